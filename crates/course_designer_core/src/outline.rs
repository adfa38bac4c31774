//! crates/course_designer_core/src/outline.rs
//!
//! Turns a topic into a list of module stubs with a single provider request.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::domain::{ContentDepth, OutlineModule, MAX_MODULES, MIN_MODULES};
use crate::ports::{PortError, PortResult, StructuredRequest, TextGenerationService};

fn outline_prompt(topic: &str, count: usize, depth: ContentDepth) -> String {
    format!(
        r#"You are an expert instructional designer. A user wants a course on: "{topic}". Generate a course outline with exactly {count} module titles and a one-sentence description for each. The course will be written at {depth} depth. Focus on a logical progression for a beginner. Output ONLY in the specified JSON format."#,
        depth = depth.as_str(),
    )
}

fn outline_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "modules": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "description": { "type": "string" }
                    },
                    "required": ["title", "description"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["modules"],
        "additionalProperties": false
    })
}

/// Providers answer either `{"modules": [...]}` or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum OutlineResponse {
    Wrapped { modules: Vec<OutlineModule> },
    Bare(Vec<OutlineModule>),
}

impl OutlineResponse {
    fn into_modules(self) -> Vec<OutlineModule> {
        match self {
            OutlineResponse::Wrapped { modules } | OutlineResponse::Bare(modules) => modules,
        }
    }
}

#[derive(Clone)]
pub struct OutlineGenerator {
    text: Arc<dyn TextGenerationService>,
}

impl OutlineGenerator {
    pub fn new(text: Arc<dyn TextGenerationService>) -> Self {
        Self { text }
    }

    /// Asks the provider for `num_modules` module stubs.
    ///
    /// A longer answer is cut to the requested count; a shorter non-empty one is
    /// passed through as-is.
    pub async fn generate(
        &self,
        topic: &str,
        num_modules: usize,
        depth: ContentDepth,
    ) -> PortResult<Vec<OutlineModule>> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PortError::Validation("prompt must not be empty".to_string()));
        }
        if !(MIN_MODULES..=MAX_MODULES).contains(&num_modules) {
            return Err(PortError::Validation(format!(
                "numModules must be between {} and {}, got {}",
                MIN_MODULES, MAX_MODULES, num_modules
            )));
        }

        let request = StructuredRequest {
            schema_name: "course_outline".to_string(),
            prompt: outline_prompt(topic, num_modules, depth),
            schema: outline_schema(),
        };

        let value = self.text.generate_json(&request).await?;
        let mut modules = serde_json::from_value::<OutlineResponse>(value)
            .map_err(|e| PortError::Generation(format!("outline did not match schema: {}", e)))?
            .into_modules();

        if modules.is_empty() {
            return Err(PortError::Generation("outline contained no modules".to_string()));
        }
        if modules.len() != num_modules {
            warn!(
                requested = num_modules,
                received = modules.len(),
                "Outline module count differs from request"
            );
            modules.truncate(num_modules);
        }

        info!(modules = modules.len(), "Outline generated");
        Ok(modules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeText;

    #[tokio::test]
    async fn returns_requested_number_of_modules() {
        let text = Arc::new(FakeText::well_behaved());
        let generator = OutlineGenerator::new(text.clone());

        let outline = generator
            .generate("Intro to X", 2, ContentDepth::Low)
            .await
            .unwrap();

        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].title, "Module 1");
        assert_eq!(text.calls(), 1);
        let requests = text.requests().await;
        assert!(requests[0].prompt.contains("\"Intro to X\""));
        assert!(requests[0].prompt.contains("exactly 2 module"));
    }

    #[tokio::test]
    async fn placeholder_text_in_the_topic_is_kept_verbatim() {
        let text = Arc::new(FakeText::well_behaved());
        let generator = OutlineGenerator::new(text.clone());

        generator
            .generate("Writing {count} and {depth} templates", 3, ContentDepth::Medium)
            .await
            .unwrap();

        let requests = text.requests().await;
        assert!(requests[0]
            .prompt
            .contains("\"Writing {count} and {depth} templates\""));
        assert!(requests[0].prompt.contains("exactly 3 module"));
        assert!(requests[0].prompt.contains("at Medium depth"));
    }

    #[tokio::test]
    async fn accepts_a_bare_array_and_truncates_extra_modules() {
        let text = Arc::new(FakeText::new(|_| {
            Ok(json!([
                {"title": "A", "description": "a"},
                {"title": "B", "description": "b"},
                {"title": "C", "description": "c"}
            ]))
        }));
        let generator = OutlineGenerator::new(text);

        let outline = generator.generate("topic", 2, ContentDepth::High).await.unwrap();

        assert_eq!(
            outline.iter().map(|m| m.title.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }

    #[tokio::test]
    async fn passes_through_a_shorter_outline() {
        let text = Arc::new(FakeText::new(|_| {
            Ok(json!({"modules": [{"title": "Only", "description": "one"}]}))
        }));
        let generator = OutlineGenerator::new(text);

        let outline = generator.generate("topic", 3, ContentDepth::Low).await.unwrap();
        assert_eq!(outline.len(), 1);
    }

    #[tokio::test]
    async fn rejects_invalid_input_without_calling_the_provider() {
        let text = Arc::new(FakeText::well_behaved());
        let generator = OutlineGenerator::new(text.clone());

        assert!(matches!(
            generator.generate("  ", 2, ContentDepth::Low).await,
            Err(PortError::Validation(_))
        ));
        assert!(matches!(
            generator.generate("topic", 0, ContentDepth::Low).await,
            Err(PortError::Validation(_))
        ));
        assert!(matches!(
            generator.generate("topic", 4, ContentDepth::Low).await,
            Err(PortError::Validation(_))
        ));
        assert_eq!(text.calls(), 0);
    }

    #[tokio::test]
    async fn surfaces_provider_and_schema_failures() {
        let missing_key = OutlineGenerator::new(Arc::new(FakeText::new(|_| {
            Err(PortError::Configuration("OPENAI_API_KEY is not set".to_string()))
        })));
        assert!(matches!(
            missing_key.generate("topic", 1, ContentDepth::Low).await,
            Err(PortError::Configuration(_))
        ));

        let garbage = OutlineGenerator::new(Arc::new(FakeText::new(|_| Ok(json!({"nope": 1})))));
        assert!(matches!(
            garbage.generate("topic", 1, ContentDepth::Low).await,
            Err(PortError::Generation(_))
        ));

        let empty = OutlineGenerator::new(Arc::new(FakeText::new(|_| Ok(json!({"modules": []})))));
        assert!(matches!(
            empty.generate("topic", 1, ContentDepth::Low).await,
            Err(PortError::Generation(_))
        ));
    }
}

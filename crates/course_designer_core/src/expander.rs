//! crates/course_designer_core/src/expander.rs
//!
//! Expands an approved outline into a full course. Every module is requested
//! concurrently alongside a cover prompt; a module that fails to generate is
//! kept as an empty module so the course always has one module per outline entry.
//! Images are then generated for the cover and every slide.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::domain::{
    ContentDepth, Course, CourseCover, CourseModule, DepthConfig, ImageKey, OutlineModule,
    QuizQuestion, Slide, QUIZ_OPTIONS, QUIZ_QUESTIONS_PER_MODULE, SLIDES_PER_MODULE,
};
use crate::images::{ImageOrchestrator, ImageRequest};
use crate::ports::{PortError, PortResult, StructuredRequest, TextGenerationService};

/// Prompt for one module. User text is substituted in a single pass, so braces in
/// a topic or title reach the model verbatim.
fn module_prompt(
    topic: &str,
    outline: &[OutlineModule],
    index: usize,
    config: DepthConfig,
) -> String {
    let stub = &outline[index];
    let outline_json = serde_json::to_string(outline).unwrap_or_default();
    format!(
        r#"You are an expert instructional designer writing one module of a course on "{topic}".
The full course outline is: {outline_json}

Write module {number} of {total}: "{title}" ({description}).

Create exactly {slides} slides. Every slide has a title, a descriptive image_prompt for an educational illustration, and content with:
- summary: a single paragraph of about {summary_words} words
- details: exactly {details} paragraphs expanding on the summary
- deep_dive: exactly {deep_dive} paragraphs with advanced, nuanced information

Then create a quiz of exactly {quiz} multiple-choice questions testing the key concepts. Every question has exactly {options} options, and correct_answer must be copied verbatim from one of the options.

Output ONLY valid JSON matching the specified schema."#,
        number = index + 1,
        total = outline.len(),
        title = stub.title,
        description = stub.description,
        slides = SLIDES_PER_MODULE,
        summary_words = config.summary_words,
        details = config.details_items,
        deep_dive = config.deep_dive_items,
        quiz = QUIZ_QUESTIONS_PER_MODULE,
        options = QUIZ_OPTIONS,
    )
}

fn cover_prompt(topic: &str, outline: &[OutlineModule]) -> String {
    let titles = outline
        .iter()
        .map(|m| m.title.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"You are designing the cover of a course on "{topic}" with these modules: {titles}.
Write one vivid, descriptive image prompt for the cover illustration. Output ONLY valid JSON matching the specified schema."#
    )
}

fn module_schema() -> Value {
    let string_array = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "properties": {
            "slides": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "image_prompt": { "type": "string" },
                        "content": {
                            "type": "object",
                            "properties": {
                                "summary": { "type": "string" },
                                "details": string_array,
                                "deep_dive": string_array
                            },
                            "required": ["summary", "details", "deep_dive"],
                            "additionalProperties": false
                        }
                    },
                    "required": ["title", "image_prompt", "content"],
                    "additionalProperties": false
                }
            },
            "quiz": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "question": { "type": "string" },
                        "options": string_array,
                        "correct_answer": { "type": "string" }
                    },
                    "required": ["question", "options", "correct_answer"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["slides", "quiz"],
        "additionalProperties": false
    })
}

fn cover_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "cover": {
                "type": "object",
                "properties": { "image_prompt": { "type": "string" } },
                "required": ["image_prompt"],
                "additionalProperties": false
            }
        },
        "required": ["cover"],
        "additionalProperties": false
    })
}

/// What a module request is expected to return. Missing arrays read as empty.
#[derive(Deserialize)]
struct GeneratedModule {
    #[serde(default)]
    slides: Vec<Slide>,
    #[serde(default)]
    quiz: Vec<QuizQuestion>,
}

#[derive(Clone)]
pub struct CourseExpander {
    text: Arc<dyn TextGenerationService>,
    images: Arc<ImageOrchestrator>,
}

impl CourseExpander {
    pub fn new(text: Arc<dyn TextGenerationService>, images: Arc<ImageOrchestrator>) -> Self {
        Self { text, images }
    }

    /// Builds a complete course from an approved outline.
    pub async fn expand(
        &self,
        topic: &str,
        outline: &[OutlineModule],
        depth: ContentDepth,
    ) -> PortResult<Course> {
        if outline.is_empty() {
            return Err(PortError::Validation("outline must not be empty".to_string()));
        }

        let now = Utc::now();
        let id = now.timestamp_millis().to_string();
        info!(course_id = %id, modules = outline.len(), depth = depth.as_str(), "Expanding course");

        let modules = join_all(
            (0..outline.len()).map(|index| self.generate_module(topic, outline, index, depth)),
        );
        let (cover_prompt, modules) = tokio::join!(self.generate_cover_prompt(topic, outline), modules);

        let mut course = Course {
            id,
            prompt: topic.to_string(),
            depth,
            cover: CourseCover {
                image_prompt: cover_prompt,
                image_url: String::new(),
            },
            modules,
            created_at: now,
            updated_at: now,
        };

        self.illustrate(&mut course).await;
        Ok(course)
    }

    async fn generate_module(
        &self,
        topic: &str,
        outline: &[OutlineModule],
        index: usize,
        depth: ContentDepth,
    ) -> CourseModule {
        let stub = &outline[index];

        let request = StructuredRequest {
            schema_name: "course_module".to_string(),
            prompt: module_prompt(topic, outline, index, depth.config()),
            schema: module_schema(),
        };

        let generated = match self.text.generate_json(&request).await {
            Ok(value) => serde_json::from_value::<GeneratedModule>(value)
                .map_err(|e| PortError::Generation(format!("module did not match schema: {}", e))),
            Err(e) => Err(e),
        };

        match generated {
            Ok(generated) => assemble_module(stub, generated, index),
            Err(e) => {
                warn!(module = index, "Module generation failed, keeping it empty: {}", e);
                CourseModule::empty(stub)
            }
        }
    }

    async fn generate_cover_prompt(&self, topic: &str, outline: &[OutlineModule]) -> String {
        let request = StructuredRequest {
            schema_name: "course_cover".to_string(),
            prompt: cover_prompt(topic, outline),
            schema: cover_schema(),
        };

        let prompt = match self.text.generate_json(&request).await {
            Ok(value) => value["cover"]["image_prompt"]
                .as_str()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            Err(e) => {
                warn!("Cover prompt generation failed: {}", e);
                None
            }
        };
        prompt.unwrap_or_else(|| format!("A welcoming cover illustration for a course about {}", topic))
    }

    /// Generates the cover and slide images and writes the URLs back into the course.
    async fn illustrate(&self, course: &mut Course) {
        if !self.images.is_enabled() {
            info!("Image generation disabled; course images left empty");
            return;
        }

        let (slots, requests): (Vec<_>, Vec<_>) = course
            .image_slots()
            .into_iter()
            .map(|(slot, prompt, _)| {
                (
                    slot,
                    ImageRequest::with_destination(prompt, ImageKey::new(course.id.as_str(), slot)),
                )
            })
            .unzip();

        let report = self.images.generate_all(&requests).await;
        for (slot, url) in slots.into_iter().zip(report.urls) {
            course.set_image_url(slot, url);
        }
    }
}

fn assemble_module(stub: &OutlineModule, generated: GeneratedModule, index: usize) -> CourseModule {
    let mut slides = generated.slides;
    slides.truncate(SLIDES_PER_MODULE);
    for slide in &mut slides {
        slide.image_url.clear();
    }

    let received = generated.quiz.len();
    let mut quiz: Vec<QuizQuestion> = generated
        .quiz
        .into_iter()
        .filter(QuizQuestion::is_valid)
        .collect();
    if quiz.len() < received {
        warn!(
            module = index,
            dropped = received - quiz.len(),
            "Dropped quiz questions whose answer is not one of four options"
        );
    }
    quiz.truncate(QUIZ_QUESTIONS_PER_MODULE);

    CourseModule {
        slides,
        quiz,
        ..CourseModule::empty(stub)
    }
}

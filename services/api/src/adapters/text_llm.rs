//! services/api/src/adapters/text_llm.rs
//!
//! This module contains the adapter for the text-generation LLM.
//! It implements the `TextGenerationService` port from the `core` crate using
//! OpenAI chat completions constrained by a JSON schema.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use course_designer_core::ports::{
    PortError, PortResult, StructuredRequest, TextGenerationService,
};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

// Matches a reply wrapped in a markdown code fence, with or without a language tag.
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("Invalid regex pattern")
});

const SYSTEM_INSTRUCTIONS: &str = "You are an expert instructional designer who writes clear, accurate, engaging course material. Always answer with JSON that matches the requested schema exactly.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTextAdapter {
    /// `None` when no API key is configured; every call then fails with a
    /// configuration error instead of the server refusing to start.
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiTextAdapter {
    /// Creates a new `OpenAiTextAdapter`.
    pub fn new(api_key: Option<&str>, model: String) -> Self {
        let client = api_key.map(|key| Client::with_config(OpenAIConfig::new().with_api_key(key)));
        Self { client, model }
    }
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for OpenAiTextAdapter {
    async fn generate_json(&self, request: &StructuredRequest) -> PortResult<Value> {
        let client = self.client.as_ref().ok_or_else(|| {
            PortError::Configuration("OPENAI_API_KEY is not set".to_string())
        })?;

        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_INSTRUCTIONS)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.prompt.as_str())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    name: request.schema_name.clone(),
                    description: None,
                    schema: Some(request.schema.clone()),
                    strict: Some(true),
                },
            })
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!(schema = %request.schema_name, model = %self.model, "Sending structured request");

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = client
            .chat()
            .create(chat_request)
            .await
            .map_err(map_openai_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Generation("LLM response contained no text content.".to_string())
            })?;

        parse_json_content(&content)
    }
}

fn map_openai_error(e: OpenAIError) -> PortError {
    match &e {
        OpenAIError::ApiError(api) if api.code.as_deref() == Some("invalid_api_key") => {
            PortError::Configuration(api.message.clone())
        }
        _ => PortError::Generation(e.to_string()),
    }
}

/// Parses model output as JSON, tolerating a surrounding markdown code fence.
fn parse_json_content(content: &str) -> PortResult<Value> {
    let body = CODE_FENCE
        .captures(content)
        .and_then(|c| c.get(1))
        .map_or(content, |m| m.as_str());

    serde_json::from_str(body.trim())
        .map_err(|e| PortError::Generation(format!("LLM output was not valid JSON: {}", e)))
}

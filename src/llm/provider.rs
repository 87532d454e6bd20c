//! LLM provider abstraction and trait definitions
//!
//! Every agent talks to a hosted model through [`LlmProvider`], so the
//! pipeline can run against Gemini, an OpenAI-compatible endpoint, or a mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Message roles in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// LLM completion request parameters
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub response_format: Option<ResponseFormat>,
    /// Ask the provider to ground the answer in live web search results
    pub grounding: bool,
    pub metadata: HashMap<String, String>,
}

impl CompletionRequest {
    /// Single-prompt request, the shape every agent uses
    pub fn from_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            model: model.into(),
            max_tokens: None,
            temperature: None,
            response_format: None,
            grounding: false,
            metadata: HashMap::new(),
        }
    }

    pub fn with_json_output(mut self) -> Self {
        self.response_format = Some(ResponseFormat::Json);
        self
    }

    pub fn with_grounding(mut self, grounding: bool) -> Self {
        self.grounding = grounding;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A web source returned alongside a grounded completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

/// LLM completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Text segments the provider reports as supported by a citation
    #[serde(default)]
    pub grounding_supports: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl CompletionResponse {
    /// Response text, empty when the provider returned no content
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason why completion finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

/// Response format for structured outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Plain text response
    #[default]
    Text,
    /// JSON object without schema validation
    Json,
}

/// LLM provider trait for dependency injection and testing
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "gemini", "openai")
    fn name(&self) -> &str;

    /// Get list of available models for this provider
    fn available_models(&self) -> Vec<String>;

    /// Generate a completion from the given request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Check if the provider is configured and ready
    async fn health_check(&self) -> Result<(), LlmError>;
}

/// LLM provider errors
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error: {0}")]
    ApiError(String),
}

/// Parse a JSON object out of model output.
///
/// Models frequently wrap JSON in markdown fences or add a sentence before
/// it, so fences are stripped and the outermost `{ ... }` is taken.
pub fn parse_json_response(text: &str) -> Result<serde_json::Value, LlmError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(value) = serde_json::from_str(unfenced) {
        return Ok(value);
    }

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&unfenced[start..=end])
            .map_err(|e| LlmError::InvalidResponse(format!("Malformed JSON from model: {e}"))),
        _ => Err(LlmError::InvalidResponse(
            "Model output contained no JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::from_prompt("gemini-2.0-flash", "Hello!")
            .with_json_output()
            .with_grounding(true)
            .with_temperature(Some(0.7));

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, MessageRole::User);
        assert_eq!(request.model, "gemini-2.0-flash");
        assert_eq!(request.response_format, Some(ResponseFormat::Json));
        assert!(request.grounding);
        assert_eq!(request.temperature, Some(0.7));
    }

    #[test]
    fn test_token_usage_default() {
        let usage = TokenUsage::default();
        assert_eq!(usage.prompt_tokens, 0);
        assert_eq!(usage.completion_tokens, 0);
        assert_eq!(usage.total_tokens, 0);
    }

    #[test]
    fn test_llm_error_display() {
        let errors = vec![
            LlmError::NotConfigured("test".to_string()),
            LlmError::AuthenticationFailed("test".to_string()),
            LlmError::ModelNotFound("test".to_string()),
            LlmError::RateLimitExceeded("test".to_string()),
            LlmError::RequestFailed("test".to_string()),
            LlmError::InvalidRequest("test".to_string()),
            LlmError::NetworkError("test".to_string()),
            LlmError::ApiError("test".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageRole::System).unwrap(),
            "\"system\""
        );
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_parse_json_response_plain() {
        let value = parse_json_response(r#"{"status": "CONTINUE"}"#).unwrap();
        assert_eq!(value["status"], "CONTINUE");
    }

    #[test]
    fn test_parse_json_response_fenced() {
        let text = "```json\n{\"reply\": \"hi\"}\n```";
        let value = parse_json_response(text).unwrap();
        assert_eq!(value["reply"], "hi");
    }

    #[test]
    fn test_parse_json_response_with_preamble() {
        let text = "Sure! Here it is: {\"confidence\": 0.8} hope that helps";
        let value = parse_json_response(text).unwrap();
        assert_eq!(value["confidence"], 0.8);
    }

    #[test]
    fn test_parse_json_response_rejects_prose() {
        assert!(matches!(
            parse_json_response("no json here"),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}

//! LLM provider implementations
//!
//! This module contains concrete implementations of the LlmProvider trait
//! for different LLM services, plus the HTTP error handling they share.

pub mod gemini;
pub mod openai;

pub use gemini::*;
pub use openai::*;

use crate::llm::provider::LlmError;
use reqwest::StatusCode;

/// Delays between retries of a failed request, in milliseconds
pub(crate) const RETRY_BACKOFF_MS: [u64; 3] = [100, 200, 300];

/// Map a non-success HTTP status to the provider error it represents
pub(crate) fn status_to_error(provider: &str, status: StatusCode, body: &str) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::AuthenticationFailed(format!("{provider} rejected the API key: {status}"))
        }
        StatusCode::NOT_FOUND => LlmError::ModelNotFound(format!("{provider}: {body}")),
        StatusCode::TOO_MANY_REQUESTS => {
            LlmError::RateLimitExceeded(format!("{provider}: {body}"))
        }
        s if s.is_server_error() => {
            LlmError::ApiError(format!("{provider} API server error: {status} - {body}"))
        }
        _ => LlmError::ApiError(format!("{provider} API error: {status} - {body}")),
    }
}

/// Check if error should trigger retry (pure)
pub(crate) fn should_retry(error: &LlmError) -> bool {
    match error {
        LlmError::NetworkError(_) | LlmError::RateLimitExceeded(_) => true,
        LlmError::ApiError(msg) => msg.contains("server error"),
        _ => false,
    }
}

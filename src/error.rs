//! Error types for the companion pipeline
//!
//! Provider, configuration and persistence failures each have their own
//! enum close to where they happen. [`NiravaError`] wraps them at the
//! orchestrator boundary, and [`NiravaError::user_message`] is the only form
//! that is ever shown to the user.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::session::SessionError;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum NiravaError {
    #[error("LLM provider error: {message}")]
    Llm { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Pipeline stage '{stage}' failed: {message}")]
    Pipeline { stage: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NiravaError {
    pub fn llm_error<S: Into<String>>(message: S) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn pipeline<S: Into<String>, M: Into<String>>(stage: S, message: M) -> Self {
        Self::Pipeline {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Sanitized message safe to print in the chat
    pub fn user_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_MESSAGE_LEN: usize = 500;
const TRUNCATE_SUFFIX: &str = "...[truncated]";

/// Redact credentials and sensitive paths, then cap the length at 500 bytes
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .into_owned();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN - TRUNCATE_SUFFIX.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(TRUNCATE_SUFFIX);
    }

    sanitized
}

/// Result type for pipeline operations
pub type NiravaResult<T> = Result<T, NiravaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let error = NiravaError::llm_error("model timeout");
        assert!(matches!(error, NiravaError::Llm { .. }));
        assert_eq!(error.to_string(), "LLM provider error: model timeout");

        let error = NiravaError::invalid_input("empty message");
        assert_eq!(error.to_string(), "Invalid input: empty message");

        let error = NiravaError::internal_error("unexpected state");
        assert_eq!(error.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_pipeline_error_names_stage() {
        let error = NiravaError::pipeline("research", "no sources");
        assert_eq!(
            error.to_string(),
            "Pipeline stage 'research' failed: no sources"
        );
    }

    #[test]
    fn test_from_llm_error() {
        let error: NiravaError = LlmError::RateLimitExceeded("slow down".to_string()).into();
        assert!(matches!(error, NiravaError::Provider(_)));
        assert!(error.to_string().contains("slow down"));
    }

    #[test]
    fn test_user_message_is_sanitized() {
        let error = NiravaError::llm_error("request failed with key=AIzaSecret123");
        let message = error.user_message();
        assert!(!message.contains("AIzaSecret123"));
        assert!(message.contains("key=***"));
    }

    #[test]
    fn test_sanitize_multiple_secrets() {
        let message = "Auth failed: password=pass1 api_key=key123 secret=hidden token=tok456";
        let sanitized = sanitize_error_message(message);

        assert!(!sanitized.contains("pass1"));
        assert!(!sanitized.contains("key123"));
        assert!(!sanitized.contains("hidden"));
        assert!(!sanitized.contains("tok456"));
        assert!(sanitized.contains("password=***"));
        assert!(sanitized.contains("key=***"));
    }

    #[test]
    fn test_sanitize_case_insensitive_and_colons() {
        let sanitized = sanitize_error_message("PASSWORD=secret123 Token: abc");
        assert!(!sanitized.contains("secret123"));
        assert!(!sanitized.contains("abc"));
    }

    #[test]
    fn test_file_path_redaction() {
        let sanitized = sanitize_error_message("Failed to read /home/user/.ssh/id_rsa");
        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("/home/user/.ssh/id_rsa"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));

        let exact = sanitize_error_message(&"x".repeat(500));
        assert_eq!(exact.len(), 500);
        assert!(!exact.contains("truncated"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"é".repeat(400));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_sanitize_empty_message() {
        assert_eq!(sanitize_error_message(""), "");
    }
}

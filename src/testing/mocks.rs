//! Mock implementations for testing
//!
//! [`MockLlmProvider`] replays scripted responses so agents and the
//! orchestrator can be exercised without network access.

use crate::llm::provider::{
    Citation, CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider,
    TokenUsage,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Scripted LLM provider.
///
/// Responses are returned in order and cycle once exhausted. Every request
/// is recorded for later inspection.
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    pub current_response: Arc<Mutex<usize>>,
    pub should_fail: bool,
    pub citations: Vec<Citation>,
    pub grounding_supports: Vec<String>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Attach web sources to every grounded response
    pub fn with_citations(mut self, citations: Vec<Citation>, supports: Vec<String>) -> Self {
        self.citations = citations;
        self.grounding_supports = supports;
        self
    }

    pub async fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn available_models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let grounded = request.grounding;
        self.requests.lock().await.push(request);

        if self.should_fail {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let mut current = self.current_response.lock().await;
        let response_idx = *current % self.responses.len().max(1);
        *current += 1;

        let content = if self.responses.is_empty() {
            "Mock response".to_string()
        } else {
            self.responses[response_idx].clone()
        };

        let (citations, grounding_supports) = if grounded {
            (self.citations.clone(), self.grounding_supports.clone())
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(CompletionResponse {
            content: Some(content),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            citations,
            grounding_supports,
            metadata: HashMap::new(),
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.should_fail {
            Err(LlmError::RequestFailed(
                "Mock health check failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

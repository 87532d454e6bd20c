//! The companion's specialist agents
//!
//! Intake runs as a loop over the conversation until enough data is
//! collected. The remaining agents implement [`PipelineStage`] and run in
//! sequence over a shared [`AgentContext`], each one enriching it for the
//! next. Every agent that talks to a model has a deterministic fallback.

pub mod coach;
pub mod intake;
pub mod metrics;
pub mod nutrition;
pub mod parsing;
pub mod planner;
pub mod registry;
pub mod research;

pub use coach::CoachAgent;
pub use intake::{IntakeAgent, IntakeOutcome, IntakeStatus};
pub use metrics::{MetricsAgent, MetricsReport};
pub use nutrition::{MealPlan, NutritionAgent};
pub use planner::{ActionPlan, PlannerAgent};
pub use registry::{AgentCard, AgentRegistry, AgentSkill};
pub use research::{ResearchAgent, ResearchFindings};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::NiravaResult;
use crate::llm::{parse_json_response, CompletionRequest, CompletionResponse, LlmError, LlmProvider};
use crate::models::{ChatMessage, DailyCheckIn, IssueType, JourneyMode, UserProfile};
use crate::observability::metrics as obs_metrics;

/// Everything the analysis pipeline knows about the user, filled in stage by stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentContext {
    pub issue_type: IssueType,
    pub journey_mode: Option<JourneyMode>,
    pub profile: UserProfile,
    pub checkin: DailyCheckIn,
    pub history: Vec<ChatMessage>,
    /// Summary of older turns produced by context compaction
    pub context_summary: Option<String>,
    /// Turns folded into `context_summary`, still screened for red flags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub earlier_messages: Vec<ChatMessage>,
    pub metrics: Option<MetricsReport>,
    pub research: Option<ResearchFindings>,
    pub plan: Option<ActionPlan>,
    pub meal_plan: Option<MealPlan>,
    pub response: Option<String>,
}

/// One step of the analysis pipeline
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Stage name used in traces and metrics
    fn name(&self) -> &'static str;

    fn card(&self) -> AgentCard;

    /// Conditional stages override this
    fn should_run(&self, _context: &AgentContext) -> bool {
        true
    }

    async fn run(&self, context: &mut AgentContext) -> NiravaResult<()>;
}

/// A provider bound to the model settings an agent should use
#[derive(Clone)]
pub struct AgentModel {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    grounding: bool,
}

impl AgentModel {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            grounding: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Allow search-grounded requests when the provider supports them
    pub fn with_grounding(mut self, grounding: bool) -> Self {
        self.grounding = grounding;
        self
    }

    pub fn grounding_enabled(&self) -> bool {
        self.grounding
    }

    fn request(&self, prompt: impl Into<String>) -> CompletionRequest {
        CompletionRequest::from_prompt(&self.model, prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        obs_metrics().llm_call();
        let result = self.provider.complete(request).await;
        if result.is_err() {
            obs_metrics().llm_failure();
        }
        result
    }

    /// Plain-text completion; an empty answer counts as a failure
    pub async fn generate_text(&self, prompt: impl Into<String>) -> Result<String, LlmError> {
        let response = self.complete(self.request(prompt)).await?;
        let text = response.text().trim();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("Model returned no text".to_string()));
        }
        Ok(text.to_string())
    }

    /// JSON-mode completion parsed into a value
    pub async fn generate_json(&self, prompt: impl Into<String>) -> Result<serde_json::Value, LlmError> {
        let response = self
            .complete(self.request(prompt).with_json_output())
            .await?;
        parse_json_response(response.text())
    }

    /// JSON-mode completion, search-grounded when both the caller and this model allow it
    pub async fn generate_grounded(
        &self,
        prompt: impl Into<String>,
        grounded: bool,
    ) -> Result<CompletionResponse, LlmError> {
        let request = self
            .request(prompt)
            .with_json_output()
            .with_grounding(grounded && self.grounding);
        self.complete(request).await
    }
}

impl std::fmt::Debug for AgentModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentModel")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("grounding", &self.grounding)
            .finish()
    }
}

/// Record that an agent answered without the model
pub(crate) fn note_fallback(agent: &str, reason: &str) {
    obs_metrics().fallback_used();
    tracing::warn!(agent, reason, "Using deterministic fallback");
}

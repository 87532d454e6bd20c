//! Conversation orchestrator
//!
//! [`NiravaSystem`] owns the live conversation and its session. Each user
//! message runs the intake loop; once intake has enough data the analysis
//! pipeline (metrics, research, planner, nutrition, coach) runs over an
//! [`AgentContext`] and the coach's reply is returned. Every turn is traced
//! and persisted.

use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use crate::agents::{
    AgentContext, AgentModel, AgentRegistry, CoachAgent, IntakeAgent, IntakeStatus, MetricsAgent,
    NutritionAgent, PipelineStage, PlannerAgent, ResearchAgent,
};
use crate::config::NiravaConfig;
use crate::context::{CompactedContext, ContextEngine, ConversationFacts};
use crate::error::NiravaResult;
use crate::health::Climate;
use crate::llm::LlmProvider;
use crate::models::{ConversationState, IssueType, Phase, UserProfile};
use crate::observability::{
    metrics, session_span, stage_span, AgentTrace, PipelineMetrics, PipelineSummary, Tracer,
};
use crate::session::store::sanitize_id;
use crate::session::{Session, SessionStore};

/// Reply used when the analysis pipeline fails
pub const PIPELINE_APOLOGY: &str = "I encountered an issue analyzing your data, but here's what I can suggest: Focus on getting 7-8 hours of sleep tonight, drink plenty of water, and take a short walk if you can. Let me know how you're feeling!";

/// Reply used when the coach produced nothing
pub const DEFAULT_REPLY: &str = "Your health plan is ready.";

pub const GOODBYE: &str = "Take care! Goodbye.";

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

/// Whether the user asked to leave the conversation
pub fn is_exit_command(text: &str) -> bool {
    let text = text.trim();
    EXIT_WORDS.iter().any(|w| text.eq_ignore_ascii_case(w))
}

/// The wellness companion: intake loop, analysis pipeline and session
pub struct NiravaSystem {
    config: NiravaConfig,
    model: Option<AgentModel>,
    user_id: String,
    state: ConversationState,
    session: Session,
    store: SessionStore,
    context_engine: ContextEngine,
    intake: IntakeAgent,
    stages: Vec<Box<dyn PipelineStage>>,
    registry: AgentRegistry,
    pipeline_metrics: PipelineMetrics,
    traces: Vec<AgentTrace>,
    compacted: Option<CompactedContext>,
    facts: ConversationFacts,
    last_context: Option<AgentContext>,
}

impl NiravaSystem {
    /// Build the system. Without a provider every agent runs its fallback.
    ///
    /// When `session_id` names a stored session it is resumed, otherwise a
    /// new session is created (under that id if one was given).
    pub fn new(
        config: NiravaConfig,
        provider: Option<Arc<dyn LlmProvider>>,
        mut store: SessionStore,
        user_id: &str,
        session_id: Option<&str>,
    ) -> NiravaResult<Self> {
        let model = provider.map(|provider| {
            AgentModel::new(provider, &config.llm.model)
                .with_temperature(config.llm.temperature)
                .with_max_tokens(config.llm.max_tokens)
                .with_grounding(config.llm.grounding)
        });

        let session = match session_id.map(sanitize_id) {
            Some(id) => match store.get(&id) {
                Some(existing) => {
                    info!(session_id = %id, "Resuming stored session");
                    existing.clone()
                }
                None => store.create_with_id(user_id, &id)?,
            },
            None => store.create(user_id)?,
        };

        let state = if session.history.is_empty() {
            ConversationState::with_profile(UserProfile::named(&config.companion.user_name))
        } else {
            session.to_state()
        };

        let stages: Vec<Box<dyn PipelineStage>> = vec![
            Box::new(MetricsAgent::new(Climate::default())),
            Box::new(ResearchAgent::new(model.clone(), config.research.clone())),
            Box::new(PlannerAgent::new(model.clone())),
            Box::new(NutritionAgent::new(model.clone())),
            Box::new(CoachAgent::new(model.clone())),
        ];

        let registry = AgentRegistry::new();
        registry.register(IntakeAgent::card());
        for stage in &stages {
            registry.register(stage.card());
        }

        info!(
            session_id = %session.session_id,
            fallback_mode = model.is_none(),
            agents = registry.len(),
            "Nirava system ready"
        );

        Ok(Self {
            context_engine: ContextEngine::new(model.clone(), config.context.clone()),
            intake: IntakeAgent::new(model.clone()),
            compacted: None,
            user_id: user_id.to_string(),
            config,
            model,
            state,
            session,
            store,
            stages,
            registry,
            pipeline_metrics: PipelineMetrics::default(),
            traces: Vec::new(),
            facts: ConversationFacts::default(),
            last_context: None,
        })
    }

    /// Opening message with the three journeys
    pub fn greeting(&self) -> String {
        format!(
            "Hey! I'm {name}.\n\n\
             I'm your health companion for the 6 Pillars of Preventative Health:\n\
             Sleep | Hydration | Movement | Mental Health | Social Connection | Toxin Avoidance\n\n\
             I can help you in three ways:\n\n\
             Path A: Quick Diagnosis (5-10 min)\n\
             -> Understand what's going on with your health right now.\n\
             -> You'll get: a snapshot, key insights and 2-3 immediate actions.\n\n\
             Path B: Deep Education (10-15 min)\n\
             -> Learn WHY you're feeling this way and the science behind it.\n\
             -> You'll get: simple explanations and research-backed insights.\n\n\
             Path C: Build a Personalized Plan (15-20 min)\n\
             -> Get a meal plan, micro-habits and a weekly action plan.\n\
             -> You'll get: a custom meal plan and 5-7 micro-habits.\n\n\
             Choose your path by typing A, B, or C.\n\
             Or just tell me what you're going through (e.g., \"I'm stressed\" or \"I can't sleep\"), \
             and I'll guide you to the right path.\n\n\
             What would you like to explore?",
            name = self.config.companion.name
        )
    }

    /// Handle one user message and return the companion's reply
    pub async fn process(&mut self, text: &str) -> String {
        let span = session_span!(
            session_id = %self.session.session_id,
            turn = self.state.user_turns() + 1
        );
        let reply = self.process_turn(text).instrument(span).await;
        metrics().turn_processed();
        reply
    }

    async fn process_turn(&mut self, text: &str) -> String {
        self.state.add_user_message(text);

        if self.context_engine.should_compact(&self.state.history) {
            let compacted = self
                .context_engine
                .compact(&self.state.history, &self.facts)
                .await;
            self.facts = compacted.extracted_facts.clone();
            if !compacted.summary.is_empty() {
                self.session.context_summary = Some(compacted.summary.clone());
            }
            self.compacted = Some(compacted);
        }

        let tracer = Tracer::start("IntakeAgent", text);
        let outcome = self
            .intake
            .run(&mut self.state)
            .instrument(stage_span!(stage = "intake"))
            .await;
        self.traces
            .push(tracer.finish(&Ok::<(), Infallible>(()), &mut self.pipeline_metrics));

        if !outcome.updated.is_empty() {
            debug!(fields = ?outcome.updated, "Check-in updated");
        }

        if self.state.phase == Phase::Intake && outcome.status == IntakeStatus::Continue {
            let reply = outcome
                .reply
                .unwrap_or_else(|| "Tell me more.".to_string());
            self.state.add_agent_message(&reply);
            self.persist();
            return reply;
        }

        if self.state.phase == Phase::Intake {
            info!("Intake complete, starting analysis");
            self.state.phase = Phase::Analysis;
        }

        let mut context = self.build_context();
        let reply = match self.run_pipeline(&mut context).await {
            Ok(()) => context
                .response
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REPLY.to_string()),
            Err(e) => {
                error!(error = %e, "Analysis pipeline failed");
                PIPELINE_APOLOGY.to_string()
            }
        };

        self.last_context = Some(context);
        self.state.add_agent_message(&reply);
        self.persist();
        reply
    }

    fn build_context(&self) -> AgentContext {
        let (history, context_summary, earlier_messages) = match &self.compacted {
            Some(compacted) if !compacted.recent_messages.is_empty() => {
                let folded = self
                    .state
                    .history
                    .len()
                    .saturating_sub(compacted.recent_messages.len());
                (
                    compacted.recent_messages.clone(),
                    ContextEngine::summary_header(compacted),
                    self.state.history[..folded].to_vec(),
                )
            }
            _ => (
                self.state.history.clone(),
                self.session.context_summary.clone(),
                Vec::new(),
            ),
        };

        AgentContext {
            issue_type: self.state.issue_type.unwrap_or(IssueType::GeneralWellness),
            journey_mode: self.state.journey_mode,
            profile: self.state.profile.clone(),
            checkin: self.state.current_checkin.clone(),
            history,
            context_summary,
            earlier_messages,
            ..Default::default()
        }
    }

    async fn run_pipeline(&mut self, context: &mut AgentContext) -> NiravaResult<()> {
        for stage in &self.stages {
            if !stage.should_run(context) {
                debug!(stage = stage.name(), "Skipping stage");
                continue;
            }

            let tracer = Tracer::start(stage.name(), &format!("issue={}", context.issue_type));
            let result = stage
                .run(context)
                .instrument(stage_span!(stage = stage.name()))
                .await;
            self.traces
                .push(tracer.finish(&result, &mut self.pipeline_metrics));
            result?;
        }
        Ok(())
    }

    fn persist(&mut self) {
        self.session.capture(&self.state);
        if let Err(e) = self.store.update(&mut self.session) {
            warn!(session_id = %self.session.session_id, error = %e, "Failed to save session");
        }
    }

    /// Save the session and snapshot it; returns the checkpoint id
    pub fn create_checkpoint(&mut self) -> NiravaResult<String> {
        self.session.capture(&self.state);
        self.store.update(&mut self.session)?;

        let summary = self.session.context_summary.clone().unwrap_or_default();
        let checkpoint = self
            .store
            .create_checkpoint(&self.session.session_id, &summary)?;
        if let Some(saved) = self.store.get(&self.session.session_id) {
            self.session = saved.clone();
        }
        Ok(checkpoint.checkpoint_id)
    }

    /// Roll the conversation back to a checkpoint
    pub fn resume_from_checkpoint(&mut self, checkpoint_id: &str) -> NiravaResult<()> {
        let session = self.store.resume_from_checkpoint(checkpoint_id)?;
        self.state = session.to_state();
        self.compacted = None;
        self.facts = ConversationFacts::default();
        self.last_context = None;
        self.session = session;
        info!(
            session_id = %self.session.session_id,
            phase = %self.state.phase,
            "Conversation restored"
        );
        Ok(())
    }

    /// Start over with a fresh session
    pub fn reset(&mut self) -> NiravaResult<()> {
        self.session = self.store.create(&self.user_id)?;
        self.state =
            ConversationState::with_profile(UserProfile::named(&self.config.companion.user_name));
        self.context_engine = ContextEngine::new(self.model.clone(), self.config.context.clone());
        self.pipeline_metrics = PipelineMetrics::default();
        self.traces.clear();
        self.compacted = None;
        self.facts = ConversationFacts::default();
        self.last_context = None;
        Ok(())
    }

    pub fn metrics_summary(&self) -> PipelineSummary {
        self.pipeline_metrics.summary()
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Mutable access, used to seed a profile before the conversation starts
    pub fn state_mut(&mut self) -> &mut ConversationState {
        &mut self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn is_fallback_mode(&self) -> bool {
        self.model.is_none()
    }

    /// Context of the most recent pipeline run
    pub fn last_context(&self) -> Option<&AgentContext> {
        self.last_context.as_ref()
    }

    pub fn traces(&self) -> &[AgentTrace] {
        &self.traces
    }
}

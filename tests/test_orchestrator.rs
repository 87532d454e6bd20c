//! End-to-end conversation tests
//!
//! Drive [`NiravaSystem`] through full conversations without a network:
//! fallback mode (no provider), a failing provider, and scripted replies.

use nirava::agents::coach::FALLBACK_REPLY;
use nirava::agents::research::SafetyLevel;
use nirava::config::NiravaConfig;
use nirava::llm::LlmProvider;
use nirava::models::{IssueType, JourneyMode, Phase, Sex};
use nirava::orchestrator::{NiravaSystem, PIPELINE_APOLOGY};
use nirava::session::SessionStore;
use nirava::testing::MockLlmProvider;
use std::sync::Arc;
use tempfile::TempDir;

const MAX_TURNS: usize = 12;

fn fallback_system() -> NiravaSystem {
    NiravaSystem::new(
        NiravaConfig::default(),
        None,
        SessionStore::in_memory(),
        "tester",
        None,
    )
    .unwrap()
}

/// Send the opener, then answer "3" until the analysis pipeline has run.
/// Returns the final reply and the number of turns taken.
async fn converse_until_analysis(system: &mut NiravaSystem, opener: &str) -> (String, usize) {
    let mut reply = system.process(opener).await;
    let mut turns = 1;
    while system.phase() == Phase::Intake && turns < MAX_TURNS {
        reply = system.process("3").await;
        turns += 1;
    }
    (reply, turns)
}

#[tokio::test]
async fn test_fallback_conversation_reaches_analysis() {
    let mut system = fallback_system();

    let (reply, turns) =
        converse_until_analysis(&mut system, "I can't focus at work, my brain feels foggy").await;

    assert_eq!(system.phase(), Phase::Analysis);
    assert!(turns < MAX_TURNS);
    assert!(reply.starts_with(FALLBACK_REPLY));
    assert_ne!(reply, PIPELINE_APOLOGY);

    assert_eq!(system.state().issue_type, Some(IssueType::MentalFatigue));
    let checkin = &system.state().current_checkin;
    assert!(checkin.is_complete());

    let context = system.last_context().unwrap();
    assert!(context.metrics.is_some());
    assert!(context.research.as_ref().is_some_and(|r| !r.insights.is_empty()));
    assert!(context.plan.as_ref().is_some_and(|p| !p.actions.is_empty()));
    assert!(context.meal_plan.is_none());
}

#[tokio::test]
async fn test_red_flag_survives_compaction() {
    let mut config = NiravaConfig::default();
    config.context.max_recent_messages = 2;
    config.context.max_history_messages = 4;
    let mut system =
        NiravaSystem::new(config, None, SessionStore::in_memory(), "tester", None).unwrap();

    let (_, turns) =
        converse_until_analysis(&mut system, "I have chest pain and feel tired all day").await;

    assert_eq!(system.phase(), Phase::Analysis);
    assert!(turns > 2);
    let context = system.last_context().unwrap();
    assert_eq!(context.history.len(), 2);
    assert!(context
        .history
        .iter()
        .all(|m| !m.content.contains("chest pain")));
    assert!(!context.earlier_messages.is_empty());

    let research = context.research.as_ref().unwrap();
    assert_eq!(research.safety.level, SafetyLevel::Urgent);
    assert!(research.insights[0].starts_with("⚠️ IMPORTANT"));
}

#[tokio::test]
async fn test_every_stage_is_traced() {
    let mut system = fallback_system();
    converse_until_analysis(&mut system, "I'm so tired and sluggish, no energy to exercise").await;

    let names: Vec<&str> = system
        .traces()
        .iter()
        .map(|t| t.agent_name.as_str())
        .collect();
    for stage in ["IntakeAgent", "MetricsAgent", "ResearchAgent", "PlannerAgent", "CoachAgent"] {
        assert!(names.contains(&stage), "missing trace for {stage}");
    }
    assert!(!names.contains(&"NutritionAgent"));
    assert!(system.traces().iter().all(|t| t.success));

    let summary = system.metrics_summary();
    assert_eq!(summary.total_requests as usize, system.traces().len());
    assert_eq!(summary.success_rate, "100.0%");
}

#[tokio::test]
async fn test_build_plan_journey_includes_meal_plan() {
    let mut system = fallback_system();
    {
        let profile = &mut system.state_mut().profile;
        profile.age = Some(30);
        profile.sex = Some(Sex::Female);
        profile.height_cm = Some(165.0);
        profile.weight_kg = Some(60.0);
    }

    converse_until_analysis(&mut system, "C").await;

    assert_eq!(system.state().journey_mode, Some(JourneyMode::BuildPlan));
    let context = system.last_context().unwrap();
    let meal_plan = context.meal_plan.as_ref().unwrap();
    assert!(!meal_plan.meals.is_empty());
    assert!(system
        .traces()
        .iter()
        .any(|t| t.agent_name == "NutritionAgent"));
}

#[tokio::test]
async fn test_failing_provider_still_completes_the_flow() {
    let provider: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider::with_failure());
    let mut system = NiravaSystem::new(
        NiravaConfig::default(),
        Some(provider),
        SessionStore::in_memory(),
        "tester",
        None,
    )
    .unwrap();
    assert!(!system.is_fallback_mode());

    let (reply, _) =
        converse_until_analysis(&mut system, "I can't fall asleep at night, always restless").await;

    assert_eq!(system.phase(), Phase::Analysis);
    assert!(reply.starts_with(FALLBACK_REPLY));
}

#[tokio::test]
async fn test_scripted_model_drives_intake_and_coach() {
    let intake_complete = r#"{
        "issue_type": "sleep_issues",
        "status": "COMPLETE",
        "reply": "",
        "extracted": {
            "sleep_hours": 4,
            "water_glasses": 5,
            "mood_score": 3,
            "energy_score": 2,
            "stress_score": 8,
            "exercise_minutes": 0
        }
    }"#;
    let coach_text = "I hear you, that's tough. Tonight, try dimming screens an hour before bed.";
    let provider: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider::new(vec![
        intake_complete.to_string(),
        coach_text.to_string(),
    ]));

    let mut config = NiravaConfig::default();
    config.llm.grounding = false;
    let mut system = NiravaSystem::new(config, Some(provider), SessionStore::in_memory(), "tester", None)
        .unwrap();

    let reply = system.process("I slept 4 hours and I'm stressed").await;

    assert_eq!(system.phase(), Phase::Analysis);
    assert_eq!(system.state().issue_type, Some(IssueType::SleepIssues));
    assert_eq!(system.state().current_checkin.stress_score, Some(8));
    assert!(!reply.is_empty());
    assert_ne!(reply, PIPELINE_APOLOGY);
}

#[tokio::test]
async fn test_turns_are_persisted_to_disk() {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::open(dir.path()).unwrap();
    let mut system =
        NiravaSystem::new(NiravaConfig::default(), None, store, "asha", Some("s_disk")).unwrap();

    system.process("I feel down").await;
    system.process("6 hours").await;

    let reopened = SessionStore::open(dir.path()).unwrap();
    let session = reopened.get("s_disk").unwrap();
    assert_eq!(session.history.len(), 4);
    assert_eq!(session.checkin.sleep_hours, Some(6.0));

    let resumed =
        NiravaSystem::new(NiravaConfig::default(), None, reopened, "asha", Some("s_disk")).unwrap();
    assert_eq!(resumed.state().history.len(), 4);
}

#[tokio::test]
async fn test_checkpoint_rolls_back_collected_data() {
    let mut system = fallback_system();
    system.process("I can't focus").await;
    system.process("7 hours").await;
    let checkpoint = system.create_checkpoint().unwrap();

    system.process("2").await;
    assert!(system.state().current_checkin.energy_score.is_some());

    system.resume_from_checkpoint(&checkpoint).unwrap();
    assert_eq!(system.state().current_checkin.sleep_hours, Some(7.0));
    assert!(system.state().current_checkin.energy_score.is_none());
    assert_eq!(system.state().history.len(), 4);
}

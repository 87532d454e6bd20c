//! Energy-matched action planning
//!
//! The planner turns research insights into a handful of concrete actions
//! sized to how much energy the user has today, then checks which of the
//! six wellness pillars the plan actually touches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{error, info};

use super::registry::AgentCard;
use super::{note_fallback, AgentContext, AgentModel, PipelineStage};
use crate::error::{NiravaError, NiravaResult};
use crate::health::RiskLevel;

const DEFAULT_ACTION: &str = "Take a 5-minute break to stretch and breathe.";
const FALLBACK_ACTIONS: &[&str] = &["Drink a glass of water.", "Take a short walk."];

/// The six wellness pillars a plan can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pillar {
    Sleep,
    Hydration,
    Movement,
    #[serde(rename = "Mental Health")]
    MentalHealth,
    #[serde(rename = "Social Connection")]
    SocialConnection,
    #[serde(rename = "Toxin Avoidance")]
    ToxinAvoidance,
}

impl Pillar {
    pub const ALL: [Pillar; 6] = [
        Pillar::Sleep,
        Pillar::Hydration,
        Pillar::Movement,
        Pillar::MentalHealth,
        Pillar::SocialConnection,
        Pillar::ToxinAvoidance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pillar::Sleep => "Sleep",
            Pillar::Hydration => "Hydration",
            Pillar::Movement => "Movement",
            Pillar::MentalHealth => "Mental Health",
            Pillar::SocialConnection => "Social Connection",
            Pillar::ToxinAvoidance => "Toxin Avoidance",
        }
    }

    /// Accepts the display name in any case, plus a few short forms
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().to_lowercase() == value)
            .or(match value.as_str() {
                "mental" | "stress" => Some(Pillar::MentalHealth),
                "social" => Some(Pillar::SocialConnection),
                "toxins" | "toxin" => Some(Pillar::ToxinAvoidance),
                "exercise" => Some(Pillar::Movement),
                "water" => Some(Pillar::Hydration),
                _ => None,
            })
    }
}

impl std::fmt::Display for Pillar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How demanding today's actions may be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intensity {
    FloorHabits,
    ModerateHabits,
    GrowthHabits,
}

impl Intensity {
    /// Energy on a 1-5 scale; unknown energy is treated as 3
    pub fn for_energy(energy: Option<u8>) -> Self {
        match energy.unwrap_or(3) {
            0..=2 => Intensity::FloorHabits,
            3 => Intensity::ModerateHabits,
            _ => Intensity::GrowthHabits,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intensity::FloorHabits => "FLOOR_HABITS",
            Intensity::ModerateHabits => "MODERATE_HABITS",
            Intensity::GrowthHabits => "GROWTH_HABITS",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Intensity::FloorHabits => "Zero-effort actions they can do lying down",
            Intensity::ModerateHabits => "Light effort with habit stacking",
            Intensity::GrowthHabits => "Challenging actions for high-capacity days",
        }
    }
}

/// An action with the reasoning the model gave for it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action: String,
    #[serde(default)]
    pub addresses: String,
    #[serde(default)]
    pub technique: String,
    #[serde(default)]
    pub pillar: Option<Pillar>,
}

/// Which pillars the plan covers and which weak pillars it misses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PillarCoverage {
    pub pillars_addressed: Vec<Pillar>,
    pub pillar_count: usize,
    pub pillar_actions: BTreeMap<Pillar, Vec<String>>,
    pub critical_gaps: Vec<Pillar>,
}

impl PillarCoverage {
    pub fn addresses(&self, pillar: Pillar) -> bool {
        self.pillars_addressed.contains(&pillar)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub actions: Vec<String>,
    pub reasoning: String,
    pub intensity: Option<Intensity>,
    pub detailed_actions: Vec<PlannedAction>,
    pub pillar_coverage: PillarCoverage,
}

impl ActionPlan {
    fn fallback() -> Self {
        Self {
            actions: FALLBACK_ACTIONS.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// Pillars that scored poorly in the metrics report
pub fn weak_pillars(context: &AgentContext) -> Vec<Pillar> {
    let Some(report) = &context.metrics else {
        return Vec::new();
    };
    let p = &report.pillars;

    let mut weak = Vec::new();
    if p.sleep_quality_score.is_some_and(|s| s < 6) {
        weak.push(Pillar::Sleep);
    }
    if matches!(p.dehydration_risk, Some(RiskLevel::Moderate | RiskLevel::High)) {
        weak.push(Pillar::Hydration);
    }
    if p.sedentary_risk_score > 6 {
        weak.push(Pillar::Movement);
    }
    if p.burnout_risk_score.is_some_and(|s| s > 7) {
        weak.push(Pillar::MentalHealth);
    }
    if p.social_wellness_score.is_some_and(|s| s < 4) {
        weak.push(Pillar::SocialConnection);
    }
    if p.toxin_load_score > 5 {
        weak.push(Pillar::ToxinAvoidance);
    }
    weak
}

pub fn pillar_coverage(actions: &[PlannedAction], weak: &[Pillar]) -> PillarCoverage {
    let mut pillar_actions: BTreeMap<Pillar, Vec<String>> = BTreeMap::new();
    for action in actions {
        if let Some(pillar) = action.pillar {
            pillar_actions
                .entry(pillar)
                .or_default()
                .push(action.action.clone());
        }
    }

    let pillars_addressed: Vec<Pillar> = pillar_actions.keys().copied().collect();
    let critical_gaps = weak
        .iter()
        .copied()
        .filter(|p| !pillars_addressed.contains(p))
        .collect();

    PillarCoverage {
        pillar_count: pillars_addressed.len(),
        pillars_addressed,
        pillar_actions,
        critical_gaps,
    }
}

/// Accepts both `{"action": ...}` objects and bare strings
fn parse_actions(value: Option<&Value>) -> Vec<PlannedAction> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(PlannedAction {
                action: text.clone(),
                ..Default::default()
            }),
            Value::Object(fields) => {
                let text = |key: &str| {
                    fields
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                Some(PlannedAction {
                    action: text("action"),
                    addresses: text("addresses"),
                    technique: text("technique"),
                    pillar: fields
                        .get("pillar")
                        .and_then(Value::as_str)
                        .and_then(Pillar::parse),
                })
            }
            _ => None,
        })
        .filter(|a| !a.action.trim().is_empty())
        .collect()
}

fn build_prompt(context: &AgentContext, intensity: Intensity, weak: &[Pillar]) -> String {
    let checkin = &context.checkin;
    let insights = context
        .research
        .as_ref()
        .map(|r| r.insights.join("\n- "))
        .unwrap_or_default();
    let weak = if weak.is_empty() {
        "none".to_string()
    } else {
        weak.iter().map(Pillar::as_str).collect::<Vec<_>>().join(", ")
    };

    format!(
        r#"You are a behavior change coach. Create 2-3 SPECIFIC micro-actions using ReAct reasoning.

=== ReAct PROCESS ===
THOUGHT 1: What is the user's biggest health gap? (Look at the research insights)
THOUGHT 2: What is their current capacity? (Energy: {energy}/5 -> {intensity})
THOUGHT 3: What simple action addresses the gap given their capacity?
ACTION: Propose 2-3 micro-actions.

=== INTENSITY GUIDE ===
- FLOOR_HABITS (Energy 1-2): Zero-effort, can be done lying down.
  e.g. "Put your phone across the room before sleep", "Drink one glass of water right now"
- MODERATE_HABITS (Energy 3): Light effort, habit stacking.
  e.g. "After your morning coffee, do 5 squats", "Take a 10-minute walk after lunch"
- GROWTH_HABITS (Energy 4-5): Challenging, for high-capacity days.
  e.g. "Try a 20-minute HIIT session", "Meal prep healthy lunches for 3 days"

Today's intensity: {intensity} ({description})

=== USER CONTEXT ===
Issue: {issue}
Mood: {mood}/5, Stress: {stress}/10, Energy: {energy}/5
Weak pillars: {weak}

Research insights:
- {insights}

=== RULES ===
1. Each action must be completable in under 15 minutes.
2. Be specific: "Drink 1 glass of water with each meal", not "Drink more water".
3. Address the root cause from the research, not just symptoms.
4. Prefer actions for the weak pillars listed above.

OUTPUT JSON:
{{
  "reasoning": "Brief ReAct thought process",
  "actions": [
    {{"action": "Specific action", "addresses": "Which insight", "technique": "Behavior technique", "pillar": "Sleep|Hydration|Movement|Mental Health|Social Connection|Toxin Avoidance"}}
  ]
}}"#,
        energy = checkin.energy_score.unwrap_or(3),
        mood = checkin.mood_score.unwrap_or(3),
        stress = checkin.stress_score.unwrap_or(5),
        intensity = intensity.as_str(),
        description = intensity.description(),
        issue = context.issue_type,
    )
}

/// Third pipeline stage: concrete actions sized to today's energy
#[derive(Debug, Clone, Default)]
pub struct PlannerAgent {
    model: Option<AgentModel>,
}

impl PlannerAgent {
    pub fn new(model: Option<AgentModel>) -> Self {
        Self { model }
    }

    async fn plan(&self, model: &AgentModel, context: &AgentContext) -> NiravaResult<ActionPlan> {
        let intensity = Intensity::for_energy(context.checkin.energy_score);
        let weak = weak_pillars(context);
        let result = model
            .generate_json(build_prompt(context, intensity, &weak))
            .await?;
        if !result.is_object() {
            return Err(NiravaError::pipeline("planner", "plan is not a JSON object"));
        }

        let mut detailed_actions = parse_actions(result.get("actions"));
        if detailed_actions.is_empty() {
            detailed_actions.push(PlannedAction {
                action: DEFAULT_ACTION.to_string(),
                ..Default::default()
            });
        }

        Ok(ActionPlan {
            actions: detailed_actions.iter().map(|a| a.action.clone()).collect(),
            reasoning: result
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            intensity: Some(intensity),
            pillar_coverage: pillar_coverage(&detailed_actions, &weak),
            detailed_actions,
        })
    }
}

#[async_trait]
impl PipelineStage for PlannerAgent {
    fn name(&self) -> &'static str {
        "PlannerAgent"
    }

    fn card(&self) -> AgentCard {
        AgentCard::new(
            "planner_agent",
            "Planner Agent",
            "Energy-matched micro-actions covering the weakest wellness pillars",
        )
        .with_skill("action_planning", "Turn insights into specific micro-actions")
        .with_skill("pillar_coverage", "Track which wellness pillars a plan addresses")
        .with_task_types(&["action_planning"])
    }

    async fn run(&self, context: &mut AgentContext) -> NiravaResult<()> {
        let plan = match &self.model {
            Some(model) => match self.plan(model, context).await {
                Ok(plan) => plan,
                Err(e) => {
                    error!(error = %e, "Planning failed");
                    note_fallback("planner", "model error");
                    ActionPlan::fallback()
                }
            },
            None => ActionPlan::fallback(),
        };

        info!(
            actions = plan.actions.len(),
            pillars = plan.pillar_coverage.pillar_count,
            gaps = plan.pillar_coverage.critical_gaps.len(),
            "Action plan ready"
        );
        context.plan = Some(plan);
        Ok(())
    }
}

//! Final response synthesis
//!
//! The coach turns everything the earlier stages produced into one warm
//! message. Tone follows the user's state: gentle when they are struggling,
//! celebratory when they are thriving.

use async_trait::async_trait;
use chrono::{Local, Timelike};
use std::collections::HashSet;
use std::fmt::Display;
use tracing::{error, info};

use super::nutrition::nutrient_focus;
use super::registry::AgentCard;
use super::research::Source;
use super::{note_fallback, AgentContext, AgentModel, MealPlan, PipelineStage};
use crate::error::NiravaResult;

const MAX_SOURCES: usize = 5;

pub const FALLBACK_REPLY: &str = "Thanks for checking in! I'm having trouble connecting to my AI brain right now, \
but please keep hydrated and try to get good sleep tonight! \
(Error: API Key missing or Connection failed)";

const FOOTER: &str = "I'm an AI companion specializing in sleep, stress, and metabolic health. \
For other medical concerns, please consult a healthcare provider.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            _ => TimeOfDay::Evening,
        }
    }

    pub fn now() -> Self {
        Self::from_hour(Local::now().hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Afternoon => "Afternoon",
            TimeOfDay::Evening => "Evening",
        }
    }
}

/// Emotional read of the user that sets the reply's tone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Struggling,
    Thriving,
    Neutral,
}

impl Tone {
    pub fn assess(context: &AgentContext) -> Self {
        let mood = context.checkin.mood_score.filter(|m| *m > 0).unwrap_or(3);
        let stress = context.checkin.stress_score.filter(|s| *s > 0).unwrap_or(5);
        let high_burnout = context
            .metrics
            .as_ref()
            .and_then(|m| m.pillars.burnout_risk_score)
            .is_some_and(|b| b > 7);

        if mood <= 2 || stress >= 7 || high_burnout {
            Tone::Struggling
        } else if mood >= 4 && stress <= 3 {
            Tone::Thriving
        } else {
            Tone::Neutral
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tone::Struggling => "STRUGGLING - Be extra gentle",
            Tone::Thriving => "THRIVING - Celebrate!",
            Tone::Neutral => "NEUTRAL - Be warm and helpful",
        }
    }

    fn voice(&self) -> &'static str {
        match self {
            Tone::Struggling => "Soft, no exclamation marks, validating",
            Tone::Thriving => "Energetic, celebratory!",
            Tone::Neutral => "Warm and encouraging",
        }
    }
}

fn fmt<T: Display>(value: Option<T>, suffix: &str) -> String {
    value
        .map(|v| format!("{v}{suffix}"))
        .unwrap_or_else(|| "N/A".to_string())
}

/// The six-pillar dashboard lines
pub fn dashboard(context: &AgentContext) -> String {
    let c = &context.checkin;
    let p = context.metrics.as_ref().map(|m| &m.pillars);

    [
        format!(
            "1. 🌙 Sleep: {} (Quality Score: {}/10)",
            fmt(c.sleep_hours, "h"),
            fmt(p.and_then(|p| p.sleep_quality_score), "")
        ),
        format!(
            "2. 💧 Hydration: {} (Risk: {})",
            fmt(c.water_glasses, " gls"),
            fmt(p.and_then(|p| p.dehydration_risk), "")
        ),
        format!(
            "3. 🏃 Movement: {} (Sedentary Risk: {}/10)",
            fmt(c.exercise_minutes, " mins"),
            fmt(p.map(|p| p.sedentary_risk_score), "")
        ),
        format!(
            "4. 🧠 Mental: Stress {} (Burnout Risk: {}/10)",
            fmt(c.stress_score, "/10"),
            fmt(p.and_then(|p| p.burnout_risk_score), "")
        ),
        format!(
            "5. 🤝 Social: Wellness {}/10",
            fmt(p.and_then(|p| p.social_wellness_score), "")
        ),
        format!(
            "6. 🛡️ Toxins: Load {}/10",
            fmt(p.map(|p| p.toxin_load_score), "")
        ),
    ]
    .join("\n")
}

/// Top sources with a link, de-duplicated by title
pub fn sources_section(sources: &[Source]) -> Option<String> {
    let mut seen = HashSet::new();
    let lines: Vec<String> = sources
        .iter()
        .take(MAX_SOURCES)
        .filter(|s| !s.uri.is_empty() && seen.insert(s.title.as_str()))
        .enumerate()
        .map(|(i, s)| format!("[{}] {}: {}", i + 1, s.title, s.uri))
        .collect();

    (!lines.is_empty()).then(|| format!("VERIFIED SOURCES:\n{}", lines.join("\n")))
}

pub fn meal_plan_section(plan: &MealPlan) -> Option<String> {
    if plan.meals.is_empty() {
        return None;
    }

    let mut out = String::from("=== MEAL PLAN (From NutritionAgent) ===\n");
    out.push_str(&format!("Daily Target: {} kcal\n", plan.daily_calories));
    out.push_str(&format!(
        "Macros: Protein {}g | Carbs {}g | Fats {}g\n\n",
        plan.macros.protein_g, plan.macros.carbs_g, plan.macros.fats_g
    ));
    for meal in &plan.meals {
        out.push_str(&format!("{} ({}):\n", meal.name, meal.time));
        out.push_str(&format!("  Foods: {}\n", meal.foods.join(", ")));
        out.push_str(&format!(
            "  Calories: {} kcal | Protein: {}g\n\n",
            meal.calories, meal.protein_g
        ));
    }
    if !plan.notes.is_empty() {
        out.push_str(&format!("Notes: {}\n", plan.notes));
    }
    Some(out)
}

fn insights(context: &AgentContext) -> &[String] {
    context
        .research
        .as_ref()
        .map(|r| r.insights.as_slice())
        .unwrap_or_default()
}

fn sources(context: &AgentContext) -> &[Source] {
    context
        .research
        .as_ref()
        .map(|r| r.sources.as_slice())
        .unwrap_or_default()
}

/// Actions as "action (Pillar)" when the planner tagged them
fn action_lines(context: &AgentContext) -> Vec<String> {
    let Some(plan) = &context.plan else {
        return Vec::new();
    };
    if plan.detailed_actions.is_empty() {
        return plan.actions.clone();
    }
    plan.detailed_actions
        .iter()
        .map(|a| match a.pillar {
            Some(pillar) => format!("{} ({pillar})", a.action),
            None => a.action.clone(),
        })
        .collect()
}

fn build_prompt(context: &AgentContext, time: TimeOfDay) -> String {
    let profile = &context.profile;
    let tone = Tone::assess(context);
    let mood = context.checkin.mood_score.filter(|m| *m > 0).unwrap_or(3);
    let stress = context.checkin.stress_score.filter(|s| *s > 0).unwrap_or(5);
    let burnout = context
        .metrics
        .as_ref()
        .and_then(|m| m.pillars.burnout_risk_score);

    let insights = serde_json::to_string_pretty(insights(context)).unwrap_or_default();
    let actions = serde_json::to_string_pretty(&action_lines(context)).unwrap_or_default();
    let meal_plan = context
        .meal_plan
        .as_ref()
        .and_then(meal_plan_section)
        .unwrap_or_default();
    let nutrient = nutrient_focus(context.issue_type)
        .filter(|_| context.meal_plan.is_some())
        .map(|n| format!("Nutrient focus for this issue: {n}\n"))
        .unwrap_or_default();
    let sources = sources_section(sources(context)).unwrap_or_default();
    let earlier = context
        .context_summary
        .as_deref()
        .map(|summary| format!("\n=== EARLIER IN THIS CONVERSATION ===\n{summary}\n"))
        .unwrap_or_default();
    let time_lower = time.as_str().to_lowercase();

    format!(
        r#"You are Nirava, a premium health companion with emotional intelligence.

=== SELF-REFLECTION BEFORE RESPONDING ===

CHECK 1: Emotional State
- Mood: {mood}/5, Stress: {stress}/10
- Burnout Risk: {burnout}/10
- User is: {tone_label}
- My tone should be: {voice}

CHECK 2: What matters most right now?
- If they're struggling: Lead with empathy, not data. Validate their feelings first.
- If they're thriving: Lead with celebration, then optimize.
- If Burnout is HIGH: Focus on REST, not achievement.
- If Loneliness is HIGH: Focus on CONNECTION, not tasks.

CHECK 3: Is my response too clinical?
- Avoid: "Your metrics indicate..." (sounds robotic)
- Prefer: "I noticed you only got 5h of sleep..." (sounds caring)

CHECK 4: EDUCATION & CLARITY (ELI5)
- If I use a medical term (e.g., Cortisol, Adenosine, BDNF, Ghrelin), I MUST explain it immediately in simple terms.

CHECK 5: SCOPE ADHERENCE
- I only solve problems I can measure: Sleep, Hydration, Stress, Energy, Movement.
- I do NOT speculate on rashes, pains, or complex diseases.

=== CONTEXT ===
- User: {name}, {age}y
- Goal: {goal}
- Time: {time}
{earlier}
=== 6-PILLAR HEALTH DASHBOARD ===
{dashboard}

=== INSIGHTS (The "Why") ===
{insights}

=== PLAN (The "How") ===
{actions}

{meal_plan}{nutrient}
{sources}

=== OUTPUT FORMAT ===
SECTION 1: Personalized Greeting
- Match {time} + Mood {mood}/5
- If struggling: "Hey... I see you're having a tough time."
- If thriving: "Good {time_lower}! You're crushing it!"
- If neutral: "Good {time_lower}, {name}."
SECTION 2: The Snapshot, using the emoji format above.
SECTION 3: Key Insight (ELI5 Style), 2-3 sentences, cite sources like [1].
SECTION 4: Your Micro-Actions, 2-3 actions with checkboxes [ ] and the pillar each addresses.
SECTION 5: Your Meal Plan (if provided), with 🍳 Breakfast, 🥗 Lunch, 🍽️ Dinner, 🍎 Snack.
SECTION 6: Sources (if available), matching the [1], [2] format.
SECTION 7: Closing with brief encouragement and this footer:
"{footer}"

Reply in plain text, not JSON."#,
        burnout = fmt(burnout, ""),
        tone_label = tone.label(),
        voice = tone.voice(),
        name = profile.name,
        age = fmt(profile.age, ""),
        goal = profile.primary_goal,
        time = time.as_str(),
        dashboard = dashboard(context),
        footer = FOOTER,
    )
}

/// Drop markdown code fences the model sometimes wraps replies in
fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Text report built from the pipeline results alone
pub fn fallback_report(context: &AgentContext) -> String {
    let mut out = format!("Here's your wellness snapshot, {}:\n\n", context.profile.name);
    out.push_str(&dashboard(context));

    let insights = insights(context);
    if !insights.is_empty() {
        out.push_str("\n\nKey insights:\n");
        for insight in insights {
            out.push_str(&format!("- {insight}\n"));
        }
    }

    let actions = action_lines(context);
    if !actions.is_empty() {
        out.push_str(if insights.is_empty() { "\n\n" } else { "\n" });
        out.push_str("Your micro-actions:\n");
        for action in actions {
            out.push_str(&format!("[ ] {action}\n"));
        }
    }

    if let Some(plan) = context.meal_plan.as_ref().and_then(meal_plan_section) {
        out.push('\n');
        out.push_str(&plan);
    }

    if let Some(section) = sources_section(sources(context)) {
        out.push('\n');
        out.push_str(&section);
        out.push('\n');
    }

    out.push('\n');
    out.push_str(FOOTER);
    out
}

/// Last pipeline stage: the reply the user sees
#[derive(Debug, Clone, Default)]
pub struct CoachAgent {
    model: Option<AgentModel>,
}

impl CoachAgent {
    pub fn new(model: Option<AgentModel>) -> Self {
        Self { model }
    }

    fn fallback(context: &AgentContext) -> String {
        format!("{FALLBACK_REPLY}\n\n{}", fallback_report(context))
    }
}

#[async_trait]
impl PipelineStage for CoachAgent {
    fn name(&self) -> &'static str {
        "CoachAgent"
    }

    fn card(&self) -> AgentCard {
        AgentCard::new(
            "coach_agent",
            "Coach Agent",
            "Empathetic synthesis of metrics, insights and actions into one reply",
        )
        .with_skill("response_synthesis", "Combine pipeline output into a personal message")
        .with_skill("tone_calibration", "Match tone to mood, stress and burnout")
        .with_task_types(&["coaching"])
    }

    async fn run(&self, context: &mut AgentContext) -> NiravaResult<()> {
        let response = match &self.model {
            Some(model) => match model
                .generate_text(build_prompt(context, TimeOfDay::now()))
                .await
            {
                Ok(text) => {
                    info!(tone = ?Tone::assess(context), "Generated coach response");
                    strip_fences(&text)
                }
                Err(e) => {
                    error!(error = %e, "Coach generation failed");
                    note_fallback("coach", "model error");
                    Self::fallback(context)
                }
            },
            None => Self::fallback(context),
        };

        context.response = Some(response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::nutrition::template_meal_plan;
    use crate::agents::{ActionPlan, ResearchFindings};
    use crate::models::DailyCheckIn;
    use crate::testing::MockLlmProvider;
    use std::sync::Arc;

    fn source(title: &str, uri: &str) -> Source {
        Source {
            id: 1,
            title: title.to_string(),
            uri: uri.to_string(),
            domain: String::new(),
            authority_score: 0,
            snippet: String::new(),
            relevance_score: 0,
        }
    }

    fn context() -> AgentContext {
        AgentContext {
            checkin: DailyCheckIn {
                sleep_hours: Some(6.5),
                stress_score: Some(4),
                mood_score: Some(3),
                ..Default::default()
            },
            research: Some(ResearchFindings {
                insights: vec!["Sleep restores energy.".to_string()],
                sources: vec![source("NIH Sleep", "https://nih.gov/sleep")],
                ..Default::default()
            }),
            plan: Some(ActionPlan {
                actions: vec!["Drink a glass of water.".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_time_of_day_buckets() {
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(11), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(2), TimeOfDay::Evening);
    }

    #[test]
    fn test_tone() {
        let mut ctx = context();
        assert_eq!(Tone::assess(&ctx), Tone::Neutral);

        ctx.checkin.stress_score = Some(8);
        assert_eq!(Tone::assess(&ctx), Tone::Struggling);

        ctx.checkin.stress_score = Some(2);
        ctx.checkin.mood_score = Some(5);
        assert_eq!(Tone::assess(&ctx), Tone::Thriving);
        assert_eq!(Tone::Thriving.label(), "THRIVING - Celebrate!");
    }

    #[test]
    fn test_dashboard_shows_na_for_missing() {
        let text = dashboard(&context());
        assert!(text.contains("1. 🌙 Sleep: 6.5h (Quality Score: N/A/10)"));
        assert!(text.contains("2. 💧 Hydration: N/A (Risk: N/A)"));
        assert!(text.contains("4. 🧠 Mental: Stress 4/10"));
    }

    #[test]
    fn test_sources_deduplicated_and_need_uri() {
        let sources = vec![
            source("A", "https://a.org"),
            source("A", "https://a.org/again"),
            source("No link", ""),
            source("B", "https://b.org"),
        ];
        let section = sources_section(&sources).unwrap();
        assert_eq!(section, "VERIFIED SOURCES:\n[1] A: https://a.org\n[2] B: https://b.org");
        assert!(sources_section(&[]).is_none());
    }

    #[test]
    fn test_meal_plan_section() {
        let plan = template_meal_plan(&Default::default(), Some(2000.0));
        let section = meal_plan_section(&plan).unwrap();
        assert!(section.starts_with("=== MEAL PLAN (From NutritionAgent) ===\nDaily Target: 2000 kcal"));
        assert!(section.contains("Breakfast (7:30 AM):"));
        assert!(meal_plan_section(&MealPlan::default()).is_none());
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```\nHello there\n```"), "Hello there");
    }

    #[test]
    fn test_fallback_report_contents() {
        let report = fallback_report(&context());
        assert!(report.contains("Sleep restores energy."));
        assert!(report.contains("[ ] Drink a glass of water."));
        assert!(report.contains("[1] NIH Sleep: https://nih.gov/sleep"));
    }

    #[tokio::test]
    async fn test_reply_from_model() {
        let provider = Arc::new(MockLlmProvider::single_response("```\nGood evening, Friend.\n```"));
        let agent = CoachAgent::new(Some(AgentModel::new(provider.clone(), "mock-model")));
        let mut ctx = context();

        agent.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.response.as_deref(), Some("Good evening, Friend."));
        let prompt = &provider.recorded_requests().await[0].messages[0].content;
        assert!(prompt.contains("NEUTRAL - Be warm and helpful"));
        assert!(prompt.contains("VERIFIED SOURCES:"));
        assert!(!prompt.contains("EARLIER IN THIS CONVERSATION"));
    }

    #[tokio::test]
    async fn test_prompt_carries_compacted_summary() {
        let provider = Arc::new(MockLlmProvider::single_response("Hi again."));
        let agent = CoachAgent::new(Some(AgentModel::new(provider.clone(), "mock-model")));
        let mut ctx = context();
        ctx.context_summary = Some("[Known facts: sleep=5h]".to_string());

        agent.run(&mut ctx).await.unwrap();

        let prompt = &provider.recorded_requests().await[0].messages[0].content;
        assert!(prompt.contains("=== EARLIER IN THIS CONVERSATION ===\n[Known facts: sleep=5h]"));
    }

    #[tokio::test]
    async fn test_failure_uses_fixed_reply() {
        let agent = CoachAgent::new(Some(AgentModel::new(
            Arc::new(MockLlmProvider::with_failure()),
            "mock-model",
        )));
        let mut ctx = context();

        agent.run(&mut ctx).await.unwrap();

        let response = ctx.response.unwrap();
        assert!(response.starts_with(FALLBACK_REPLY));
        assert!(response.contains("Sleep restores energy."));
    }
}

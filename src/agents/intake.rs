//! Symptom-aware intake
//!
//! Intake loops over the conversation, one user turn at a time, until it
//! has collected enough of the signals that matter for the user's issue.
//! Someone with brain fog gets asked about sleep, stress and water, not
//! their BMI.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::parsing::{value_as_bool, value_as_f64, value_as_text, value_as_u32};
use super::registry::AgentCard;
use super::{note_fallback, AgentModel};
use crate::models::{
    ChatRole, ConversationState, DietaryPreference, ExerciseType, IssueType, JourneyMode, Sex,
};

/// A signal intake can collect, from the profile or today's check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Age,
    Sex,
    HeightCm,
    WeightKg,
    Origin,
    Religion,
    DietaryPreference,
    SleepHours,
    WaterGlasses,
    MoodScore,
    EnergyScore,
    StressScore,
    ExerciseMinutes,
    ExerciseType,
    SocialHours,
    AlcoholUnits,
    SmokingToday,
}

impl Metric {
    pub const ALL: [Metric; 17] = [
        Metric::Age,
        Metric::Sex,
        Metric::HeightCm,
        Metric::WeightKg,
        Metric::Origin,
        Metric::Religion,
        Metric::DietaryPreference,
        Metric::SleepHours,
        Metric::WaterGlasses,
        Metric::MoodScore,
        Metric::EnergyScore,
        Metric::StressScore,
        Metric::ExerciseMinutes,
        Metric::ExerciseType,
        Metric::SocialHours,
        Metric::AlcoholUnits,
        Metric::SmokingToday,
    ];

    /// Field name used in the model's JSON output
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Age => "age",
            Metric::Sex => "sex",
            Metric::HeightCm => "height_cm",
            Metric::WeightKg => "weight_kg",
            Metric::Origin => "origin",
            Metric::Religion => "religion",
            Metric::DietaryPreference => "dietary_preference",
            Metric::SleepHours => "sleep_hours",
            Metric::WaterGlasses => "water_glasses",
            Metric::MoodScore => "mood_score",
            Metric::EnergyScore => "energy_score",
            Metric::StressScore => "stress_score",
            Metric::ExerciseMinutes => "exercise_minutes",
            Metric::ExerciseType => "exercise_type",
            Metric::SocialHours => "social_hours",
            Metric::AlcoholUnits => "alcohol_units",
            Metric::SmokingToday => "smoking_today",
        }
    }

    /// Key without units, e.g. "sleep" for `sleep_hours`
    pub fn friendly_name(&self) -> String {
        self.key()
            .replace('_', " ")
            .replace(" score", "")
            .replace(" hours", "")
            .replace(" glasses", "")
            .replace(" minutes", "")
    }

    pub fn is_collected(&self, state: &ConversationState) -> bool {
        let p = &state.profile;
        let c = &state.current_checkin;
        match self {
            Metric::Age => p.age.is_some(),
            Metric::Sex => p.sex.is_some(),
            Metric::HeightCm => p.height_cm.is_some(),
            Metric::WeightKg => p.weight_kg.is_some(),
            Metric::Origin => p.origin.is_some(),
            Metric::Religion => p.religion.is_some(),
            // Omnivore is the default, so only a stated preference counts
            Metric::DietaryPreference => p.dietary_preference != DietaryPreference::Omnivore,
            Metric::SleepHours => c.sleep_hours.is_some(),
            Metric::WaterGlasses => c.water_glasses.is_some(),
            Metric::MoodScore => c.mood_score.is_some(),
            Metric::EnergyScore => c.energy_score.is_some(),
            Metric::StressScore => c.stress_score.is_some(),
            Metric::ExerciseMinutes => c.exercise_minutes.is_some(),
            Metric::ExerciseType => c.exercise_type.is_some(),
            Metric::SocialHours => c.social_hours.is_some(),
            Metric::AlcoholUnits => c.alcohol_units.is_some(),
            Metric::SmokingToday => c.smoking_today.is_some(),
        }
    }

    /// Validate and store one extracted value; returns whether it was accepted
    fn apply(&self, state: &mut ConversationState, value: &Value) -> bool {
        let p = &mut state.profile;
        let c = &mut state.current_checkin;
        match self {
            Metric::Age => store(&mut p.age, value_as_u32(value), 10..=120),
            Metric::Sex => store_parsed(&mut p.sex, value_as_text(value).and_then(|s| Sex::parse(&s))),
            Metric::HeightCm => store(&mut p.height_cm, value_as_f64(value), 100.0..=250.0),
            Metric::WeightKg => store(&mut p.weight_kg, value_as_f64(value), 30.0..=300.0),
            Metric::Origin => store_parsed(&mut p.origin, value_as_text(value)),
            Metric::Religion => store_parsed(&mut p.religion, value_as_text(value)),
            Metric::DietaryPreference => {
                match value_as_text(value).and_then(|s| DietaryPreference::parse(&s)) {
                    Some(pref) => {
                        p.dietary_preference = pref;
                        true
                    }
                    None => false,
                }
            }
            Metric::SleepHours => store(&mut c.sleep_hours, value_as_f64(value), 1.0..=12.0),
            Metric::WaterGlasses => store(&mut c.water_glasses, value_as_u32(value), 0..=20),
            Metric::MoodScore => store(&mut c.mood_score, score(value), 1..=5),
            Metric::EnergyScore => store(&mut c.energy_score, score(value), 1..=5),
            Metric::StressScore => store(&mut c.stress_score, score(value), 1..=10),
            Metric::ExerciseMinutes => store(&mut c.exercise_minutes, value_as_u32(value), 0..=300),
            Metric::ExerciseType => store_parsed(
                &mut c.exercise_type,
                value_as_text(value).and_then(|s| ExerciseType::parse(&s)),
            ),
            Metric::SocialHours => store(&mut c.social_hours, value_as_f64(value), 0.0..=24.0),
            Metric::AlcoholUnits => store(&mut c.alcohol_units, value_as_u32(value), 0..=20),
            Metric::SmokingToday => store_parsed(&mut c.smoking_today, value_as_bool(value)),
        }
    }
}

fn score(value: &Value) -> Option<u8> {
    value_as_u32(value).and_then(|v| u8::try_from(v).ok())
}

fn store<T: PartialOrd + Copy + std::fmt::Debug>(
    slot: &mut Option<T>,
    parsed: Option<T>,
    range: std::ops::RangeInclusive<T>,
) -> bool {
    match parsed {
        Some(v) if range.contains(&v) => {
            *slot = Some(v);
            true
        }
        Some(v) => {
            warn!(value = ?v, expected = ?range, "Extracted value out of range");
            false
        }
        None => false,
    }
}

fn store_parsed<T>(slot: &mut Option<T>, parsed: Option<T>) -> bool {
    match parsed {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}

/// Signals to collect for an issue, most important first
pub fn relevant_metrics(issue: IssueType) -> &'static [Metric] {
    use Metric::*;
    match issue {
        IssueType::Emotional => &[
            StressScore, MoodScore, SleepHours, SocialHours, ExerciseMinutes, Metric::ExerciseType,
            EnergyScore, WaterGlasses, AlcoholUnits, SmokingToday,
        ],
        IssueType::MentalFatigue => &[
            SleepHours, StressScore, WaterGlasses, MoodScore, EnergyScore, ExerciseMinutes,
            SocialHours, AlcoholUnits, SmokingToday,
        ],
        IssueType::PhysicalFatigue => &[
            SleepHours, EnergyScore, ExerciseMinutes, Metric::ExerciseType, WaterGlasses, StressScore,
            MoodScore, SocialHours, AlcoholUnits, SmokingToday,
        ],
        IssueType::SleepIssues => &[
            SleepHours, StressScore, ExerciseMinutes, Metric::ExerciseType, AlcoholUnits, MoodScore,
            EnergyScore, WaterGlasses, SocialHours, SmokingToday,
        ],
        IssueType::BuildPlan => &[
            Age, Metric::Sex, HeightCm, WeightKg, SleepHours, WaterGlasses, MoodScore, EnergyScore,
            StressScore, ExerciseMinutes, Metric::ExerciseType, SocialHours, AlcoholUnits,
            SmokingToday, Metric::DietaryPreference, Origin, Religion,
        ],
        IssueType::GeneralWellness | IssueType::SocialIsolation | IssueType::ToxinReduction => &[
            SleepHours, WaterGlasses, MoodScore, EnergyScore, StressScore, ExerciseMinutes,
            Metric::ExerciseType, SocialHours, AlcoholUnits, SmokingToday,
        ],
    }
}

const ISSUE_KEYWORDS: [(IssueType, &[&str]); 4] = [
    (
        IssueType::MentalFatigue,
        &[
            "brain fog", "can't focus", "mentally tired", "can't think", "concentration",
            "distracted", "foggy", "mental",
        ],
    ),
    (
        IssueType::Emotional,
        &[
            "sad", "anxious", "depressed", "down", "worried", "stressed out", "overwhelmed",
            "upset", "lonely",
        ],
    ),
    (
        IssueType::PhysicalFatigue,
        &[
            "lethargic", "sluggish", "no energy", "exhausted", "physically tired", "weak",
            "drained", "fatigued",
        ],
    ),
    (
        IssueType::SleepIssues,
        &[
            "can't sleep", "insomnia", "restless", "waking up", "sleep problems",
            "tired but can't sleep",
        ],
    ),
];

/// Classify the concern from everything the user has said.
///
/// Exactly one matching category wins. None or several fall back to
/// general wellness, which collects the broadest set of signals.
pub fn classify_issue(state: &ConversationState) -> IssueType {
    if state.journey_mode == Some(JourneyMode::BuildPlan) {
        return IssueType::BuildPlan;
    }

    let text = state.user_text();
    let matched: Vec<IssueType> = ISSUE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| text.contains(kw)))
        .map(|(issue, _)| *issue)
        .collect();

    match matched.as_slice() {
        [single] => *single,
        [] => IssueType::GeneralWellness,
        several => {
            info!(issues = ?several, "Multiple issues detected, using comprehensive metrics");
            IssueType::GeneralWellness
        }
    }
}

/// Enough relevant signals to analyse: at least 8, or 75% of a longer list
pub fn has_enough_data(state: &ConversationState, issue: Option<IssueType>) -> bool {
    let Some(issue) = issue else {
        return state.current_checkin.is_complete();
    };

    let metrics = relevant_metrics(issue);
    let collected = metrics.iter().filter(|m| m.is_collected(state)).count();
    let threshold = 8.max(metrics.len() * 3 / 4);
    collected >= threshold
}

/// Friendly names of relevant signals not yet collected
pub fn missing_relevant(state: &ConversationState, issue: Option<IssueType>) -> Vec<String> {
    match issue {
        Some(issue) => relevant_metrics(issue)
            .iter()
            .filter(|m| !m.is_collected(state))
            .map(Metric::friendly_name)
            .collect(),
        None => state
            .current_checkin
            .missing_fields()
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

/// One-line summary of what is already known
pub fn collected_summary(state: &ConversationState) -> String {
    let p = &state.profile;
    let c = &state.current_checkin;
    let mut parts = Vec::new();

    if let Some(age) = p.age {
        parts.push(format!("age: {age}y"));
    }
    if let Some(sex) = p.sex {
        parts.push(format!("sex: {sex}"));
    }
    if let Some(height) = p.height_cm {
        parts.push(format!("height: {height}cm"));
    }
    if let Some(weight) = p.weight_kg {
        parts.push(format!("weight: {weight}kg"));
    }
    if let Some(origin) = &p.origin {
        parts.push(format!("origin: {origin}"));
    }
    if let Some(religion) = &p.religion {
        parts.push(format!("religion: {religion}"));
    }
    if let Some(sleep) = c.sleep_hours {
        parts.push(format!("sleep: {sleep}h"));
    }
    if let Some(water) = c.water_glasses {
        parts.push(format!("water: {water} glasses"));
    }
    if let Some(mood) = c.mood_score {
        parts.push(format!("mood: {mood}/5"));
    }
    if let Some(energy) = c.energy_score {
        parts.push(format!("energy: {energy}/5"));
    }
    if let Some(stress) = c.stress_score {
        parts.push(format!("stress: {stress}/10"));
    }
    if let Some(minutes) = c.exercise_minutes {
        parts.push(format!("exercise: {minutes}min"));
    }
    if let Some(social) = c.social_hours {
        parts.push(format!("social: {social}h"));
    }
    if let Some(units) = c.alcohol_units {
        parts.push(format!("alcohol: {units} units"));
    }
    if let Some(smoking) = c.smoking_today {
        parts.push(format!("smoking: {}", if smoking { "yes" } else { "no" }));
    }

    if parts.is_empty() {
        "Nothing yet".to_string()
    } else {
        parts.join(", ")
    }
}

fn issue_context(issue: Option<IssueType>) -> &'static str {
    match issue {
        Some(IssueType::MentalFatigue) => {
            "ISSUE: MENTAL FATIGUE (brain fog, can't focus, mentally tired)\n\
             RELEVANT: Sleep, Stress, Water, Mood\n\
             NOT RELEVANT: BMI, Weight, Exercise (unless they mention it)\n\
             FOCUS: Sleep quality and stress are the biggest factors for mental clarity."
        }
        Some(IssueType::Emotional) => {
            "ISSUE: EMOTIONAL (sad, anxious, overwhelmed)\n\
             RELEVANT: Mood, Sleep, Stress, Exercise\n\
             NOT RELEVANT: Water, BMI (unless relevant)\n\
             FOCUS: Be extra gentle. Sleep and exercise are proven mood boosters."
        }
        Some(IssueType::PhysicalFatigue) => {
            "ISSUE: PHYSICAL FATIGUE (lethargic, sluggish, no energy)\n\
             RELEVANT: Sleep, Exercise, Water, Energy level\n\
             FOCUS: Physical energy often comes from sleep + movement + hydration basics."
        }
        Some(IssueType::SleepIssues) => {
            "ISSUE: SLEEP PROBLEMS (can't sleep, insomnia)\n\
             RELEVANT: Stress, Exercise timing, Mood\n\
             NOT RELEVANT: Water, BMI\n\
             FOCUS: Stress and lack of physical activity are top sleep disruptors."
        }
        Some(IssueType::GeneralWellness) => {
            "ISSUE: GENERAL WELLNESS (feeling good, wants to optimize)\n\
             RELEVANT: All metrics for benchmarking\n\
             FOCUS: Compare their stats to clinical ideals for their age/sex."
        }
        _ => "Classify the issue type first.",
    }
}

const PROMPT_RULES: &str = r#"MODE-SPECIFIC BEHAVIOR:
- Path A (QUICK_CHECK): Be efficient. Ask questions concisely.
- Path B (DEEP_DIVE): Be educational. Explain WHY you ask each question and what the metric means.
- Path C (BUILD_PLAN): Be comprehensive. Explain how each answer feeds the plan.

CONTEXT AWARENESS:
- Check DATA COLLECTED before asking. Never re-ask a known metric.
- When a metric is known, ask a follow-up that goes deeper instead.

SCOPE GUARD:
- We ONLY handle the 6 Preventative Health Pillars: Sleep, Hydration, Movement, Mental Health, Social Connection, Toxin Avoidance.
- We do NOT handle medical diagnosis, injuries, rashes, severe pain, chronic diseases or emergencies.
- For out-of-scope questions reply: "I specialize in preventative health (Sleep, Stress, Hydration, Energy, Movement, and Lifestyle). For medical concerns like [their issue], please consult a healthcare provider. However, I can help you optimize your basics. How have you been sleeping lately?"

RULES:
- Turn 1: acknowledge briefly, classify the issue, set expectations (~8-10 questions, ~10-12 for Path C) and ask the first needed metric. No "Are you ready?" confirmations.
- Turn 2+: ask the next uncollected metric from METRICS NEEDED, in order, and state its range.
- Use light transitions ("Got it.", "I see.", "Almost there.") instead of praising every answer.

EXTRACTION EXAMPLES:
- "I got maybe 5-6 hours last night" -> sleep_hours: 5.5
- "Maybe 2 liters?" -> water_glasses: 8 (1L = 4 glasses)
- "Just coffee honestly" -> water_glasses: 0
- "I'm super stressed, like 8 out of 10" -> stress_score: 8
- "Stress is through the roof" -> stress_score: 9
- "Feeling like a 3 out of 10" -> mood_score: 2 (convert to the 1-5 scale)
- "Exhausted, no energy" -> energy_score: 1
- "Did an hour at the gym" -> exercise_minutes: 60
- "2 beers" -> alcohol_units: 2
- "I'm 28 years old" -> age: 28
- "I weigh 60 kg" -> weight_kg: 60.0

RANGES TO STATE WHEN ASKING:
Age (10-120), Sex (male/female), Height in cm, Weight in kg, Origin, Religious dietary restrictions,
Sleep hours (1-12), Glasses of water (0-20), Mood (1=low, 5=great), Energy (1=exhausted, 5=energized),
Stress (1=calm, 10=overwhelmed), Minutes of movement (0-180), Social hours (0-8), Alcohol units (0-10),
Smoked today (yes/no), Dietary preference (vegetarian/vegan/pescatarian/omnivore).

OUTPUT JSON:
{
  "issue_type": "mental_fatigue" | "emotional" | "physical_fatigue" | "sleep_issues" | "general_wellness" | "build_plan" | null,
  "extracted": {
    "age": int or null, "sex": "male" | "female" or null, "height_cm": float or null,
    "weight_kg": float or null, "origin": string or null, "religion": string or null,
    "sleep_hours": float or null, "water_glasses": int or null, "mood_score": int or null,
    "energy_score": int or null, "stress_score": int or null, "exercise_minutes": int or null,
    "exercise_type": "cardio" | "strength" | "both" | "none" | null, "social_hours": float or null,
    "alcohol_units": int or null, "smoking_today": boolean or null,
    "dietary_preference": "vegetarian" | "vegan" | "pescatarian" | "omnivore" | null
  },
  "status": "CONTINUE" or "COMPLETE",
  "reply": "Your natural response"
}"#;

fn build_prompt(state: &ConversationState, issue: Option<IssueType>) -> String {
    let recent = state.history.len().saturating_sub(6);
    let history = state.history[recent..]
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");
    let journey = state
        .journey_mode
        .map(|j| j.as_str())
        .unwrap_or("not chosen");

    format!(
        "You are Nirava, a caring friend who understands health science.\n\
         PERSONALITY: Warm, understanding, focused. You ask ONLY what is relevant to their issue.\n\n\
         {PROMPT_RULES}\n\n\
         USER: {name}\n\
         JOURNEY: {journey}\n\
         CONVERSATION:\n{history}\n\n\
         DATA COLLECTED: {collected}\n\
         METRICS NEEDED FOR THIS ISSUE: {needed}\n\
         TURN COUNT: {turns}\n\n\
         {context}",
        name = state.profile.name,
        collected = collected_summary(state),
        needed = missing_relevant(state, issue).join(", "),
        turns = state.user_turns(),
        context = issue_context(issue),
    )
}

/// Store every valid value in `updates`; returns the keys that were accepted
pub fn apply_updates(state: &mut ConversationState, updates: &Map<String, Value>) -> Vec<&'static str> {
    let mut accepted = Vec::new();
    for metric in Metric::ALL {
        let Some(value) = updates.get(metric.key()).filter(|v| !v.is_null()) else {
            continue;
        };
        if metric.apply(state, value) {
            debug!(metric = metric.key(), value = %value, "Collected");
            accepted.push(metric.key());
        } else {
            warn!(metric = metric.key(), value = %value, "Rejected extracted value");
        }
    }
    accepted
}

static SLEEP_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"(?:sleep|slept)\D{0,25}?(\d+(?:\.\d+)?)\s*(?:hours?|hrs?|h\b)")
            .expect("sleep pattern is valid"),
        Regex::new(r"(\d+(?:\.\d+)?)\s*(?:hours?|hrs?)\s+(?:of\s+)?sleep")
            .expect("sleep pattern is valid"),
    ]
});
static WATER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:glasses|glass)\b").expect("water pattern is valid"));
static STRESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"stress\D{0,20}?(\d+)").expect("stress pattern is valid"));
static MOOD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"mood\D{0,20}?(\d)").expect("mood pattern is valid"));
static ENERGY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"energy\D{0,20}?(\d)").expect("energy pattern is valid"));
static EXERCISE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:minutes?|mins?)\b").expect("exercise pattern is valid"));

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Pull explicitly stated signals out of free text without a model
pub fn extract_signals(text: &str) -> Map<String, Value> {
    let text = text.to_lowercase();
    let mut found = Map::new();

    if let Some(hours) = SLEEP_PATTERNS.iter().find_map(|p| capture(p, &text)) {
        found.insert("sleep_hours".to_string(), Value::String(hours));
    }
    let single = [
        ("water_glasses", &*WATER_PATTERN),
        ("stress_score", &*STRESS_PATTERN),
        ("mood_score", &*MOOD_PATTERN),
        ("energy_score", &*ENERGY_PATTERN),
        ("exercise_minutes", &*EXERCISE_PATTERN),
    ];
    for (key, pattern) in single {
        if let Some(value) = capture(pattern, &text) {
            found.insert(key.to_string(), Value::String(value));
        }
    }
    found
}

/// Which signal a question was asking about
fn metric_asked_by(question: &str) -> Option<Metric> {
    let q = question.to_lowercase();
    if q.contains("sleep") {
        Some(Metric::SleepHours)
    } else if q.contains("water") {
        Some(Metric::WaterGlasses)
    } else if q.contains("energy") {
        Some(Metric::EnergyScore)
    } else if q.contains("stress") {
        Some(Metric::StressScore)
    } else if q.contains("movement") || q.contains("exercise") {
        Some(Metric::ExerciseMinutes)
    } else if q.contains("feeling") || q.contains("mood") {
        Some(Metric::MoodScore)
    } else {
        None
    }
}

/// Read a short worded answer ("pretty good", "none") for the signal asked about.
/// Negated phrases are checked before the words they contain.
fn interpret_words(metric: Metric, answer: &str) -> Option<Value> {
    let words: Vec<String> = answer
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let has = |phrases: &[&str]| phrases.iter().any(|p| contains_phrase(&words, p));

    let level = match metric {
        Metric::MoodScore | Metric::EnergyScore => {
            if has(&["not bad", "not too bad"]) {
                3
            } else if has(&["not great", "not good", "not well", "not really", "not so good"]) {
                2
            } else if has(&["terrible", "awful", "exhausted", "drained"]) {
                1
            } else if has(&["great", "amazing", "fantastic", "energized"]) {
                5
            } else if has(&["low", "bad", "tired", "meh"]) {
                2
            } else if has(&["good", "well"]) {
                4
            } else if has(&["okay", "ok", "fine", "alright"]) {
                3
            } else {
                return None;
            }
        }
        Metric::StressScore => {
            if has(&["overwhelmed", "through the roof", "very high", "terrible"]) {
                9
            } else if has(&["not manageable", "not really manageable", "not okay", "not ok"]) {
                8
            } else if has(&["not really", "not much", "not stressed", "calm", "relaxed", "low"]) {
                2
            } else if has(&["high", "stressed"]) {
                8
            } else if has(&["manageable", "okay", "ok", "fine", "yes", "yeah"]) {
                4
            } else {
                return None;
            }
        }
        Metric::ExerciseMinutes | Metric::WaterGlasses => {
            if has(&["none", "nothing", "nope", "not really", "not at all", "no"]) {
                0
            } else {
                return None;
            }
        }
        _ => return None,
    };
    Some(Value::from(level))
}

/// Whole-word match of a space-separated phrase against tokenized words
fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let target: Vec<&str> = phrase.split_whitespace().collect();
    !target.is_empty()
        && words
            .windows(target.len())
            .any(|window| window.iter().zip(&target).all(|(w, t)| w == t))
}

const EARLY_REPLIES: [(Metric, &str); 3] = [
    (
        Metric::SleepHours,
        "I hear you. To help you best, how many hours of sleep did you get last night?",
    ),
    (
        Metric::EnergyScore,
        "That sounds tough. Let's check your basics. How is your energy level right now (1-5)?",
    ),
    (
        Metric::WaterGlasses,
        "Got it. Quick check: How much water have you had today?",
    ),
];

fn fallback_question(missing_label: &str) -> &'static str {
    match missing_label {
        "sleep duration" => "How'd you sleep last night?",
        "water intake" => "Have you been drinking enough water today?",
        "mood (1-5)" => "How are you feeling overall?",
        "energy level (1-5)" => "Energy levels holding up?",
        "stress level (1-5)" => "Stress been manageable lately?",
        "daily movement/exercise" => "Get any movement in today?",
        _ => "How are things going?",
    }
}

/// Whether intake needs another turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStatus {
    Continue,
    Complete,
}

/// Result of one intake turn
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeOutcome {
    pub status: IntakeStatus,
    /// Next question for the user; `None` once intake is complete
    pub reply: Option<String>,
    pub updated: Vec<&'static str>,
    pub issue_type: Option<IssueType>,
}

impl IntakeOutcome {
    fn complete(updated: Vec<&'static str>, issue_type: Option<IssueType>) -> Self {
        Self {
            status: IntakeStatus::Complete,
            reply: None,
            updated,
            issue_type,
        }
    }

    fn ask(reply: impl Into<String>, updated: Vec<&'static str>, issue_type: Option<IssueType>) -> Self {
        Self {
            status: IntakeStatus::Continue,
            reply: Some(reply.into()),
            updated,
            issue_type,
        }
    }
}

/// Loop agent that triages the concern and collects the relevant signals
#[derive(Debug, Clone, Default)]
pub struct IntakeAgent {
    model: Option<AgentModel>,
}

impl IntakeAgent {
    pub fn new(model: Option<AgentModel>) -> Self {
        Self { model }
    }

    pub fn card() -> AgentCard {
        AgentCard::new(
            "intake_agent",
            "Intake Agent",
            "Triages the user's concern and collects the relevant daily signals",
        )
        .with_skill("classify_issue", "Classify the user's concern into an issue type")
        .with_skill("collect_checkin", "Collect sleep, hydration, mood and lifestyle signals")
        .with_task_types(&["intake", "classify_issue"])
    }

    /// Process the latest user message stored in `state`
    pub async fn run(&self, state: &mut ConversationState) -> IntakeOutcome {
        if state.journey_mode.is_none() {
            if let Some(journey) = state
                .last_message()
                .filter(|m| m.role == ChatRole::User)
                .and_then(|m| JourneyMode::from_selection(&m.content))
            {
                info!(journey = journey.as_str(), "Journey selected");
                state.journey_mode = Some(journey);
            }
        }

        if state.issue_type.is_none() && state.history.len() >= 2 {
            let issue = classify_issue(state);
            info!(issue = %issue, "Issue classified");
            state.issue_type = Some(issue);
        }

        let Some(model) = &self.model else {
            return self.fallback(state);
        };

        match model.generate_json(build_prompt(state, state.issue_type)).await {
            Ok(result) => self.apply_model_turn(state, &result),
            Err(e) => {
                error!(error = %e, "Intake model call failed");
                note_fallback("intake", "model error");
                self.fallback(state)
            }
        }
    }

    fn apply_model_turn(&self, state: &mut ConversationState, result: &Value) -> IntakeOutcome {
        if state.issue_type.is_none() {
            if let Some(issue) = result
                .get("issue_type")
                .and_then(Value::as_str)
                .and_then(IssueType::parse)
            {
                debug!(issue = %issue, "Issue classified by model");
                state.issue_type = Some(issue);
            }
        }

        let updated = match result.get("extracted").and_then(Value::as_object) {
            Some(extracted) => apply_updates(state, extracted),
            None => Vec::new(),
        };

        let status = result
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("CONTINUE")
            .to_uppercase();

        if status == "COMPLETE" || has_enough_data(state, state.issue_type) {
            return IntakeOutcome::complete(updated, state.issue_type);
        }

        let reply = result
            .get("reply")
            .and_then(Value::as_str)
            .filter(|r| !r.trim().is_empty())
            .unwrap_or("Tell me more.");
        IntakeOutcome::ask(reply, updated, state.issue_type)
    }

    /// Rule-based turn used without a model or when the model fails
    fn fallback(&self, state: &mut ConversationState) -> IntakeOutcome {
        let updated = self.extract_without_model(state);
        let issue = state.issue_type;

        if state.user_turns() <= 2 {
            if let Some((_, reply)) = EARLY_REPLIES
                .iter()
                .find(|(metric, _)| !metric.is_collected(state))
            {
                return IntakeOutcome::ask(*reply, updated, issue);
            }
        }

        match state.current_checkin.missing_fields().first() {
            None => IntakeOutcome::complete(updated, issue),
            Some(label) => IntakeOutcome::ask(fallback_question(label), updated, issue),
        }
    }

    /// Answer to the previous question first, then explicit mentions
    fn extract_without_model(&self, state: &mut ConversationState) -> Vec<&'static str> {
        let n = state.history.len();
        let Some(answer) = state
            .history
            .last()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.clone())
        else {
            return Vec::new();
        };

        let mut updates = Map::new();
        let asked = n
            .checked_sub(2)
            .map(|i| &state.history[i])
            .filter(|m| m.role == ChatRole::Model)
            .and_then(|m| metric_asked_by(&m.content));
        if let Some(metric) = asked {
            let value = if answer.chars().any(|c| c.is_ascii_digit()) {
                Some(Value::String(answer.clone()))
            } else {
                interpret_words(metric, &answer)
            };
            if let Some(value) = value {
                updates.insert(metric.key().to_string(), value);
            }
        }
        updates.extend(extract_signals(&answer));

        apply_updates(state, &updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProfile;
    use crate::testing::MockLlmProvider;
    use serde_json::json;
    use std::sync::Arc;

    fn state_with(messages: &[(&str, &str)]) -> ConversationState {
        let mut state = ConversationState::with_profile(UserProfile::default());
        for (role, content) in messages {
            if *role == "user" {
                state.add_user_message(*content);
            } else {
                state.add_agent_message(*content);
            }
        }
        state
    }

    fn mock_agent(responses: Vec<Value>) -> IntakeAgent {
        let provider = MockLlmProvider::new(responses.iter().map(Value::to_string).collect());
        IntakeAgent::new(Some(AgentModel::new(Arc::new(provider), "mock-model")))
    }

    #[test]
    fn test_interpret_words_checks_negation_first() {
        let level = |metric, answer| interpret_words(metric, answer).and_then(|v| v.as_i64());
        assert_eq!(level(Metric::MoodScore, "not great"), Some(2));
        assert_eq!(level(Metric::EnergyScore, "Not good, honestly"), Some(2));
        assert_eq!(level(Metric::MoodScore, "not bad"), Some(3));
        assert_eq!(level(Metric::MoodScore, "great!"), Some(5));
        assert_eq!(level(Metric::MoodScore, "pretty good"), Some(4));
        assert_eq!(level(Metric::StressScore, "not manageable at all"), Some(8));
        assert_eq!(level(Metric::StressScore, "yeah, manageable"), Some(4));
        assert_eq!(level(Metric::StressScore, "not really"), Some(2));
    }

    #[test]
    fn test_interpret_words_matches_whole_words() {
        let level = |metric, answer| interpret_words(metric, answer).and_then(|v| v.as_i64());
        assert_eq!(level(Metric::WaterGlasses, "yes, enough"), None);
        assert_eq!(level(Metric::WaterGlasses, "I know I should"), None);
        assert_eq!(level(Metric::WaterGlasses, "no"), Some(0));
        assert_eq!(level(Metric::ExerciseMinutes, "Nope, nothing today"), Some(0));
        assert_eq!(level(Metric::EnergyScore, "following along"), None);
        assert_eq!(level(Metric::MoodScore, "I'm okay"), Some(3));
        assert_eq!(level(Metric::SleepHours, "good"), None);
    }

    #[test]
    fn test_classify_single_issue() {
        let state = state_with(&[("user", "I can't focus, my brain feels foggy"), ("model", "?")]);
        assert_eq!(classify_issue(&state), IssueType::MentalFatigue);
    }

    #[test]
    fn test_classify_multiple_issues_is_general() {
        let state = state_with(&[("user", "I'm exhausted and anxious")]);
        assert_eq!(classify_issue(&state), IssueType::GeneralWellness);
    }

    #[test]
    fn test_classify_build_plan_journey() {
        let mut state = state_with(&[("user", "C")]);
        state.journey_mode = Some(JourneyMode::BuildPlan);
        assert_eq!(classify_issue(&state), IssueType::BuildPlan);
    }

    #[test]
    fn test_friendly_names() {
        assert_eq!(Metric::SleepHours.friendly_name(), "sleep");
        assert_eq!(Metric::WaterGlasses.friendly_name(), "water");
        assert_eq!(Metric::HeightCm.friendly_name(), "height cm");
        assert_eq!(Metric::SmokingToday.friendly_name(), "smoking today");
    }

    #[test]
    fn test_enough_data_threshold() {
        let mut state = ConversationState::default();
        let c = &mut state.current_checkin;
        c.sleep_hours = Some(6.0);
        c.stress_score = Some(7);
        c.water_glasses = Some(4);
        c.mood_score = Some(3);
        c.energy_score = Some(2);
        c.exercise_minutes = Some(10);
        c.social_hours = Some(1.0);
        assert!(!has_enough_data(&state, Some(IssueType::MentalFatigue)));

        state.current_checkin.alcohol_units = Some(0);
        assert!(has_enough_data(&state, Some(IssueType::MentalFatigue)));
    }

    #[test]
    fn test_apply_updates_validates_ranges() {
        let mut state = ConversationState::default();
        let updates = json!({
            "sleep_hours": "5-6",
            "water_glasses": 25,
            "stress_score": "8 out of 10",
            "mood_score": 9,
            "age": "I'm 28 years old",
            "sex": "F",
            "height_cm": "5'7",
            "smoking_today": "no",
            "dietary_preference": "Vegan",
            "origin": "  India ",
            "exercise_type": "yoga",
        });

        let accepted = apply_updates(&mut state, updates.as_object().unwrap());

        assert_eq!(state.current_checkin.sleep_hours, Some(5.5));
        assert_eq!(state.current_checkin.water_glasses, None);
        assert_eq!(state.current_checkin.stress_score, Some(8));
        assert_eq!(state.current_checkin.mood_score, None);
        assert_eq!(state.current_checkin.smoking_today, Some(false));
        assert_eq!(state.current_checkin.exercise_type, None);
        assert_eq!(state.profile.age, Some(28));
        assert_eq!(state.profile.sex, Some(Sex::Female));
        assert_eq!(state.profile.height_cm, None);
        assert_eq!(state.profile.dietary_preference, DietaryPreference::Vegan);
        assert_eq!(state.profile.origin.as_deref(), Some("India"));
        assert!(accepted.contains(&"sleep_hours"));
        assert!(!accepted.contains(&"water_glasses"));
    }

    #[test]
    fn test_collected_summary() {
        let mut state = ConversationState::default();
        assert_eq!(collected_summary(&state), "Nothing yet");

        state.profile.age = Some(28);
        state.current_checkin.sleep_hours = Some(6.0);
        state.current_checkin.stress_score = Some(7);
        state.current_checkin.smoking_today = Some(true);
        assert_eq!(
            collected_summary(&state),
            "age: 28y, sleep: 6h, stress: 7/10, smoking: yes"
        );
    }

    #[test]
    fn test_extract_signals() {
        let found = extract_signals("Slept about 6 hours, had 3 glasses and stress is 7/10");
        assert_eq!(found["sleep_hours"], "6");
        assert_eq!(found["water_glasses"], "3");
        assert_eq!(found["stress_score"], "7");
        assert!(!found.contains_key("mood_score"));
    }

    #[tokio::test]
    async fn test_journey_selection_from_first_message() {
        let agent = IntakeAgent::default();
        let mut state = state_with(&[("user", "b")]);

        let outcome = agent.run(&mut state).await;

        assert_eq!(state.journey_mode, Some(JourneyMode::DeepDive));
        assert_eq!(outcome.status, IntakeStatus::Continue);
        assert_eq!(
            outcome.reply.as_deref(),
            Some("I hear you. To help you best, how many hours of sleep did you get last night?")
        );
    }

    #[tokio::test]
    async fn test_fallback_reads_answer_to_previous_question() {
        let agent = IntakeAgent::default();
        let mut state = state_with(&[
            ("user", "I feel tired"),
            ("model", "I hear you. To help you best, how many hours of sleep did you get last night?"),
            ("user", "maybe 5-6"),
        ]);

        let outcome = agent.run(&mut state).await;

        assert_eq!(state.current_checkin.sleep_hours, Some(5.5));
        assert_eq!(outcome.updated, vec!["sleep_hours"]);
        assert_eq!(
            outcome.reply.as_deref(),
            Some("That sounds tough. Let's check your basics. How is your energy level right now (1-5)?")
        );
    }

    #[tokio::test]
    async fn test_fallback_asks_first_missing_field_later() {
        let agent = IntakeAgent::default();
        let mut state = state_with(&[
            ("user", "hi"),
            ("model", "q"),
            ("user", "ok"),
            ("model", "Energy levels holding up?"),
            ("user", "pretty good"),
        ]);
        state.current_checkin.sleep_hours = Some(7.0);
        state.current_checkin.water_glasses = Some(5);

        let outcome = agent.run(&mut state).await;

        assert_eq!(state.current_checkin.energy_score, Some(4));
        assert_eq!(outcome.reply.as_deref(), Some("How are you feeling overall?"));
    }

    #[tokio::test]
    async fn test_fallback_completes_with_full_checkin() {
        let agent = IntakeAgent::default();
        let mut state = state_with(&[("user", "a"), ("model", "q"), ("user", "x"), ("model", "q"), ("user", "done")]);
        let c = &mut state.current_checkin;
        c.sleep_hours = Some(7.0);
        c.water_glasses = Some(8);
        c.mood_score = Some(4);
        c.energy_score = Some(4);
        c.stress_score = Some(3);
        c.exercise_minutes = Some(30);

        let outcome = agent.run(&mut state).await;
        assert_eq!(outcome.status, IntakeStatus::Complete);
        assert!(outcome.reply.is_none());
    }

    #[tokio::test]
    async fn test_model_turn_extracts_and_continues() {
        let agent = mock_agent(vec![json!({
            "issue_type": "mental_fatigue",
            "extracted": {"sleep_hours": 6, "stress_score": "7/10"},
            "status": "CONTINUE",
            "reply": "Got it. How much water have you had today? (0-20 glasses)"
        })]);
        let mut state = state_with(&[("user", "Brain fog all day, slept 6 hours, stress 7")]);

        let outcome = agent.run(&mut state).await;

        assert_eq!(outcome.status, IntakeStatus::Continue);
        assert_eq!(state.issue_type, Some(IssueType::MentalFatigue));
        assert_eq!(state.current_checkin.sleep_hours, Some(6.0));
        assert_eq!(state.current_checkin.stress_score, Some(7));
        assert!(outcome.reply.unwrap().contains("water"));
    }

    #[tokio::test]
    async fn test_model_complete_status_ends_intake() {
        let agent = mock_agent(vec![json!({
            "issue_type": null,
            "extracted": {},
            "status": "complete",
            "reply": "Thanks!"
        })]);
        let mut state = state_with(&[("user", "that's all")]);

        let outcome = agent.run(&mut state).await;
        assert_eq!(outcome.status, IntakeStatus::Complete);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let provider = MockLlmProvider::with_failure();
        let agent = IntakeAgent::new(Some(AgentModel::new(Arc::new(provider), "mock-model")));
        let mut state = state_with(&[("user", "hello")]);

        let outcome = agent.run(&mut state).await;
        assert_eq!(outcome.status, IntakeStatus::Continue);
        assert!(outcome.reply.unwrap().contains("sleep"));
    }
}

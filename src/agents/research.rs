//! Issue-aware research with optional search grounding
//!
//! The stage screens the conversation for symptoms that need a
//! professional, decides whether live search is worth it, and then loops:
//! ask the model, rank the returned web sources by domain authority and
//! relevance, and retry with tighter search hints until the sources clear
//! the quality bar or the attempts run out. The best attempt wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, error, info, warn};
use url::Url;

use super::registry::AgentCard;
use super::{note_fallback, AgentContext, AgentModel, PipelineStage};
use crate::config::ResearchSection;
use crate::error::{NiravaError, NiravaResult};
use crate::health::round_to;
use crate::llm::{parse_json_response, CompletionResponse};
use crate::models::{ChatMessage, DailyCheckIn, IssueType};

const URGENT_KEYWORDS: &[&str] = &[
    "chest pain",
    "difficulty breathing",
    "severe pain",
    "suicidal",
    "self-harm",
    "overdose",
    "emergency",
    "heart attack",
    "stroke",
];

const RECOMMEND_DOCTOR_KEYWORDS: &[&str] = &[
    "blood in",
    "sudden weight loss",
    "persistent pain",
    "depression",
    "anxiety disorder",
    "insomnia chronic",
    "dizziness",
    "fainting",
    "numbness",
    "vision changes",
    "unexplained",
    "weeks",
    "months",
    "getting worse",
];

/// Domain authority: 10 peer-reviewed, 9 government, 8 academic medical, 7 foundations
const TRUSTED_DOMAINS: &[(&str, u8)] = &[
    ("pubmed.ncbi.nlm.nih.gov", 10),
    ("nih.gov", 10),
    ("thelancet.com", 10),
    ("nejm.org", 10),
    ("bmj.com", 10),
    ("jamanetwork.com", 10),
    ("cdc.gov", 9),
    ("who.int", 9),
    ("medlineplus.gov", 9),
    ("mayoclinic.org", 8),
    ("hopkinsmedicine.org", 8),
    ("clevelandclinic.org", 8),
    ("harvard.edu", 8),
    ("stanfordhealthcare.org", 8),
    ("sleepfoundation.org", 7),
    ("heart.org", 7),
    ("diabetes.org", 7),
    ("cancer.org", 7),
];

const TITLE_KEYWORDS: &[&str] = &[
    "sleep",
    "stress",
    "exercise",
    "hydration",
    "mental health",
    "cognitive",
    "fatigue",
    "wellness",
    "health",
    "study",
    "research",
    "clinical",
    "trial",
    "meta-analysis",
];

const SCIENTIFIC_TERMS: &[&str] = &[
    "study",
    "research",
    "participants",
    "results",
    "significant",
    "correlation",
    "effect",
    "associated",
    "risk",
    "benefit",
];

const MAX_SNIPPET_CHARS: usize = 500;
const MIN_OVERALL_QUALITY: f64 = 60.0;
const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Severity of what the user described
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    #[default]
    None,
    Recommend,
    Urgent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub needs_professional: bool,
    pub level: SafetyLevel,
    pub matched_keywords: Vec<String>,
}

impl SafetyCheck {
    /// Message shown ahead of all other insights
    pub fn insight(&self) -> Option<&'static str> {
        match self.level {
            SafetyLevel::Urgent => Some(
                "⚠️ IMPORTANT: Some of what you've described may need immediate attention. \
                 If you're experiencing chest pain, difficulty breathing, or thoughts of self-harm, \
                 please contact emergency services (911) or a crisis helpline immediately.",
            ),
            SafetyLevel::Recommend => Some(
                "💡 Based on what you've shared, it might be helpful to discuss these symptoms \
                 with a healthcare provider. While I can offer general wellness tips, \
                 a professional can give you personalized medical advice.",
            ),
            SafetyLevel::None => None,
        }
    }
}

/// Scan the conversation and reported symptoms for red-flag keywords.
///
/// Urgent keywords take precedence; doctor-recommendation keywords are only
/// checked when nothing urgent matched.
pub fn check_safety(history: &[ChatMessage], symptoms: &[String]) -> SafetyCheck {
    let mut text = history
        .iter()
        .map(|m| m.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if !symptoms.is_empty() {
        text.push(' ');
        text.push_str(&symptoms.join(" ").to_lowercase());
    }

    let matches = |keywords: &[&str]| -> Vec<String> {
        keywords
            .iter()
            .filter(|kw| text.contains(*kw))
            .map(|kw| kw.to_string())
            .collect()
    };

    let urgent = matches(URGENT_KEYWORDS);
    if !urgent.is_empty() {
        return SafetyCheck {
            needs_professional: true,
            level: SafetyLevel::Urgent,
            matched_keywords: urgent,
        };
    }

    let recommend = matches(RECOMMEND_DOCTOR_KEYWORDS);
    if !recommend.is_empty() {
        return SafetyCheck {
            needs_professional: true,
            level: SafetyLevel::Recommend,
            matched_keywords: recommend,
        };
    }

    SafetyCheck::default()
}

/// Whether search grounding is worth the latency for this user.
///
/// Health-critical issues and concerning numbers always ground. General
/// wellness grounds only for already-healthy users looking to optimise.
pub fn should_ground(issue: IssueType, checkin: &DailyCheckIn) -> bool {
    if matches!(
        issue,
        IssueType::SleepIssues | IssueType::PhysicalFatigue | IssueType::Emotional
    ) {
        return true;
    }

    let sleep = checkin.sleep_hours;
    let stress = checkin.stress_score;
    if sleep.is_some_and(|s| s < 5.0) || stress.is_some_and(|s| s >= 8) {
        return true;
    }

    if issue == IssueType::GeneralWellness {
        return sleep.is_some_and(|s| s >= 7.0) && stress.is_some_and(|s| s <= 4);
    }

    true
}

/// Host of a URL without a leading `www.`
pub fn extract_domain(uri: &str) -> String {
    Url::parse(uri)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .and_then(|url| url.host_str().map(|host| host.trim_start_matches("www.").to_string()))
        .unwrap_or_default()
}

/// 0-10 authority of a domain; untrusted domains score 0
pub fn authority_score(domain: &str) -> u8 {
    TRUSTED_DOMAINS
        .iter()
        .find(|(trusted, _)| domain.contains(trusted))
        .map(|(_, score)| *score)
        .unwrap_or(0)
}

/// 0-100 relevance: authority up to 40, title keywords up to 30, scientific
/// language in the snippet up to 30
pub fn relevance_score(title: &str, snippet: &str, authority: u8) -> u8 {
    let title = title.to_lowercase();
    let snippet = snippet.to_lowercase();

    let title_matches = TITLE_KEYWORDS.iter().filter(|kw| title.contains(*kw)).count();
    let snippet_matches = if snippet.is_empty() {
        0
    } else {
        SCIENTIFIC_TERMS
            .iter()
            .filter(|term| snippet.contains(*term))
            .count()
    };

    let score = usize::from(authority) * 4 + (title_matches * 5).min(30) + (snippet_matches * 6).min(30);
    score.min(100) as u8
}

/// A web source behind a grounded answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: usize,
    pub title: String,
    pub uri: String,
    pub domain: String,
    pub authority_score: u8,
    pub snippet: String,
    pub relevance_score: u8,
}

impl Source {
    fn rank(&self) -> f64 {
        f64::from(self.authority_score) * 0.6 + f64::from(self.relevance_score) / 10.0 * 0.4
    }

    fn tier(&self) -> &'static str {
        match self.authority_score {
            10 => "Tier 1 (Peer-Reviewed)",
            9 => "Tier 2 (Government)",
            8 => "Tier 3 (Academic Medical)",
            7 => "Tier 4 (Trusted Foundation)",
            _ => "Other",
        }
    }
}

/// Score and rank the citations of a grounded response, best first
pub fn rank_sources(response: &CompletionResponse) -> Vec<Source> {
    let snippet: String = response
        .grounding_supports
        .iter()
        .find(|s| !s.trim().is_empty())
        .map(|s| s.chars().take(MAX_SNIPPET_CHARS).collect())
        .unwrap_or_default();

    let mut sources: Vec<Source> = response
        .citations
        .iter()
        .enumerate()
        .map(|(i, citation)| {
            let domain = extract_domain(&citation.uri);
            let authority = authority_score(&domain);
            Source {
                id: i + 1,
                title: citation.title.clone(),
                uri: citation.uri.clone(),
                relevance_score: relevance_score(&citation.title, &snippet, authority),
                authority_score: authority,
                domain,
                snippet: snippet.clone(),
            }
        })
        .collect();

    sources.sort_by(|a, b| b.rank().total_cmp(&a.rank()));
    sources
}

/// Aggregate quality of one research attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchQuality {
    /// 0-100: authority 40%, relevance 30%, trusted share 20%, diversity 10%
    pub overall_score: f64,
    pub avg_authority: f64,
    pub avg_relevance: f64,
    pub trusted_count: usize,
    pub diversity_score: f64,
}

pub fn score_research_quality(sources: &[Source], min_authority: u8) -> ResearchQuality {
    if sources.is_empty() {
        return ResearchQuality::default();
    }

    let n = sources.len() as f64;
    let avg_authority = sources
        .iter()
        .map(|s| f64::from(s.authority_score))
        .sum::<f64>()
        / n;
    let avg_relevance = sources
        .iter()
        .map(|s| f64::from(s.relevance_score))
        .sum::<f64>()
        / n;
    let trusted_count = sources
        .iter()
        .filter(|s| s.authority_score >= min_authority)
        .count();
    let unique_domains = sources
        .iter()
        .map(|s| s.domain.as_str())
        .collect::<HashSet<_>>()
        .len();
    let diversity_score = (unique_domains as f64 / n * 100.0).min(100.0);

    let overall_score = avg_authority / 10.0 * 40.0
        + avg_relevance / 100.0 * 30.0
        + trusted_count as f64 / n * 20.0
        + diversity_score / 100.0 * 10.0;

    ResearchQuality {
        overall_score: round_to(overall_score, 1),
        avg_authority: round_to(avg_authority, 1),
        avg_relevance: round_to(avg_relevance, 1),
        trusted_count,
        diversity_score: round_to(diversity_score, 1),
    }
}

/// Ungrounded answers have no sources to judge and always pass
pub fn meets_quality_threshold(
    quality: &ResearchQuality,
    grounded: bool,
    thresholds: &ResearchSection,
) -> bool {
    if !grounded {
        return true;
    }
    quality.overall_score >= MIN_OVERALL_QUALITY
        && quality.trusted_count >= thresholds.min_trusted_sources
        && quality.avg_authority >= f64::from(thresholds.min_authority_score)
}

/// One attempt of the research loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationLog {
    pub iteration: u32,
    pub sources_found: usize,
    pub quality_score: f64,
    pub authority_score: f64,
    pub relevance_score: f64,
    pub trusted_sources: usize,
}

fn refine_prompt(base: &str, iteration: u32, previous: Option<&IterationLog>, thresholds: &ResearchSection) -> String {
    if iteration <= 1 {
        return base.to_string();
    }

    let mut refined = format!("{base}\n\n=== SEARCH REFINEMENT (CRITICAL) ===\n");
    let trusted = previous.map(|p| p.trusted_sources).unwrap_or(0);
    if trusted < thresholds.min_trusted_sources {
        refined.push_str(&format!(
            "Previous search found only {trusted} trusted sources. \
             PRIORITIZE searching these domains:\n\
             - site:pubmed.ncbi.nlm.nih.gov\n\
             - site:nih.gov\n\
             - site:mayoclinic.org\n\
             - site:harvard.edu\n\n"
        ));
    }
    if previous.map(|p| p.relevance_score).unwrap_or(0.0) < 50.0 {
        refined.push_str(
            "Previous sources had low relevance. \
             Use MORE SPECIFIC search terms related to the user's exact symptoms.\n\n",
        );
    }
    refined.push_str(
        "Focus on:\n\
         1. Peer-reviewed research papers\n\
         2. Clinical studies with quantitative results\n\
         3. Meta-analyses and systematic reviews\n\
         4. Government health agency guidelines\n",
    );
    refined
}

/// Compact view of a cited source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSource {
    pub title: String,
    pub domain: String,
    pub authority: u8,
}

/// What the research loop did, for display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchSummary {
    pub iterations_performed: u32,
    pub final_quality_score: f64,
    pub sources_cited: usize,
    pub source_breakdown: BTreeMap<String, usize>,
    pub top_sources: Vec<TopSource>,
}

impl ResearchSummary {
    fn new(iterations: u32, quality: f64, sources: &[Source]) -> Self {
        let mut source_breakdown = BTreeMap::new();
        for source in sources {
            *source_breakdown.entry(source.tier().to_string()).or_insert(0) += 1;
        }
        Self {
            iterations_performed: iterations,
            final_quality_score: quality,
            sources_cited: sources.len(),
            source_breakdown,
            top_sources: sources
                .iter()
                .take(3)
                .map(|s| TopSource {
                    title: s.title.clone(),
                    domain: s.domain.clone(),
                    authority: s.authority_score,
                })
                .collect(),
        }
    }
}

/// Output of the research stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchFindings {
    pub reasoning: String,
    pub insights: Vec<String>,
    pub confidence: f64,
    pub sources: Vec<Source>,
    pub quality: Option<ResearchQuality>,
    pub safety: SafetyCheck,
    pub grounded: bool,
    pub iterations: u32,
    pub log: Vec<IterationLog>,
    pub summary: Option<ResearchSummary>,
}

struct IssueFocus {
    title: &'static str,
    focus: &'static [&'static str],
    evidence: &'static [&'static str],
}

fn issue_focus(issue: IssueType) -> IssueFocus {
    match issue {
        IssueType::MentalFatigue => IssueFocus {
            title: "Mental Clarity",
            focus: &["sleep quality", "stress levels", "hydration"],
            evidence: &[
                "Sleep deprivation impairs prefrontal cortex function, reducing focus and decision-making.",
                "Dehydration of just 2% body weight reduces cognitive performance by 10-15%.",
                "Chronic stress elevates cortisol, which impairs memory consolidation.",
            ],
        },
        IssueType::Emotional => IssueFocus {
            title: "Emotional Wellness",
            focus: &["sleep", "exercise", "stress"],
            evidence: &[
                "Exercise releases endorphins and BDNF, both proven mood boosters.",
                "Sleep deprivation increases amygdala reactivity by 60%, amplifying negative emotions.",
                "Even 10 minutes of walking reduces anxiety symptoms.",
            ],
        },
        IssueType::PhysicalFatigue => IssueFocus {
            title: "Physical Energy",
            focus: &["sleep", "exercise", "hydration"],
            evidence: &[
                "Sleep is when muscle repair and energy restoration occur.",
                "Regular movement increases mitochondrial density, improving energy production.",
                "Dehydration reduces blood volume, making the heart work harder.",
            ],
        },
        IssueType::SleepIssues => IssueFocus {
            title: "Sleep Quality",
            focus: &["stress", "exercise timing", "sleep hygiene"],
            evidence: &[
                "Cortisol suppresses melatonin production, delaying sleep onset.",
                "Exercise improves sleep quality but not within 2h of bedtime.",
                "Consistent wake times regulate circadian rhythm better than total hours.",
            ],
        },
        IssueType::GeneralWellness => IssueFocus {
            title: "Optimization",
            focus: &["metabolic health", "circadian alignment", "longevity"],
            evidence: &[
                "Consistent sleep onset stabilizes circadian rhythm, boosting growth hormone release.",
                "Zone 2 cardio improves mitochondrial efficiency and metabolic flexibility.",
                "Morning sunlight exposure within 30 minutes of waking resets cortisol rhythm.",
            ],
        },
        IssueType::BuildPlan => IssueFocus {
            title: "Comprehensive Health Plan",
            focus: &["nutrition", "sleep hygiene", "movement", "stress management"],
            evidence: &[
                "Protein intake of 1.6g/kg body weight preserves muscle mass during weight loss.",
                "Consistent meal timing improves metabolic health and circadian rhythm.",
                "Combining cardio and strength training provides optimal longevity benefits.",
            ],
        },
        IssueType::SocialIsolation => IssueFocus {
            title: "Social Connection",
            focus: &["loneliness impact", "social support", "community"],
            evidence: &[
                "Social isolation increases mortality risk by 29% (meta-analysis, Holt-Lunstad 2015).",
                "Strong social connections lower cortisol and improve immune function.",
                "Even brief social interactions (10-15 min) reduce stress biomarkers.",
            ],
        },
        IssueType::ToxinReduction => IssueFocus {
            title: "Toxin Avoidance",
            focus: &["alcohol effects", "smoking cessation", "environmental toxins"],
            evidence: &[
                "Alcohol disrupts REM sleep architecture, reducing sleep quality by up to 39%.",
                "Smoking cessation improves cardiovascular health within 24 hours (CDC).",
                "Even moderate alcohol (2+ drinks/day) increases cancer risk (WHO).",
            ],
        },
    }
}

fn user_data_lines(context: &AgentContext) -> Vec<String> {
    let c = &context.checkin;
    let mut lines = Vec::new();
    if let Some(v) = c.sleep_hours {
        lines.push(format!("Sleep: {v} hours"));
    }
    if let Some(v) = c.water_glasses {
        lines.push(format!("Water: {v} glasses"));
    }
    if let Some(v) = c.mood_score {
        lines.push(format!("Mood: {v}/5"));
    }
    if let Some(v) = c.energy_score {
        lines.push(format!("Energy: {v}/5"));
    }
    if let Some(v) = c.stress_score {
        lines.push(format!("Stress: {v}/10"));
    }
    if let Some(v) = c.exercise_minutes {
        lines.push(format!("Exercise: {v} min"));
    }

    if let Some(report) = &context.metrics {
        let p = &report.pillars;
        if let Some(v) = p.sleep_quality_score {
            lines.push(format!("Sleep Quality Score: {v}/10"));
        }
        if let Some(v) = p.sleep_debt_hours.filter(|d| *d != 0.0) {
            lines.push(format!("Sleep Debt: {v}h"));
        }
        if let Some(v) = p.burnout_risk_score {
            lines.push(format!("Burnout Risk: {v}/10"));
        }
        if let Some(v) = p.stress_load_index {
            lines.push(format!("Stress Load Index: {v}/10"));
        }
        if let Some(v) = p.mental_resilience_score {
            lines.push(format!("Mental Resilience: {v}/10"));
        }
        if let Some(v) = p.dehydration_risk {
            lines.push(format!("Dehydration Risk: {v}"));
        }
        lines.push(format!("Sedentary Risk: {}/10", p.sedentary_risk_score));
        if let Some(v) = p.social_wellness_score {
            lines.push(format!("Social Wellness: {v}/10"));
        }
        if let Some(v) = p.loneliness_risk {
            lines.push(format!("Loneliness Risk: {v}"));
        }
        if p.toxin_load_score > 0 {
            lines.push(format!("Toxin Load: {}/10", p.toxin_load_score));
        }
    }
    lines
}

fn build_prompt(context: &AgentContext) -> String {
    let focus = issue_focus(context.issue_type);
    let c = &context.checkin;
    let known = |v: Option<String>| v.unwrap_or_else(|| "unknown".to_string());

    let data = user_data_lines(context);
    let data = if data.is_empty() {
        "Limited data collected".to_string()
    } else {
        data.join("\n")
    };
    let evidence = focus
        .evidence
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a health researcher providing TARGETED insights for: {title}

ISSUE TYPE: {issue}
FOCUS AREAS: {areas}

RELEVANT EVIDENCE BASE:
{evidence}

PREFERRED SOURCES:
NIH, Mayo Clinic, Harvard Health, Cleveland Clinic, PubMed, CDC, WHO.
Avoid forums, blogs, or unverified commercial sites.

USER ({age}y {sex}):
{data}

=== CHAIN-OF-THOUGHT REASONING (You MUST follow these steps) ===
STEP 1: IDENTIFY THE GAP
- Sleep: 7-9h optimal -> User has {sleep}h
- Water: 8+ glasses optimal -> User has {water} glasses
- Stress: <4/10 optimal -> User has {stress}/10
STEP 2: FIND THE ROOT CAUSE for the biggest gap (which biological mechanism explains the symptom?)
STEP 3: CONNECT TO THE USER'S COMPLAINT, using their words.
STEP 4: FORMULATE INSIGHT as [Their Data] + [Clinical Ideal] + [Mechanism] + [Their Symptom]

=== SAFETY RULES (CRITICAL) ===
- Do NOT provide a medical diagnosis.
- Do NOT name specific diseases as a conclusion.
- Do NOT recommend medications, supplements, or dosages.
- Keep language educational and focused on prevention.

=== EXAMPLE ===
INPUT: Sleep: 5h, Stress: 8/10, Issue: mental_fatigue
OUTPUT: "Your 5h sleep is well below the 7-9h recommended by major sleep foundations. This acute restriction impairs prefrontal cortex function, directly causing the 'brain fog' you described [1]."

=== CITATION FORMAT (MANDATORY) ===
Every medical claim must carry a citation number [1], [2], ... referencing a grounded source.
Prioritize peer-reviewed sources over general health sites.

OUTPUT JSON:
{{
  "reasoning": "Which metrics are most concerning and why (2-3 sentences)",
  "insights": ["Insight 1", "Insight 2", "Insight 3"],
  "confidence": 0.0-1.0
}}

Generate 2-4 insights maximum. Focus on the MOST IMPACTFUL findings."#,
        title = focus.title,
        issue = context.issue_type.as_str().to_uppercase().replace('_', " "),
        areas = focus.focus.join(", "),
        age = context.profile.age.unwrap_or(30),
        sex = context
            .profile
            .sex
            .map(|s| s.as_str())
            .unwrap_or("unknown"),
        sleep = known(c.sleep_hours.map(|v| v.to_string())),
        water = known(c.water_glasses.map(|v| v.to_string())),
        stress = known(c.stress_score.map(|v| v.to_string())),
    )
}

/// Insights derived from the check-in alone
pub fn fallback_insights(issue: IssueType, checkin: &DailyCheckIn) -> Vec<String> {
    let sleep = checkin.sleep_hours.filter(|s| *s > 0.0);
    let water = checkin.water_glasses.filter(|w| *w > 0);
    let stress = checkin.stress_score.filter(|s| *s > 0);

    let mut insights = Vec::new();
    match issue {
        IssueType::MentalFatigue => {
            if let Some(s) = sleep.filter(|s| *s < 7.0) {
                insights.push(format!("Your {s}h of sleep is likely impacting your mental clarity. The brain consolidates memories and clears toxins during deep sleep."));
            }
            if let Some(s) = stress.filter(|s| *s > 5) {
                insights.push(format!("High stress ({s}/10) elevates cortisol, which impairs focus and memory. Consider a brief breathing exercise."));
            }
            if let Some(w) = water.filter(|w| *w < 6) {
                insights.push(format!("At {w} glasses, dehydration may be contributing to brain fog. Even mild dehydration reduces cognitive performance."));
            }
        }
        IssueType::Emotional => {
            if let Some(s) = sleep.filter(|s| *s < 7.0) {
                insights.push(format!("Sleep deprivation ({s}h) amplifies negative emotions by increasing amygdala reactivity."));
            }
            if let Some(s) = stress.filter(|s| *s > 5) {
                insights.push(format!("Your stress level ({s}/10) is elevated. Physical movement, even a 10-min walk, can help regulate mood."));
            }
        }
        IssueType::PhysicalFatigue => {
            if let Some(s) = sleep.filter(|s| *s < 7.0) {
                insights.push(format!("Your {s}h of sleep limits physical recovery. Muscles repair and energy restores during deep sleep."));
            }
            if let Some(w) = water.filter(|w| *w < 6) {
                insights.push(format!("{w} glasses of water is below optimal. Dehydration makes your heart work harder, reducing energy."));
            }
        }
        IssueType::SleepIssues => {
            if let Some(s) = stress.filter(|s| *s > 5) {
                insights.push(format!("High stress ({s}/10) suppresses melatonin production, making it harder to fall asleep."));
            }
        }
        _ => {
            if let Some(s) = sleep.filter(|s| *s >= 7.0) {
                insights.push(format!("Great job on {s}h of sleep! You're in the optimal range."));
            }
            if let Some(w) = water.filter(|w| *w >= 8) {
                insights.push(format!("You're well-hydrated at {w} glasses."));
            }
        }
    }

    if insights.is_empty() {
        insights.push(
            "Based on the data collected, let's focus on building consistent healthy habits."
                .to_string(),
        );
    }
    insights
}

/// Second pipeline stage: evidence-backed insights
#[derive(Debug, Clone)]
pub struct ResearchAgent {
    model: Option<AgentModel>,
    thresholds: ResearchSection,
}

impl ResearchAgent {
    pub fn new(model: Option<AgentModel>, thresholds: ResearchSection) -> Self {
        Self { model, thresholds }
    }

    fn fallback(&self, context: &AgentContext, safety: SafetyCheck) -> ResearchFindings {
        let mut insights = fallback_insights(context.issue_type, &context.checkin);
        if let Some(warning) = safety.insight() {
            insights.insert(0, warning.to_string());
        }
        ResearchFindings {
            insights,
            confidence: 0.5,
            safety,
            ..Default::default()
        }
    }

    async fn research(
        &self,
        model: &AgentModel,
        context: &AgentContext,
        safety: SafetyCheck,
    ) -> NiravaResult<ResearchFindings> {
        let grounded = model.grounding_enabled() && should_ground(context.issue_type, &context.checkin);
        let base_prompt = build_prompt(context);

        let mut log: Vec<IterationLog> = Vec::new();
        let mut best: Option<(CompletionResponse, Vec<Source>, ResearchQuality)> = None;
        let mut iterations = 0;

        while iterations < self.thresholds.max_iterations {
            iterations += 1;
            info!(iteration = iterations, grounded, "Research iteration");

            let prompt = refine_prompt(&base_prompt, iterations, log.last(), &self.thresholds);
            let response = model.generate_grounded(prompt, grounded).await?;

            let sources = if grounded { rank_sources(&response) } else { Vec::new() };
            let quality = score_research_quality(&sources, self.thresholds.min_authority_score);
            info!(
                iteration = iterations,
                quality = quality.overall_score,
                authority = quality.avg_authority,
                relevance = quality.avg_relevance,
                trusted = quality.trusted_count,
                sources = sources.len(),
                "Research quality"
            );
            log.push(IterationLog {
                iteration: iterations,
                sources_found: sources.len(),
                quality_score: quality.overall_score,
                authority_score: quality.avg_authority,
                relevance_score: quality.avg_relevance,
                trusted_sources: quality.trusted_count,
            });

            let improved = best
                .as_ref()
                .map_or(true, |(_, _, b)| quality.overall_score > b.overall_score);
            let passed = meets_quality_threshold(&quality, grounded, &self.thresholds);
            if improved {
                best = Some((response, sources, quality));
            }
            if passed {
                debug!(iteration = iterations, "Quality threshold met");
                break;
            }
            warn!(iteration = iterations, "Quality threshold not met, refining search");
        }

        let Some((response, sources, quality)) = best else {
            return Err(NiravaError::pipeline("research", "no research attempt completed"));
        };

        let result = parse_json_response(response.text())?;
        let mut insights: Vec<String> = result
            .get("insights")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if insights.is_empty() {
            return Err(NiravaError::llm_error("research returned no insights"));
        }
        if let Some(warning) = safety.insight() {
            insights.insert(0, warning.to_string());
        }

        let summary = ResearchSummary::new(iterations, quality.overall_score, &sources);
        Ok(ResearchFindings {
            reasoning: result
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            insights,
            confidence: result
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_CONFIDENCE),
            sources,
            quality: grounded.then_some(quality),
            safety,
            grounded,
            iterations,
            log,
            summary: Some(summary),
        })
    }
}

#[async_trait]
impl PipelineStage for ResearchAgent {
    fn name(&self) -> &'static str {
        "ResearchAgent"
    }

    fn card(&self) -> AgentCard {
        AgentCard::new(
            "research_agent",
            "Research Agent",
            "Issue-aware health insights grounded in trusted medical sources",
        )
        .with_skill("safety_check", "Detect symptoms that need a healthcare professional")
        .with_skill("grounded_search", "Search trusted medical sources and rank them")
        .with_skill("health_insights", "Explain the mechanism behind the user's symptoms")
        .with_task_types(&["health_research", "safety_check"])
    }

    async fn run(&self, context: &mut AgentContext) -> NiravaResult<()> {
        let screened: Vec<ChatMessage> = context
            .earlier_messages
            .iter()
            .chain(&context.history)
            .cloned()
            .collect();
        let safety = check_safety(&screened, &context.checkin.symptoms);
        if safety.needs_professional {
            warn!(level = ?safety.level, keywords = ?safety.matched_keywords, "Safety check triggered");
        }

        let findings = match &self.model {
            Some(model) => match self.research(model, context, safety.clone()).await {
                Ok(findings) => findings,
                Err(e) => {
                    error!(error = %e, "Research failed");
                    note_fallback("research", "model error");
                    self.fallback(context, safety)
                }
            },
            None => self.fallback(context, safety),
        };

        info!(
            insights = findings.insights.len(),
            sources = findings.sources.len(),
            iterations = findings.iterations,
            grounded = findings.grounded,
            "Research completed"
        );

        context.research = Some(findings);
        Ok(())
    }
}

//! Conversation state: chat history, flow phase and triage results

use super::{DailyCheckIn, UserProfile};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who said a message. The model side is "model" to match Gemini's roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            content: content.into(),
        }
    }
}

/// Where the conversation is in the intake → analysis flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Intake,
    Analysis,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Intake => f.write_str("intake"),
            Phase::Analysis => f.write_str("analysis"),
        }
    }
}

/// What the user wants from this session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyMode {
    /// Path A: data and a snapshot
    QuickCheck,
    /// Path B: data plus education on why each signal matters
    DeepDive,
    /// Path C: data plus an actionable plan and meal plan
    BuildPlan,
}

impl JourneyMode {
    /// Match a menu answer such as "A", "deep dive" or "plan"
    pub fn from_selection(text: &str) -> Option<Self> {
        match text.trim().to_uppercase().as_str() {
            "A" | "QUICK CHECK" | "QUICK" => Some(Self::QuickCheck),
            "B" | "DEEP DIVE" | "DEEP" | "EDUCATE" | "EDUCATION" => Some(Self::DeepDive),
            "C" | "BUILD PLAN" | "PLAN" | "BUILD" => Some(Self::BuildPlan),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickCheck => "QUICK_CHECK",
            Self::DeepDive => "DEEP_DIVE",
            Self::BuildPlan => "BUILD_PLAN",
        }
    }
}

/// Triage category of the user's concern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Emotional,
    MentalFatigue,
    PhysicalFatigue,
    SleepIssues,
    #[default]
    GeneralWellness,
    BuildPlan,
    SocialIsolation,
    ToxinReduction,
}

impl IssueType {
    pub const ALL: [IssueType; 8] = [
        IssueType::Emotional,
        IssueType::MentalFatigue,
        IssueType::PhysicalFatigue,
        IssueType::SleepIssues,
        IssueType::GeneralWellness,
        IssueType::BuildPlan,
        IssueType::SocialIsolation,
        IssueType::ToxinReduction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Emotional => "emotional",
            IssueType::MentalFatigue => "mental_fatigue",
            IssueType::PhysicalFatigue => "physical_fatigue",
            IssueType::SleepIssues => "sleep_issues",
            IssueType::GeneralWellness => "general_wellness",
            IssueType::BuildPlan => "build_plan",
            IssueType::SocialIsolation => "social_isolation",
            IssueType::ToxinReduction => "toxin_reduction",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|issue| issue.as_str() == value)
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The flowing state of the chat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub history: Vec<ChatMessage>,
    pub profile: UserProfile,
    pub current_checkin: DailyCheckIn,
    pub phase: Phase,
    pub journey_mode: Option<JourneyMode>,
    pub issue_type: Option<IssueType>,
}

impl ConversationState {
    pub fn with_profile(profile: UserProfile) -> Self {
        Self {
            profile,
            ..Default::default()
        }
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content));
    }

    pub fn add_agent_message(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::model(content));
    }

    /// Number of messages the user has sent
    pub fn user_turns(&self) -> usize {
        self.history
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .count()
    }

    /// All user text, lowercased and space-joined
    pub fn user_text(&self) -> String {
        self.history
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journey_selection() {
        assert_eq!(JourneyMode::from_selection("a"), Some(JourneyMode::QuickCheck));
        assert_eq!(
            JourneyMode::from_selection(" Deep Dive "),
            Some(JourneyMode::DeepDive)
        );
        assert_eq!(
            JourneyMode::from_selection("education"),
            Some(JourneyMode::DeepDive)
        );
        assert_eq!(JourneyMode::from_selection("build"), Some(JourneyMode::BuildPlan));
        assert_eq!(JourneyMode::from_selection("I feel tired"), None);
    }

    #[test]
    fn test_issue_type_roundtrip_names() {
        for issue in IssueType::ALL {
            assert_eq!(IssueType::parse(issue.as_str()), Some(issue));
            let json = serde_json::to_string(&issue).unwrap();
            assert_eq!(json, format!("\"{}\"", issue.as_str()));
        }
        assert_eq!(IssueType::parse("unknown"), None);
    }

    #[test]
    fn test_history_helpers() {
        let mut state = ConversationState::default();
        state.add_user_message("I'm Tired");
        state.add_agent_message("How did you sleep?");
        state.add_user_message("Badly");

        assert_eq!(state.user_turns(), 2);
        assert_eq!(state.user_text(), "i'm tired badly");
        assert_eq!(state.last_message().unwrap().role, ChatRole::User);
        assert_eq!(state.phase, Phase::Intake);
    }
}

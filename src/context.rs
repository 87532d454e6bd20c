//! Conversation compaction
//!
//! Long conversations are cut down to the most recent messages plus a short
//! summary of everything older, and a few facts are pulled out of the older
//! messages so they survive the cut.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::agents::AgentModel;
use crate::config::ContextSection;
use crate::models::ChatMessage;
use crate::observability::metrics;

/// Rough characters-per-token ratio used for the size check
pub const CHARS_PER_TOKEN: usize = 4;

const SUMMARY_PREVIEW_CHARS: usize = 100;

static SLEEP_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(?:hours?|hrs?)\s*(?:of\s+)?sleep").expect("sleep pattern is valid")
});
static STRESS_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"stress(?:ed)?.*?(\d+)\s*(?:out of|/)\s*10").expect("stress pattern is valid")
});

const POSITIVE_WORDS: &[&str] = &["happy", "great", "amazing", "good"];
const NEGATIVE_WORDS: &[&str] = &["sad", "down", "depressed", "anxious"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodIndicator {
    Positive,
    Negative,
}

/// Facts worth keeping after older messages are dropped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationFacts {
    pub mentioned_sleep: Option<f64>,
    pub mentioned_stress: Option<u8>,
    pub mood_indicator: Option<MoodIndicator>,
}

impl ConversationFacts {
    pub fn is_empty(&self) -> bool {
        self.mentioned_sleep.is_none()
            && self.mentioned_stress.is_none()
            && self.mood_indicator.is_none()
    }
}

impl fmt::Display for ConversationFacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(sleep) = self.mentioned_sleep {
            parts.push(format!("mentioned_sleep: {sleep}"));
        }
        if let Some(stress) = self.mentioned_stress {
            parts.push(format!("mentioned_stress: {stress}"));
        }
        if let Some(mood) = self.mood_indicator {
            let mood = match mood {
                MoodIndicator::Positive => "positive",
                MoodIndicator::Negative => "negative",
            };
            parts.push(format!("mood_indicator: {mood}"));
        }
        f.write_str(&parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactedContext {
    /// Summary of the dropped messages; empty when nothing was dropped
    pub summary: String,
    pub recent_messages: Vec<ChatMessage>,
    pub extracted_facts: ConversationFacts,
    pub original_length: usize,
    pub compacted_length: usize,
}

/// Pull sleep hours, a stress rating and a mood hint out of free text
pub fn extract_facts(messages: &[ChatMessage], existing: &ConversationFacts) -> ConversationFacts {
    let mut facts = existing.clone();
    let text = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if let Some(hours) = SLEEP_MENTION
        .captures(&text)
        .and_then(|c| c[1].parse::<f64>().ok())
    {
        facts.mentioned_sleep = Some(hours);
    }
    if let Some(stress) = STRESS_MENTION
        .captures(&text)
        .and_then(|c| c[1].parse::<u8>().ok())
    {
        facts.mentioned_stress = Some(stress);
    }

    if POSITIVE_WORDS.iter().any(|w| text.contains(w)) {
        facts.mood_indicator = Some(MoodIndicator::Positive);
    } else if NEGATIVE_WORDS.iter().any(|w| text.contains(w)) {
        facts.mood_indicator = Some(MoodIndicator::Negative);
    }

    facts
}

/// Rule-based summary: the user's first message and the message count
pub fn fallback_summary(messages: &[ChatMessage]) -> String {
    let Some(first) = messages
        .iter()
        .find(|m| m.role == crate::models::ChatRole::User)
    else {
        return "Previous conversation context.".to_string();
    };

    let preview: String = first.content.chars().take(SUMMARY_PREVIEW_CHARS).collect();
    format!(
        "User initially discussed: '{preview}...' ({} messages exchanged)",
        messages.len()
    )
}

/// Decides when to compact and performs the compaction
#[derive(Debug, Clone)]
pub struct ContextEngine {
    model: Option<AgentModel>,
    settings: ContextSection,
    compaction_count: usize,
}

impl ContextEngine {
    pub fn new(model: Option<AgentModel>, settings: ContextSection) -> Self {
        Self {
            model,
            settings,
            compaction_count: 0,
        }
    }

    pub fn compaction_count(&self) -> usize {
        self.compaction_count
    }

    pub fn should_compact(&self, history: &[ChatMessage]) -> bool {
        let total_chars: usize = history.iter().map(|m| m.content.chars().count()).sum();
        total_chars > self.settings.max_context_tokens * CHARS_PER_TOKEN
            || history.len() > self.settings.max_history_messages
    }

    /// Keep the last `max_recent_messages` verbatim and summarize the rest
    pub async fn compact(
        &mut self,
        history: &[ChatMessage],
        current_facts: &ConversationFacts,
    ) -> CompactedContext {
        let keep = self.settings.max_recent_messages;
        if history.len() <= keep {
            return CompactedContext {
                summary: String::new(),
                recent_messages: history.to_vec(),
                extracted_facts: current_facts.clone(),
                original_length: history.len(),
                compacted_length: history.len(),
            };
        }

        let (older, recent) = history.split_at(history.len() - keep);
        let summary = self.summarize(older).await;
        let extracted_facts = extract_facts(older, current_facts);

        self.compaction_count += 1;
        metrics().context_compacted();
        info!(
            from = history.len(),
            to = recent.len(),
            compaction = self.compaction_count,
            "Context compacted"
        );

        CompactedContext {
            summary,
            recent_messages: recent.to_vec(),
            extracted_facts,
            original_length: history.len(),
            compacted_length: recent.len(),
        }
    }

    async fn summarize(&self, messages: &[ChatMessage]) -> String {
        if messages.is_empty() {
            return String::new();
        }

        if let Some(model) = &self.model {
            let conversation = messages
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str(), m.content))
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = format!(
                "Summarize this health conversation in 2-3 sentences.\n\
                 Focus on: What issue was discussed, what data was collected, what advice was given.\n\n\
                 Conversation:\n{conversation}\n\nSummary:"
            );
            match model.generate_text(prompt).await {
                Ok(summary) => return summary,
                Err(e) => warn!(error = %e, "LLM summarization failed"),
            }
        }

        fallback_summary(messages)
    }

    /// Summary and known facts of the compacted turns, if there are any
    pub fn summary_header(compacted: &CompactedContext) -> Option<String> {
        let mut parts = Vec::new();
        if !compacted.summary.is_empty() {
            parts.push(format!("[Previous conversation summary: {}]", compacted.summary));
        }
        if !compacted.extracted_facts.is_empty() {
            parts.push(format!("[Known facts: {}]", compacted.extracted_facts));
        }
        (!parts.is_empty()).then(|| parts.join("\n"))
    }

    /// Prompt-ready text: summary, known facts, then the recent messages
    pub fn build_prompt_context(compacted: &CompactedContext) -> String {
        let mut parts: Vec<String> = Self::summary_header(compacted).into_iter().collect();
        parts.extend(
            compacted
                .recent_messages
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str(), m.content)),
        );
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlmProvider;
    use std::sync::Arc;

    fn settings(max_recent: usize, max_history: usize) -> ContextSection {
        ContextSection {
            max_context_tokens: 8000,
            max_recent_messages: max_recent,
            max_history_messages: max_history,
        }
    }

    fn history(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("user message {i}"))
                } else {
                    ChatMessage::model(format!("reply {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn test_should_compact_by_count_and_size() {
        let engine = ContextEngine::new(None, settings(6, 12));
        assert!(!engine.should_compact(&history(12)));
        assert!(engine.should_compact(&history(13)));

        let tiny = ContextEngine::new(
            None,
            ContextSection {
                max_context_tokens: 2,
                ..settings(6, 12)
            },
        );
        assert!(tiny.should_compact(&[ChatMessage::user("more than eight chars")]));
    }

    #[test]
    fn test_extract_facts() {
        let messages = vec![
            ChatMessage::user("I got 5.5 hours of sleep"),
            ChatMessage::user("my stress is about 7/10 and I feel down"),
        ];
        let facts = extract_facts(&messages, &ConversationFacts::default());
        assert_eq!(facts.mentioned_sleep, Some(5.5));
        assert_eq!(facts.mentioned_stress, Some(7));
        assert_eq!(facts.mood_indicator, Some(MoodIndicator::Negative));
        assert_eq!(
            facts.to_string(),
            "mentioned_sleep: 5.5, mentioned_stress: 7, mood_indicator: negative"
        );
    }

    #[test]
    fn test_extract_facts_keeps_existing() {
        let existing = ConversationFacts {
            mentioned_sleep: Some(8.0),
            ..Default::default()
        };
        let facts = extract_facts(&[ChatMessage::user("feeling great")], &existing);
        assert_eq!(facts.mentioned_sleep, Some(8.0));
        assert_eq!(facts.mood_indicator, Some(MoodIndicator::Positive));
    }

    #[test]
    fn test_fallback_summary() {
        assert_eq!(
            fallback_summary(&[ChatMessage::model("hello")]),
            "Previous conversation context."
        );
        assert_eq!(
            fallback_summary(&history(4)),
            "User initially discussed: 'user message 0...' (4 messages exchanged)"
        );
    }

    #[tokio::test]
    async fn test_short_history_is_untouched() {
        let mut engine = ContextEngine::new(None, settings(6, 12));
        let compacted = engine.compact(&history(4), &ConversationFacts::default()).await;
        assert!(compacted.summary.is_empty());
        assert_eq!(compacted.compacted_length, 4);
        assert_eq!(engine.compaction_count(), 0);
    }

    #[tokio::test]
    async fn test_compaction_keeps_recent_and_summarizes() {
        let model = AgentModel::new(
            Arc::new(MockLlmProvider::single_response("User is tired and stressed.")),
            "mock-model",
        );
        let mut engine = ContextEngine::new(Some(model), settings(4, 12));
        let history = history(14);

        let compacted = engine.compact(&history, &ConversationFacts::default()).await;

        assert_eq!(compacted.original_length, 14);
        assert_eq!(compacted.compacted_length, 4);
        assert_eq!(compacted.recent_messages, history[10..].to_vec());
        assert_eq!(compacted.summary, "User is tired and stressed.");
        assert_eq!(engine.compaction_count(), 1);

        let prompt = ContextEngine::build_prompt_context(&compacted);
        assert!(prompt.starts_with("[Previous conversation summary: User is tired and stressed.]"));
        assert!(prompt.ends_with("model: reply 13"));
    }

    #[tokio::test]
    async fn test_failed_summary_uses_fallback() {
        let model = AgentModel::new(Arc::new(MockLlmProvider::with_failure()), "mock-model");
        let mut engine = ContextEngine::new(Some(model), settings(2, 12));

        let compacted = engine.compact(&history(5), &ConversationFacts::default()).await;

        assert_eq!(
            compacted.summary,
            "User initially discussed: 'user message 0...' (3 messages exchanged)"
        );
    }
}

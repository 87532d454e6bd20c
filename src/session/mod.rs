//! Session persistence and pause/resume checkpoints
//!
//! A [`Session`] is the saved form of one conversation. Checkpoints snapshot
//! the flow state so a conversation can be rolled back and resumed later.

pub mod store;

pub use store::SessionStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{
    ChatMessage, ConversationState, DailyCheckIn, IssueType, JourneyMode, Phase, UserProfile,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("No session owns checkpoint {0}")]
    OrphanCheckpoint(String),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode session data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A user's conversation with its full flow state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub journey_mode: Option<JourneyMode>,
    #[serde(default)]
    pub issue_type: Option<IssueType>,
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default)]
    pub checkin: DailyCheckIn,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Checkpoint ids, oldest first
    #[serde(default)]
    pub checkpoints: Vec<String>,
    #[serde(default)]
    pub context_summary: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
            phase: Phase::default(),
            journey_mode: None,
            issue_type: None,
            profile: UserProfile::default(),
            checkin: DailyCheckIn::default(),
            history: Vec::new(),
            checkpoints: Vec::new(),
            context_summary: None,
            metadata: HashMap::new(),
        }
    }

    /// Copy the live conversation into the session
    pub fn capture(&mut self, state: &ConversationState) {
        self.phase = state.phase;
        self.journey_mode = state.journey_mode;
        self.issue_type = state.issue_type;
        self.profile = state.profile.clone();
        self.checkin = state.current_checkin.clone();
        self.history = state.history.clone();
    }

    /// Rebuild the live conversation from the session
    pub fn to_state(&self) -> ConversationState {
        ConversationState {
            history: self.history.clone(),
            profile: self.profile.clone(),
            current_checkin: self.checkin.clone(),
            phase: self.phase,
            journey_mode: self.journey_mode,
            issue_type: self.issue_type,
        }
    }
}

/// Frozen flow state a session can be rolled back to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    pub checkpoint_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub phase: Phase,
    #[serde(default)]
    pub journey_mode: Option<JourneyMode>,
    pub issue_type: Option<IssueType>,
    pub collected_data: DailyCheckIn,
    #[serde(default)]
    pub profile: UserProfile,
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub context_summary: String,
}

impl SessionCheckpoint {
    pub(crate) fn of(checkpoint_id: String, session: &Session, context_summary: &str) -> Self {
        Self {
            checkpoint_id,
            session_id: session.session_id.clone(),
            created_at: Utc::now(),
            phase: session.phase,
            journey_mode: session.journey_mode,
            issue_type: session.issue_type,
            collected_data: session.checkin.clone(),
            profile: session.profile.clone(),
            history: session.history.clone(),
            context_summary: context_summary.to_string(),
        }
    }

    pub(crate) fn restore_into(&self, session: &mut Session) {
        session.phase = self.phase;
        session.journey_mode = self.journey_mode;
        session.issue_type = self.issue_type;
        session.checkin = self.collected_data.clone();
        session.profile = self.profile.clone();
        session.history = self.history.clone();
        session.context_summary =
            (!self.context_summary.is_empty()).then(|| self.context_summary.clone());
    }
}

//! Agent cards and the in-process registry
//!
//! Each pipeline agent publishes a card describing what it can do. The
//! registry is the lookup table used by the CLI `agents` command and by
//! anything that needs to find the agent behind a skill.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// A single capability advertised by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub name: String,
    pub description: String,
}

impl AgentSkill {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Metadata describing an agent's capabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    pub agent_id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub skills: Vec<AgentSkill>,
    pub supported_task_types: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AgentCard {
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            description: description.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            skills: Vec::new(),
            supported_task_types: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_skill(mut self, name: &str, description: &str) -> Self {
        self.skills.push(AgentSkill::new(name, description));
        self
    }

    pub fn with_task_types(mut self, task_types: &[&str]) -> Self {
        self.supported_task_types
            .extend(task_types.iter().map(|t| t.to_string()));
        self
    }

    pub fn has_skill(&self, skill_name: &str) -> bool {
        self.skills.iter().any(|s| s.name == skill_name)
    }

    pub fn can_handle(&self, task_type: &str) -> bool {
        self.supported_task_types.iter().any(|t| t == task_type)
    }
}

/// Thread-safe registry of agent cards, kept in registration order
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<Vec<AgentCard>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a card, replacing any card with the same id in place
    pub fn register(&self, card: AgentCard) {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        match agents.iter_mut().find(|a| a.agent_id == card.agent_id) {
            Some(existing) => {
                debug!(agent_id = %card.agent_id, "Updated agent card");
                *existing = card;
            }
            None => {
                info!(agent_id = %card.agent_id, "Registered agent '{}'", card.name);
                agents.push(card);
            }
        }
    }

    /// Remove a card; returns whether it was present
    pub fn unregister(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        let before = agents.len();
        agents.retain(|a| a.agent_id != agent_id);
        before != agents.len()
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentCard> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.agent_id == agent_id)
            .cloned()
    }

    pub fn list(&self) -> Vec<AgentCard> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn find_by_skill(&self, skill_name: &str) -> Vec<AgentCard> {
        self.filter(|card| card.has_skill(skill_name))
    }

    pub fn find_by_task_type(&self, task_type: &str) -> Vec<AgentCard> {
        self.filter(|card| card.can_handle(task_type))
    }

    pub fn len(&self) -> usize {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn filter(&self, predicate: impl Fn(&AgentCard) -> bool) -> Vec<AgentCard> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|card| predicate(card))
            .cloned()
            .collect()
    }
}

//! JSON-file session store
//!
//! Sessions live in memory and, when a storage directory is configured, are
//! mirrored to `{dir}/{session_id}.json`. Checkpoints go to
//! `{dir}/{checkpoint_id}.checkpoint.json`. Everything on disk is loaded
//! when the store opens; unreadable files are skipped with a warning.

use chrono::{Local, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{Session, SessionCheckpoint, SessionError};
use crate::config::SessionSection;
use crate::observability::metrics;

const CHECKPOINT_SUFFIX: &str = ".checkpoint.json";

#[derive(Debug, Default)]
pub struct SessionStore {
    dir: Option<PathBuf>,
    sessions: HashMap<String, Session>,
    checkpoints: HashMap<String, SessionCheckpoint>,
}

impl SessionStore {
    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (creating if needed) a storage directory and load its contents
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SessionError::io(&dir, e))?;

        let mut store = Self {
            dir: Some(dir.clone()),
            ..Default::default()
        };

        let entries = fs::read_dir(&dir).map_err(|e| SessionError::io(&dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(CHECKPOINT_SUFFIX) {
                match read_json::<SessionCheckpoint>(&path) {
                    Ok(cp) => {
                        store.checkpoints.insert(cp.checkpoint_id.clone(), cp);
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to load checkpoint"),
                }
            } else if name.ends_with(".json") {
                match read_json::<Session>(&path) {
                    Ok(session) => {
                        store.sessions.insert(session.session_id.clone(), session);
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to load session"),
                }
            }
        }

        info!(
            sessions = store.sessions.len(),
            checkpoints = store.checkpoints.len(),
            dir = %dir.display(),
            "Loaded session store"
        );
        Ok(store)
    }

    pub fn from_config(config: &SessionSection) -> Result<Self, SessionError> {
        if config.persist {
            Self::open(&config.storage_dir)
        } else {
            Ok(Self::in_memory())
        }
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// New session with an id of the form `session_{user}_{YYYYmmdd_HHMMSS}`
    pub fn create(&mut self, user_id: &str) -> Result<Session, SessionError> {
        let base = format!(
            "session_{}_{}",
            sanitize_id(user_id),
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let session_id = unique_id(&base, |id| self.sessions.contains_key(id));
        self.create_with_id(user_id, &session_id)
    }

    /// New session under an explicit id. Characters outside `[A-Za-z0-9_-]` become `-`.
    pub fn create_with_id(&mut self, user_id: &str, session_id: &str) -> Result<Session, SessionError> {
        let session_id = sanitize_id(session_id);
        let session = Session::new(&session_id, user_id);
        self.save_session(&session)?;
        self.sessions
            .insert(session.session_id.clone(), session.clone());

        metrics().session_created();
        info!(%session_id, user_id, "Created session");
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Store the new state of a session, stamping `updated_at`
    pub fn update(&mut self, session: &mut Session) -> Result<(), SessionError> {
        session.updated_at = Utc::now();
        self.save_session(session)?;
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    /// Remove a session and its checkpoints. Returns false if it did not exist.
    pub fn delete(&mut self, session_id: &str) -> Result<bool, SessionError> {
        let Some(session) = self.sessions.remove(session_id) else {
            return Ok(false);
        };

        for checkpoint_id in &session.checkpoints {
            self.checkpoints.remove(checkpoint_id);
            self.remove_file(&format!("{checkpoint_id}{CHECKPOINT_SUFFIX}"))?;
        }
        self.remove_file(&format!("{session_id}.json"))?;

        info!(session_id, "Deleted session");
        Ok(true)
    }

    /// Sessions oldest first, optionally only those of one user
    pub fn list(&self, user_id: Option<&str>) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self
            .sessions
            .values()
            .filter(|s| user_id.map_or(true, |u| s.user_id == u))
            .collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions
    }

    /// Snapshot a session's flow state under `cp_{session_id}_{HHMMSS}`
    pub fn create_checkpoint(
        &mut self,
        session_id: &str,
        context_summary: &str,
    ) -> Result<SessionCheckpoint, SessionError> {
        let mut session = self
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let base = format!("cp_{session_id}_{}", Local::now().format("%H%M%S"));
        let checkpoint_id = unique_id(&base, |id| self.checkpoints.contains_key(id));
        let checkpoint = SessionCheckpoint::of(checkpoint_id.clone(), &session, context_summary);

        self.save_checkpoint(&checkpoint)?;
        self.checkpoints
            .insert(checkpoint_id.clone(), checkpoint.clone());
        session.checkpoints.push(checkpoint_id.clone());
        self.update(&mut session)?;

        info!(checkpoint_id, session_id, "Created checkpoint");
        Ok(checkpoint)
    }

    /// Roll the owning session back to a checkpoint and return it
    pub fn resume_from_checkpoint(&mut self, checkpoint_id: &str) -> Result<Session, SessionError> {
        let checkpoint = match self.checkpoints.get(checkpoint_id) {
            Some(cp) => cp.clone(),
            None => self
                .load_checkpoint(checkpoint_id)?
                .ok_or_else(|| SessionError::CheckpointNotFound(checkpoint_id.to_string()))?,
        };

        let owner = self
            .sessions
            .values()
            .find(|s| s.checkpoints.iter().any(|id| id == checkpoint_id))
            .or_else(|| self.sessions.get(&checkpoint.session_id))
            .cloned();
        let Some(mut session) = owner else {
            return Err(SessionError::OrphanCheckpoint(checkpoint_id.to_string()));
        };

        checkpoint.restore_into(&mut session);
        self.update(&mut session)?;
        info!(session_id = %session.session_id, checkpoint_id, "Resumed session from checkpoint");
        Ok(session)
    }

    pub fn get_latest_checkpoint(&self, session_id: &str) -> Option<&SessionCheckpoint> {
        self.sessions
            .get(session_id)?
            .checkpoints
            .last()
            .and_then(|id| self.checkpoints.get(id))
    }

    fn save_session(&self, session: &Session) -> Result<(), SessionError> {
        self.write_file(&format!("{}.json", session.session_id), session)
    }

    fn save_checkpoint(&self, checkpoint: &SessionCheckpoint) -> Result<(), SessionError> {
        self.write_file(
            &format!("{}{CHECKPOINT_SUFFIX}", checkpoint.checkpoint_id),
            checkpoint,
        )
    }

    fn load_checkpoint(&self, checkpoint_id: &str) -> Result<Option<SessionCheckpoint>, SessionError> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let path = dir.join(format!("{}{CHECKPOINT_SUFFIX}", sanitize_id(checkpoint_id)));
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn write_file<T: Serialize>(&self, name: &str, value: &T) -> Result<(), SessionError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let path = dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|e| SessionError::io(&path, e))?;
        debug!(path = %path.display(), "Saved");
        Ok(())
    }

    fn remove_file(&self, name: &str) -> Result<(), SessionError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let path = dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::io(&path, e)),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SessionError> {
    let content = fs::read_to_string(path).map_err(|e| SessionError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Keep ids safe to use as file names
pub(crate) fn sanitize_id(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

/// `base`, or `base_2`, `base_3`... if taken
fn unique_id(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}_{n}"))
        .find(|id| !taken(id))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, Phase};
    use tempfile::TempDir;

    #[test]
    fn test_create_uses_id_format() {
        let mut store = SessionStore::in_memory();
        let session = store.create("asha").unwrap();
        assert!(session.session_id.starts_with("session_asha_"));
        assert_eq!(session.session_id.len(), "session_asha_".len() + 15);
        assert!(store.get(&session.session_id).is_some());
    }

    #[test]
    fn test_colliding_ids_get_counter() {
        let mut store = SessionStore::in_memory();
        let first = store.create("u").unwrap();
        let second = store.create("u").unwrap();
        let third = store.create("u").unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_ne!(second.session_id, third.session_id);
        assert_eq!(store.list(Some("u")).len(), 3);
    }

    #[test]
    fn test_unique_id_and_sanitize() {
        assert_eq!(unique_id("a", |_| false), "a");
        assert_eq!(unique_id("a", |id| id == "a" || id == "a_2"), "a_3");
        assert_eq!(sanitize_id("jo/../x"), "jo----x");
        assert_eq!(sanitize_id(""), "anonymous");
    }

    #[test]
    fn test_list_filters_by_user() {
        let mut store = SessionStore::in_memory();
        store.create_with_id("a", "s1").unwrap();
        store.create_with_id("b", "s2").unwrap();
        store.create_with_id("a", "s3").unwrap();

        let ids: Vec<&str> = store
            .list(Some("a"))
            .iter()
            .map(|s| s.session_id.as_str())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"s1") && ids.contains(&"s3"));
        assert_eq!(store.list(None).len(), 3);
    }

    #[test]
    fn test_checkpoint_and_resume() {
        let mut store = SessionStore::in_memory();
        let mut session = store.create_with_id("u", "s1").unwrap();
        session.history.push(ChatMessage::user("I slept 5 hours"));
        session.checkin.sleep_hours = Some(5.0);
        store.update(&mut session).unwrap();

        let checkpoint = store.create_checkpoint("s1", "early summary").unwrap();
        assert!(checkpoint.checkpoint_id.starts_with("cp_s1_"));
        assert_eq!(
            store.get_latest_checkpoint("s1").map(|c| c.checkpoint_id.as_str()),
            Some(checkpoint.checkpoint_id.as_str())
        );

        let mut session = store.get("s1").cloned().unwrap();
        session.history.push(ChatMessage::user("more"));
        session.phase = Phase::Analysis;
        store.update(&mut session).unwrap();

        let resumed = store.resume_from_checkpoint(&checkpoint.checkpoint_id).unwrap();
        assert_eq!(resumed.history.len(), 1);
        assert_eq!(resumed.phase, Phase::Intake);
        assert_eq!(resumed.checkpoints, vec![checkpoint.checkpoint_id.clone()]);
        assert_eq!(store.get("s1").unwrap().history.len(), 1);
    }

    #[test]
    fn test_missing_targets_are_errors() {
        let mut store = SessionStore::in_memory();
        assert!(matches!(
            store.create_checkpoint("nope", ""),
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            store.resume_from_checkpoint("cp_nope_000000"),
            Err(SessionError::CheckpointNotFound(_))
        ));
        assert!(store.get_latest_checkpoint("nope").is_none());
        assert!(!store.delete("nope").unwrap());
    }

    #[test]
    fn test_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let checkpoint_id = {
            let mut store = SessionStore::open(dir.path()).unwrap();
            let mut session = store.create_with_id("u", "s1").unwrap();
            session.checkin.water_glasses = Some(6);
            store.update(&mut session).unwrap();
            store.create_checkpoint("s1", "").unwrap().checkpoint_id
        };

        assert!(dir.path().join("s1.json").exists());
        assert!(dir
            .path()
            .join(format!("{checkpoint_id}.checkpoint.json"))
            .exists());

        let store = SessionStore::open(dir.path()).unwrap();
        assert_eq!(store.get("s1").unwrap().checkin.water_glasses, Some(6));
        assert!(store.get_latest_checkpoint("s1").is_some());
    }

    #[test]
    fn test_delete_removes_files() {
        let dir = TempDir::new().unwrap();
        let mut store = SessionStore::open(dir.path()).unwrap();
        store.create_with_id("u", "s1").unwrap();
        let cp = store.create_checkpoint("s1", "").unwrap();

        assert!(store.delete("s1").unwrap());

        assert!(!dir.path().join("s1.json").exists());
        assert!(!dir
            .path()
            .join(format!("{}.checkpoint.json", cp.checkpoint_id))
            .exists());
        assert!(store.get("s1").is_none());
    }

    #[test]
    fn test_corrupt_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let store = SessionStore::open(dir.path()).unwrap();
        assert!(store.list(None).is_empty());
    }
}

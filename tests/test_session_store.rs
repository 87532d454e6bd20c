//! Session persistence tests against a real directory

use nirava::models::{ChatMessage, Phase};
use nirava::session::{SessionError, SessionStore};
use tempfile::TempDir;

#[test]
fn test_sessions_survive_reopening_the_store() {
    let dir = TempDir::new().unwrap();

    let session_id = {
        let mut store = SessionStore::open(dir.path()).unwrap();
        let mut session = store.create("asha").unwrap();
        session.history.push(ChatMessage::user("I can't sleep"));
        session.checkin.sleep_hours = Some(4.5);
        store.update(&mut session).unwrap();
        session.session_id
    };

    assert!(dir.path().join(format!("{session_id}.json")).exists());

    let store = SessionStore::open(dir.path()).unwrap();
    let loaded = store.get(&session_id).unwrap();
    assert_eq!(loaded.user_id, "asha");
    assert_eq!(loaded.history.len(), 1);
    assert_eq!(loaded.checkin.sleep_hours, Some(4.5));
}

#[test]
fn test_session_ids_follow_the_naming_scheme() {
    let mut store = SessionStore::in_memory();

    let first = store.create("user 1").unwrap();
    let second = store.create("user 1").unwrap();

    assert!(first.session_id.starts_with("session_user-1_"));
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(store.list(Some("user 1")).len(), 2);
    assert!(store.list(Some("someone else")).is_empty());
}

#[test]
fn test_checkpoint_files_are_written_and_reloaded() {
    let dir = TempDir::new().unwrap();

    let (session_id, checkpoint_id) = {
        let mut store = SessionStore::open(dir.path()).unwrap();
        let mut session = store.create_with_id("asha", "s_checkpoint").unwrap();
        session.phase = Phase::Analysis;
        session.history.push(ChatMessage::user("hello"));
        store.update(&mut session).unwrap();

        let checkpoint = store.create_checkpoint("s_checkpoint", "talked about sleep").unwrap();
        (session.session_id, checkpoint.checkpoint_id)
    };

    assert!(checkpoint_id.starts_with("cp_s_checkpoint_"));
    assert!(dir
        .path()
        .join(format!("{checkpoint_id}.checkpoint.json"))
        .exists());

    let mut store = SessionStore::open(dir.path()).unwrap();
    let latest = store.get_latest_checkpoint(&session_id).unwrap();
    assert_eq!(latest.checkpoint_id, checkpoint_id);
    assert_eq!(latest.context_summary, "talked about sleep");

    let mut session = store.get(&session_id).cloned().unwrap();
    session.history.push(ChatMessage::model("later reply"));
    session.phase = Phase::Intake;
    store.update(&mut session).unwrap();

    let restored = store.resume_from_checkpoint(&checkpoint_id).unwrap();
    assert_eq!(restored.history.len(), 1);
    assert_eq!(restored.phase, Phase::Analysis);
    assert_eq!(restored.context_summary.as_deref(), Some("talked about sleep"));
}

#[test]
fn test_explicit_ids_stay_inside_the_storage_dir() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("sessions");
    let mut store = SessionStore::open(&dir).unwrap();

    let session = store.create_with_id("asha", "../escape").unwrap();

    assert_eq!(session.session_id, "---escape");
    assert!(dir.join("---escape.json").exists());
    assert!(!root.path().join("escape.json").exists());
    assert!(store.get("---escape").is_some());

    assert!(matches!(
        store.resume_from_checkpoint("../../cp_elsewhere"),
        Err(SessionError::CheckpointNotFound(_))
    ));
}

#[test]
fn test_unknown_ids_are_errors() {
    let mut store = SessionStore::in_memory();

    assert!(matches!(
        store.create_checkpoint("missing", ""),
        Err(SessionError::NotFound(_))
    ));
    assert!(matches!(
        store.resume_from_checkpoint("cp_missing"),
        Err(SessionError::CheckpointNotFound(_))
    ));
    assert!(!store.delete("missing").unwrap());
}

#[test]
fn test_delete_removes_session_and_checkpoint_files() {
    let dir = TempDir::new().unwrap();
    let mut store = SessionStore::open(dir.path()).unwrap();
    store.create_with_id("asha", "s_delete").unwrap();
    let checkpoint = store.create_checkpoint("s_delete", "").unwrap();

    assert!(store.delete("s_delete").unwrap());

    assert!(store.get("s_delete").is_none());
    assert!(!dir.path().join("s_delete.json").exists());
    assert!(!dir
        .path()
        .join(format!("{}.checkpoint.json", checkpoint.checkpoint_id))
        .exists());
}

#[test]
fn test_corrupt_files_are_skipped_on_load() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let store = SessionStore::open(dir.path()).unwrap();

    assert!(store.list(None).is_empty());
    assert_eq!(store.storage_dir(), Some(dir.path()));
}

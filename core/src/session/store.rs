//! Persistent per-session state.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::StateError;

/// Poison record for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub poisoned: bool,
    #[serde(default)]
    pub poison_codes: Vec<String>,
    pub poisoned_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl SessionState {
    pub fn poisoned_with(codes: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            poisoned: true,
            poison_codes: codes,
            poisoned_at: now,
            last_updated: now,
        }
    }
}

/// Session persistence. Atomicity is per session: one writer at a time,
/// readers see a consistent snapshot.
pub trait StateStore: Send + Sync {
    fn get(&self, session_id: &str) -> Result<Option<SessionState>, StateError>;
    fn put(&self, session_id: &str, state: SessionState) -> Result<(), StateError>;
    fn delete(&self, session_id: &str) -> Result<(), StateError>;
    /// Drop every record older than `max_age`; returns how many were
    /// removed.
    fn purge_older_than(&self, max_age: Duration) -> Result<usize, StateError>;
}

/// File-backed store: a single JSON document keyed by session id, written
/// with write-temp-then-rename so readers never observe a torn file. A
/// process-wide mutex serializes writers.
pub struct FileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, SessionState>, StateError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_all(&self, sessions: &BTreeMap<String, SessionState>) -> Result<(), StateError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut temp, sessions)?;
        temp.flush()?;
        temp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get(&self, session_id: &str) -> Result<Option<SessionState>, StateError> {
        let _guard = self.lock.lock().expect("state lock poisoned");
        Ok(self.read_all()?.remove(session_id))
    }

    fn put(&self, session_id: &str, state: SessionState) -> Result<(), StateError> {
        let _guard = self.lock.lock().expect("state lock poisoned");
        let mut sessions = self.read_all()?;
        sessions.insert(session_id.to_string(), state);
        self.write_all(&sessions)
    }

    fn delete(&self, session_id: &str) -> Result<(), StateError> {
        let _guard = self.lock.lock().expect("state lock poisoned");
        let mut sessions = self.read_all()?;
        if sessions.remove(session_id).is_some() {
            self.write_all(&sessions)?;
        }
        Ok(())
    }

    fn purge_older_than(&self, max_age: Duration) -> Result<usize, StateError> {
        let _guard = self.lock.lock().expect("state lock poisoned");
        let mut sessions = self.read_all()?;
        let cutoff = Utc::now() - max_age;
        let before = sessions.len();
        sessions.retain(|_, state| state.poisoned_at > cutoff);
        let removed = before - sessions.len();
        if removed > 0 {
            self.write_all(&sessions)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn store(dir: &TempDir) -> FileStateStore {
        FileStateStore::new(dir.path().join("session_state.json"))
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.get("s1").unwrap(), None);
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let state = SessionState::poisoned_with(vec!["GIT010".into()], Utc::now());
        store.put("s1", state.clone()).unwrap();
        assert_eq!(store.get("s1").unwrap(), Some(state));
        assert_eq!(store.get("s2").unwrap(), None);
    }

    #[test]
    fn delete_removes_only_the_named_session() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let now = Utc::now();
        store
            .put("a", SessionState::poisoned_with(vec!["GIT010".into()], now))
            .unwrap();
        store
            .put("b", SessionState::poisoned_with(vec!["SEC999".into()], now))
            .unwrap();

        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.get("b").unwrap().is_some());

        // Deleting an absent session is a no-op.
        store.delete("a").unwrap();
    }

    #[test]
    fn purge_drops_only_stale_sessions() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let now = Utc::now();
        store
            .put(
                "old",
                SessionState::poisoned_with(vec!["GIT010".into()], now - Duration::hours(48)),
            )
            .unwrap();
        store
            .put("new", SessionState::poisoned_with(vec!["GIT010".into()], now))
            .unwrap();

        let removed = store.purge_older_than(Duration::hours(24)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get("old").unwrap(), None);
        assert!(store.get("new").unwrap().is_some());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session_state.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileStateStore::new(path);
        assert!(matches!(store.get("s1"), Err(StateError::Corrupt(_))));
    }
}

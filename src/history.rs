//! Per-user conversation history stored as one JSON file per key

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex};

use anyhow::{Context, Error, Result, bail};
use regex::Regex;
use tokio::sync::OwnedMutexGuard;

use crate::openai::Message;

static USER_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("Invalid user key regex"));

/// User keys name files on disk so only a conservative set of
/// characters is allowed.
pub fn is_valid_user_key(user_key: &str) -> bool {
    USER_KEY_RE.is_match(user_key)
}

pub struct HistoryStore {
    data_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl HistoryStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        Ok(Self {
            data_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn path(&self, user_key: &str) -> Result<PathBuf, Error> {
        if !is_valid_user_key(user_key) {
            bail!("Invalid user key: {:?}", user_key);
        }
        Ok(self.data_dir.join(format!("{}.json", user_key)))
    }

    /// Serializes access to a single user's history. Hold the guard
    /// for the whole load, modify, save cycle.
    pub async fn lock(&self, user_key: &str) -> HistoryGuard<'_> {
        let key_lock = {
            // Ignoring any previous panics, the map is still usable
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(user_key.to_string()).or_default())
        };
        let guard = key_lock.lock_owned().await;
        HistoryGuard {
            store: self,
            user_key: user_key.to_string(),
            guard: Some(guard),
        }
    }

    /// Load the history for a user or an empty history if there is none yet
    pub async fn load(&self, user_key: &str) -> Result<Vec<Message>, Error> {
        let path = self.path(user_key)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::from(e).context(format!("Failed to read {}", path.display())));
            }
        };
        let history = serde_json::from_slice(&data)
            .with_context(|| format!("Corrupt history file {}", path.display()))?;
        Ok(history)
    }

    /// Replace the history for a user. The file is written next to
    /// the target and renamed over it so readers never see a partial
    /// write.
    pub async fn save(&self, user_key: &str, history: &[Message]) -> Result<(), Error> {
        let path = self.path(user_key)?;
        let tmp_path = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(history)?;
        tokio::fs::write(&tmp_path, data)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        tracing::debug!("Saved {} messages to {}", history.len(), path.display());
        Ok(())
    }
}

/// Holds a user's history lock. The lock entry is removed from the
/// store once nobody holds or waits for it.
pub struct HistoryGuard<'a> {
    store: &'a HistoryStore,
    user_key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HistoryGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only other reference
        drop(self.guard.take());
        let mut locks = self.store.locks.lock().unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(&self.user_key)
            .is_some_and(|key_lock| Arc::strong_count(key_lock) == 1);
        if idle {
            locks.remove(&self.user_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::openai::Role;

    #[test]
    fn it_validates_user_keys() {
        assert!(is_valid_user_key("user_123-abc"));
        assert!(!is_valid_user_key(""));
        assert!(!is_valid_user_key("../etc/passwd"));
        assert!(!is_valid_user_key("a/b"));
        assert!(!is_valid_user_key("has space"));
        assert!(!is_valid_user_key(&"x".repeat(129)));
    }

    #[tokio::test]
    async fn it_loads_an_empty_history_for_a_new_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        assert!(store.load("new-user").await.unwrap().is_empty());
        assert!(!dir.path().join("new-user.json").exists());
    }

    #[tokio::test]
    async fn it_round_trips_history_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("data")).unwrap();
        let history = vec![
            Message::new(Role::User, "Hi"),
            Message::new(Role::Assistant, "Hello! How can I help?"),
            Message::new_tool_call_response("{\"success\":true}", "call_1"),
        ];

        store.save("user-1", &history).await.unwrap();

        assert_eq!(store.load("user-1").await.unwrap(), history);
        assert!(!dir.path().join("data/user-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn it_refuses_invalid_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        assert!(store.load("../escape").await.is_err());
        assert!(store.save("../escape", &[]).await.is_err());
    }

    #[tokio::test]
    async fn it_errors_on_a_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("user-1.json"), "[{").unwrap();
        assert!(store.load("user-1").await.is_err());
    }

    #[tokio::test]
    async fn it_serializes_access_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        let guard = store.lock("user-1").await;
        // Other keys are not blocked
        let _other = store.lock("user-2").await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), store.lock("user-1")).await;
        assert!(blocked.is_err());

        drop(guard);
        let acquired = tokio::time::timeout(Duration::from_millis(50), store.lock("user-1")).await;
        assert!(acquired.is_ok());
    }

    fn lock_count(store: &HistoryStore) -> usize {
        store.locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn it_forgets_locks_nobody_holds() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        for i in 0..10 {
            let _guard = store.lock(&format!("user-{}", i)).await;
        }
        assert_eq!(lock_count(&store), 0);

        // A waiter keeps the entry alive after the holder releases it
        let guard = store.lock("user-1").await;
        let waiter = store.lock("user-1");
        tokio::pin!(waiter);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), &mut waiter)
                .await
                .is_err()
        );
        drop(guard);
        assert_eq!(lock_count(&store), 1);

        let second = waiter.await;
        assert_eq!(lock_count(&store), 1);
        drop(second);
        assert_eq!(lock_count(&store), 0);
    }
}

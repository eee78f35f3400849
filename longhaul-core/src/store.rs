//! Session store: one pretty-printed JSON document per session.
//!
//! Directory structure:
//! ```text
//! analysis_sessions/
//! ├── 20241101_192023.json
//! ├── 20241101_192023_2.json   (second session created in the same second)
//! └── 20241102_080000.json
//! ```
//!
//! Every write lands in a temporary file in the same directory first and is
//! then moved into place, so readers only ever observe complete documents.
//! Appends to one session are serialized by an in-process lock keyed by
//! session id; separate processes sharing a directory are not coordinated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::types::{now_local, Iteration, Session};

/// `strftime` pattern for new session ids.
pub const SESSION_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

const MAX_ID_ATTEMPTS: u32 = 1000;

/// Returns true if `id` can name a file inside the sessions directory.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Directory-backed session store.
///
/// Cheap to clone; clones share the per-session lock table.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    tmp_counter: AtomicU64,
}

/// Handle on one entry of the lock table.
///
/// Dropping the last outstanding lease removes the entry.
struct SessionLease {
    inner: Arc<StoreInner>,
    session_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut locks = self
            .inner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one here.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.session_id);
        }
    }
}

/// Sort key that puts `<base>_10` after `<base>_2`.
fn creation_key(session_id: &str) -> (&str, u32) {
    match session_id.rsplit_once('_') {
        Some((base, suffix)) if base.contains('_') => match suffix.parse() {
            Ok(n) => (base, n),
            Err(_) => (session_id, 1),
        },
        _ => (session_id, 1),
    }
}

impl SessionStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                dir: dir.into(),
                locks: Mutex::new(HashMap::new()),
                tmp_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Create the store and make sure its directory exists.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        store.ensure_dir().await?;
        Ok(store)
    }

    /// Base directory
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Path of the document for `session_id`
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.inner.dir.join(format!("{}.json", session_id))
    }

    /// Start a new session and return its id.
    ///
    /// The id is the creation time formatted with [`SESSION_ID_FORMAT`]. When a
    /// document with that id already exists, `_2`, `_3`, ... is appended rather
    /// than overwriting it.
    pub async fn create(&self, task: &str, iteration_count: u32) -> Result<String> {
        self.ensure_dir().await?;

        let base_id = Local::now().format(SESSION_ID_FORMAT).to_string();
        let mut session = Session::new(base_id.clone(), task);

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let session_id = if attempt == 1 {
                base_id.clone()
            } else {
                format!("{}_{}", base_id, attempt)
            };
            session.session_id = session_id.clone();

            if self.write_new(&session).await? {
                tracing::info!(
                    session_id = %session_id,
                    iteration_count,
                    task = %task,
                    "Started analysis session"
                );
                return Ok(session_id);
            }
            tracing::debug!(session_id = %session_id, "Session id taken, trying next suffix");
        }

        Err(Error::StoreWrite {
            path: self.path_for(&base_id),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free session id for this second",
            ),
        })
    }

    /// Load a session document.
    pub async fn read(&self, session_id: &str) -> Result<Session> {
        if !is_valid_session_id(session_id) {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }

        let content = match fs::read_to_string(self.path_for(session_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::SessionNotFound(session_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&content)?)
    }

    /// Append one record to a session and persist it.
    ///
    /// The record is stamped with the current time while the session lock is
    /// held, so timestamps never decrease in append order. Returns the
    /// document as written.
    pub async fn append_iteration(
        &self,
        session_id: &str,
        mut record: Iteration,
    ) -> Result<Session> {
        // Unknown ids never reach the lock table.
        if !self.exists(session_id).await? {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }

        let lease = self.lease(session_id);
        let _guard = lease.lock.lock().await;

        let mut session = self.read(session_id).await?;
        record.timestamp = now_local();
        let kind = record.kind;
        session.iterations.push(record);
        self.write_replace(&session).await?;

        tracing::debug!(
            session_id = %session_id,
            kind = %kind,
            iterations = session.iterations.len(),
            "Appended iteration"
        );
        Ok(session)
    }

    /// Returns true if a document exists for `session_id`.
    pub async fn exists(&self, session_id: &str) -> Result<bool> {
        if !is_valid_session_id(session_id) {
            return Ok(false);
        }
        Ok(fs::try_exists(self.path_for(session_id)).await?)
    }

    /// Record operator steering text in the session history.
    pub async fn update_system_prompt(&self, session_id: &str, text: &str) -> Result<Session> {
        tracing::info!(session_id = %session_id, prompt = %text, "Updating system prompt");
        self.append_iteration(session_id, Iteration::system_prompt_update(text))
            .await
    }

    /// Ids of all stored sessions, oldest first.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(self.dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_session_id(stem) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort_by(|a, b| creation_key(a).cmp(&creation_key(b)).then_with(|| a.cmp(b)));
        Ok(ids)
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(self.dir())
            .await
            .map_err(|source| Error::StoreWrite {
                path: self.dir().to_path_buf(),
                source,
            })
    }

    fn lease(&self, session_id: &str) -> SessionLease {
        let mut locks = self
            .inner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(session_id.to_string()).or_default().clone();
        SessionLease {
            inner: Arc::clone(&self.inner),
            session_id: session_id.to_string(),
            lock,
        }
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.inner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Write `session` only if no document with its id exists yet.
    ///
    /// Returns `false` when the id is taken.
    async fn write_new(&self, session: &Session) -> Result<bool> {
        let target = self.path_for(&session.session_id);
        let tmp = self.write_temp(session).await?;

        // hard_link refuses to replace an existing file, which gives
        // create-new semantics for a file that is already complete.
        let linked = match fs::hard_link(&tmp, &target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(source) => Err(Error::StoreWrite {
                path: target.clone(),
                source,
            }),
        };

        if let Err(e) = fs::remove_file(&tmp).await {
            tracing::warn!(path = %tmp.display(), error = %e, "Failed to remove temp file");
        }
        linked
    }

    /// Replace the document for `session` atomically.
    async fn write_replace(&self, session: &Session) -> Result<()> {
        let target = self.path_for(&session.session_id);
        let tmp = self.write_temp(session).await?;

        if let Err(source) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Error::StoreWrite {
                path: target,
                source,
            });
        }
        Ok(())
    }

    async fn write_temp(&self, session: &Session) -> Result<PathBuf> {
        let content = serde_json::to_string_pretty(session)?;
        let n = self.inner.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = self.inner.dir.join(format!(
            ".{}.{}.{}.tmp",
            session.session_id,
            std::process::id(),
            n
        ));

        let write = async {
            let mut file = File::create(&tmp).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await
        };
        if let Err(source) = write.await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Error::StoreWrite { path: tmp, source });
        }
        Ok(tmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IterationKind, STATUS_IN_PROGRESS};
    use tempfile::TempDir;

    #[test]
    fn test_session_id_validation() {
        assert!(is_valid_session_id("20241101_192023"));
        assert!(is_valid_session_id("20241101_192023_2"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("../secrets"));
        assert!(!is_valid_session_id("a/b"));
        assert!(!is_valid_session_id("x.json"));
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions"));

        let id = store.create("X", 5).await.unwrap();
        let session = store.read(&id).await.unwrap();

        assert_eq!(session.session_id, id);
        assert_eq!(session.task, "X");
        assert!(session.iterations.is_empty());
        assert_eq!(session.status, STATUS_IN_PROGRESS);
        assert!(store.path_for(&id).exists());
    }

    #[tokio::test]
    async fn test_read_unknown_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        assert!(matches!(
            store.read("19990101_000000").await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            store.read("../../etc/passwd").await,
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_is_suffix_extension() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let id = store.create("X", 5).await.unwrap();

        store
            .append_iteration(&id, Iteration::analysis("first"))
            .await
            .unwrap();
        let before = store.read(&id).await.unwrap();

        let record = Iteration::analysis("second");
        store.append_iteration(&id, record.clone()).await.unwrap();
        let after = store.read(&id).await.unwrap();

        assert_eq!(after.iterations.len(), before.iterations.len() + 1);
        assert_eq!(after.iterations[..1], before.iterations[..]);
        let last = after.iterations.last().unwrap();
        assert_eq!(last.kind, record.kind);
        assert_eq!(last.content, record.content);
    }

    #[tokio::test]
    async fn test_append_stamps_record_under_lock() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let id = store.create("X", 5).await.unwrap();

        let mut record = Iteration::analysis("late");
        record.timestamp = chrono::NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let before = now_local();

        let session = store.append_iteration(&id, record).await.unwrap();

        let stamped = session.iterations.last().unwrap().timestamp;
        assert!(stamped >= before);
        assert_eq!(store.read(&id).await.unwrap().iterations[0].timestamp, stamped);
    }

    #[tokio::test]
    async fn test_lock_table_does_not_grow() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let id = store.create("X", 5).await.unwrap();

        let long_id = "../".repeat(10_000);
        for i in 0..100 {
            let unknown = format!("19990101_000000_{i}");
            assert!(store.append_iteration(&unknown, Iteration::analysis("x")).await.is_err());
        }
        assert!(store.append_iteration(&long_id, Iteration::analysis("x")).await.is_err());
        assert_eq!(store.lock_table_len(), 0);

        store
            .append_iteration(&id, Iteration::analysis("ok"))
            .await
            .unwrap();
        assert_eq!(store.lock_table_len(), 0);
    }

    #[tokio::test]
    async fn test_update_system_prompt() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let id = store.create("X", 5).await.unwrap();

        let session = store.update_system_prompt(&id, "focus on Y").await.unwrap();

        assert_eq!(session.iterations.len(), 1);
        let last = session.iterations.last().unwrap();
        assert_eq!(last.kind, IterationKind::SystemPromptUpdate);
        assert_eq!(last.content, "focus on Y");
    }

    #[tokio::test]
    async fn test_append_to_unknown_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        let result = store.update_system_prompt("19990101_000000", "hi").await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_second_creates_get_distinct_ids() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(store.create(&format!("task {i}"), 5).await.unwrap());
        }

        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(store.read(id).await.unwrap().task, format!("task {i}"));
        }
    }

    #[tokio::test]
    async fn test_list_ignores_temp_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let id = store.create("X", 5).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join(".abc.1.0.tmp"), "x").unwrap();

        assert_eq!(store.list().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_list_orders_suffixes_numerically() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        for id in [
            "20241101_192023_10",
            "20241102_080000",
            "20241101_192023_2",
            "20241101_192023",
        ] {
            std::fs::write(store.path_for(id), "{}").unwrap();
        }

        assert_eq!(
            store.list().await.unwrap(),
            vec![
                "20241101_192023",
                "20241101_192023_2",
                "20241101_192023_10",
                "20241102_080000",
            ]
        );
    }

    #[tokio::test]
    async fn test_document_is_pretty_printed() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let id = store.create("X", 5).await.unwrap();

        let raw = std::fs::read_to_string(store.path_for(&id)).unwrap();
        assert!(raw.starts_with("{\n  \"session_id\""));
    }
}

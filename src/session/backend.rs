//! Server-side persistence for encoded session records.
//!
//! The cookie only carries a signed session id; the record itself (already
//! signed and optionally encrypted by the codec) lives in a backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use futures_util::future::BoxFuture;

use crate::session::SessionError;

/// Storage for encoded session records keyed by session id.
pub trait SessionBackend: Send + Sync {
    /// Read a record; `Ok(None)` when no record exists for `id`.
    fn load<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<String>, SessionError>>;

    /// Create or overwrite a record.
    fn save<'a>(&'a self, id: &'a str, record: String) -> BoxFuture<'a, Result<(), SessionError>>;

    /// Delete records last written before `cutoff`, returning how many went.
    fn purge_older_than(&self, cutoff: SystemTime) -> BoxFuture<'_, Result<usize, SessionError>>;
}

/// One file per session, named `session_<id>`, in a single directory.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    directory: PathBuf,
}

impl FilesystemBackend {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, SessionError> {
        // Ids come from a verified cookie, but they still end up in a path.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SessionError::InvalidId);
        }
        Ok(self.directory.join(format!("session_{id}")))
    }
}

impl SessionBackend for FilesystemBackend {
    fn load<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<String>, SessionError>> {
        Box::pin(async move {
            let path = self.path_for(id)?;
            match tokio::fs::read_to_string(&path).await {
                Ok(record) => Ok(Some(record)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(SessionError::Io(e)),
            }
        })
    }

    fn save<'a>(&'a self, id: &'a str, record: String) -> BoxFuture<'a, Result<(), SessionError>> {
        Box::pin(async move {
            let path = self.path_for(id)?;
            tokio::fs::write(&path, record).await.map_err(SessionError::Io)
        })
    }

    fn purge_older_than(&self, cutoff: SystemTime) -> BoxFuture<'_, Result<usize, SessionError>> {
        Box::pin(async move {
            let mut entries = tokio::fs::read_dir(&self.directory)
                .await
                .map_err(SessionError::Io)?;
            let mut removed = 0;
            while let Some(entry) = entries.next_entry().await.map_err(SessionError::Io)? {
                let is_session = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with("session_"));
                if !is_session {
                    continue;
                }
                // a file we cannot stat is left for the next sweep
                let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                    continue;
                };
                if modified >= cutoff {
                    continue;
                }
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(SessionError::Io(e)),
                }
            }
            Ok(removed)
        })
    }
}

#[derive(Debug)]
struct MemoryRecord {
    record: String,
    saved_at: SystemTime,
}

/// Process-local backend. Records are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    records: Arc<DashMap<String, MemoryRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SessionBackend for MemoryBackend {
    fn load<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<String>, SessionError>> {
        let record = self.records.get(id).map(|entry| entry.record.clone());
        Box::pin(async move { Ok(record) })
    }

    fn save<'a>(&'a self, id: &'a str, record: String) -> BoxFuture<'a, Result<(), SessionError>> {
        self.records.insert(
            id.to_string(),
            MemoryRecord {
                record,
                saved_at: SystemTime::now(),
            },
        );
        Box::pin(async { Ok(()) })
    }

    fn purge_older_than(&self, cutoff: SystemTime) -> BoxFuture<'_, Result<usize, SessionError>> {
        let before = self.records.len();
        self.records.retain(|_, entry| entry.saved_at >= cutoff);
        let removed = before.saturating_sub(self.records.len());
        Box::pin(async move { Ok(removed) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "uaa-proxy-backend-{tag}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn filesystem_backend_persists_records() {
        let backend = FilesystemBackend::new(scratch_dir("persist"));
        assert!(backend.load("abc123").await.unwrap().is_none());

        backend.save("abc123", "record-1".into()).await.unwrap();
        backend.save("abc123", "record-2".into()).await.unwrap();
        assert_eq!(backend.load("abc123").await.unwrap().as_deref(), Some("record-2"));
        assert!(backend.directory().join("session_abc123").exists());
    }

    #[tokio::test]
    async fn filesystem_backend_rejects_path_like_ids() {
        let backend = FilesystemBackend::new(scratch_dir("ids"));
        for id in ["", "../etc", "a/b", "a.b"] {
            assert!(matches!(backend.load(id).await, Err(SessionError::InvalidId)), "{id}");
        }
    }

    #[tokio::test]
    async fn memory_backend_overwrites() {
        let backend = MemoryBackend::new();
        backend.save("s1", "one".into()).await.unwrap();
        backend.save("s1", "two".into()).await.unwrap();
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.load("s1").await.unwrap().as_deref(), Some("two"));
        assert!(backend.load("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_backend_purges_only_old_records() {
        let backend = MemoryBackend::new();
        for id in ["a", "b", "c"] {
            backend.save(id, id.to_string()).await.unwrap();
        }

        let past = SystemTime::now() - Duration::from_secs(60);
        assert_eq!(backend.purge_older_than(past).await.unwrap(), 0);
        assert_eq!(backend.len(), 3);

        let future = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(backend.purge_older_than(future).await.unwrap(), 3);
        assert!(backend.is_empty());
        assert!(backend.load("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn filesystem_backend_purges_old_session_files() {
        let dir = scratch_dir("purge");
        let backend = FilesystemBackend::new(dir.clone());
        backend.save("old1", "x".into()).await.unwrap();
        backend.save("old2", "y".into()).await.unwrap();
        std::fs::write(dir.join("unrelated.txt"), "keep").unwrap();

        let past = SystemTime::now() - Duration::from_secs(60);
        assert_eq!(backend.purge_older_than(past).await.unwrap(), 0);

        let future = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(backend.purge_older_than(future).await.unwrap(), 2);
        assert!(backend.load("old1").await.unwrap().is_none());
        assert!(dir.join("unrelated.txt").exists());
    }
}

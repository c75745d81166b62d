//! The shared authorization feed.
//!
//! A single scalar slot holding the current access decision. The recognizer
//! writes Grant/Deny; the lock controller reads it and writes Deny back when
//! it relocks. Each written value carries a revision so the controller can
//! tell a fresh Grant from one it already consumed.

use crate::cloud::CloudFeed;
use crate::types::Authorization;
use std::future::Future;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Backend both daemons and the CLI use when none is configured.
pub const DEFAULT_FEED: &str = "file:/run/gatewatch/lock";

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("feed request failed: {0}")]
    Http(String),
    #[error("malformed feed data: {0}")]
    Malformed(String),
    #[error("invalid feed configuration: {0}")]
    Config(String),
    #[error("feed task failed: {0}")]
    Join(String),
}

/// Current value of the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    pub value: Authorization,
    /// Identifies this particular write; `None` for backends (or legacy
    /// writers) that store a bare value.
    pub revision: Option<String>,
}

pub trait AuthorizationFeed: Send + Sync {
    /// Read the slot. `Ok(None)` means it has never been written.
    fn read(&self) -> impl Future<Output = Result<Option<FeedRecord>, FeedError>> + Send;

    /// Overwrite the slot and return the record as stored.
    fn write(&self, value: Authorization) -> impl Future<Output = Result<FeedRecord, FeedError>> + Send;
}

/// In-process slot; clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeed {
    slot: Arc<Mutex<MemorySlot>>,
}

#[derive(Debug, Default)]
struct MemorySlot {
    current: Option<FeedRecord>,
    next_revision: u64,
    writes: Vec<Authorization>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every value written through [`AuthorizationFeed::write`], oldest first.
    pub fn writes(&self) -> Vec<Authorization> {
        self.lock().writes.clone()
    }

    /// Replace the slot directly, bypassing revision assignment.
    pub fn set(&self, record: Option<FeedRecord>) {
        self.lock().current = record;
    }

    pub fn current(&self) -> Option<FeedRecord> {
        self.lock().current.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySlot> {
        // A poisoned slot still holds a valid value.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AuthorizationFeed for MemoryFeed {
    async fn read(&self) -> Result<Option<FeedRecord>, FeedError> {
        Ok(self.current())
    }

    async fn write(&self, value: Authorization) -> Result<FeedRecord, FeedError> {
        let mut slot = self.lock();
        slot.next_revision += 1;
        let record = FeedRecord {
            value,
            revision: Some(slot.next_revision.to_string()),
        };
        slot.current = Some(record.clone());
        slot.writes.push(value);
        Ok(record)
    }
}

/// Slot stored in a file as `<value> <revision>`, replaced atomically.
/// A bare `1`/`0` (no revision) is also accepted.
#[derive(Debug, Clone)]
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(contents: &str) -> Option<FeedRecord> {
        let mut fields = contents.split_whitespace();
        let value = fields.next()?;
        Some(FeedRecord {
            value: Authorization::from_wire(value),
            revision: fields.next().map(str::to_string),
        })
    }
}

impl AuthorizationFeed for FileFeed {
    async fn read(&self) -> Result<Option<FeedRecord>, FeedError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, value: Authorization) -> Result<FeedRecord, FeedError> {
        let revision = format!(
            "{}.{}.{}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            std::process::id(),
            WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let line = format!("{} {revision}\n", value.as_wire());
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, line.as_bytes()))
            .await
            .map_err(|e| FeedError::Join(e.to_string()))??;
        Ok(FeedRecord {
            value,
            revision: Some(revision),
        })
    }
}

/// Write to a uniquely named sibling, then rename it over `path`.
fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new().prefix(".gatewatch-feed").tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Feed backend chosen at runtime.
#[derive(Clone)]
pub enum FeedBackend {
    Memory(MemoryFeed),
    File(FileFeed),
    Cloud(CloudFeed),
}

impl FeedBackend {
    /// Build from a backend spec: `memory`, `file:<path>` or `cloud`.
    /// `cloud` needs a configured client.
    pub fn from_spec(spec: &str, cloud: Option<CloudFeed>) -> Result<Self, FeedError> {
        let spec = spec.trim();
        if spec == "memory" {
            Ok(FeedBackend::Memory(MemoryFeed::new()))
        } else if let Some(path) = spec.strip_prefix("file:") {
            if path.is_empty() {
                return Err(FeedError::Config("file: backend needs a path".into()));
            }
            Ok(FeedBackend::File(FileFeed::new(path)))
        } else if spec == "cloud" {
            cloud
                .map(FeedBackend::Cloud)
                .ok_or_else(|| FeedError::Config("cloud backend needs cloud credentials".into()))
        } else {
            Err(FeedError::Config(format!("unknown feed backend: {spec}")))
        }
    }

    /// Like [`FeedBackend::from_spec`], but refuses `memory`: a daemon or
    /// CLI on its own process cannot share an in-memory slot.
    pub fn shared_from_spec(spec: &str, cloud: Option<CloudFeed>) -> Result<Self, FeedError> {
        match Self::from_spec(spec, cloud)? {
            FeedBackend::Memory(_) => Err(FeedError::Config(format!(
                "memory backend is process-local; use {DEFAULT_FEED} or cloud"
            ))),
            backend => Ok(backend),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FeedBackend::Memory(_) => "memory".into(),
            FeedBackend::File(f) => format!("file:{}", f.path().display()),
            FeedBackend::Cloud(c) => format!("cloud:{}", c.feed_key()),
        }
    }
}

impl AuthorizationFeed for FeedBackend {
    async fn read(&self) -> Result<Option<FeedRecord>, FeedError> {
        match self {
            FeedBackend::Memory(f) => f.read().await,
            FeedBackend::File(f) => f.read().await,
            FeedBackend::Cloud(f) => f.read().await,
        }
    }

    async fn write(&self, value: Authorization) -> Result<FeedRecord, FeedError> {
        match self {
            FeedBackend::Memory(f) => f.write(value).await,
            FeedBackend::File(f) => f.write(value).await,
            FeedBackend::Cloud(f) => f.write(value).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_feed_revisions_advance() {
        let feed = MemoryFeed::new();
        assert_eq!(feed.read().await.unwrap(), None);

        let first = feed.write(Authorization::Grant).await.unwrap();
        let second = feed.write(Authorization::Grant).await.unwrap();
        assert_ne!(first.revision, second.revision);
        assert_eq!(feed.read().await.unwrap(), Some(second));
        assert_eq!(feed.writes(), vec![Authorization::Grant, Authorization::Grant]);
    }

    #[tokio::test]
    async fn test_memory_feed_clones_share_slot() {
        let feed = MemoryFeed::new();
        let other = feed.clone();
        feed.write(Authorization::Deny).await.unwrap();
        assert_eq!(other.read().await.unwrap().unwrap().value, Authorization::Deny);
    }

    #[tokio::test]
    async fn test_file_feed_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let feed = FileFeed::new(dir.path().join("lock"));
        assert_eq!(feed.read().await.unwrap(), None);

        let written = feed.write(Authorization::Grant).await.unwrap();
        let read = feed.read().await.unwrap().unwrap();
        assert_eq!(read, written);
        assert!(read.revision.is_some());
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("lock")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_feed_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = FileFeed::new(dir.path().join("lock"));
        let controller = FileFeed::new(dir.path().join("lock"));

        let mut failed = 0;
        let mut revisions = std::collections::HashSet::new();
        for _ in 0..300 {
            let (a, b) = tokio::join!(
                recognizer.write(Authorization::Grant),
                controller.write(Authorization::Deny)
            );
            for record in [a, b] {
                match record {
                    Ok(r) => assert!(revisions.insert(r.revision.unwrap())),
                    Err(_) => failed += 1,
                }
            }
        }
        assert_eq!(failed, 0);

        let last = controller.read().await.unwrap().unwrap();
        assert!(revisions.contains(last.revision.as_deref().unwrap()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_file_feed_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let feed = FileFeed::new(dir.path().join("run/gatewatch/lock"));
        feed.write(Authorization::Deny).await.unwrap();
        assert_eq!(feed.read().await.unwrap().unwrap().value, Authorization::Deny);
    }

    #[tokio::test]
    async fn test_file_feed_accepts_bare_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        std::fs::write(&path, "1\n").unwrap();
        let record = FileFeed::new(&path).read().await.unwrap().unwrap();
        assert_eq!(record.value, Authorization::Grant);
        assert_eq!(record.revision, None);

        std::fs::write(&path, "").unwrap();
        assert_eq!(FileFeed::new(&path).read().await.unwrap(), None);
    }

    #[test]
    fn test_backend_from_spec() {
        assert!(matches!(FeedBackend::from_spec("memory", None), Ok(FeedBackend::Memory(_))));
        match FeedBackend::from_spec("file:/run/gatewatch/lock", None) {
            Ok(FeedBackend::File(f)) => assert_eq!(f.path(), Path::new("/run/gatewatch/lock")),
            _ => panic!("expected file backend"),
        }
        assert!(matches!(FeedBackend::from_spec("file:", None), Err(FeedError::Config(_))));
        assert!(matches!(FeedBackend::from_spec("cloud", None), Err(FeedError::Config(_))));
        assert!(matches!(FeedBackend::from_spec("mqtt", None), Err(FeedError::Config(_))));
    }

    #[test]
    fn test_default_feed_is_shared() {
        assert!(matches!(
            FeedBackend::shared_from_spec(DEFAULT_FEED, None),
            Ok(FeedBackend::File(_))
        ));
        assert!(matches!(
            FeedBackend::shared_from_spec("memory", None),
            Err(FeedError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_file_backends_share_slot() {
        let dir = tempfile::tempdir().unwrap();
        let spec = format!("file:{}", dir.path().join("lock").display());
        let recognizer = FeedBackend::shared_from_spec(&spec, None).unwrap();
        let controller = FeedBackend::shared_from_spec(&spec, None).unwrap();

        let written = recognizer.write(Authorization::Grant).await.unwrap();
        assert_eq!(controller.read().await.unwrap(), Some(written));
    }
}

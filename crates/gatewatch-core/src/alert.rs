//! Alert dispatch.
//!
//! Turns match results into an authorization write plus notifications, at
//! most once per throttle window. Every collaborator call is bounded by a
//! timeout; failures are logged and never retried, and the throttle advances
//! regardless.

use crate::feed::{AuthorizationFeed, FeedError};
use crate::frame::encode_jpeg;
use crate::throttle::AlertThrottle;
use crate::types::{AuthorizationEvent, Identity, MatchResult};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
const NOTIFY_JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("cloud: {0}")]
    Cloud(#[from] FeedError),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("snapshot I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("webhook failed: {0}")]
    Webhook(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("background task failed: {0}")]
    Join(String),
}

/// Image feed a snapshot is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Known,
    Unknown,
}

impl Channel {
    pub fn feed_key(&self) -> &'static str {
        match self {
            Channel::Known => "known",
            Channel::Unknown => "unknown",
        }
    }

    pub fn for_identity(identity: &Identity) -> Self {
        if identity.is_known() {
            Channel::Known
        } else {
            Channel::Unknown
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, label: &str, image: &RgbImage) -> impl Future<Output = Result<(), AlertError>> + Send;
}

pub trait Uploader: Send + Sync {
    fn upload(&self, channel: Channel, image: &RgbImage) -> impl Future<Output = Result<(), AlertError>> + Send;
}

/// Notification subject and body for a label.
pub fn alert_text(label: &str, known: bool) -> (String, String) {
    let subject = format!("Security Alert: {label}");
    let body = if known {
        format!("{label} was recognized by the security system.")
    } else {
        "An unknown person was detected by the security system.".to_string()
    };
    (subject, body)
}

/// Posts alerts as JSON to a webhook (mail relay, chat bridge, ...).
/// Without a URL the alert is only logged.
#[derive(Clone)]
pub struct WebhookNotifier {
    agent: ureq::Agent,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url,
        }
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, label: &str, image: &RgbImage) -> Result<(), AlertError> {
        let known = label != crate::types::UNKNOWN_LABEL;
        let (subject, body) = alert_text(label, known);

        let Some(url) = self.url.clone() else {
            tracing::info!(%subject, "notification (no webhook configured)");
            return Ok(());
        };

        let jpeg = encode_jpeg(image, NOTIFY_JPEG_QUALITY)?;
        let payload = serde_json::json!({
            "subject": subject,
            "body": body,
            "label": label,
            "image_jpeg_base64": base64::engine::general_purpose::STANDARD.encode(jpeg),
        });
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || agent.post(&url).send_json(payload))
            .await
            .map_err(|e| AlertError::Join(e.to_string()))?
            .map_err(|e| AlertError::Webhook(e.to_string()))?;
        tracing::info!(label, "notification sent");
        Ok(())
    }
}

/// Local directory of unknown-face snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save as `unknown_<unix-seconds>.png`, creating the directory if needed.
    pub fn save(&self, frame: &RgbImage, at: DateTime<Utc>) -> Result<PathBuf, AlertError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("unknown_{}.png", at.timestamp()));
        frame.save(&path)?;
        Ok(path)
    }
}

/// Which collaborator failed during a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Feed,
    Snapshot,
    Notifier,
    Uploader,
}

/// What one dispatch did.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub event: AuthorizationEvent,
    pub snapshot: Option<PathBuf>,
    pub failed: Vec<Collaborator>,
}

pub struct AlertDispatcher<F, N, U> {
    throttle: AlertThrottle,
    feed: F,
    notifier: N,
    uploader: U,
    snapshots: SnapshotStore,
    call_timeout: Duration,
}

impl<F: AuthorizationFeed, N: Notifier, U: Uploader> AlertDispatcher<F, N, U> {
    pub fn new(throttle: AlertThrottle, feed: F, notifier: N, uploader: U, snapshots: SnapshotStore) -> Self {
        Self {
            throttle,
            feed,
            notifier,
            uploader,
            snapshots,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn throttle(&self) -> &AlertThrottle {
        &self.throttle
    }

    /// Evaluate the throttle once per result, in order, and dispatch the
    /// ones it admits.
    pub async fn on_results(&mut self, results: &[MatchResult], frame: &RgbImage) -> Vec<DispatchReport> {
        let mut reports = Vec::new();
        for result in results {
            if !self.throttle.admit(Instant::now()) {
                tracing::debug!(label = %result.identity, "alert suppressed by throttle");
                continue;
            }
            let report = self.dispatch(&result.identity, frame).await;
            self.throttle.record(Instant::now());
            reports.push(report);
        }
        reports
    }

    async fn dispatch(&self, identity: &Identity, frame: &RgbImage) -> DispatchReport {
        let event = AuthorizationEvent::for_identity(identity);
        let mut failed = Vec::new();

        if let Err(e) = bounded(self.call_timeout, "feed write", async {
            self.feed.write(event.decision).await.map_err(AlertError::from)
        })
        .await
        {
            tracing::warn!(error = %e, decision = ?event.decision, "authorization write failed");
            failed.push(Collaborator::Feed);
        }

        let mut snapshot = None;
        if !identity.is_known() {
            let store = self.snapshots.clone();
            let image = frame.clone();
            let at = event.at;
            let saved = bounded(self.call_timeout, "snapshot", async move {
                tokio::task::spawn_blocking(move || store.save(&image, at))
                    .await
                    .map_err(|e| AlertError::Join(e.to_string()))?
            })
            .await;
            match saved {
                Ok(path) => snapshot = Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, dir = %self.snapshots.dir().display(), "snapshot not saved");
                    failed.push(Collaborator::Snapshot);
                }
            }
        }

        if let Err(e) = bounded(self.call_timeout, "notification", self.notifier.notify(&event.label, frame)).await {
            tracing::warn!(error = %e, label = %event.label, "notification failed");
            failed.push(Collaborator::Notifier);
        }

        let channel = Channel::for_identity(identity);
        if let Err(e) = bounded(self.call_timeout, "upload", self.uploader.upload(channel, frame)).await {
            tracing::warn!(error = %e, channel = channel.feed_key(), "upload failed");
            failed.push(Collaborator::Uploader);
        }

        tracing::info!(
            label = %event.label,
            decision = ?event.decision,
            failures = failed.len(),
            "alert dispatched"
        );

        DispatchReport {
            event,
            snapshot,
            failed,
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T, AlertError>>,
) -> Result<T, AlertError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AlertError::Timeout {
            operation,
            after: limit,
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MemoryFeed;
    use crate::throttle::DEFAULT_WINDOW;
    use crate::types::Authorization;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        labels: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        async fn notify(&self, label: &str, _image: &RgbImage) -> Result<(), AlertError> {
            self.labels.lock().unwrap().push(label.to_string());
            if self.fail {
                Err(AlertError::Webhook("smtp down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingUploader {
        channels: Arc<Mutex<Vec<Channel>>>,
        hang: bool,
    }

    impl Uploader for RecordingUploader {
        async fn upload(&self, channel: Channel, _image: &RgbImage) -> Result<(), AlertError> {
            self.channels.lock().unwrap().push(channel);
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn result(label: Option<&str>) -> MatchResult {
        MatchResult {
            identity: label.map_or(Identity::Unknown, |l| Identity::Known(l.into())),
            distance: 0.3,
        }
    }

    fn dispatcher(
        dir: &Path,
        notifier: RecordingNotifier,
        uploader: RecordingUploader,
    ) -> (AlertDispatcher<MemoryFeed, RecordingNotifier, RecordingUploader>, MemoryFeed) {
        let feed = MemoryFeed::new();
        let d = AlertDispatcher::new(
            AlertThrottle::new(DEFAULT_WINDOW),
            feed.clone(),
            notifier,
            uploader,
            SnapshotStore::new(dir.join("unknown_faces")),
        );
        (d, feed)
    }

    #[tokio::test(start_paused = true)]
    async fn test_known_face_grants() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::default();
        let uploader = RecordingUploader::default();
        let (mut d, feed) = dispatcher(dir.path(), notifier.clone(), uploader.clone());

        tokio::time::advance(DEFAULT_WINDOW).await;
        let reports = d.on_results(&[result(Some("alice"))], &RgbImage::new(8, 8)).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].event.decision, Authorization::Grant);
        assert!(reports[0].snapshot.is_none());
        assert!(reports[0].failed.is_empty());
        assert_eq!(feed.writes(), vec![Authorization::Grant]);
        assert_eq!(*notifier.labels.lock().unwrap(), vec!["alice".to_string()]);
        assert_eq!(*uploader.channels.lock().unwrap(), vec![Channel::Known]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_face_denies_and_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = RecordingUploader::default();
        let (mut d, feed) = dispatcher(dir.path(), RecordingNotifier::default(), uploader.clone());

        tokio::time::advance(DEFAULT_WINDOW).await;
        let reports = d.on_results(&[result(None)], &RgbImage::new(8, 8)).await;

        assert_eq!(feed.writes(), vec![Authorization::Deny]);
        let snapshot = reports[0].snapshot.clone().unwrap();
        assert!(snapshot.exists());
        let name = snapshot.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("unknown_") && name.ends_with(".png"), "{name}");
        assert_eq!(*uploader.channels.lock().unwrap(), vec![Channel::Unknown]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_fires_before_first_window() {
        let dir = tempfile::tempdir().unwrap();
        let (mut d, feed) = dispatcher(dir.path(), RecordingNotifier::default(), RecordingUploader::default());
        let reports = d.on_results(&[result(Some("alice"))], &RgbImage::new(8, 8)).await;
        assert!(reports.is_empty());
        assert!(feed.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_shared_across_identities() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::default();
        let (mut d, feed) = dispatcher(dir.path(), notifier.clone(), RecordingUploader::default());
        let frame = RgbImage::new(8, 8);

        tokio::time::advance(DEFAULT_WINDOW).await;
        let first = d
            .on_results(&[result(Some("alice")), result(None), result(Some("bob"))], &frame)
            .await;
        assert_eq!(first.len(), 1);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(d.on_results(&[result(Some("bob"))], &frame).await.is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(d.on_results(&[result(Some("bob"))], &frame).await.len(), 1);

        assert_eq!(feed.writes(), vec![Authorization::Grant, Authorization::Grant]);
        assert_eq!(
            *notifier.labels.lock().unwrap(),
            vec!["alice".to_string(), "bob".to_string()]
        );
        assert_eq!(d.throttle().suppressed(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_still_advance_throttle() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let uploader = RecordingUploader {
            hang: true,
            ..Default::default()
        };
        let (d, feed) = dispatcher(dir.path(), notifier, uploader);
        let mut d = d.with_call_timeout(Duration::from_secs(2));
        let frame = RgbImage::new(8, 8);

        tokio::time::advance(DEFAULT_WINDOW).await;
        let reports = d.on_results(&[result(Some("alice"))], &frame).await;
        assert_eq!(reports[0].failed, vec![Collaborator::Notifier, Collaborator::Uploader]);

        // The hung upload consumed 2s; the window restarts after it.
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(d.on_results(&[result(Some("alice"))], &frame).await.is_empty());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(d.on_results(&[result(Some("alice"))], &frame).await.len(), 1);
        assert_eq!(feed.writes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwritable_snapshot_dir_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("unknown_faces");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let notifier = RecordingNotifier::default();
        let uploader = RecordingUploader::default();
        let (mut d, feed) = dispatcher(dir.path(), notifier.clone(), uploader.clone());

        tokio::time::advance(DEFAULT_WINDOW).await;
        let reports = d.on_results(&[result(None)], &RgbImage::new(8, 8)).await;

        assert_eq!(reports[0].failed, vec![Collaborator::Snapshot]);
        assert!(reports[0].snapshot.is_none());
        assert_eq!(feed.writes(), vec![Authorization::Deny]);
        assert_eq!(notifier.labels.lock().unwrap().len(), 1);
        assert_eq!(*uploader.channels.lock().unwrap(), vec![Channel::Unknown]);
    }

    #[test]
    fn test_alert_text() {
        let (subject, body) = alert_text("alice", true);
        assert_eq!(subject, "Security Alert: alice");
        assert_eq!(body, "alice was recognized by the security system.");
        let (_, body) = alert_text("Unknown", false);
        assert_eq!(body, "An unknown person was detected by the security system.");
    }

    #[test]
    fn test_channel_keys() {
        assert_eq!(Channel::for_identity(&Identity::Unknown).feed_key(), "unknown");
        assert_eq!(Channel::for_identity(&Identity::Known("a".into())).feed_key(), "known");
    }
}

use gatewatch_core::cloud::{CloudClient, CloudFeed, DEFAULT_CLOUD_URL, LOCK_FEED_KEY};
use gatewatch_core::env;
use gatewatch_core::feed::DEFAULT_FEED;
use gatewatch_core::matcher::DEFAULT_TOLERANCE;
use gatewatch_core::sampler::{DEFAULT_DETECTION_SCALE, DEFAULT_PROCESS_EVERY};
use gatewatch_wire::DEFAULT_MAX_FRAME_LEN;
use std::path::PathBuf;
use std::time::Duration;

/// Recognition node configuration, loaded from environment variables.
pub struct Config {
    /// Address the single camera connects to (default: 0.0.0.0:8000).
    pub listen_addr: String,
    /// Directory of labelled reference images; file stem = label.
    pub known_faces_dir: PathBuf,
    /// Where snapshots of unknown faces are written.
    pub snapshot_dir: PathBuf,
    /// Maximum embedding distance accepted as a match (strict). The 0.45
    /// default suits dlib-style embeddings; with the L2-normalised ArcFace
    /// encoder distances span 0 to 2 and a value near 1.0 to 1.2 is typical.
    pub tolerance: f32,
    /// Run detection on one frame in this many.
    pub process_every: usize,
    /// Down-scale factor applied before detection.
    pub detection_scale: f32,
    /// Global alert cooldown.
    pub throttle_window: Duration,
    /// Flip received frames vertically (camera mounted upside down).
    pub flip_vertical: bool,
    pub max_frame_len: usize,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Authorization feed backend: `file:<path>` or `cloud`. Must be reachable
    /// from both daemons; `memory` is rejected at startup.
    pub feed: String,
    pub notify_webhook: Option<String>,
    pub cloud_url: String,
    pub cloud_user: Option<String>,
    pub cloud_key: Option<String>,
    /// Bound on every collaborator call during a dispatch.
    pub call_timeout: Duration,
}

impl Config {
    /// Load configuration from `GATEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            listen_addr: env::string_or("GATEWATCH_LISTEN_ADDR", "0.0.0.0:8000"),
            known_faces_dir: env::string_or("GATEWATCH_KNOWN_FACES_DIR", "known_faces").into(),
            snapshot_dir: env::string_or("GATEWATCH_SNAPSHOT_DIR", "unknown_faces").into(),
            tolerance: env::parse_or("GATEWATCH_TOLERANCE", DEFAULT_TOLERANCE),
            process_every: env::parse_or("GATEWATCH_PROCESS_EVERY", DEFAULT_PROCESS_EVERY),
            detection_scale: env::parse_or("GATEWATCH_DETECTION_SCALE", DEFAULT_DETECTION_SCALE),
            throttle_window: env::secs_or("GATEWATCH_THROTTLE_SECS", 5.0),
            flip_vertical: env::flag("GATEWATCH_FLIP_VERTICAL", false),
            max_frame_len: env::parse_or("GATEWATCH_MAX_FRAME_BYTES", DEFAULT_MAX_FRAME_LEN),
            model_dir: env::string_or("GATEWATCH_MODEL_DIR", "models").into(),
            feed: env::string_or("GATEWATCH_FEED", DEFAULT_FEED),
            notify_webhook: env::optional("GATEWATCH_NOTIFY_WEBHOOK"),
            cloud_url: env::string_or("GATEWATCH_CLOUD_URL", DEFAULT_CLOUD_URL),
            cloud_user: env::optional("GATEWATCH_CLOUD_USER"),
            cloud_key: env::optional("GATEWATCH_CLOUD_KEY"),
            call_timeout: env::secs_or("GATEWATCH_CALL_TIMEOUT_SECS", 10.0),
        }
    }

    /// Cloud client, when both user and key are configured.
    pub fn cloud_client(&self) -> Option<CloudClient> {
        match (&self.cloud_user, &self.cloud_key) {
            (Some(user), Some(key)) => Some(CloudClient::new(&self.cloud_url, user, key, self.call_timeout)),
            _ => None,
        }
    }

    pub fn cloud_lock_feed(&self) -> Option<CloudFeed> {
        self.cloud_client().map(|c| CloudFeed::new(c, LOCK_FEED_KEY))
    }
}

use gatewatch_core::cloud::{CloudClient, CloudFeed, DEFAULT_CLOUD_URL, LOCK_FEED_KEY};
use gatewatch_core::env;
use gatewatch_core::feed::DEFAULT_FEED;
use std::path::PathBuf;
use std::time::Duration;

/// Access controller configuration, loaded from environment variables.
pub struct Config {
    /// How often the authorization feed is read.
    pub poll_interval: Duration,
    /// How long the lock stays open before relocking.
    pub dwell: Duration,
    /// Time the servo is given to reach a commanded angle.
    pub settle: Duration,
    pub unlock_angle: f32,
    pub lock_angle: f32,
    /// Bound on each feed read/write.
    pub feed_timeout: Duration,
    /// Authorization feed backend: `file:<path>` or `cloud`. Must be reachable
    /// from both daemons; `memory` is rejected at startup.
    pub feed: String,
    /// Board profile name from `contrib/board`.
    pub board: String,
    pub pwm_root: PathBuf,
    pub gpio_root: PathBuf,
    /// Use simulated hardware instead of sysfs.
    pub dry_run: bool,
    pub cloud_url: String,
    pub cloud_user: Option<String>,
    pub cloud_key: Option<String>,
}

impl Config {
    /// Load configuration from `GATEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            poll_interval: env::secs_or("GATEWATCH_POLL_SECS", 4.0),
            dwell: env::secs_or("GATEWATCH_DWELL_SECS", 10.0),
            settle: env::millis_or("GATEWATCH_SETTLE_MS", 500),
            unlock_angle: env::parse_or("GATEWATCH_UNLOCK_ANGLE", 90.0),
            lock_angle: env::parse_or("GATEWATCH_LOCK_ANGLE", 0.0),
            feed_timeout: env::secs_or("GATEWATCH_FEED_TIMEOUT_SECS", 10.0),
            feed: env::string_or("GATEWATCH_FEED", DEFAULT_FEED),
            board: env::string_or("GATEWATCH_BOARD", "rpi4"),
            pwm_root: env::string_or("GATEWATCH_PWM_ROOT", gatewatch_hw::servo::DEFAULT_PWM_ROOT).into(),
            gpio_root: env::string_or("GATEWATCH_GPIO_ROOT", gatewatch_hw::led::DEFAULT_GPIO_ROOT).into(),
            dry_run: env::flag("GATEWATCH_DRY_RUN", false),
            cloud_url: env::string_or("GATEWATCH_CLOUD_URL", DEFAULT_CLOUD_URL),
            cloud_user: env::optional("GATEWATCH_CLOUD_USER"),
            cloud_key: env::optional("GATEWATCH_CLOUD_KEY"),
        }
    }

    pub fn cloud_lock_feed(&self) -> Option<CloudFeed> {
        match (&self.cloud_user, &self.cloud_key) {
            (Some(user), Some(key)) => Some(CloudFeed::new(
                CloudClient::new(&self.cloud_url, user, key, self.feed_timeout),
                LOCK_FEED_KEY,
            )),
            _ => None,
        }
    }
}

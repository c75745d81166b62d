//! Global alert cooldown.
//!
//! One timestamp for the whole process: a dispatch for any identity closes
//! the window for every identity.

use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct AlertThrottle {
    window: Duration,
    last_dispatch: Instant,
    suppressed: u64,
}

impl AlertThrottle {
    /// The window starts closed: the first alert can fire `window` after now.
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: Duration, start: Instant) -> Self {
        Self {
            window,
            last_dispatch: start,
            suppressed: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a dispatch may proceed at `now`. Counts a suppression when not.
    pub fn admit(&mut self, now: Instant) -> bool {
        let open = now.saturating_duration_since(self.last_dispatch) >= self.window;
        if !open {
            self.suppressed += 1;
        }
        open
    }

    /// Record a finished dispatch attempt, successful or not.
    pub fn record(&mut self, at: Instant) {
        self.last_dispatch = at;
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

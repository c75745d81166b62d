//! The lock state machine.
//!
//! Each poll reads the authorization slot. A Grant whose revision has not
//! been consumed yet runs one full unlock cycle; the cycle ends by
//! rewriting the slot to Deny, so the producer's next Grant is a new edge.

use crate::hardware::LockHardware;
use gatewatch_core::{Authorization, AuthorizationFeed, FeedRecord};
use gatewatch_hw::{Indicator, LockActuator};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocking,
    Unlocked,
    Relocking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Deny, absent, or a Grant already acted on.
    Idle,
    /// A Grant ran one cycle; the states it passed through, in order.
    Cycled(Vec<LockState>),
    /// The feed could not be read; state left unchanged.
    FeedUnavailable,
}

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub poll_interval: Duration,
    pub dwell: Duration,
    pub feed_timeout: Duration,
    pub unlock_angle: f32,
    pub lock_angle: f32,
}

pub struct AccessController<F, A: LockActuator, I: Indicator> {
    feed: F,
    hw: LockHardware<A, I>,
    timing: Timing,
    state: LockState,
    consumed: Option<String>,
}

impl<F: AuthorizationFeed, A: LockActuator, I: Indicator> AccessController<F, A, I> {
    pub fn new(feed: F, hw: LockHardware<A, I>, timing: Timing) -> Self {
        Self {
            feed,
            hw,
            timing,
            state: LockState::Locked,
            consumed: None,
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    /// Put the hardware in the locked position with the denied LED lit.
    pub async fn init(&mut self) {
        self.hw.actuate(self.timing.lock_angle).await;
        self.hw.show(false);
    }

    pub async fn poll_once(&mut self) -> PollOutcome {
        let record = match tokio::time::timeout(self.timing.feed_timeout, self.feed.read()).await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "feed read failed; retrying next poll");
                return PollOutcome::FeedUnavailable;
            }
            Err(_) => {
                tracing::warn!(after = ?self.timing.feed_timeout, "feed read timed out; retrying next poll");
                return PollOutcome::FeedUnavailable;
            }
        };

        match record {
            Some(record) if record.value == Authorization::Grant => {
                if record.revision.is_some() && record.revision == self.consumed {
                    tracing::debug!(revision = ?record.revision, "grant already consumed");
                    return PollOutcome::Idle;
                }
                PollOutcome::Cycled(self.cycle(record).await)
            }
            _ => PollOutcome::Idle,
        }
    }

    async fn cycle(&mut self, grant: FeedRecord) -> Vec<LockState> {
        tracing::info!(revision = ?grant.revision, "access granted");
        self.consumed = grant.revision;
        let mut path = Vec::with_capacity(4);

        self.enter(LockState::Unlocking, &mut path);
        self.hw.show(true);
        self.hw.actuate(self.timing.unlock_angle).await;

        self.enter(LockState::Unlocked, &mut path);
        tokio::time::sleep(self.timing.dwell).await;

        self.enter(LockState::Relocking, &mut path);
        self.hw.show(false);
        match tokio::time::timeout(self.timing.feed_timeout, self.feed.write(Authorization::Deny)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to reset feed to deny"),
            Err(_) => tracing::warn!(after = ?self.timing.feed_timeout, "feed reset timed out"),
        }
        self.hw.actuate(self.timing.lock_angle).await;

        self.enter(LockState::Locked, &mut path);
        path
    }

    fn enter(&mut self, next: LockState, path: &mut Vec<LockState>) {
        tracing::info!(from = ?self.state, to = ?next, "lock state");
        self.state = next;
        path.push(next);
    }

    /// Poll until `shutdown` resolves, then re-secure and release the
    /// hardware. A cycle in progress is abandoned; the hardware guard
    /// relocks.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.timing.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        outcome = self.poll_once() => {
                            if let PollOutcome::Cycled(_) = outcome {
                                tracing::info!("unlock cycle complete");
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(state = ?self.state, "access controller stopping");
        self.hw.shutdown();
    }
}

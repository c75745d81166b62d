//! Scoped ownership of the lock actuator and indicator LEDs.

use gatewatch_hw::{Indicator, LockActuator};
use std::time::Duration;

/// Owns the servo and both LEDs. Dropping it, on any exit path including
/// unwinding, drives the bolt to the locked angle, turns the LEDs off and
/// releases the sysfs lines.
pub struct LockHardware<A: LockActuator, I: Indicator> {
    actuator: A,
    granted: I,
    denied: I,
    settle: Duration,
    lock_angle: f32,
    released: bool,
}

impl<A: LockActuator, I: Indicator> LockHardware<A, I> {
    pub fn new(actuator: A, granted: I, denied: I, settle: Duration, lock_angle: f32) -> Self {
        Self {
            actuator,
            granted,
            denied,
            settle,
            lock_angle,
            released: false,
        }
    }

    /// Drive to `angle`, wait for the servo to settle, then stop holding.
    pub async fn actuate(&mut self, angle: f32) {
        if let Err(e) = self.actuator.drive(angle) {
            tracing::error!(error = %e, angle, "servo drive failed");
            return;
        }
        tokio::time::sleep(self.settle).await;
        if let Err(e) = self.actuator.idle() {
            tracing::warn!(error = %e, "servo idle failed");
        }
    }

    /// Granted LED on and denied LED off when `granted`, the reverse otherwise.
    pub fn show(&mut self, granted: bool) {
        if let Err(e) = self.granted.set(granted) {
            tracing::warn!(error = %e, "granted indicator write failed");
        }
        if let Err(e) = self.denied.set(!granted) {
            tracing::warn!(error = %e, "denied indicator write failed");
        }
    }

    /// Re-secure and release everything. Idempotent.
    pub fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        tracing::info!(angle = self.lock_angle, "securing lock and releasing hardware");

        if let Err(e) = self.actuator.drive(self.lock_angle) {
            tracing::error!(error = %e, "failed to drive lock closed on shutdown");
        } else {
            // May run from Drop, outside any async context.
            std::thread::sleep(self.settle);
        }
        let steps = [
            self.actuator.idle(),
            self.actuator.release(),
            self.granted.release(),
            self.denied.release(),
        ];
        for result in steps {
            if let Err(e) = result {
                tracing::warn!(error = %e, "hardware release step failed");
            }
        }
    }
}

impl<A: LockActuator, I: Indicator> Drop for LockHardware<A, I> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

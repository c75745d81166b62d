//! Shutdown signals.

use tokio::signal::unix::{signal, Signal, SignalKind};

/// SIGINT and SIGTERM handlers, installed when this is built. A signal that
/// arrives before [`ShutdownSignals::recv`] is polled is kept, not lost.
pub struct ShutdownSignals {
    interrupt: Option<Signal>,
    terminate: Option<Signal>,
}

impl ShutdownSignals {
    pub fn install() -> Self {
        Self {
            interrupt: install(SignalKind::interrupt(), "SIGINT"),
            terminate: install(SignalKind::terminate(), "SIGTERM"),
        }
    }

    /// Resolves on the first delivered signal. Never resolves when neither
    /// handler could be installed.
    pub async fn recv(mut self) {
        tokio::select! {
            _ = recv_or_pending(&mut self.interrupt) => {}
            _ = recv_or_pending(&mut self.terminate) => {}
        }
    }
}

fn install(kind: SignalKind, name: &'static str) -> Option<Signal> {
    match signal(kind) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(error = %e, signal = name, "signal handler unavailable");
            None
        }
    }
}

async fn recv_or_pending(sig: &mut Option<Signal>) {
    match sig {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_before_recv_is_kept() {
        let signals = ShutdownSignals::install();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .expect("SIGTERM not observed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_handler_waits_forever() {
        let mut none = None;
        let waited = tokio::time::timeout(Duration::from_secs(3600), recv_or_pending(&mut none)).await;
        assert!(waited.is_err());
    }
}

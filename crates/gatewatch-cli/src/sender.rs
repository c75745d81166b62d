//! Paced send loop shared by `stream` and `replay`.

use crate::source::{FrameSource, SourceError};
use gatewatch_wire::{FrameWriter, TransportError};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug)]
pub enum SendError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub fps: f32,
    /// Stop after this many frames.
    pub limit: Option<u64>,
}

impl Pacing {
    fn period(&self) -> Duration {
        Duration::try_from_secs_f32(1.0 / self.fps.max(0.1)).unwrap_or(Duration::from_secs(1))
    }
}

/// Pull frames from `source` and send each one, at most `fps` per second.
/// Returns the number of frames sent once the source is exhausted or the
/// limit is reached.
pub async fn pump<S, W>(source: &mut S, writer: &mut FrameWriter<W>, pacing: Pacing) -> Result<u64, SendError>
where
    S: FrameSource,
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(pacing.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sent = 0u64;

    while pacing.limit.map_or(true, |limit| sent < limit) {
        ticker.tick().await;
        let Some(frame) = source.next_frame().await? else {
            break;
        };
        writer.send(&frame).await?;
        sent += 1;
        tracing::trace!(seq = sent, len = frame.len(), "frame sent");
    }
    Ok(sent)
}

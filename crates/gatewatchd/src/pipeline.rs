//! Receive → decode → match → dispatch, one frame at a time.

use crate::engine::{EngineError, EngineHandle};
use gatewatch_core::alert::DispatchReport;
use gatewatch_core::frame::{decode_frame, DecodeError};
use gatewatch_core::{AlertDispatcher, AuthorizationFeed, FrameOutcome, Notifier, Uploader};
use gatewatch_wire::{FrameReader, TransportError};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Everything one iteration produced, handed from stage to stage.
pub struct FrameContext {
    pub sequence: u64,
    pub frame: Arc<RgbImage>,
    pub outcome: FrameOutcome,
    pub dispatches: Vec<DispatchReport>,
}

/// Counters for one camera session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub received: u64,
    pub dropped: u64,
    pub processed: u64,
    pub dispatched: u64,
}

pub struct Pipeline<F, N, U> {
    engine: EngineHandle,
    dispatcher: AlertDispatcher<F, N, U>,
    flip_vertical: bool,
    sequence: u64,
}

impl<F: AuthorizationFeed, N: Notifier, U: Uploader> Pipeline<F, N, U> {
    pub fn new(engine: EngineHandle, dispatcher: AlertDispatcher<F, N, U>, flip_vertical: bool) -> Self {
        Self {
            engine,
            dispatcher,
            flip_vertical,
            sequence: 0,
        }
    }

    /// Run one received payload through every stage. Only frames that went
    /// through detection reach the throttle.
    pub async fn handle(&mut self, payload: &[u8]) -> Result<FrameContext, PipelineError> {
        self.sequence += 1;
        let mut frame = decode_frame(payload)?;
        if self.flip_vertical {
            image::imageops::flip_vertical_in_place(&mut frame);
        }
        let frame = Arc::new(frame);

        let outcome = self.engine.process(frame.clone()).await?;
        let dispatches = if outcome.fresh {
            self.dispatcher.on_results(&outcome.results(), &frame).await
        } else {
            Vec::new()
        };

        Ok(FrameContext {
            sequence: self.sequence,
            frame,
            outcome,
            dispatches,
        })
    }

    /// Serve one camera until it disconnects. Undecodable frames and
    /// per-frame encoder failures are dropped; a dead engine or a transport
    /// failure other than disconnect ends the session with an error.
    pub async fn serve<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut FrameReader<R>,
    ) -> Result<SessionStats, PipelineError> {
        let mut stats = SessionStats::default();
        loop {
            let payload = match reader.recv().await {
                Ok(payload) => payload,
                Err(e) if e.is_disconnect() => {
                    tracing::info!(error = %e, frames = stats.received, "camera disconnected");
                    return Ok(stats);
                }
                Err(e) => return Err(e.into()),
            };
            stats.received += 1;

            match self.handle(&payload).await {
                Ok(ctx) => {
                    if ctx.outcome.fresh {
                        stats.processed += 1;
                        tracing::debug!(
                            seq = ctx.sequence,
                            faces = ctx.outcome.faces.len(),
                            "frame processed"
                        );
                    }
                    stats.dispatched += ctx.dispatches.len() as u64;
                }
                Err(PipelineError::Decode(e)) => {
                    stats.dropped += 1;
                    tracing::warn!(error = %e, len = payload.len(), "undecodable frame dropped");
                }
                Err(PipelineError::Engine(EngineError::Encoder(e))) => {
                    stats.dropped += 1;
                    tracing::warn!(error = %e, "face encoding failed; frame dropped");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

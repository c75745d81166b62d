use gatewatch_core::{EncoderError, FaceEncoder, FrameOutcome, FrameSampler, KnownSet, NearestNeighbor};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from the receive loop to the engine thread.
enum EngineRequest {
    Process {
        frame: Arc<RgbImage>,
        reply: oneshot::Sender<Result<FrameOutcome, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run one frame through the sampler: detection + classification on
    /// processed frames, carried-over faces otherwise.
    pub async fn process(&self, frame: Arc<RgbImage>) -> Result<FrameOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Process { frame, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the encoder (inference is blocking and not `Sync`), the
/// known set and the sampler's carried-over faces. It exits when every
/// handle is dropped.
pub fn spawn_engine<E>(
    mut encoder: E,
    known: KnownSet,
    mut sampler: FrameSampler<NearestNeighbor>,
) -> Result<EngineHandle, EngineError>
where
    E: FaceEncoder + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(1);

    std::thread::Builder::new()
        .name("gatewatch-engine".into())
        .spawn(move || {
            tracing::info!(identities = known.len(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Process { frame, reply } => {
                        let result = sampler
                            .process(&frame, &mut encoder, &known)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

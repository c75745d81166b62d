use anyhow::{Context, Result};
use gatewatch_core::{
    AlertDispatcher, AlertThrottle, CloudUploader, FaceEncoder, FeedBackend, FrameSampler, KnownSet,
    NearestNeighbor, SnapshotStore, WebhookNotifier,
};
use gatewatch_wire::FrameListener;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod pipeline;

use config::Config;
use pipeline::Pipeline;

#[cfg(feature = "onnx")]
fn load_encoder(config: &Config) -> Result<Box<dyn FaceEncoder + Send>> {
    let encoder = gatewatch_core::OnnxEncoder::load(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;
    Ok(Box::new(encoder))
}

#[cfg(not(feature = "onnx"))]
fn load_encoder(_config: &Config) -> Result<Box<dyn FaceEncoder + Send>> {
    anyhow::bail!("gatewatchd was built without the `onnx` feature; no face encoder available")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("gatewatchd starting");
    let config = Config::from_env();

    let mut encoder = load_encoder(&config)?;
    let known = KnownSet::load_dir(&config.known_faces_dir, &mut encoder)
        .with_context(|| format!("loading known faces from {}", config.known_faces_dir.display()))?;
    tracing::info!(identities = known.len(), labels = ?known.labels(), "known set loaded");

    let matcher = NearestNeighbor {
        tolerance: config.tolerance,
    };
    let sampler = FrameSampler::new(matcher, config.process_every, config.detection_scale);
    let engine = engine::spawn_engine(encoder, known, sampler)?;

    let feed = FeedBackend::shared_from_spec(&config.feed, config.cloud_lock_feed()).context("configuring authorization feed")?;
    tracing::info!(feed = %feed.describe(), "authorization feed ready");

    let dispatcher = AlertDispatcher::new(
        AlertThrottle::new(config.throttle_window),
        feed,
        WebhookNotifier::new(config.notify_webhook.clone(), config.call_timeout),
        CloudUploader::new(config.cloud_client()),
        SnapshotStore::new(&config.snapshot_dir),
    )
    .with_call_timeout(config.call_timeout);
    let mut pipeline = Pipeline::new(engine, dispatcher, config.flip_vertical);

    let listener = FrameListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "waiting for camera");

    let (reader, _peer) = tokio::select! {
        accepted = listener.accept_one() => accepted.context("accepting camera connection")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted before a camera connected");
            return Ok(());
        }
    };
    let mut reader = reader.with_max_len(config.max_frame_len);

    tokio::select! {
        served = pipeline.serve(&mut reader) => {
            let stats = served?;
            tracing::info!(
                received = stats.received,
                dropped = stats.dropped,
                processed = stats.processed,
                dispatched = stats.dispatched,
                "session ended"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("gatewatchd shutting down");
        }
    }

    Ok(())
}

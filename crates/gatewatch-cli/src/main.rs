use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gatewatch_core::cloud::{CloudClient, CloudFeed, DEFAULT_CLOUD_URL, LOCK_FEED_KEY};
use gatewatch_core::feed::DEFAULT_FEED;
use gatewatch_core::{Authorization, AuthorizationFeed, FeedBackend};
use gatewatch_hw::camera::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use gatewatch_hw::Camera;
use gatewatch_wire::FrameWriter;
use std::path::PathBuf;
use std::time::Duration;

mod sender;
mod source;

use sender::{pump, Pacing, SendError};
use source::{CameraSource, FrameSource, ReplaySource};

const CAMERA_WARMUP: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "gatewatch", about = "Gatewatch camera node and diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture from a camera and stream JPEG frames to the recognition node
    Stream {
        #[command(flatten)]
        target: Target,
        /// V4L2 device path
        #[arg(long, env = "GATEWATCH_CAMERA_DEVICE", default_value = "/dev/video0")]
        device: String,
        /// Flip frames vertically before sending
        #[arg(long)]
        flip: bool,
    },
    /// Send the JPEG/PNG files in a directory, in file-name order
    Replay {
        #[command(flatten)]
        target: Target,
        dir: PathBuf,
        /// Start over after the last file
        #[arg(long = "loop")]
        repeat: bool,
    },
    /// Inspect or write the authorization feed
    Feed {
        #[command(flatten)]
        feed: FeedArgs,
        #[command(subcommand)]
        action: FeedAction,
    },
    /// List V4L2 capture devices
    Devices,
}

#[derive(Args)]
struct Target {
    /// Recognition node address
    #[arg(long, env = "GATEWATCH_SERVER", default_value = "127.0.0.1:8000")]
    server: String,
    /// Frames per second
    #[arg(long, default_value_t = 10.0)]
    fps: f32,
    /// Stop after this many frames
    #[arg(long)]
    count: Option<u64>,
}

#[derive(Args)]
struct FeedArgs {
    /// Feed backend: file:<path> or cloud
    #[arg(long, env = "GATEWATCH_FEED", default_value = DEFAULT_FEED)]
    backend: String,
    #[arg(long, env = "GATEWATCH_CLOUD_URL", default_value = DEFAULT_CLOUD_URL)]
    cloud_url: String,
    #[arg(long, env = "GATEWATCH_CLOUD_USER")]
    cloud_user: Option<String>,
    #[arg(long, env = "GATEWATCH_CLOUD_KEY", hide_env_values = true)]
    cloud_key: Option<String>,
}

#[derive(Subcommand)]
enum FeedAction {
    /// Print the current value and revision
    Get,
    /// Write a Grant ("1")
    Grant,
    /// Write a Deny ("0")
    Deny,
}

impl FeedArgs {
    fn backend(&self) -> Result<FeedBackend> {
        let cloud = match (&self.cloud_user, &self.cloud_key) {
            (Some(user), Some(key)) => Some(CloudFeed::new(
                CloudClient::new(&self.cloud_url, user, key, Duration::from_secs(10)),
                LOCK_FEED_KEY,
            )),
            _ => None,
        };
        Ok(FeedBackend::shared_from_spec(&self.backend, cloud)?)
    }
}

/// Send frames until the source ends, the node disconnects or Ctrl-C.
async fn send_frames<S: FrameSource>(source: &mut S, target: &Target) -> Result<()> {
    let mut writer = FrameWriter::connect(&target.server)
        .await
        .with_context(|| format!("connecting to {}", target.server))?;
    tracing::info!(server = %target.server, fps = target.fps, "connected to recognition node");

    let pacing = Pacing {
        fps: target.fps,
        limit: target.count,
    };
    tokio::select! {
        result = pump(source, &mut writer, pacing) => match result {
            Ok(sent) => tracing::info!(sent, "all frames sent"),
            Err(SendError::Transport(e)) => {
                tracing::warn!(error = %e, sent = writer.frames_sent(), "recognition node went away");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(sent = writer.frames_sent(), "interrupted");
        }
    }

    writer.shutdown().await.ok();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stream { target, device, flip } => {
            let mut source = CameraSource::open(&device, DEFAULT_WIDTH, DEFAULT_HEIGHT, flip)
                .await
                .with_context(|| format!("opening camera {device}"))?;
            tracing::info!(warmup = ?CAMERA_WARMUP, "camera warming up");
            tokio::time::sleep(CAMERA_WARMUP).await;
            send_frames(&mut source, &target).await?;
        }
        Commands::Replay { target, dir, repeat } => {
            let mut source = ReplaySource::from_dir(&dir, repeat)?;
            send_frames(&mut source, &target).await?;
        }
        Commands::Feed { feed, action } => {
            let backend = feed.backend()?;
            match action {
                FeedAction::Get => match backend.read().await? {
                    Some(record) => println!(
                        "{} ({:?}) revision {}",
                        record.value.as_wire(),
                        record.value,
                        record.revision.as_deref().unwrap_or("-")
                    ),
                    None => println!("(empty) reads as Deny"),
                },
                FeedAction::Grant | FeedAction::Deny => {
                    let value = match action {
                        FeedAction::Grant => Authorization::Grant,
                        _ => Authorization::Deny,
                    };
                    let record = backend.write(value).await?;
                    println!(
                        "wrote {} to {} (revision {})",
                        record.value.as_wire(),
                        backend.describe(),
                        record.revision.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {}  ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_args(argv: &[&str]) -> FeedArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Feed { feed, .. } => feed,
            _ => panic!("expected feed command"),
        }
    }

    #[test]
    fn test_feed_defaults_to_shared_file() {
        let args = feed_args(&["gatewatch", "feed", "get"]);
        if std::env::var_os("GATEWATCH_FEED").is_none() {
            assert_eq!(args.backend, DEFAULT_FEED);
        }
        let args = feed_args(&["gatewatch", "feed", "--backend", DEFAULT_FEED, "get"]);
        assert!(matches!(args.backend(), Ok(FeedBackend::File(_))));
    }

    #[test]
    fn test_feed_rejects_memory_backend() {
        let args = feed_args(&["gatewatch", "feed", "--backend", "memory", "grant"]);
        assert!(args.backend().is_err());
    }
}

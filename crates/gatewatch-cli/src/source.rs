//! Where outgoing frames come from: a live camera or a directory of images.

use gatewatch_core::frame::encode_jpeg;
use gatewatch_hw::{Camera, CameraError};
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no JPEG or PNG files in {0}")]
    Empty(PathBuf),
    #[error("failed to spawn camera thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("camera thread exited")]
    Closed,
}

/// A sequence of encoded frames. `Ok(None)` means the source is exhausted.
pub trait FrameSource {
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, SourceError>>;
}

type CaptureReply = oneshot::Sender<Result<Vec<u8>, SourceError>>;

/// Handle to the capture thread. Each request captures and encodes exactly
/// one frame, so capture, encode and send never overlap.
pub struct CameraSource {
    tx: mpsc::Sender<CaptureReply>,
}

impl CameraSource {
    /// Open the device on a dedicated thread. Fails if the camera cannot be
    /// opened or streaming cannot start.
    pub async fn open(device: &str, width: u32, height: u32, flip: bool) -> Result<Self, SourceError> {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), SourceError>>();
        let (tx, mut rx) = mpsc::channel::<CaptureReply>(1);
        let device = device.to_string();

        std::thread::Builder::new()
            .name("gatewatch-camera".into())
            .spawn(move || {
                let camera = match Camera::open(&device, width, height) {
                    Ok(camera) => camera,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                let mut session = match camera.stream() {
                    Ok(session) => session,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Some(reply) = rx.blocking_recv() {
                    let result = session.next_frame().map_err(SourceError::from).and_then(|frame| {
                        let mut image = frame.image;
                        if flip {
                            image::imageops::flip_vertical_in_place(&mut image);
                        }
                        Ok(encode_jpeg(&image, JPEG_QUALITY)?)
                    });
                    let _ = reply.send(result);
                }
                tracing::debug!("camera thread exiting");
            })
            .map_err(SourceError::Spawn)?;

        ready_rx.await.map_err(|_| SourceError::Closed)??;
        Ok(Self { tx })
    }
}

impl FrameSource for CameraSource {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(reply_tx).await.map_err(|_| SourceError::Closed)?;
        let jpeg = reply_rx.await.map_err(|_| SourceError::Closed)??;
        Ok(Some(jpeg))
    }
}

/// Already-encoded image files sent as-is, in file-name order.
pub struct ReplaySource {
    files: Vec<PathBuf>,
    next: usize,
    repeat: bool,
}

impl ReplaySource {
    pub fn from_dir(dir: &Path, repeat: bool) -> Result<Self, SourceError> {
        let entries = std::fs::read_dir(dir).map_err(|source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(SourceError::Empty(dir.to_path_buf()));
        }
        tracing::info!(dir = %dir.display(), files = files.len(), repeat, "replay source ready");
        Ok(Self { files, next: 0, repeat })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for ReplaySource {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        if self.next == self.files.len() {
            if !self.repeat {
                return Ok(None);
            }
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;
        let bytes = tokio::fs::read(path).await.map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Some(bytes))
    }
}

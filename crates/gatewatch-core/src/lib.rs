//! gatewatch-core — Recognition and alerting engine.
//!
//! Classifies face embeddings against a known set, sub-samples the incoming
//! frame stream, throttles outbound alerts and talks to the shared
//! authorization feed polled by the lock controller.

pub mod alert;
pub mod cloud;
pub mod encoder;
pub mod env;
pub mod feed;
pub mod frame;
pub mod known;
pub mod matcher;
pub mod sampler;
pub mod throttle;
pub mod types;

#[cfg(feature = "onnx")]
pub mod detector;
#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "onnx")]
pub mod recognizer;

pub use alert::{AlertDispatcher, Channel, Notifier, SnapshotStore, Uploader, WebhookNotifier};
pub use cloud::{CloudClient, CloudFeed, CloudUploader};
pub use encoder::{EncoderError, FaceEncoder};
pub use feed::{AuthorizationFeed, FeedBackend, FeedError, FeedRecord, FileFeed, MemoryFeed};
pub use known::{KnownIdentity, KnownSet, KnownSetError};
pub use matcher::{MatchError, Matcher, NearestNeighbor};
pub use sampler::{FaceMatch, FrameOutcome, FrameSampler};
pub use throttle::AlertThrottle;
pub use types::{
    Authorization, AuthorizationEvent, BoundingBox, Embedding, FaceObservation, Identity,
    MatchResult,
};

#[cfg(feature = "onnx")]
pub use onnx::OnnxEncoder;

//! Face embedding capability.
//!
//! Detection and embedding extraction are a black box to the rest of the
//! crate: anything that turns a frame into bounding boxes plus fixed-size
//! embeddings can drive the matcher.

use crate::types::FaceObservation;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[cfg(feature = "onnx")]
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub trait FaceEncoder {
    /// Detect every face in `frame` and embed it. Boxes are in `frame`'s
    /// own pixel coordinates.
    fn detect_and_encode(&mut self, frame: &RgbImage) -> Result<Vec<FaceObservation>, EncoderError>;
}

impl<E: FaceEncoder + ?Sized> FaceEncoder for Box<E> {
    fn detect_and_encode(&mut self, frame: &RgbImage) -> Result<Vec<FaceObservation>, EncoderError> {
        (**self).detect_and_encode(frame)
    }
}

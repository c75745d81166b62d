//! ONNX-backed [`FaceEncoder`]: SCRFD detection followed by ArcFace
//! embedding of each detected face.

use crate::detector::{Detection, FaceDetector};
use crate::encoder::{EncoderError, FaceEncoder};
use crate::recognizer::FaceRecognizer;
use crate::types::FaceObservation;
use image::imageops;
use image::RgbImage;
use std::path::Path;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Extra context around the detected box, as a fraction of its longer side.
const CROP_MARGIN: f32 = 0.1;

pub struct OnnxEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEncoder {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, EncoderError> {
        Ok(Self {
            detector: FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?,
            recognizer: FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?,
        })
    }
}

impl FaceEncoder for OnnxEncoder {
    fn detect_and_encode(&mut self, frame: &RgbImage) -> Result<Vec<FaceObservation>, EncoderError> {
        let (width, height) = frame.dimensions();
        let detections = self.detector.detect(frame)?;

        let mut faces = Vec::with_capacity(detections.len());
        for det in detections {
            let Some(crop) = square_crop(frame, &det) else {
                continue;
            };
            let embedding = self.recognizer.embed(&crop)?;
            faces.push(FaceObservation {
                bbox: det.to_bbox(width, height),
                embedding,
            });
        }
        Ok(faces)
    }
}

/// Square region centred on the detection, clamped to the frame.
fn square_crop(frame: &RgbImage, det: &Detection) -> Option<RgbImage> {
    let side = (det.x2 - det.x1).max(det.y2 - det.y1) * (1.0 + CROP_MARGIN);
    let cx = (det.x1 + det.x2) / 2.0;
    let cy = (det.y1 + det.y2) / 2.0;

    let (width, height) = frame.dimensions();
    let x0 = (cx - side / 2.0).max(0.0) as u32;
    let y0 = (cy - side / 2.0).max(0.0) as u32;
    let x1 = ((cx + side / 2.0).max(0.0) as u32).min(width);
    let y1 = ((cy + side / 2.0).max(0.0) as u32).min(height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(imageops::crop_imm(frame, x0, y0, x1 - x0, y1 - y0).to_image())
}

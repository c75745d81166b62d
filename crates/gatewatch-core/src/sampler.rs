//! Frame sub-sampling around the matcher.
//!
//! Detection and embedding run on one frame in every `process_every`, on a
//! copy shrunk by `scale`. Frames in between reuse the previous boxes and
//! labels for display without re-matching.

use crate::encoder::{EncoderError, FaceEncoder};
use crate::frame::downscale;
use crate::known::KnownSet;
use crate::matcher::Matcher;
use crate::types::{BoundingBox, MatchResult};
use image::RgbImage;

pub const DEFAULT_PROCESS_EVERY: usize = 3;
pub const DEFAULT_DETECTION_SCALE: f32 = 0.25;

/// A classified face with its box in full-resolution coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub bbox: BoundingBox,
    pub result: MatchResult,
}

/// What the matcher produced for one incoming frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    /// True when this frame went through detection; false when the faces
    /// were carried over from the last processed frame.
    pub fresh: bool,
    pub faces: Vec<FaceMatch>,
}

impl FrameOutcome {
    pub fn results(&self) -> Vec<MatchResult> {
        self.faces.iter().map(|f| f.result.clone()).collect()
    }
}

pub struct FrameSampler<M> {
    matcher: M,
    process_every: usize,
    scale: f32,
    counter: usize,
    last_faces: Vec<FaceMatch>,
}

impl<M: Matcher> FrameSampler<M> {
    pub fn new(matcher: M, process_every: usize, scale: f32) -> Self {
        Self {
            matcher,
            process_every: process_every.max(1),
            scale,
            counter: 0,
            last_faces: Vec::new(),
        }
    }

    pub fn with_defaults(matcher: M) -> Self {
        Self::new(matcher, DEFAULT_PROCESS_EVERY, DEFAULT_DETECTION_SCALE)
    }

    pub fn process<E: FaceEncoder + ?Sized>(
        &mut self,
        frame: &RgbImage,
        encoder: &mut E,
        known: &KnownSet,
    ) -> Result<FrameOutcome, EncoderError> {
        let due = self.counter == 0;
        self.counter = (self.counter + 1) % self.process_every;

        if !due {
            return Ok(FrameOutcome {
                fresh: false,
                faces: self.last_faces.clone(),
            });
        }

        let small = downscale(frame, self.scale);
        let observations = match encoder.detect_and_encode(&small) {
            Ok(observations) => observations,
            Err(e) => {
                self.last_faces.clear();
                return Err(e);
            }
        };
        let inverse = 1.0 / self.scale;

        let mut faces = Vec::with_capacity(observations.len());
        for observation in observations {
            match self.matcher.classify(&observation.embedding, known) {
                Ok(result) => {
                    tracing::debug!(
                        label = %result.identity,
                        distance = result.distance,
                        "face classified"
                    );
                    faces.push(FaceMatch {
                        bbox: observation.bbox.scaled(inverse),
                        result,
                    });
                }
                Err(e) => tracing::warn!(error = %e, "observation dropped"),
            }
        }

        self.last_faces = faces.clone();
        Ok(FrameOutcome { fresh: true, faces })
    }
}

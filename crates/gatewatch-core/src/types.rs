use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label reported for faces that do not match any known identity.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Face bounding box in pixel coordinates of the frame it was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl BoundingBox {
    /// Map the box into a frame `factor` times larger (or smaller).
    pub fn scaled(&self, factor: f32) -> Self {
        let scale = |v: i32| (v as f32 * factor).round() as i32;
        Self {
            top: scale(self.top),
            right: scale(self.right),
            bottom: scale(self.bottom),
            left: scale(self.left),
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Face embedding vector. Dimensionality depends on the encoder in use
/// (128 for dlib-style encoders, 512 for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean (L2) distance. Always non-negative.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One detected face: where it is and what it looks like.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceObservation {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Outcome of classification for one face.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Unknown,
    Known(String),
}

impl Identity {
    pub fn label(&self) -> &str {
        match self {
            Identity::Unknown => UNKNOWN_LABEL,
            Identity::Known(label) => label,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of matching one observation against the known set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Identity,
    /// Distance to the nearest known identity; `+inf` when the known set is empty.
    pub distance: f32,
}

/// Access decision carried on the authorization feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authorization {
    Grant,
    Deny,
}

impl Authorization {
    /// Scalar feed value: "1" grants, "0" denies.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Authorization::Grant => "1",
            Authorization::Deny => "0",
        }
    }

    /// Parse a feed value. Anything other than "1" is a denial.
    pub fn from_wire(value: &str) -> Self {
        if value.trim() == "1" {
            Authorization::Grant
        } else {
            Authorization::Deny
        }
    }
}

impl From<&Identity> for Authorization {
    fn from(identity: &Identity) -> Self {
        if identity.is_known() {
            Authorization::Grant
        } else {
            Authorization::Deny
        }
    }
}

/// A dispatched access decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationEvent {
    pub decision: Authorization,
    pub label: String,
    pub at: DateTime<Utc>,
}

impl AuthorizationEvent {
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            decision: identity.into(),
            label: identity.label().to_string(),
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_345() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert_eq!(a.euclidean_distance(&b), 5.0);
        assert_eq!(b.euclidean_distance(&a), 5.0);
    }

    #[test]
    fn test_euclidean_distance_identical_is_zero() {
        let a = Embedding::new(vec![0.25, -0.5, 1.0]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_bbox_scaled_back_up() {
        let small = BoundingBox { top: 10, right: 40, bottom: 50, left: 5 };
        let full = small.scaled(4.0);
        assert_eq!(full, BoundingBox { top: 40, right: 160, bottom: 200, left: 20 });
        assert_eq!(full.width(), 140);
        assert_eq!(full.height(), 160);
    }

    #[test]
    fn test_authorization_wire_values() {
        assert_eq!(Authorization::from_wire("1"), Authorization::Grant);
        assert_eq!(Authorization::from_wire(" 1\n"), Authorization::Grant);
        assert_eq!(Authorization::from_wire("0"), Authorization::Deny);
        assert_eq!(Authorization::from_wire(""), Authorization::Deny);
        assert_eq!(Authorization::from_wire("yes"), Authorization::Deny);
        assert_eq!(Authorization::Grant.as_wire(), "1");
        assert_eq!(Authorization::Deny.as_wire(), "0");
    }

    #[test]
    fn test_event_decision_follows_identity() {
        let known = AuthorizationEvent::for_identity(&Identity::Known("alice".into()));
        assert_eq!(known.decision, Authorization::Grant);
        assert_eq!(known.label, "alice");

        let unknown = AuthorizationEvent::for_identity(&Identity::Unknown);
        assert_eq!(unknown.decision, Authorization::Deny);
        assert_eq!(unknown.label, UNKNOWN_LABEL);
    }
}

//! Nearest-neighbour classification.

use crate::known::KnownSet;
use crate::types::{Embedding, Identity, MatchResult};
use thiserror::Error;

/// Maximum distance accepted as a match (strict less-than).
///
/// Tuned for 128-d dlib-style embeddings. The ArcFace encoder emits unit
/// vectors, where Euclidean distance is `sqrt(2 - 2 * cosine)` and ranges over
/// `0..=2`; same-person pairs usually fall near 0.9 to 1.2, so deployments
/// using it should raise `GATEWATCH_TOLERANCE` into that range after checking
/// against their own reference images.
pub const DEFAULT_TOLERANCE: f32 = 0.45;

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("query has {actual} dimensions, known set uses {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Strategy for classifying a query embedding against the known set.
pub trait Matcher {
    fn classify(&self, query: &Embedding, known: &KnownSet) -> Result<MatchResult, MatchError>;
}

/// Euclidean nearest neighbour with a strict distance tolerance.
///
/// The winner is the minimum of `(distance, load ordinal)`, so the answer is
/// the same whatever order the set is iterated in and exact ties go to the
/// identity loaded first.
#[derive(Debug, Clone, Copy)]
pub struct NearestNeighbor {
    pub tolerance: f32,
}

impl Default for NearestNeighbor {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Matcher for NearestNeighbor {
    fn classify(&self, query: &Embedding, known: &KnownSet) -> Result<MatchResult, MatchError> {
        if let Some(expected) = known.dim() {
            if query.dim() != expected {
                return Err(MatchError::DimensionMismatch {
                    expected,
                    actual: query.dim(),
                });
            }
        }

        let nearest = known
            .iter()
            .map(|identity| (identity.embedding.euclidean_distance(query), identity))
            .min_by(|(da, a), (db, b)| da.total_cmp(db).then(a.ordinal.cmp(&b.ordinal)));

        Ok(match nearest {
            Some((distance, identity)) if distance < self.tolerance => MatchResult {
                identity: Identity::Known(identity.label.clone()),
                distance,
            },
            Some((distance, _)) => MatchResult {
                identity: Identity::Unknown,
                distance,
            },
            None => MatchResult {
                identity: Identity::Unknown,
                distance: f32::INFINITY,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::known::KnownIdentity;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn known(entries: &[(&str, &[f32])]) -> KnownSet {
        let mut set = KnownSet::new();
        for (label, values) in entries {
            set.push(*label, emb(values)).unwrap();
        }
        set
    }

    #[test]
    fn test_nearest_within_tolerance() {
        let set = known(&[("alice", &[0.0, 0.0]), ("bob", &[1.0, 1.0])]);
        let result = NearestNeighbor::default().classify(&emb(&[0.9, 1.0]), &set).unwrap();
        assert_eq!(result.identity, Identity::Known("bob".into()));
        assert!((result.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_too_far_is_unknown() {
        let set = known(&[("alice", &[0.0, 0.0])]);
        let result = NearestNeighbor::default().classify(&emb(&[0.5, 0.5]), &set).unwrap();
        assert_eq!(result.identity, Identity::Unknown);
        assert!(result.distance > DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_distance_equal_to_tolerance_is_unknown() {
        let set = known(&[("alice", &[0.0, 0.0])]);
        let query = emb(&[3.0, 4.0]);

        let at = NearestNeighbor { tolerance: 5.0 }.classify(&query, &set).unwrap();
        assert_eq!(at.identity, Identity::Unknown);
        assert_eq!(at.distance, 5.0);

        // Smallest representable step above the distance.
        let just_above = f32::from_bits(5.0f32.to_bits() + 1);
        let below = NearestNeighbor { tolerance: just_above }.classify(&query, &set).unwrap();
        assert_eq!(below.identity, Identity::Known("alice".into()));
    }

    #[test]
    fn test_empty_known_set_is_unknown() {
        let set = KnownSet::new();
        let result = NearestNeighbor { tolerance: f32::MAX }
            .classify(&emb(&[0.0; 128]), &set)
            .unwrap();
        assert_eq!(result.identity, Identity::Unknown);
        assert_eq!(result.distance, f32::INFINITY);
    }

    #[test]
    fn test_unit_vector_distance_scale() {
        // cosine 0.5 between unit vectors is Euclidean 1.0
        let b = emb(&[0.5, 3f32.sqrt() / 2.0]);
        let set = known(&[("alice", &[1.0, 0.0])]);

        let strict = NearestNeighbor::default().classify(&b, &set).unwrap();
        assert!((strict.distance - 1.0).abs() < 1e-5);
        assert_eq!(strict.identity, Identity::Unknown);

        let calibrated = NearestNeighbor { tolerance: 1.1 }.classify(&b, &set).unwrap();
        assert_eq!(calibrated.identity, Identity::Known("alice".into()));
    }

    #[test]
    fn test_tie_goes_to_first_loaded() {
        let set = known(&[("first", &[1.0, 0.0]), ("second", &[-1.0, 0.0])]);
        let result = NearestNeighbor { tolerance: 2.0 }.classify(&emb(&[0.0, 0.0]), &set).unwrap();
        assert_eq!(result.identity, Identity::Known("first".into()));

        // Same identities presented in reverse: ordinal still decides.
        let reversed: Vec<KnownIdentity> = set.iter().rev().cloned().collect();
        let reversed = KnownSet::from_identities(reversed).unwrap();
        let again = NearestNeighbor { tolerance: 2.0 }
            .classify(&emb(&[0.0, 0.0]), &reversed)
            .unwrap();
        assert_eq!(again, result);
    }

    #[test]
    fn test_result_independent_of_iteration_order() {
        let mut rng = StdRng::seed_from_u64(7);
        let identities: Vec<KnownIdentity> = (0..40)
            .map(|i| KnownIdentity {
                label: format!("person-{i}"),
                embedding: Embedding::new((0..16).map(|_| rng.gen_range(-1.0..1.0)).collect()),
                ordinal: i,
            })
            .collect();
        let queries: Vec<Embedding> = (0..25)
            .map(|_| Embedding::new((0..16).map(|_| rng.gen_range(-1.0..1.0)).collect()))
            .collect();

        let matcher = NearestNeighbor { tolerance: 1.5 };
        let canonical = KnownSet::from_identities(identities.clone()).unwrap();
        let expected: Vec<MatchResult> = queries
            .iter()
            .map(|p| matcher.classify(p, &canonical).unwrap())
            .collect();

        for _ in 0..5 {
            let mut shuffled = identities.clone();
            shuffled.shuffle(&mut rng);
            let set = KnownSet::from_identities(shuffled).unwrap();
            for (query, want) in queries.iter().zip(&expected) {
                assert_eq!(&matcher.classify(query, &set).unwrap(), want);
            }
        }
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let set = known(&[("alice", &[0.0, 0.0, 0.0])]);
        let err = NearestNeighbor::default().classify(&emb(&[0.0, 0.0]), &set).unwrap_err();
        assert_eq!(err, MatchError::DimensionMismatch { expected: 3, actual: 2 });
    }
}

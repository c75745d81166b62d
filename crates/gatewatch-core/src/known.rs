//! The known set: labeled reference embeddings loaded once at startup.

use crate::encoder::{EncoderError, FaceEncoder};
use crate::types::{Embedding, UNKNOWN_LABEL};
use std::path::{Path, PathBuf};
use thiserror::Error;

const REFERENCE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum KnownSetError {
    #[error("cannot read known-faces directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("embedding for {label} has {actual} dimensions, known set uses {expected}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("encoder failed on {path}: {source}")]
    Encoder {
        path: PathBuf,
        #[source]
        source: EncoderError,
    },
}

/// One reference identity. `ordinal` is its position in load order and
/// breaks distance ties.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownIdentity {
    pub label: String,
    pub embedding: Embedding,
    pub ordinal: usize,
}

#[derive(Debug, Clone, Default)]
pub struct KnownSet {
    identities: Vec<KnownIdentity>,
    dim: Option<usize>,
}

impl KnownSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an identity; its ordinal is the current size of the set.
    pub fn push(&mut self, label: impl Into<String>, embedding: Embedding) -> Result<(), KnownSetError> {
        let ordinal = self.identities.len();
        self.insert(KnownIdentity {
            label: label.into(),
            embedding,
            ordinal,
        })
    }

    /// Build a set from identities with pre-assigned ordinals, in whatever
    /// order they are given.
    pub fn from_identities(identities: Vec<KnownIdentity>) -> Result<Self, KnownSetError> {
        let mut set = Self::new();
        for identity in identities {
            set.insert(identity)?;
        }
        Ok(set)
    }

    fn insert(&mut self, identity: KnownIdentity) -> Result<(), KnownSetError> {
        let actual = identity.embedding.dim();
        match self.dim {
            Some(expected) if expected != actual => {
                return Err(KnownSetError::DimensionMismatch {
                    label: identity.label,
                    expected,
                    actual,
                })
            }
            _ => self.dim = Some(actual),
        }
        self.identities.push(identity);
        Ok(())
    }

    /// Load every reference image in `dir`. The file stem is the label.
    ///
    /// Files are visited in name order so the load order (and with it the
    /// tie-break) is reproducible. Images without a detectable face, or that
    /// fail to decode, are skipped with a warning.
    pub fn load_dir<E: FaceEncoder + ?Sized>(dir: &Path, encoder: &mut E) -> Result<Self, KnownSetError> {
        let entries = std::fs::read_dir(dir).map_err(|source| KnownSetError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_reference_image(path))
            .collect();
        paths.sort();

        let mut set = Self::new();
        for path in paths {
            let Some(label) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if label == UNKNOWN_LABEL {
                tracing::warn!(path = %path.display(), "reference label collides with the unknown label; skipped");
                continue;
            }

            let image = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable reference image; skipped");
                    continue;
                }
            };

            let faces = encoder
                .detect_and_encode(&image)
                .map_err(|source| KnownSetError::Encoder {
                    path: path.clone(),
                    source,
                })?;

            match faces.into_iter().next() {
                Some(face) => {
                    set.push(label, face.embedding)?;
                    tracing::info!(label, "loaded known identity");
                }
                None => tracing::warn!(path = %path.display(), "no face found in reference image"),
            }
        }

        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Embedding dimensionality, once at least one identity is loaded.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KnownIdentity> {
        self.identities.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.identities.iter().map(|i| i.label.as_str()).collect()
    }
}

fn is_reference_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| REFERENCE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, FaceObservation};
    use image::{Rgb, RgbImage};

    /// Encodes a frame as one face whose embedding is its first pixel;
    /// pure black frames contain no face.
    struct PixelEncoder;

    impl FaceEncoder for PixelEncoder {
        fn detect_and_encode(&mut self, frame: &RgbImage) -> Result<Vec<FaceObservation>, EncoderError> {
            let Rgb([r, g, b]) = *frame.get_pixel(0, 0);
            if (r, g, b) == (0, 0, 0) {
                return Ok(Vec::new());
            }
            Ok(vec![FaceObservation {
                bbox: BoundingBox { top: 0, right: 1, bottom: 1, left: 0 },
                embedding: Embedding::new(vec![r as f32, g as f32, b as f32]),
            }])
        }
    }

    fn write_png(dir: &Path, name: &str, rgb: [u8; 3]) {
        RgbImage::from_pixel(4, 4, Rgb(rgb)).save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_load_dir_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "bob.png", [2, 0, 0]);
        write_png(dir.path(), "alice.PNG", [1, 0, 0]);
        write_png(dir.path(), "nobody.png", [0, 0, 0]);
        write_png(dir.path(), "Unknown.png", [3, 0, 0]);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.jpg"), "not an image").unwrap();

        let set = KnownSet::load_dir(dir.path(), &mut PixelEncoder).unwrap();
        assert_eq!(set.labels(), vec!["alice", "bob"]);
        assert_eq!(set.dim(), Some(3));
        let ordinals: Vec<usize> = set.iter().map(|i| i.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1]);
    }

    #[test]
    fn test_load_dir_missing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let err = KnownSet::load_dir(&missing, &mut PixelEncoder).unwrap_err();
        assert!(matches!(err, KnownSetError::Directory { .. }));
    }

    #[test]
    fn test_empty_dir_gives_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let set = KnownSet::load_dir(dir.path(), &mut PixelEncoder).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.dim(), None);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut set = KnownSet::new();
        set.push("a", Embedding::new(vec![0.0; 4])).unwrap();
        let err = set.push("b", Embedding::new(vec![0.0; 5])).unwrap_err();
        assert!(matches!(
            err,
            KnownSetError::DimensionMismatch { expected: 4, actual: 5, .. }
        ));
        assert_eq!(set.len(), 1);
    }
}

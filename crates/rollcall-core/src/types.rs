use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cosine similarity at which two ArcFace descriptors are taken to be the same person.
pub const ARCFACE_MATCH_COSINE: f32 = 0.40;

/// Euclidean distance between unit vectors with cosine similarity
/// [`ARCFACE_MATCH_COSINE`]: `sqrt(2 - 2 * 0.40)`.
const ARCFACE_MATCH_DISTANCE: f32 = 1.095_445;

/// Default tolerance of the encoder's own match predicate (`distance <= tolerance`).
pub const DEFAULT_MATCH_TOLERANCE: f32 = ARCFACE_MATCH_DISTANCE;

/// Default acceptance threshold: a match must also be strictly closer than this.
pub const DEFAULT_MATCH_THRESHOLD: f32 = ARCFACE_MATCH_DISTANCE;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Multiply every coordinate (box and landmarks) by `factor`.
    ///
    /// Used to map a box found on a downscaled frame back onto the full frame.
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(x, y)| (x * factor, y * factor))),
        }
    }

    /// Integer corners `(left, top, right, bottom)`.
    pub fn corners(&self) -> (i32, i32, i32, i32) {
        (
            self.x.round() as i32,
            self.y.round() as i32,
            (self.x + self.width).round() as i32,
            (self.y + self.height).round() as i32,
        )
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One enrolled face: the descriptor of a single enrollment image and its person label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceModel {
    /// Source image the descriptor was computed from.
    pub id: PathBuf,
    /// Person name (the enrollment folder name).
    pub label: String,
    pub embedding: Embedding,
}

/// The enrolled gallery. Descriptor and label of entry `i` always travel together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnownFaces {
    pub models: Vec<FaceModel>,
}

impl KnownFaces {
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.label.as_str())
    }
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance to the closest gallery entry (`f32::INFINITY` for an empty gallery).
    pub distance: f32,
    /// Index of the closest gallery entry, if any.
    pub index: Option<usize>,
    /// Label of the matched model (only set when `matched`).
    pub label: Option<String>,
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceModel], threshold: f32) -> MatchResult;
}

/// Nearest-neighbour matcher on Euclidean distance.
///
/// The closest entry is accepted only when it passes the tolerance predicate
/// (`distance <= tolerance`) and is strictly below `threshold`. Exact ties keep
/// the earliest gallery entry.
pub struct DistanceMatcher {
    pub tolerance: f32,
}

impl Default for DistanceMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_MATCH_TOLERANCE,
        }
    }
}

impl Matcher for DistanceMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceModel], threshold: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, model) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&model.embedding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= self.tolerance && best_dist < threshold => MatchResult {
                matched: true,
                distance: best_dist,
                index: Some(idx),
                label: Some(gallery[idx].label.clone()),
            },
            _ => MatchResult {
                matched: false,
                distance: best_dist,
                index: best_idx,
                label: None,
            },
        }
    }
}

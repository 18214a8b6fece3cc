//! rollcall-core — face detection, recognition, enrollment and the attendance ledger.
//!
//! Uses SCRFD for face detection and ArcFace for face description, both
//! running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod enrollment;
pub mod ledger;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use encoder::{encode_enrollment, EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use enrollment::{load_enrollment, Enrollment, EnrollmentImage};
pub use ledger::{AttendanceRecord, CsvLedger, Ledger, LedgerError, MarkOutcome};
pub use recognizer::FaceRecognizer;
pub use types::{
    BoundingBox, DistanceMatcher, Embedding, FaceModel, KnownFaces, MatchResult, Matcher,
    ARCFACE_MATCH_COSINE, DEFAULT_MATCH_THRESHOLD, DEFAULT_MATCH_TOLERANCE,
};

/// File name of the SCRFD detection model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// File name of the ArcFace recognition model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`, else
/// `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}

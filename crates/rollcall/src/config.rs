use std::path::PathBuf;

use rollcall_core::{
    ARCFACE_MODEL_FILE, DEFAULT_MATCH_THRESHOLD, DEFAULT_MATCH_TOLERANCE, SCRFD_MODEL_FILE,
};

const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Enrollment root: one subdirectory of photos per person.
    pub dataset_dir: PathBuf,
    /// CSV attendance store.
    pub ledger_path: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// A match must be strictly closer than this Euclidean distance.
    pub match_threshold: f32,
    /// Tolerance of the encoder's own match predicate.
    pub match_tolerance: f32,
    /// TrueType font used for overlay labels.
    pub font_path: PathBuf,
    /// Where the headless display writes the latest annotated frame, if anywhere.
    pub preview_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);
        let number = |key: &str, default: f32| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            dataset_dir: path("ROLLCALL_DATASET_DIR", PathBuf::from("dataset")),
            ledger_path: path("ROLLCALL_LEDGER_PATH", PathBuf::from("attendance.csv")),
            camera_device: lookup("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: path("ROLLCALL_MODEL_DIR", rollcall_core::default_model_dir()),
            match_threshold: number("ROLLCALL_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            match_tolerance: number("ROLLCALL_MATCH_TOLERANCE", DEFAULT_MATCH_TOLERANCE),
            font_path: path("ROLLCALL_FONT_PATH", PathBuf::from(DEFAULT_FONT_PATH)),
            preview_path: lookup("ROLLCALL_PREVIEW_PATH").map(PathBuf::from),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(SCRFD_MODEL_FILE)
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join(ARCFACE_MODEL_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[]);
        assert_eq!(config.dataset_dir, PathBuf::from("dataset"));
        assert_eq!(config.ledger_path, PathBuf::from("attendance.csv"));
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(config.match_tolerance, DEFAULT_MATCH_TOLERANCE);
        assert!((config.match_threshold - 1.0954).abs() < 1e-3);
        assert!(config.preview_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("ROLLCALL_DATASET_DIR", "/srv/faces"),
            ("ROLLCALL_MODEL_DIR", "/opt/models"),
            ("ROLLCALL_MATCH_THRESHOLD", "0.45"),
            ("ROLLCALL_PREVIEW_PATH", "/tmp/preview.png"),
        ]);
        assert_eq!(config.dataset_dir, PathBuf::from("/srv/faces"));
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(config.scrfd_model_path(), PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(config.arcface_model_path(), PathBuf::from("/opt/models/w600k_r50.onnx"));
        assert_eq!(config.preview_path, Some(PathBuf::from("/tmp/preview.png")));
    }

    #[test]
    fn test_unparseable_number_falls_back() {
        let config = config_with(&[("ROLLCALL_MATCH_TOLERANCE", "loose")]);
        assert_eq!(config.match_tolerance, DEFAULT_MATCH_TOLERANCE);
    }
}

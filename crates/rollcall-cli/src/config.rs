use anyhow::{Context, Result};
use rollcall_core::registration::DEFAULT_SAMPLES_PER_PERSON;
use rollcall_core::session::DEFAULT_CONFIDENCE_THRESHOLD;
use rollcall_core::{DetectionParams, SessionConfig, SAMPLE_SIZE};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";

/// Runtime configuration: `rollcall.toml` (or `$ROLLCALL_CONFIG`), then
/// `ROLLCALL_*` environment variables on top.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the `<id>_<name>` sample folders.
    pub dataset_dir: PathBuf,
    pub attendance_path: PathBuf,
    pub registration_log_path: PathBuf,
    /// Trained LBPH model.
    pub model_path: PathBuf,
    /// Haar cascade XML for frontal faces.
    pub cascade_path: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Recogniser distance at or above which a face is unknown.
    pub confidence_threshold: f64,
    pub scale_factor: f64,
    pub min_neighbors: u32,
    pub min_face_size: u32,
    /// Samples captured per registration.
    pub registration_images: usize,
    /// Show the preview window (needs a display).
    pub preview: bool,
}

impl Default for Config {
    fn default() -> Self {
        let detection = DetectionParams::default();
        Self {
            dataset_dir: PathBuf::from("face_dataset"),
            attendance_path: PathBuf::from("attendance.csv"),
            registration_log_path: PathBuf::from("registered_users.csv"),
            model_path: PathBuf::from("trained_model.yml"),
            cascade_path: PathBuf::from(
                "/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml",
            ),
            camera_device: "/dev/video0".to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            scale_factor: detection.scale_factor,
            min_neighbors: detection.min_neighbors,
            min_face_size: detection.min_face_size,
            registration_images: DEFAULT_SAMPLES_PER_PERSON,
            preview: true,
        }
    }
}

impl Config {
    /// Load the config file if present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else if let Some(missing) = explicit {
            anyhow::bail!("config file {} does not exist", missing.display());
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Apply `ROLLCALL_*` overrides looked up through `var`. Values that do
    /// not parse are ignored.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("ROLLCALL_DATASET_DIR") {
            self.dataset_dir = v.into();
        }
        if let Some(v) = var("ROLLCALL_ATTENDANCE_PATH") {
            self.attendance_path = v.into();
        }
        if let Some(v) = var("ROLLCALL_REGISTRATION_LOG") {
            self.registration_log_path = v.into();
        }
        if let Some(v) = var("ROLLCALL_MODEL_PATH") {
            self.model_path = v.into();
        }
        if let Some(v) = var("ROLLCALL_CASCADE_PATH") {
            self.cascade_path = v.into();
        }
        if let Some(v) = var("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        self.confidence_threshold =
            parsed(&var, "ROLLCALL_CONFIDENCE_THRESHOLD", self.confidence_threshold);
        self.scale_factor = parsed(&var, "ROLLCALL_SCALE_FACTOR", self.scale_factor);
        self.min_neighbors = parsed(&var, "ROLLCALL_MIN_NEIGHBORS", self.min_neighbors);
        self.min_face_size = parsed(&var, "ROLLCALL_MIN_FACE_SIZE", self.min_face_size);
        self.registration_images =
            parsed(&var, "ROLLCALL_REGISTRATION_IMAGES", self.registration_images);
        if let Some(v) = var("ROLLCALL_PREVIEW") {
            self.preview = v != "0";
        }
    }

    pub fn detection(&self) -> DetectionParams {
        DetectionParams {
            scale_factor: self.scale_factor,
            min_neighbors: self.min_neighbors,
            min_face_size: self.min_face_size,
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            confidence_threshold: self.confidence_threshold,
            detection: self.detection(),
            sample_size: SAMPLE_SIZE,
        }
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    var(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dataset_dir, PathBuf::from("face_dataset"));
        assert_eq!(config.attendance_path, PathBuf::from("attendance.csv"));
        assert_eq!(config.model_path, PathBuf::from("trained_model.yml"));
        assert_eq!(config.confidence_threshold, 60.0);
        assert_eq!(config.scale_factor, 1.3);
        assert_eq!(config.min_neighbors, 5);
        assert_eq!(config.registration_images, 20);
        assert_eq!(config.session().sample_size, 200);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(
            &path,
            "dataset_dir = \"/srv/faces\"\nconfidence_threshold = 45.5\npreview = false\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.dataset_dir, PathBuf::from("/srv/faces"));
        assert_eq!(config.confidence_threshold, 45.5);
        assert!(!config.preview);
        assert_eq!(config.camera_device, "/dev/video0");
    }

    #[test]
    fn test_bad_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(&path, "min_neighbors = \"lots\"").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ROLLCALL_CAMERA_DEVICE", "/dev/video2"),
            ("ROLLCALL_MIN_NEIGHBORS", "3"),
            ("ROLLCALL_SCALE_FACTOR", "not-a-number"),
            ("ROLLCALL_PREVIEW", "0"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.min_neighbors, 3);
        assert_eq!(config.scale_factor, 1.3);
        assert!(!config.preview);
        assert_eq!(config.detection().min_neighbors, 3);
    }
}

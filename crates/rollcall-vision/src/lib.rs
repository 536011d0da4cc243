//! rollcall-vision — OpenCV face detection and recognition backends.
//!
//! Haar-cascade detection, LBPH recognition/training and the HighGUI
//! preview window, exposed through the `rollcall-core` traits. Built only
//! with the `opencv` feature; without it every constructor returns
//! [`VisionError::Unavailable`] so the rest of the workspace still builds
//! and the bookkeeping commands still work.

use rollcall_core::{BackendError, FaceDetector, Preview, Recognizer, Trainer};
use std::path::Path;
use thiserror::Error;

#[cfg(feature = "opencv")]
mod convert;
#[cfg(feature = "opencv")]
pub mod haar;
#[cfg(feature = "opencv")]
pub mod highgui;
#[cfg(feature = "opencv")]
pub mod lbph;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("file not found: {0}")]
    ModelNotFound(String),
    #[error("could not load {0}")]
    InvalidModel(String),
    #[error("built without OpenCV support; rebuild with `--features opencv`")]
    Unavailable,
    #[cfg(feature = "opencv")]
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

impl From<VisionError> for BackendError {
    fn from(e: VisionError) -> Self {
        BackendError::Unavailable(e.to_string())
    }
}

/// Whether this build links a vision backend.
pub const fn available() -> bool {
    cfg!(feature = "opencv")
}

/// Load the Haar cascade at `cascade_path`.
pub fn load_detector(cascade_path: &Path) -> Result<Box<dyn FaceDetector>, VisionError> {
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(haar::HaarDetector::load(cascade_path)?))
    }
    #[cfg(not(feature = "opencv"))]
    {
        let _ = cascade_path;
        Err(VisionError::Unavailable)
    }
}

/// Load a trained LBPH model from `model_path`.
pub fn load_recognizer(model_path: &Path) -> Result<Box<dyn Recognizer>, VisionError> {
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(lbph::LbphRecognizer::load(model_path)?))
    }
    #[cfg(not(feature = "opencv"))]
    {
        let _ = model_path;
        Err(VisionError::Unavailable)
    }
}

/// Fresh, untrained LBPH recogniser for the training step.
pub fn new_trainer() -> Result<Box<dyn Trainer>, VisionError> {
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(lbph::LbphRecognizer::new()?))
    }
    #[cfg(not(feature = "opencv"))]
    {
        Err(VisionError::Unavailable)
    }
}

/// Open a preview window titled `title`. ESC in the window stops the loop.
pub fn open_preview(title: &str) -> Result<Box<dyn Preview>, VisionError> {
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(highgui::HighGuiPreview::open(title)?))
    }
    #[cfg(not(feature = "opencv"))]
    {
        let _ = title;
        Err(VisionError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_constructors_report_unavailable() {
        assert!(!available());
        let path = Path::new("trained_model.yml");
        assert!(matches!(load_recognizer(path), Err(VisionError::Unavailable)));
        assert!(matches!(load_detector(path), Err(VisionError::Unavailable)));
        assert!(matches!(new_trainer(), Err(VisionError::Unavailable)));
        assert!(matches!(open_preview("x"), Err(VisionError::Unavailable)));
    }

    #[test]
    fn test_error_maps_to_backend_error() {
        let err: BackendError = VisionError::ModelNotFound("m.yml".into()).into();
        assert!(err.to_string().contains("m.yml"));
    }
}

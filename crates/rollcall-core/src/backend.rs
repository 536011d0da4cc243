//! Seams to the camera, the vision library and the preview window.
//!
//! The session controller and the registration capture only talk to these
//! traits, so they can be driven by scripted fakes in tests.

use crate::sample::FaceSample;
use crate::training::TrainingSet;
use crate::types::{Annotation, BoundingBox, DetectionParams, Frame, Prediction};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("capture failed: {0}")]
pub struct CaptureError(pub String);

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("detection failed: {0}")]
    Detection(String),
    #[error("recognition failed: {0}")]
    Recognition(String),
    #[error("training failed: {0}")]
    Training(String),
    #[error("vision backend unavailable: {0}")]
    Unavailable(String),
}

/// Source of grayscale frames, typically a webcam.
pub trait FrameSource {
    /// Block until the next frame is available.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Release the device. Called once when a session or capture ends.
    fn release(&mut self) {}
}

/// Finds face regions in a frame.
pub trait FaceDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<BoundingBox>, BackendError>;
}

/// Trained face recogniser.
pub trait Recognizer {
    fn predict(&mut self, sample: &FaceSample) -> Result<Prediction, BackendError>;
}

/// Builds a recognition model file from labelled samples.
pub trait Trainer {
    fn train(&mut self, set: &TrainingSet, model_path: &Path) -> Result<(), BackendError>;
}

/// Operator response after a frame has been presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Continue,
    Stop,
}

/// Preview surface showing the live frame with region annotations.
pub trait Preview {
    fn present(&mut self, frame: &Frame, annotations: &[Annotation]) -> KeyAction;

    /// Tear down the surface. Called once when a session or capture ends.
    fn close(&mut self) {}
}

/// Preview that only logs; used when no window should be opened.
#[derive(Debug, Default)]
pub struct HeadlessPreview;

impl Preview for HeadlessPreview {
    fn present(&mut self, frame: &Frame, annotations: &[Annotation]) -> KeyAction {
        for a in annotations {
            tracing::trace!(seq = frame.sequence, region = ?a.region, text = %a.text, "region");
        }
        KeyAction::Continue
    }
}

//! Haar-cascade face detector.

use crate::convert::gray_mat;
use crate::VisionError;
use opencv::core::{Rect, Size, Vector};
use opencv::objdetect::{self, CascadeClassifier};
use opencv::prelude::*;
use rollcall_core::{BackendError, BoundingBox, DetectionParams, FaceDetector, Frame};
use std::path::Path;

/// Frontal-face Haar cascade (e.g. `haarcascade_frontalface_default.xml`).
pub struct HaarDetector {
    classifier: CascadeClassifier,
}

impl HaarDetector {
    pub fn load(cascade_path: &Path) -> Result<Self, VisionError> {
        let path = cascade_path.to_string_lossy();
        if !cascade_path.exists() {
            return Err(VisionError::ModelNotFound(path.into_owned()));
        }
        let classifier = CascadeClassifier::new(&path)?;
        if classifier.empty()? {
            return Err(VisionError::InvalidModel(path.into_owned()));
        }
        tracing::info!(path = %path, "Haar cascade loaded");
        Ok(Self { classifier })
    }
}

impl FaceDetector for HaarDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<BoundingBox>, BackendError> {
        let gray = gray_mat(&frame.data, frame.width, frame.height)
            .map_err(|e| BackendError::Detection(e.to_string()))?;

        let min = params.min_face_size as i32;
        let mut faces = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                params.scale_factor,
                params.min_neighbors as i32,
                objdetect::CASCADE_SCALE_IMAGE,
                Size::new(min, min),
                Size::new(0, 0),
            )
            .map_err(|e| BackendError::Detection(e.to_string()))?;

        Ok(faces
            .iter()
            .filter(|r| r.x >= 0 && r.y >= 0 && r.width > 0 && r.height > 0)
            .map(|r| BoundingBox::new(r.x as u32, r.y as u32, r.width as u32, r.height as u32))
            .collect())
    }
}

//! Local-binary-pattern histogram recogniser.
//!
//! `predict` reports a chi-square histogram distance as the confidence,
//! so lower is a closer match.

use crate::convert::gray_mat;
use crate::VisionError;
use opencv::core::{Mat, Ptr, Vector};
use opencv::face::{FaceRecognizerTrait, FaceRecognizerTraitConst, LBPHFaceRecognizer};
use rollcall_core::training::TrainingSet;
use rollcall_core::{BackendError, FaceSample, Prediction, Recognizer, Trainer};
use std::path::Path;

pub struct LbphRecognizer {
    inner: Ptr<LBPHFaceRecognizer>,
}

impl LbphRecognizer {
    /// Untrained recogniser with OpenCV's defaults (radius 1, 8 neighbours, 8x8 grid).
    pub fn new() -> Result<Self, VisionError> {
        Ok(Self {
            inner: LBPHFaceRecognizer::create_def()?,
        })
    }

    /// Load a model written by [`Trainer::train`].
    pub fn load(model_path: &Path) -> Result<Self, VisionError> {
        let path = model_path.to_string_lossy();
        if !model_path.exists() {
            return Err(VisionError::ModelNotFound(path.into_owned()));
        }
        let mut recognizer = Self::new()?;
        FaceRecognizerTrait::read(&mut recognizer.inner, &path)?;
        tracing::info!(path = %path, "LBPH model loaded");
        Ok(recognizer)
    }
}

impl Recognizer for LbphRecognizer {
    fn predict(&mut self, sample: &FaceSample) -> Result<Prediction, BackendError> {
        let mat = gray_mat(sample.pixels(), sample.width(), sample.height())
            .map_err(|e| BackendError::Recognition(e.to_string()))?;

        let mut label = -1;
        let mut confidence = 0.0;
        FaceRecognizerTraitConst::predict(&self.inner, &mat, &mut label, &mut confidence)
            .map_err(|e| BackendError::Recognition(e.to_string()))?;
        Ok(Prediction { label, confidence })
    }
}

impl Trainer for LbphRecognizer {
    fn train(&mut self, set: &TrainingSet, model_path: &Path) -> Result<(), BackendError> {
        let to_backend = |e: opencv::Error| BackendError::Training(e.to_string());

        let mut images = Vector::<Mat>::new();
        for sample in set.samples() {
            let mat = gray_mat(sample.pixels(), sample.width(), sample.height())
                .map_err(to_backend)?;
            images.push(mat);
        }
        let labels = Vector::<i32>::from_slice(set.labels());

        FaceRecognizerTrait::train(&mut self.inner, &images, &labels).map_err(to_backend)?;
        FaceRecognizerTraitConst::write(&self.inner, &model_path.to_string_lossy())
            .map_err(to_backend)?;
        Ok(())
    }
}

//! Training-set loading and model training orchestration.

use crate::backend::{BackendError, Trainer};
use crate::identity::dataset_entries;
use crate::sample::FaceSample;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("no usable training images under {0}; register a person first")]
    NoTrainingData(PathBuf),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Labelled face samples read from the dataset root.
#[derive(Debug, Default)]
pub struct TrainingSet {
    samples: Vec<FaceSample>,
    labels: Vec<i32>,
    skipped_files: usize,
}

impl TrainingSet {
    /// Load every decodable image under each `<label>_<name>` folder.
    ///
    /// Malformed folders and unreadable files are skipped with a warning.
    pub fn load(root: &Path, sample_size: u32) -> Result<Self, TrainingError> {
        let mut set = TrainingSet::default();

        for entry in dataset_entries(root)? {
            let label = match entry.parsed {
                Ok((label, _)) => label,
                Err(reason) => {
                    tracing::warn!(folder = %entry.name, %reason, "skipping invalid folder");
                    continue;
                }
            };

            let mut files: Vec<PathBuf> = std::fs::read_dir(&entry.path)?
                .filter_map(|f| f.ok().map(|f| f.path()))
                .filter(|p| p.is_file())
                .collect();
            files.sort();

            for file in files {
                match FaceSample::load(&file, sample_size) {
                    Ok(sample) => {
                        tracing::debug!(path = %file.display(), label, "loaded sample");
                        set.samples.push(sample);
                        set.labels.push(label);
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %file.display(),
                            error = %e,
                            "skipping unreadable image"
                        );
                        set.skipped_files += 1;
                    }
                }
            }
        }

        if set.samples.is_empty() {
            return Err(TrainingError::NoTrainingData(root.to_path_buf()));
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[FaceSample] {
        &self.samples
    }

    /// Labels, parallel to [`samples`](Self::samples).
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn skipped_files(&self) -> usize {
        self.skipped_files
    }

    /// Number of distinct labels.
    pub fn identities(&self) -> usize {
        self.labels.iter().collect::<BTreeSet<_>>().len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingReport {
    pub images: usize,
    pub identities: usize,
    pub skipped_files: usize,
    pub model_path: PathBuf,
}

/// Load the dataset and have `trainer` write a model to `model_path`.
pub fn train_model(
    trainer: &mut dyn Trainer,
    dataset_root: &Path,
    model_path: &Path,
    sample_size: u32,
) -> Result<TrainingReport, TrainingError> {
    let set = TrainingSet::load(dataset_root, sample_size)?;
    tracing::info!(images = set.len(), identities = set.identities(), "training model");

    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    trainer.train(&set, model_path)?;
    tracing::info!(path = %model_path.display(), "model saved");

    Ok(TrainingReport {
        images: set.len(),
        identities: set.identities(),
        skipped_files: set.skipped_files(),
        model_path: model_path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::fs;

    fn write_sample(path: &Path, value: u8) {
        GrayImage::from_pixel(32, 32, image::Luma([value])).save(path).unwrap();
    }

    struct RecordingTrainer {
        seen: Vec<(usize, Vec<i32>)>,
    }

    impl Trainer for RecordingTrainer {
        fn train(&mut self, set: &TrainingSet, model_path: &Path) -> Result<(), BackendError> {
            self.seen.push((set.len(), set.labels().to_vec()));
            fs::write(model_path, b"model").map_err(|e| BackendError::Training(e.to_string()))
        }
    }

    #[test]
    fn test_load_labels_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("1_Ann")).unwrap();
        fs::create_dir_all(root.join("2_Bob")).unwrap();
        fs::create_dir_all(root.join("bogus")).unwrap();
        write_sample(&root.join("1_Ann/0.png"), 10);
        write_sample(&root.join("1_Ann/1.png"), 20);
        write_sample(&root.join("2_Bob/0.png"), 30);
        write_sample(&root.join("bogus/0.png"), 40);
        fs::write(root.join("2_Bob/notes.txt"), b"not an image").unwrap();

        let set = TrainingSet::load(root, 50).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.labels(), &[1, 1, 2]);
        assert_eq!(set.identities(), 2);
        assert_eq!(set.skipped_files(), 1);
        assert!(set.samples().iter().all(|s| s.width() == 50 && s.height() == 50));
    }

    #[test]
    fn test_empty_dataset_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("1_Ann")).unwrap();
        let err = TrainingSet::load(dir.path(), 50).unwrap_err();
        assert!(matches!(err, TrainingError::NoTrainingData(_)));
    }

    #[test]
    fn test_train_model_writes_through_trainer() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("face_dataset");
        fs::create_dir_all(root.join("5_Cy")).unwrap();
        write_sample(&root.join("5_Cy/0.png"), 99);

        let model = dir.path().join("models/trained_model.yml");
        let mut trainer = RecordingTrainer { seen: vec![] };
        let report = train_model(&mut trainer, &root, &model, 50).unwrap();

        assert_eq!(report.images, 1);
        assert_eq!(report.identities, 1);
        assert_eq!(trainer.seen, vec![(1, vec![5])]);
        assert!(model.exists());
    }
}

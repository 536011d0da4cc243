//! Registration capture: collect face samples for a new person.
//!
//! Samples land in `<dataset>/<id>_<name>/<n>.jpg`, the layout the identity
//! directory and the training loader read back.

use crate::backend::{FaceDetector, FrameSource, KeyAction, Preview};
use crate::identity::parse_folder_name;
use crate::job::CancelToken;
use crate::sample::FaceSample;
use crate::session::{Clock, SystemClock};
use crate::store::{AttendanceRow, RegistrationLog, StoreError};
use crate::types::{Annotation, DetectionParams, Identity};
use std::path::PathBuf;
use thiserror::Error;

/// Samples captured per registration unless configured otherwise.
pub const DEFAULT_SAMPLES_PER_PERSON: usize = 20;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("invalid registration: {0}")]
    InvalidRequest(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write sample: {0}")]
    Image(#[from] image::ImageError),
    #[error("registration log: {0}")]
    Log(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub id: String,
    pub name: String,
    pub samples: usize,
}

impl RegistrationRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            samples: DEFAULT_SAMPLES_PER_PERSON,
        }
    }

    /// The person being registered, checked against the dataset convention.
    ///
    /// The id is normalised to the label's decimal form (`007` becomes `7`),
    /// matching what the identity directory reads back.
    pub fn identity(&self) -> Result<Identity, RegistrationError> {
        let id = self.id.trim();
        let name = self.name.trim();
        if id.is_empty() || name.is_empty() {
            return Err(RegistrationError::InvalidRequest(
                "both id and name are required".into(),
            ));
        }
        if self.samples == 0 {
            return Err(RegistrationError::InvalidRequest(
                "sample count must be at least 1".into(),
            ));
        }
        let folder = format!("{id}_{name}");
        let (_, identity) = parse_folder_name(&folder)
            .map_err(|e| RegistrationError::InvalidRequest(format!("{folder}: {e}")))?;
        Ok(identity)
    }

    pub fn folder_name(&self) -> Result<String, RegistrationError> {
        let identity = self.identity()?;
        Ok(format!("{}_{}", identity.id, identity.name))
    }
}

/// Why a capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEnd {
    TargetReached,
    Cancelled,
    CaptureFailed(String),
}

#[derive(Debug, Clone)]
pub struct RegistrationReport {
    pub folder: PathBuf,
    pub images: usize,
    pub ended: CaptureEnd,
}

pub struct Registrar<C = SystemClock> {
    dataset_root: PathBuf,
    log: RegistrationLog,
    detection: DetectionParams,
    sample_size: u32,
    clock: C,
}

impl Registrar<SystemClock> {
    pub fn new(
        dataset_root: impl Into<PathBuf>,
        log: RegistrationLog,
        detection: DetectionParams,
        sample_size: u32,
    ) -> Self {
        Self::with_clock(dataset_root, log, detection, sample_size, SystemClock)
    }
}

impl<C: Clock> Registrar<C> {
    pub fn with_clock(
        dataset_root: impl Into<PathBuf>,
        log: RegistrationLog,
        detection: DetectionParams,
        sample_size: u32,
        clock: C,
    ) -> Self {
        Self {
            dataset_root: dataset_root.into(),
            log,
            detection,
            sample_size,
            clock,
        }
    }

    /// Capture up to `request.samples` face crops for one person.
    ///
    /// Ends on reaching the target, on cancellation, or when the camera
    /// fails; in every case the registration is logged with whatever was
    /// captured, and the camera and preview are released.
    pub fn capture(
        &self,
        request: &RegistrationRequest,
        camera: &mut dyn FrameSource,
        detector: &mut dyn FaceDetector,
        preview: &mut dyn Preview,
        cancel: &CancelToken,
    ) -> Result<RegistrationReport, RegistrationError> {
        let identity = request.identity()?;
        let folder = self
            .dataset_root
            .join(format!("{}_{}", identity.id, identity.name));
        std::fs::create_dir_all(&folder)?;
        tracing::info!(
            folder = %folder.display(),
            target = request.samples,
            "registration started"
        );

        let result = self.capture_loop(request, &folder, camera, detector, preview, cancel);
        camera.release();
        preview.close();
        let (images, ended) = result?;

        self.log.record(AttendanceRow::new(
            identity.id.as_str(),
            identity.name.as_str(),
            self.clock.now(),
        ))?;
        tracing::info!(
            folder = %folder.display(),
            images,
            ended = ?ended,
            "registration finished"
        );

        Ok(RegistrationReport {
            folder,
            images,
            ended,
        })
    }

    fn capture_loop(
        &self,
        request: &RegistrationRequest,
        folder: &std::path::Path,
        camera: &mut dyn FrameSource,
        detector: &mut dyn FaceDetector,
        preview: &mut dyn Preview,
        cancel: &CancelToken,
    ) -> Result<(usize, CaptureEnd), RegistrationError> {
        let mut count = 0usize;
        loop {
            let frame = match camera.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        captured = count,
                        "camera read failed; ending registration"
                    );
                    return Ok((count, CaptureEnd::CaptureFailed(e.to_string())));
                }
            };

            let regions = match detector.detect(&frame, &self.detection) {
                Ok(regions) => regions,
                Err(e) => {
                    tracing::warn!(
                        seq = frame.sequence,
                        error = %e,
                        "detection failed; skipping frame"
                    );
                    Vec::new()
                }
            };

            let mut annotations = Vec::with_capacity(regions.len());
            for region in regions {
                if count >= request.samples {
                    break;
                }
                let Some(sample) = FaceSample::from_region(&frame, &region, self.sample_size) else {
                    continue;
                };
                let path = folder.join(format!("{count}.jpg"));
                sample.save(&path)?;
                tracing::debug!(path = %path.display(), "saved sample");
                count += 1;
                annotations.push(Annotation {
                    region,
                    text: format!("{count}/{}", request.samples),
                });
            }

            if count >= request.samples {
                return Ok((count, CaptureEnd::TargetReached));
            }
            if preview.present(&frame, &annotations) == KeyAction::Stop || cancel.is_cancelled() {
                return Ok((count, CaptureEnd::Cancelled));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, CaptureError};
    use crate::identity::IdentityDirectory;
    use crate::types::{BoundingBox, Frame};
    use chrono::{NaiveDate, NaiveDateTime};

    struct LoopCamera {
        remaining: usize,
        released: bool,
    }

    impl FrameSource for LoopCamera {
        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            if self.remaining == 0 {
                return Err(CaptureError("no more frames".into()));
            }
            self.remaining -= 1;
            Ok(Frame::new(vec![128u8; 160 * 120], 160, 120, self.remaining as u32))
        }

        fn release(&mut self) {
            self.released = true;
        }
    }

    /// Always reports the same `faces` regions.
    struct StaticDetector {
        faces: Vec<BoundingBox>,
    }

    impl FaceDetector for StaticDetector {
        fn detect(
            &mut self,
            _frame: &Frame,
            _params: &DetectionParams,
        ) -> Result<Vec<BoundingBox>, BackendError> {
            Ok(self.faces.clone())
        }
    }

    #[derive(Default)]
    struct CountingPreview {
        frames: usize,
        closed: bool,
    }

    impl Preview for CountingPreview {
        fn present(&mut self, _frame: &Frame, _annotations: &[Annotation]) -> KeyAction {
            self.frames += 1;
            KeyAction::Continue
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    struct FixedClock(NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    fn registrar(root: &std::path::Path) -> Registrar<FixedClock> {
        let at = NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Registrar::with_clock(
            root.join("face_dataset"),
            RegistrationLog::new(root.join("registered_users.csv")),
            DetectionParams::default(),
            64,
            FixedClock(at),
        )
    }

    #[test]
    fn test_capture_stops_at_target() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = registrar(dir.path());
        let mut camera = LoopCamera {
            remaining: 100,
            released: false,
        };
        let mut detector = StaticDetector {
            faces: vec![BoundingBox::new(0, 0, 40, 40), BoundingBox::new(60, 10, 40, 40)],
        };
        let mut preview = CountingPreview::default();
        let request = RegistrationRequest {
            samples: 5,
            ..RegistrationRequest::new("7", "Alice")
        };

        let report = registrar
            .capture(&request, &mut camera, &mut detector, &mut preview, &CancelToken::new())
            .unwrap();

        assert_eq!(report.images, 5);
        assert_eq!(report.ended, CaptureEnd::TargetReached);
        assert_eq!(report.folder, dir.path().join("face_dataset/7_Alice"));
        let saved = std::fs::read_dir(&report.folder).unwrap().count();
        assert_eq!(saved, 5);
        assert!(report.folder.join("4.jpg").exists());
        assert!(camera.released);
        assert!(preview.closed);

        let log = RegistrationLog::new(dir.path().join("registered_users.csv"));
        let rows = log.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].id.as_str(), rows[0].name.as_str()), ("7", "Alice"));

        let directory = IdentityDirectory::scan(&dir.path().join("face_dataset")).unwrap();
        assert_eq!(directory.resolve(7), Some(&Identity::new("7", "Alice")));
    }

    #[test]
    fn test_camera_failure_still_logs() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = registrar(dir.path());
        let mut camera = LoopCamera {
            remaining: 2,
            released: false,
        };
        let mut detector = StaticDetector {
            faces: vec![BoundingBox::new(0, 0, 40, 40)],
        };
        let mut preview = CountingPreview::default();
        let request = RegistrationRequest::new("3", "Bob");

        let report = registrar
            .capture(&request, &mut camera, &mut detector, &mut preview, &CancelToken::new())
            .unwrap();

        assert_eq!(report.images, 2);
        assert!(matches!(report.ended, CaptureEnd::CaptureFailed(_)));
        assert!(camera.released);
        assert_eq!(
            RegistrationLog::new(dir.path().join("registered_users.csv"))
                .rows()
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_cancel_ends_capture() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = registrar(dir.path());
        let mut camera = LoopCamera {
            remaining: 100,
            released: false,
        };
        let mut detector = StaticDetector { faces: vec![] };
        let mut preview = CountingPreview::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = registrar
            .capture(
                &RegistrationRequest::new("1", "Ann"),
                &mut camera,
                &mut detector,
                &mut preview,
                &cancel,
            )
            .unwrap();

        assert_eq!(report.images, 0);
        assert_eq!(report.ended, CaptureEnd::Cancelled);
        assert_eq!(preview.frames, 1);
    }

    #[test]
    fn test_padded_id_is_normalised() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = registrar(dir.path());
        let mut camera = LoopCamera {
            remaining: 10,
            released: false,
        };
        let mut detector = StaticDetector {
            faces: vec![BoundingBox::new(0, 0, 40, 40)],
        };
        let mut preview = CountingPreview::default();
        let request = RegistrationRequest {
            samples: 2,
            ..RegistrationRequest::new(" 007 ", "Alice")
        };
        assert_eq!(request.folder_name().unwrap(), "7_Alice");

        let report = registrar
            .capture(&request, &mut camera, &mut detector, &mut preview, &CancelToken::new())
            .unwrap();

        assert_eq!(report.folder, dir.path().join("face_dataset/7_Alice"));
        let rows = RegistrationLog::new(dir.path().join("registered_users.csv"))
            .rows()
            .unwrap();
        assert_eq!(rows[0].id, "7");
        let directory = IdentityDirectory::scan(&dir.path().join("face_dataset")).unwrap();
        assert_eq!(directory.resolve(7).map(|p| p.id.as_str()), Some(rows[0].id.as_str()));
    }

    #[test]
    fn test_rejects_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = registrar(dir.path());
        let mut camera = LoopCamera {
            remaining: 1,
            released: false,
        };
        let mut detector = StaticDetector { faces: vec![] };
        let mut preview = CountingPreview::default();

        for request in [
            RegistrationRequest::new("", "Ann"),
            RegistrationRequest::new("4", "  "),
            RegistrationRequest::new("abc", "Ann"),
        ] {
            let err = registrar
                .capture(&request, &mut camera, &mut detector, &mut preview, &CancelToken::new())
                .unwrap_err();
            assert!(matches!(err, RegistrationError::InvalidRequest(_)), "got {err:?}");
        }
        assert!(!dir.path().join("face_dataset").exists());
        assert!(!camera.released);
    }
}

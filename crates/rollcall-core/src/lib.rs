//! rollcall-core — attendance bookkeeping around face recognition.
//!
//! Maps recogniser labels to registered people, keeps the once-per-day
//! attendance table, and drives the capture → detect → recognise → log
//! session loop. Camera, vision library and preview window sit behind the
//! traits in [`backend`].

pub mod backend;
pub mod identity;
pub mod job;
pub mod registration;
pub mod sample;
pub mod session;
pub mod store;
pub mod training;
pub mod types;

pub use backend::{
    BackendError, CaptureError, FaceDetector, FrameSource, HeadlessPreview, KeyAction, Preview,
    Recognizer, Trainer,
};
pub use identity::{IdentityDirectory, SkippedFolder};
pub use job::{CancelToken, JobError, JobHandle};
pub use sample::{FaceSample, SAMPLE_SIZE};
pub use session::{SessionConfig, SessionController, SessionIo, SessionSummary, StopReason};
pub use store::{AppendOutcome, AttendanceRow, AttendanceStore, RegistrationLog, StoreError};
pub use types::{
    Annotation, BoundingBox, Classification, DetectionParams, Frame, Identity, Prediction,
};

//! Attendance session controller.
//!
//! Reads frames until cancelled or the camera fails. Every detected face is
//! cropped, recognised, gated on confidence and resolved to an identity;
//! the first sighting of an identity in a session is written through to the
//! attendance store. The store decides whether a row is actually added: it
//! holds at most one row per id per day, across restarts.

use crate::backend::{FaceDetector, FrameSource, KeyAction, Preview, Recognizer};
use crate::identity::IdentityDirectory;
use crate::job::CancelToken;
use crate::sample::{FaceSample, SAMPLE_SIZE};
use crate::store::{AppendOutcome, AttendanceStore, StoreError};
use crate::types::{Annotation, Classification, DetectionParams, Frame, Prediction};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Recogniser distance at or above which a face counts as unknown.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub confidence_threshold: f64,
    pub detection: DetectionParams,
    pub sample_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            detection: DetectionParams::default(),
            sample_size: SAMPLE_SIZE,
        }
    }
}

/// Source of the local wall-clock time stamped on attendance rows.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Operator stop: cancel token or preview key.
    Cancelled,
    /// The camera could not deliver a frame.
    CaptureFailed(String),
    /// The attendance table could not be created.
    StoreUnavailable(String),
    /// `run` was called on a controller that had already run.
    AlreadyStopped,
}

/// What a finished session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: u64,
    pub faces: u64,
    pub rows_written: u64,
    pub marked: usize,
    pub reason: StopReason,
}

/// The camera, vision backends and preview driven by one session.
pub struct SessionIo<'a> {
    pub camera: &'a mut dyn FrameSource,
    pub detector: &'a mut dyn FaceDetector,
    pub recognizer: &'a mut dyn Recognizer,
    pub preview: &'a mut dyn Preview,
}

#[derive(Default)]
struct Counters {
    frames: u64,
    faces: u64,
    rows_written: u64,
}

pub struct SessionController<C = SystemClock> {
    config: SessionConfig,
    directory: IdentityDirectory,
    store: AttendanceStore,
    clock: C,
    marked: HashSet<String>,
    state: SessionState,
}

impl SessionController<SystemClock> {
    pub fn new(
        config: SessionConfig,
        directory: IdentityDirectory,
        store: AttendanceStore,
    ) -> Self {
        Self::with_clock(config, directory, store, SystemClock)
    }
}

impl<C: Clock> SessionController<C> {
    pub fn with_clock(
        config: SessionConfig,
        directory: IdentityDirectory,
        store: AttendanceStore,
        clock: C,
    ) -> Self {
        Self {
            config,
            directory,
            store,
            clock,
            marked: HashSet::new(),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether `id` has been marked during this session.
    pub fn is_marked(&self, id: &str) -> bool {
        self.marked.contains(id)
    }

    pub fn marked(&self) -> &HashSet<String> {
        &self.marked
    }

    pub fn directory(&self) -> &IdentityDirectory {
        &self.directory
    }

    /// Apply the confidence gate, then resolve the label.
    pub fn classify(&self, prediction: Prediction) -> Classification {
        if prediction.confidence >= self.config.confidence_threshold {
            return Classification::Unknown;
        }
        match self.directory.resolve(prediction.label) {
            Some(identity) => Classification::Known(identity.clone()),
            None => Classification::Unknown,
        }
    }

    /// Run the session until cancelled or the camera fails.
    ///
    /// The camera is released and the preview closed on every exit path.
    pub fn run(&mut self, io: SessionIo<'_>, cancel: &CancelToken) -> SessionSummary {
        let SessionIo {
            camera,
            detector,
            recognizer,
            preview,
        } = io;
        let mut counters = Counters::default();

        if self.state != SessionState::Idle {
            tracing::warn!(state = ?self.state, "session already ran");
            return self.summary(counters, StopReason::AlreadyStopped);
        }
        self.state = SessionState::Running;
        tracing::info!(
            identities = self.directory.len(),
            threshold = self.config.confidence_threshold,
            store = %self.store.path().display(),
            "attendance session started"
        );

        let reason = match self.store.ensure_initialized() {
            Ok(()) => self.run_loop(
                &mut *camera,
                detector,
                recognizer,
                &mut *preview,
                cancel,
                &mut counters,
            ),
            Err(e) => {
                tracing::error!(error = %e, "cannot initialise attendance table");
                StopReason::StoreUnavailable(e.to_string())
            }
        };

        camera.release();
        preview.close();
        self.state = SessionState::Stopped;

        let summary = self.summary(counters, reason);
        tracing::info!(
            frames = summary.frames,
            faces = summary.faces,
            rows_written = summary.rows_written,
            marked = summary.marked,
            reason = ?summary.reason,
            "attendance session stopped"
        );
        summary
    }

    fn run_loop(
        &mut self,
        camera: &mut dyn FrameSource,
        detector: &mut dyn FaceDetector,
        recognizer: &mut dyn Recognizer,
        preview: &mut dyn Preview,
        cancel: &CancelToken,
        counters: &mut Counters,
    ) -> StopReason {
        loop {
            let frame = match camera.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "camera read failed; stopping session");
                    return StopReason::CaptureFailed(e.to_string());
                }
            };
            counters.frames += 1;

            let annotations = self.process_frame(&frame, detector, recognizer, counters);

            let key = preview.present(&frame, &annotations);
            if key == KeyAction::Stop || cancel.is_cancelled() {
                return StopReason::Cancelled;
            }
        }
    }

    fn process_frame(
        &mut self,
        frame: &Frame,
        detector: &mut dyn FaceDetector,
        recognizer: &mut dyn Recognizer,
        counters: &mut Counters,
    ) -> Vec<Annotation> {
        let regions = match detector.detect(frame, &self.config.detection) {
            Ok(regions) => regions,
            Err(e) => {
                tracing::warn!(
                    seq = frame.sequence,
                    error = %e,
                    "detection failed; skipping frame"
                );
                return Vec::new();
            }
        };
        counters.faces += regions.len() as u64;

        let mut annotations = Vec::with_capacity(regions.len());
        for region in regions {
            let sample = FaceSample::from_region(frame, &region, self.config.sample_size);
            let classification = match sample.map(|s| recognizer.predict(&s)) {
                Some(Ok(prediction)) => {
                    tracing::trace!(
                        label = prediction.label,
                        confidence = prediction.confidence,
                        "prediction"
                    );
                    self.classify(prediction)
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "recognition failed for region");
                    Classification::Unknown
                }
                None => Classification::Unknown,
            };

            if let Classification::Known(identity) = &classification {
                if !self.marked.contains(&identity.id) {
                    if self.mark(&identity.id, &identity.name) {
                        counters.rows_written += 1;
                    }
                    self.marked.insert(identity.id.clone());
                }
            }

            annotations.push(Annotation {
                region,
                text: classification.label_text(),
            });
        }
        annotations
    }

    /// Write an attendance row; returns whether one was added.
    ///
    /// Store failures are reported and the row is dropped.
    fn mark(&self, id: &str, name: &str) -> bool {
        let now = self.clock.now();
        match self.store.append(id, name, now.date(), now.time()) {
            Ok(AppendOutcome::Written) => {
                tracing::info!(id, name, time = %now.format("%H:%M:%S"), "marked present");
                true
            }
            Ok(AppendOutcome::AlreadyPresent) => {
                tracing::debug!(id, name, "already marked today");
                false
            }
            Err(StoreError::Busy(path)) => {
                tracing::warn!(
                    id,
                    path = %path.display(),
                    "attendance table is busy; close it in any other program"
                );
                false
            }
            Err(e) => {
                tracing::error!(id, error = %e, "failed to write attendance row");
                false
            }
        }
    }

    fn summary(&self, counters: Counters, reason: StopReason) -> SessionSummary {
        SessionSummary {
            frames: counters.frames,
            faces: counters.faces,
            rows_written: counters.rows_written,
            marked: self.marked.len(),
            reason,
        }
    }
}

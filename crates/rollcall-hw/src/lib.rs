//! rollcall-hw — Webcam capture for the attendance session.
//!
//! Provides V4L2 camera access producing grayscale frames for the
//! `rollcall-core` session loop and registration capture.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, PixelFormat};

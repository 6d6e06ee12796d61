//! bantam-hw — Hardware abstraction for webcam capture.
//!
//! Provides V4L2-based camera access producing RGB frames for the
//! detection pipeline.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::Frame;

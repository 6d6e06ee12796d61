//! bantam-core — Detection and tracking engine.
//!
//! Runs a generic object detector (person boxes) and a hand-landmark
//! model via ONNX Runtime, and derives character orientation and wave
//! gestures from their output.

pub mod hand;
pub mod person;
pub mod tracking;
pub mod types;

pub use hand::HandLandmarker;
pub use person::PersonDetector;
pub use tracking::{Orientation, OrientationTracker, WaveGate};
pub use types::{HandLandmarks, Landmark, PersonBox};

use std::path::PathBuf;

/// Default directory for ONNX model files.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("bantam/models")
}

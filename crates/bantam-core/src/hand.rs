//! Hand-landmark model via ONNX Runtime.
//!
//! Runs a 21-point hand landmark model (MediaPipe-style export) over the
//! full frame. At most one hand is tracked; when the presence score is
//! below threshold the frame yields no hands.

use crate::types::{HandLandmarks, Landmark, HAND_LANDMARK_COUNT};
use image::{imageops::FilterType, ImageBuffer, Rgb};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const HAND_INPUT_SIZE: u32 = 224;
const HAND_PRESENCE_THRESHOLD: f32 = 0.5;
/// Landmark tensor length: 21 points × (x, y, z).
const HAND_OUTPUT_LEN: usize = HAND_LANDMARK_COUNT * 3;

#[derive(Error, Debug)]
pub enum HandLandmarkerError {
    #[error("model file not found: {0} — place a hand landmark export in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer too short: expected {expected}, got {actual}")]
    BadFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// 21-point hand landmark model.
pub struct HandLandmarker {
    session: Session,
    landmarks_idx: usize,
    presence_idx: usize,
}

impl HandLandmarker {
    /// Load the hand landmark ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, HandLandmarkerError> {
        if !Path::new(model_path).exists() {
            return Err(HandLandmarkerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(path = model_path, outputs = ?names, "loaded hand landmark model");

        // "landmarks" and "hand_presence" in recent exports; older ones
        // only expose positional ordering [0]=landmarks, [1]=presence.
        let landmarks_idx = names.iter().position(|n| n.contains("landmark")).unwrap_or(0);
        let presence_idx = names
            .iter()
            .position(|n| n.contains("presence") || n.contains("score"))
            .unwrap_or(1);

        Ok(Self {
            session,
            landmarks_idx,
            presence_idx,
        })
    }

    /// Load with a bounded retry: hand model fetches are the flakiest
    /// part of startup, so transient failures get `attempts` tries with
    /// a fixed `backoff` between them.
    pub fn load_with_retry(
        model_path: &str,
        attempts: usize,
        backoff: Duration,
    ) -> Result<Self, HandLandmarkerError> {
        retry(attempts, backoff, || Self::load(model_path))
    }

    /// Run the landmark model on an RGB24 frame.
    ///
    /// Returns at most one hand's landmarks, normalized to [0, 1] frame
    /// coordinates.
    pub fn process(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<HandLandmarks>, HandLandmarkerError> {
        let input = self.preprocess(frame, width, height)?;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, presence) = outputs[self.presence_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| HandLandmarkerError::InferenceFailed(format!("presence: {e}")))?;
        if presence.first().copied().unwrap_or(0.0) < HAND_PRESENCE_THRESHOLD {
            return Ok(Vec::new());
        }

        let (_, raw) = outputs[self.landmarks_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| HandLandmarkerError::InferenceFailed(format!("landmarks: {e}")))?;

        match decode_landmarks(raw, HAND_INPUT_SIZE as f32) {
            Some(hand) => Ok(vec![hand]),
            None => Err(HandLandmarkerError::InferenceFailed(format!(
                "landmark tensor too short: expected {HAND_OUTPUT_LEN}, got {}",
                raw.len()
            ))),
        }
    }

    /// Resize the RGB frame to the model input square, NHWC float in [0, 1].
    fn preprocess(
        &self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Array4<f32>, HandLandmarkerError> {
        let expected = (width * height * 3) as usize;
        if frame.len() < expected {
            return Err(HandLandmarkerError::BadFrame {
                expected,
                actual: frame.len(),
            });
        }

        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(width, height, frame[..expected].to_vec()).ok_or(
                HandLandmarkerError::BadFrame {
                    expected,
                    actual: frame.len(),
                },
            )?;
        let resized =
            image::imageops::resize(&img, HAND_INPUT_SIZE, HAND_INPUT_SIZE, FilterType::Triangle);

        let size = HAND_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            tensor[[0, y as usize, x as usize, 0]] = pixel[0] as f32 / 255.0;
            tensor[[0, y as usize, x as usize, 1]] = pixel[1] as f32 / 255.0;
            tensor[[0, y as usize, x as usize, 2]] = pixel[2] as f32 / 255.0;
        }

        Ok(tensor)
    }
}

/// Decode a flat [x, y, z; 21] tensor in input-pixel coordinates into
/// normalized landmarks. Returns None when the tensor is too short.
fn decode_landmarks(raw: &[f32], input_size: f32) -> Option<HandLandmarks> {
    if raw.len() < HAND_OUTPUT_LEN {
        return None;
    }

    let mut points = [Landmark { x: 0.0, y: 0.0, z: 0.0 }; HAND_LANDMARK_COUNT];
    for (i, point) in points.iter_mut().enumerate() {
        *point = Landmark {
            x: raw[i * 3] / input_size,
            y: raw[i * 3 + 1] / input_size,
            z: raw[i * 3 + 2] / input_size,
        };
    }

    Some(HandLandmarks { points })
}

/// Call `f` up to `attempts` times, sleeping `backoff` between failures.
///
/// Returns the first success; after the final attempt the last error is
/// returned. `attempts` must be at least 1.
fn retry<T, E: std::fmt::Display>(
    attempts: usize,
    backoff: Duration,
    mut f: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let attempts = attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::warn!(attempt, attempts, error = %e, "hand model load attempt failed");
                last_err = Some(e);
                if attempt < attempts {
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    // attempts >= 1 guarantees at least one iteration ran.
    Err(last_err.unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MIDDLE_FINGERTIP, WRIST};

    #[test]
    fn test_decode_landmarks_normalizes() {
        let mut raw = vec![0.0f32; HAND_OUTPUT_LEN];
        // wrist at (112, 224), fingertip at (112, 56)
        raw[WRIST * 3] = 112.0;
        raw[WRIST * 3 + 1] = 224.0;
        raw[MIDDLE_FINGERTIP * 3] = 112.0;
        raw[MIDDLE_FINGERTIP * 3 + 1] = 56.0;

        let hand = decode_landmarks(&raw, 224.0).unwrap();
        assert!((hand.wrist().x - 0.5).abs() < 1e-6);
        assert!((hand.wrist().y - 1.0).abs() < 1e-6);
        assert!((hand.middle_fingertip().y - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_decode_landmarks_short_tensor() {
        let raw = vec![0.0f32; HAND_OUTPUT_LEN - 1];
        assert!(decode_landmarks(&raw, 224.0).is_none());
    }

    #[test]
    fn test_retry_success_second_attempt_stops() {
        let mut calls = 0;
        let result: Result<u32, String> = retry(3, Duration::ZERO, || {
            calls += 1;
            if calls < 2 {
                Err("transient".to_string())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        // Success on attempt 2 must not run a 3rd attempt.
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_retry_exhausts_exactly_n_attempts() {
        let mut calls = 0;
        let result: Result<u32, String> = retry(3, Duration::ZERO, || {
            calls += 1;
            Err(format!("fail {calls}"))
        });
        assert_eq!(result.unwrap_err(), "fail 3");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_first_attempt_success() {
        let mut calls = 0;
        let result: Result<u32, String> = retry(3, Duration::ZERO, || {
            calls += 1;
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retry_zero_attempts_clamped_to_one() {
        let mut calls = 0;
        let result: Result<u32, String> = retry(0, Duration::ZERO, || {
            calls += 1;
            Err("nope".to_string())
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}

//! SSD-style object detector via ONNX Runtime.
//!
//! Runs a COCO-trained single-shot detector and surfaces `person`
//! detections only. The model contract is the common SSD export shape:
//! one NHWC uint8 image tensor in, three float tensors out — normalized
//! corner boxes, class ids, and confidence scores.

use crate::types::PersonBox;
use image::{imageops::FilterType, ImageBuffer, Rgb};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const SSD_INPUT_SIZE: u32 = 320;
const SSD_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// COCO class id for "person" in the SSD export label map.
const COCO_PERSON_CLASS: f32 = 1.0;

#[derive(Error, Debug)]
pub enum PersonDetectorError {
    #[error("model file not found: {0} — place an SSD COCO export in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer too short: expected {expected}, got {actual}")]
    BadFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Output tensor indices: (boxes_idx, classes_idx, scores_idx).
type OutputIndices = (usize, usize, usize);

/// COCO SSD person detector.
pub struct PersonDetector {
    session: Session,
    /// Output indices for (boxes, classes, scores). Discovered by name
    /// at load time; falls back to positional ordering.
    output_indices: OutputIndices,
}

impl PersonDetector {
    /// Load the SSD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, PersonDetectorError> {
        if !Path::new(model_path).exists() {
            return Err(PersonDetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded person detection model"
        );

        if output_names.len() < 3 {
            return Err(PersonDetectorError::InferenceFailed(format!(
                "SSD model requires at least 3 outputs (boxes/classes/scores), got {}",
                output_names.len()
            )));
        }

        let output_indices = discover_output_indices(&output_names);
        tracing::debug!(?output_indices, "SSD output tensor mapping");

        Ok(Self {
            session,
            output_indices,
        })
    }

    /// Detect persons in an RGB24 frame, in detector output order.
    pub fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<PersonBox>, PersonDetectorError> {
        let input = self.preprocess(frame, width, height)?;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (boxes_idx, classes_idx, scores_idx) = self.output_indices;

        let (_, boxes) = outputs[boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| PersonDetectorError::InferenceFailed(format!("boxes: {e}")))?;
        let (_, classes) = outputs[classes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| PersonDetectorError::InferenceFailed(format!("classes: {e}")))?;
        let (_, scores) = outputs[scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| PersonDetectorError::InferenceFailed(format!("scores: {e}")))?;

        Ok(decode_detections(
            boxes,
            classes,
            scores,
            width as f32,
            height as f32,
            SSD_CONFIDENCE_THRESHOLD,
        ))
    }

    /// Resize the RGB frame to the SSD input square and pack it NHWC uint8.
    fn preprocess(
        &self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Array4<u8>, PersonDetectorError> {
        let expected = (width * height * 3) as usize;
        if frame.len() < expected {
            return Err(PersonDetectorError::BadFrame {
                expected,
                actual: frame.len(),
            });
        }

        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(width, height, frame[..expected].to_vec()).ok_or(
                PersonDetectorError::BadFrame {
                    expected,
                    actual: frame.len(),
                },
            )?;
        let resized = image::imageops::resize(
            &img,
            SSD_INPUT_SIZE,
            SSD_INPUT_SIZE,
            FilterType::Triangle,
        );

        let size = SSD_INPUT_SIZE as usize;
        let mut tensor = Array4::<u8>::zeros((1, size, size, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            tensor[[0, y as usize, x as usize, 0]] = pixel[0];
            tensor[[0, y as usize, x as usize, 1]] = pixel[1];
            tensor[[0, y as usize, x as usize, 2]] = pixel[2];
        }

        Ok(tensor)
    }
}

/// Discover output tensor ordering by name.
///
/// SSD exports commonly name outputs "detection_boxes" /
/// "detection_classes" / "detection_scores" (a fourth
/// "num_detections" tensor is ignored). Falls back to positional
/// ordering [0]=boxes, [1]=classes, [2]=scores when names are not
/// recognized.
fn discover_output_indices(names: &[String]) -> OutputIndices {
    let find = |needle: &str| names.iter().position(|n| n.contains(needle));

    match (find("boxes"), find("classes"), find("scores")) {
        (Some(b), Some(c), Some(s)) => {
            tracing::info!("SSD: using name-based output tensor mapping");
            (b, c, s)
        }
        _ => {
            tracing::info!(
                ?names,
                "SSD: output names not recognized, using positional mapping [0]=boxes, [1]=classes, [2]=scores"
            );
            (0, 1, 2)
        }
    }
}

/// Decode SSD outputs into person boxes in source-frame pixels.
///
/// Boxes arrive as normalized [ymin, xmin, ymax, xmax]; detector output
/// order is preserved so downstream tie-breaks are stable.
fn decode_detections(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
    frame_w: f32,
    frame_h: f32,
    threshold: f32,
) -> Vec<PersonBox> {
    let count = scores.len().min(classes.len()).min(boxes.len() / 4);
    let mut detections = Vec::new();

    for i in 0..count {
        let score = scores[i];
        if score <= threshold {
            continue;
        }
        if (classes[i] - COCO_PERSON_CLASS).abs() > f32::EPSILON {
            continue;
        }

        let ymin = boxes[i * 4].clamp(0.0, 1.0);
        let xmin = boxes[i * 4 + 1].clamp(0.0, 1.0);
        let ymax = boxes[i * 4 + 2].clamp(0.0, 1.0);
        let xmax = boxes[i * 4 + 3].clamp(0.0, 1.0);

        detections.push(PersonBox {
            x: xmin * frame_w,
            y: ymin * frame_h,
            width: (xmax - xmin).max(0.0) * frame_w,
            height: (ymax - ymin).max(0.0) * frame_h,
            label: "person".to_string(),
            confidence: score,
        });
    }

    detections
}

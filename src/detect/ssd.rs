//! Decoding of SSD-style detector outputs.
//!
//! Two layouts are understood:
//!
//! - `DetectionOutput`: a flat tensor of 7-value rows
//!   `(image_id, class_id, confidence, x0, y0, x1, y1)`, as produced by Caffe
//!   and OpenCV style SSD heads (`[1, 1, N, 7]`). A negative image id marks
//!   the end of the valid rows.
//! - TensorFlow object-detection exports: separate `boxes` (`ymin, xmin,
//!   ymax, xmax` per row), `classes`, `scores` and `num_detections` tensors.

use anyhow::{anyhow, Result};

use super::result::{BoundingBox, Detection};

pub const DETECTION_ROW_LEN: usize = 7;

pub fn decode_detection_output(values: &[f32], max_detections: usize) -> Result<Vec<Detection>> {
    if values.len() % DETECTION_ROW_LEN != 0 {
        return Err(anyhow!(
            "detection output length {} is not a multiple of {}",
            values.len(),
            DETECTION_ROW_LEN
        ));
    }

    let mut detections = Vec::new();
    for row in values.chunks_exact(DETECTION_ROW_LEN) {
        if detections.len() >= max_detections {
            break;
        }
        if row[0] < 0.0 {
            break;
        }
        let Some(detection) = build_detection(row[1], row[2], [row[3], row[4], row[5], row[6]])
        else {
            continue;
        };
        detections.push(detection);
    }
    Ok(detections)
}

pub fn decode_tf_outputs(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
    num_detections: Option<f32>,
    max_detections: usize,
) -> Result<Vec<Detection>> {
    if boxes.len() % 4 != 0 {
        return Err(anyhow!(
            "box tensor length {} is not a multiple of 4",
            boxes.len()
        ));
    }
    let rows = boxes.len() / 4;
    if classes.len() < rows || scores.len() < rows {
        return Err(anyhow!(
            "tensor length mismatch: {} boxes, {} classes, {} scores",
            rows,
            classes.len(),
            scores.len()
        ));
    }

    let valid = num_detections
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| (n as usize).min(rows))
        .unwrap_or(rows);

    let mut detections = Vec::new();
    for i in 0..valid {
        if detections.len() >= max_detections {
            break;
        }
        let b = &boxes[i * 4..i * 4 + 4];
        if let Some(detection) = build_detection(classes[i], scores[i], [b[1], b[0], b[3], b[2]]) {
            detections.push(detection);
        }
    }
    Ok(detections)
}

fn build_detection(class: f32, score: f32, corners: [f32; 4]) -> Option<Detection> {
    if !class.is_finite() || class < 0.0 || !score.is_finite() {
        return None;
    }
    Some(Detection {
        class_id: class.round() as u32,
        confidence: score.clamp(0.0, 1.0),
        bbox: BoundingBox::new(corners[0], corners[1], corners[2], corners[3]).clamped(),
    })
}

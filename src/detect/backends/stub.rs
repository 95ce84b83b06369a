use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectorBackend, MAX_DETECTIONS};
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;
use crate::labels;

/// Channel value at or above which a pixel counts as saturated.
const SATURATION: u8 = 240;
/// Grid cell edge in pixels.
const CELL: u32 = 8;

/// Stub backend for dry runs and tests.
///
/// Reports every saturated white region of the frame as one object of a fixed
/// class. Pairs with the synthetic frame source, which paints such a block in
/// occupied scenes.
pub struct StubBackend {
    class_id: u32,
    confidence: f32,
}

impl StubBackend {
    pub fn new(class_id: u32, confidence: f32) -> Self {
        Self {
            class_id,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Build from the part after `stub://`: a label name or id, empty for person.
    pub fn for_target(target: &str) -> Result<Self> {
        let target = target.trim_matches('/');
        let class_id = if target.is_empty() {
            labels::PERSON
        } else {
            labels::resolve_category(target)
                .ok_or_else(|| anyhow!("stub detector: unknown class '{}'", target))?
        };
        Ok(Self::new(class_id, 0.9))
    }

    fn saturated_cells(frame: &Frame) -> (Vec<bool>, u32, u32) {
        let cols = frame.width.div_ceil(CELL);
        let rows = frame.height.div_ceil(CELL);
        let mut cells = vec![false; (cols * rows) as usize];
        for row in 0..rows {
            for col in 0..cols {
                let x_end = ((col + 1) * CELL).min(frame.width);
                let y_end = ((row + 1) * CELL).min(frame.height);
                let mut total = 0u32;
                let mut bright = 0u32;
                for y in row * CELL..y_end {
                    for x in col * CELL..x_end {
                        total += 1;
                        if let Some(rgb) = frame.rgb_at(x, y) {
                            if rgb.iter().all(|&c| c >= SATURATION) {
                                bright += 1;
                            }
                        }
                    }
                }
                // Majority of the cell must be saturated.
                cells[(row * cols + col) as usize] = bright * 2 > total;
            }
        }
        (cells, cols, rows)
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.width == 0 || frame.height == 0 {
            return Ok(Vec::new());
        }
        let (mut cells, cols, rows) = Self::saturated_cells(frame);
        let mut detections = Vec::new();

        for start in 0..cells.len() {
            if !cells[start] || detections.len() >= MAX_DETECTIONS {
                continue;
            }
            // Flood fill one 4-connected region of saturated cells.
            let (mut min_c, mut min_r, mut max_c, mut max_r) = (cols, rows, 0, 0);
            let mut stack = vec![start];
            cells[start] = false;
            while let Some(idx) = stack.pop() {
                let (c, r) = (idx as u32 % cols, idx as u32 / cols);
                min_c = min_c.min(c);
                min_r = min_r.min(r);
                max_c = max_c.max(c);
                max_r = max_r.max(r);
                let neighbors = [
                    (c > 0).then(|| idx - 1),
                    (c + 1 < cols).then(|| idx + 1),
                    (r > 0).then(|| idx - cols as usize),
                    (r + 1 < rows).then(|| idx + cols as usize),
                ];
                for n in neighbors.into_iter().flatten() {
                    if cells[n] {
                        cells[n] = false;
                        stack.push(n);
                    }
                }
            }

            let w = frame.width as f32;
            let h = frame.height as f32;
            let bbox = BoundingBox::new(
                (min_c * CELL) as f32 / w,
                (min_r * CELL) as f32 / h,
                (((max_c + 1) * CELL).min(frame.width)) as f32 / w,
                (((max_r + 1) * CELL).min(frame.height)) as f32 / h,
            );
            detections.push(Detection {
                class_id: self.class_id,
                confidence: self.confidence,
                bbox,
            });
        }

        Ok(detections)
    }
}

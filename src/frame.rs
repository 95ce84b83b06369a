//! Captured frames.
//!
//! A `Frame` is an immutable RGB24 pixel buffer. It is produced once per
//! capture call, borrowed by the detector and the frame sink, and dropped at
//! the end of the loop iteration.

use anyhow::{anyhow, Result};
use std::time::Instant;

pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Capture order, starting at 1 for the first frame of a source.
    pub sequence: u64,

    pub captured_at: Instant,
}

impl Frame {
    /// Wrap an RGB24 buffer. The buffer length must match `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} RGB bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// Row-major RGB24 pixels.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// RGB triple at (x, y). Returns `None` outside the frame.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

//! Synthetic frame source for `stub://` devices.
//!
//! Generates a dim textured background and, in every other scene, a saturated
//! white block standing in for an object. Scenes last `scene_period` frames,
//! starting with an empty scene, so a run alternates absent and present
//! stretches the stub detector can pick up.

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{CameraConfig, Capture, FrameSource, SourceStats};
use crate::frame::Frame;

/// Background channel values stay below this so they never read as an object.
const BACKGROUND_CEILING: u8 = 176;

pub struct SyntheticSource {
    config: CameraConfig,
    frame_count: u64,
    connected: bool,
    closed: bool,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
            closed: false,
        }
    }

    /// Synthetic sources are always available.
    pub fn connect(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!(
                "synthetic source {} needs non-zero dimensions",
                self.config.device
            ));
        }
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    /// Whether frame `sequence` (1-based) falls in an occupied scene.
    ///
    /// Sequence 0 is treated as the first frame.
    pub fn scene_occupied(&self, sequence: u64) -> bool {
        let period = self.config.scene_period.max(1);
        (sequence.saturating_sub(1) / period) % 2 == 1
    }

    fn generate_pixels(&self, sequence: u64) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut rng = rand::thread_rng();

        let mut pixels = vec![0u8; width * height * 3];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            let base = ((i as u64 + sequence) % 160) as u8;
            *pixel = base.saturating_add(rng.gen_range(0..16)).min(BACKGROUND_CEILING);
        }

        if self.scene_occupied(sequence) {
            let side = (width.min(height) / 4).max(1);
            let scene = sequence.saturating_sub(1) / self.config.scene_period.max(1);
            let x0 = (scene as usize * side) % (width - side + 1);
            let y0 = (height - side) / 2;
            for y in y0..y0 + side {
                let row = y * width * 3;
                pixels[row + x0 * 3..row + (x0 + side) * 3].fill(255);
            }
        }

        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.config.device)
    }

    fn next_frame(&mut self) -> Result<Capture> {
        if self.closed {
            return Err(anyhow!("synthetic source {} is closed", self.config.device));
        }
        if !self.connected {
            return Err(anyhow!(
                "synthetic source {} not connected",
                self.config.device
            ));
        }
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(Capture::EndOfStream);
            }
        }

        self.frame_count += 1;
        let pixels = self.generate_pixels(self.frame_count);
        let frame = Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )?;
        Ok(Capture::Frame(frame))
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            log::info!("SyntheticSource: released {}", self.config.device);
        }
        Ok(())
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(frame_limit: Option<u64>) -> CameraConfig {
        CameraConfig {
            device: "stub://test".to_string(),
            width: 64,
            height: 48,
            target_fps: 30,
            frame_limit,
            scene_period: 3,
        }
    }

    fn next(source: &mut SyntheticSource) -> Frame {
        match source.next_frame().expect("capture") {
            Capture::Frame(frame) => frame,
            Capture::EndOfStream => panic!("unexpected end of stream"),
        }
    }

    #[test]
    fn produces_frames_in_capture_order() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config(None));
        source.connect()?;

        let a = next(&mut source);
        let b = next(&mut source);
        assert_eq!(a.width, 64);
        assert_eq!(a.height, 48);
        assert_eq!(a.sequence, 1);
        assert_eq!(b.sequence, 2);
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn scenes_alternate_starting_empty() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config(None));
        source.connect()?;

        let occupied: Vec<bool> = (1..=7).map(|seq| source.scene_occupied(seq)).collect();
        assert_eq!(
            occupied,
            vec![false, false, false, true, true, true, false]
        );

        for _ in 0..3 {
            let frame = next(&mut source);
            assert!(frame.pixels().iter().all(|&p| p <= BACKGROUND_CEILING));
        }
        let frame = next(&mut source);
        assert!(frame.pixels().iter().any(|&p| p == 255));
        Ok(())
    }

    #[test]
    fn sequence_zero_reads_as_first_frame() {
        let source = SyntheticSource::new(stub_config(None));
        assert!(!source.scene_occupied(0));
        assert_eq!(source.scene_occupied(0), source.scene_occupied(1));
    }

    #[test]
    fn frame_limit_ends_stream() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config(Some(2)));
        source.connect()?;

        next(&mut source);
        next(&mut source);
        assert!(matches!(source.next_frame()?, Capture::EndOfStream));
        Ok(())
    }

    #[test]
    fn closed_source_refuses_capture() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config(None));
        source.connect()?;
        source.close()?;
        source.close()?;
        assert!(source.next_frame().is_err());
        Ok(())
    }
}

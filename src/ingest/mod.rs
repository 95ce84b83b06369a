//! Frame ingestion sources.
//!
//! - USB/V4L2 capture devices (feature: ingest-v4l2)
//! - Synthetic scenes for `stub://` devices (tests and dry runs)
//! - A prefetching wrapper that overlaps capture with inference
//!
//! Every source produces `Frame`s strictly in capture order and holds its
//! device until `close()` is called. `close()` is idempotent.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod prefetch;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::error::PipelineError;
use crate::frame::Frame;

pub use prefetch::PrefetchSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Result of one capture call.
#[derive(Debug)]
pub enum Capture {
    Frame(Frame),
    EndOfStream,
}

/// A blocking, single-frame-at-a-time capture device.
pub trait FrameSource {
    /// Device description for logs.
    fn describe(&self) -> String;

    /// Block until the next frame is ready.
    ///
    /// Errors are capture failures; the caller stops the run on the first one.
    fn next_frame(&mut self) -> Result<Capture>;

    /// Release the device. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub device: String,
}

/// Capture settings shared by all backends.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path. `stub://...` selects the synthetic source.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Synthetic sources end the stream after this many frames.
    pub frame_limit: Option<u64>,
    /// Synthetic sources alternate empty and occupied scenes with this period.
    pub scene_period: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: device_path_for_index(0),
            width: 640,
            height: 480,
            target_fps: 30,
            frame_limit: None,
            scene_period: 30,
        }
    }
}

/// Capture device index N maps to `/dev/videoN`.
pub fn device_path_for_index(index: u32) -> String {
    format!("/dev/video{}", index)
}

/// Open and connect the source named by `config.device`.
pub fn open_source(config: CameraConfig) -> Result<Box<dyn FrameSource>, PipelineError> {
    if config.device.starts_with("stub://") {
        let mut source = SyntheticSource::new(config);
        source.connect().map_err(PipelineError::DeviceUnavailable)?;
        return Ok(Box::new(source));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        let mut source = V4l2Source::new(config);
        source.connect().map_err(PipelineError::DeviceUnavailable)?;
        Ok(Box::new(source))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(PipelineError::DeviceUnavailable(anyhow::anyhow!(
            "capture device {} requires the ingest-v4l2 feature",
            config.device
        )))
    }
}

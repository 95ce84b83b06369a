use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Upper bound on detections returned per frame.
pub const MAX_DETECTIONS: usize = 100;

/// Detector backend trait.
///
/// The engine behind it is a black box: it receives a frame and returns at
/// most `MAX_DETECTIONS` candidates. Implementations must be deterministic for
/// identical weights and input, and must not keep the frame past the call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// An error here is an inference failure; the control loop stops on it.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

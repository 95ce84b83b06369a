//! Presence trigger
//!
//! Watches a live camera feed with an object detector and pulses a serial
//! link with a single `'A'` byte each time an object of interest appears.
//!
//! # Pipeline
//!
//! Each frame goes through capture, detection, category filtering and the
//! edge trigger, strictly in capture order. Only the transition from "no
//! object of interest" to "object of interest present" writes to the link.
//!
//! # Module Structure
//!
//! - `ingest`: capture devices (V4L2, synthetic `stub://` scenes, prefetch)
//! - `detect`: detector backends (tract/ONNX, `stub://` pattern detector)
//! - `filter` and `trigger`: per-frame presence and the edge state machine
//! - `signal`: the outbound serial link
//! - `control`: startup, the per-frame loop and shutdown
//! - `config`: file and environment configuration

pub mod config;
pub mod control;
pub mod detect;
pub mod error;
pub mod filter;
pub mod frame;
pub mod ingest;
pub mod labels;
pub mod signal;
pub mod trigger;

pub use config::TriggerConfig;
pub use control::{
    Components, ControlLoop, ExitReason, FrameSink, LogSink, LoopSettings, NullSink, RunReport,
    RunStats, StopFlag,
};
pub use detect::{load_detector, BoundingBox, Detection, DetectorBackend};
pub use error::PipelineError;
pub use filter::{filter, CategorySet};
pub use frame::Frame;
pub use ingest::{open_source, CameraConfig, Capture, FrameSource, PrefetchSource};
pub use signal::{open_channel, SerialConfig, SignalChannel};
pub use trigger::{Edge, EdgeTrigger, PresenceState, SIGNAL_BYTE};

/// Acquire the link, the detector and the capture device described by
/// `config`, in that order.
pub fn acquire(config: &TriggerConfig) -> Result<Components, PipelineError> {
    let camera = config.camera.to_camera_config();
    let prefetch = config.prefetch;
    Components::acquire(
        || open_channel(&config.serial),
        || load_detector(&config.model.weights, config.model.description.as_deref()),
        move || {
            if prefetch {
                let source = PrefetchSource::spawn(move || open_source(camera))?;
                Ok(Box::new(source) as Box<dyn FrameSource>)
            } else {
                open_source(camera)
            }
        },
    )
}

/// Acquire everything and run the control loop to completion.
pub fn run(
    config: &TriggerConfig,
    stop: StopFlag,
    sink: Box<dyn FrameSink>,
) -> Result<RunReport, PipelineError> {
    let settings = config.loop_settings().map_err(PipelineError::Config)?;
    let components = acquire(config)?;
    Ok(ControlLoop::new(components, settings, stop)
        .with_sink(sink)
        .run())
}

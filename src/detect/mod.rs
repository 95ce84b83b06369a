//! Object detection.
//!
//! The engine is a black box behind `DetectorBackend`. `load_detector` picks
//! the backend from the weights path: `stub://` selects the stub backend,
//! anything else is an ONNX file run through tract (feature: backend-tract).

mod backend;
mod backends;
pub mod model;
mod result;
pub mod ssd;

use std::path::Path;

use crate::error::PipelineError;

pub use backend::{DetectorBackend, MAX_DETECTIONS};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use model::ModelDescription;
pub use result::{BoundingBox, Detection};

/// Load and warm up the detector for `weights`.
///
/// `description` is the model description file; defaults apply without one.
pub fn load_detector(
    weights: &str,
    description: Option<&Path>,
) -> Result<Box<dyn DetectorBackend>, PipelineError> {
    let mut detector: Box<dyn DetectorBackend> = match weights.strip_prefix("stub://") {
        Some(target) => {
            let stub = StubBackend::for_target(target).map_err(PipelineError::ModelLoad)?;
            Box::new(stub)
        }
        None => {
            let description = match description {
                Some(path) => ModelDescription::load(path).map_err(PipelineError::ModelLoad)?,
                None => ModelDescription::default(),
            };
            onnx_backend(weights, description)?
        }
    };
    if let Err(err) = detector.warm_up() {
        let context = format!("warm-up of {} detector failed", detector.name());
        return Err(PipelineError::ModelLoad(err.context(context)));
    }
    log::info!("detector ready: {} ({})", detector.name(), weights);
    Ok(detector)
}

#[cfg(feature = "backend-tract")]
fn onnx_backend(
    weights: &str,
    description: ModelDescription,
) -> Result<Box<dyn DetectorBackend>, PipelineError> {
    let backend = TractBackend::new(weights, description).map_err(PipelineError::ModelLoad)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn onnx_backend(
    weights: &str,
    description: ModelDescription,
) -> Result<Box<dyn DetectorBackend>, PipelineError> {
    Err(PipelineError::ModelLoad(anyhow::anyhow!(
        "model {} ({}x{} input) requires the backend-tract feature",
        weights,
        description.input_width,
        description.input_height
    )))
}

use std::fmt;

/// Failure kinds the control loop and the daemon need to tell apart.
///
/// Everything below this level is plain `anyhow::Error` with context; the kind
/// only decides whether the loop stops and what exit status the process uses.
#[derive(Debug)]
pub enum PipelineError {
    /// Weights or model description unreadable or malformed.
    ModelLoad(anyhow::Error),
    /// Capture device could not be opened.
    DeviceUnavailable(anyhow::Error),
    /// Capture device failed mid-run.
    CaptureFailed(anyhow::Error),
    /// Forward pass failed.
    Inference(anyhow::Error),
    /// Serial link could not be opened or a send failed.
    Link(anyhow::Error),
    /// Invalid startup configuration.
    Config(anyhow::Error),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::ModelLoad(_) => "model_load",
            PipelineError::DeviceUnavailable(_) => "device_unavailable",
            PipelineError::CaptureFailed(_) => "capture_failed",
            PipelineError::Inference(_) => "inference",
            PipelineError::Link(_) => "link",
            PipelineError::Config(_) => "config",
        }
    }

    /// Link failures are reported but never stop the loop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::Link(_))
    }

    fn inner(&self) -> &anyhow::Error {
        match self {
            PipelineError::ModelLoad(e)
            | PipelineError::DeviceUnavailable(e)
            | PipelineError::CaptureFailed(e)
            | PipelineError::Inference(e)
            | PipelineError::Link(e)
            | PipelineError::Config(e) => e,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.code(), self.inner())
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner().as_ref())
    }
}

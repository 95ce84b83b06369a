//! Outbound signal link.
//!
//! One direction (host to device), one byte per signal, no acknowledgement.
//! `stub://` ports select an in-process channel that only logs and records.

pub mod serial;
pub mod stub;

use anyhow::Result;
use std::time::Duration;

use crate::error::PipelineError;

pub use serial::SerialChannel;
pub use stub::StubChannel;

/// A write-only link to the external actuator.
pub trait SignalChannel {
    /// Link description for logs.
    fn describe(&self) -> String;

    /// Transmit one byte. Must return within the link's write timeout.
    fn send(&mut self, byte: u8) -> Result<()>;

    /// Close the link. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port path (e.g. /dev/ttyUSB0). `stub://...` selects the stub channel.
    pub port: String,
    pub baud_rate: u32,
    pub write_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            write_timeout: Duration::from_millis(100),
        }
    }
}

/// Open the channel named by `config.port`.
pub fn open_channel(config: &SerialConfig) -> Result<Box<dyn SignalChannel>, PipelineError> {
    if config.port.starts_with("stub://") {
        return Ok(Box::new(StubChannel::new(&config.port)));
    }
    let channel = SerialChannel::open(config).map_err(PipelineError::Link)?;
    Ok(Box::new(channel))
}

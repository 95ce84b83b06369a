use anyhow::{anyhow, Result};

use super::SignalChannel;

/// In-process channel for dry runs: logs and records every byte.
pub struct StubChannel {
    port: String,
    sent: Vec<u8>,
    closed: bool,
}

impl StubChannel {
    pub fn new(port: &str) -> Self {
        log::info!("StubChannel: opened {}", port);
        Self {
            port: port.to_string(),
            sent: Vec::new(),
            closed: false,
        }
    }

    pub fn sent(&self) -> &[u8] {
        &self.sent
    }
}

impl SignalChannel for StubChannel {
    fn describe(&self) -> String {
        format!("{} (stub)", self.port)
    }

    fn send(&mut self, byte: u8) -> Result<()> {
        if self.closed {
            return Err(anyhow!("stub channel {} is closed", self.port));
        }
        log::info!("StubChannel: {} <- {:?}", self.port, byte as char);
        self.sent.push(byte);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            log::info!(
                "StubChannel: closed {} after {} bytes",
                self.port,
                self.sent.len()
            );
        }
        Ok(())
    }
}

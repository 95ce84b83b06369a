use anyhow::{anyhow, Context, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Write;

use super::{SerialConfig, SignalChannel};

/// Serial port channel, 8N1 without flow control.
pub struct SerialChannel {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
    bytes_sent: u64,
}

impl SerialChannel {
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.write_timeout)
            .open()
            .with_context(|| {
                format!(
                    "open serial port {} at {} baud",
                    config.port, config.baud_rate
                )
            })?;
        log::info!(
            "SerialChannel: opened {} at {} baud",
            config.port,
            config.baud_rate
        );
        Ok(Self {
            config: config.clone(),
            port: Some(port),
            bytes_sent: 0,
        })
    }
}

impl SignalChannel for SerialChannel {
    fn describe(&self) -> String {
        format!("{} @ {} baud", self.config.port, self.config.baud_rate)
    }

    fn send(&mut self, byte: u8) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| anyhow!("serial port {} is closed", self.config.port))?;
        port.write_all(&[byte])
            .and_then(|_| port.flush())
            .with_context(|| format!("write to serial port {}", self.config.port))?;
        self.bytes_sent += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut port) = self.port.take() else {
            return Ok(());
        };
        let flushed = port
            .flush()
            .with_context(|| format!("flush serial port {}", self.config.port));
        drop(port);
        log::info!(
            "SerialChannel: closed {} after {} bytes",
            self.config.port,
            self.bytes_sent
        );
        flushed
    }
}

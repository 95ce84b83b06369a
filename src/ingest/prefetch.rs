//! Single-slot capture prefetch.
//!
//! Runs a source on its own thread so the device can deliver frame N+1 while
//! the control thread is still running inference on frame N. The hand-off is a
//! rendezvous `sync_channel(0)`: the worker holds at most the one frame it has
//! already captured, never more, and capture order is kept.
//!
//! The inner source is opened, driven and closed entirely on the worker
//! thread; it never has to be `Send`.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{Capture, FrameSource, SourceStats};
use crate::error::PipelineError;

pub struct PrefetchSource {
    device: String,
    frames: Option<Receiver<Result<Capture>>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<Result<()>>>,
    frames_received: u64,
}

impl PrefetchSource {
    /// Spawn the worker and open the source on it.
    ///
    /// Returns once the worker reports whether the device opened.
    pub fn spawn<F>(open: F) -> Result<Self, PipelineError>
    where
        F: FnOnce() -> Result<Box<dyn FrameSource>, PipelineError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, PipelineError>>();
        let (frame_tx, frame_rx) = mpsc::sync_channel::<Result<Capture>>(0);
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();

        let worker = thread::Builder::new()
            .name("frame-prefetch".to_string())
            .spawn(move || -> Result<()> {
                let mut source = match open() {
                    Ok(source) => source,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return Ok(());
                    }
                };
                let _ = ready_tx.send(Ok(source.describe()));

                while !worker_stop.load(Ordering::Acquire) {
                    let capture = source.next_frame();
                    let terminal = !matches!(capture, Ok(Capture::Frame(_)));
                    if frame_tx.send(capture).is_err() || terminal {
                        break;
                    }
                }
                source.close()
            })
            .map_err(|err| {
                PipelineError::DeviceUnavailable(
                    anyhow::Error::new(err).context("spawn prefetch thread"),
                )
            })?;

        let device = match ready_rx.recv() {
            Ok(Ok(device)) => device,
            Ok(Err(err)) => {
                let _ = worker.join();
                return Err(err);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(PipelineError::DeviceUnavailable(anyhow!(
                    "prefetch thread exited before opening the source"
                )));
            }
        };
        log::info!("PrefetchSource: capturing {} on worker thread", device);

        Ok(Self {
            device,
            frames: Some(frame_rx),
            stop,
            worker: Some(worker),
            frames_received: 0,
        })
    }
}

impl FrameSource for PrefetchSource {
    fn describe(&self) -> String {
        format!("{} (prefetch)", self.device)
    }

    fn next_frame(&mut self) -> Result<Capture> {
        let frames = self
            .frames
            .as_ref()
            .ok_or_else(|| anyhow!("prefetch source {} is closed", self.device))?;
        let capture = frames
            .recv()
            .map_err(|_| anyhow!("prefetch worker for {} stopped", self.device))??;
        if matches!(capture, Capture::Frame(_)) {
            self.frames_received += 1;
        }
        Ok(capture)
    }

    fn close(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::Release);
        // Dropping the receiver unblocks a worker parked on a full slot.
        self.frames.take();
        worker
            .join()
            .map_err(|_| anyhow!("prefetch worker for {} panicked", self.device))?
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_received,
            device: self.device.clone(),
        }
    }
}

impl Drop for PrefetchSource {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("PrefetchSource: close on drop failed: {:#}", err);
        }
    }
}

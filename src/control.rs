//! Per-frame control loop.
//!
//! capture -> detect -> filter -> edge trigger -> signal, one frame at a time,
//! strictly in capture order. The loop owns the source, the detector and the
//! link; whichever way it exits, the source is closed first and the link
//! second, each exactly once.

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detect::{Detection, DetectorBackend, MAX_DETECTIONS};
use crate::error::PipelineError;
use crate::filter::{filter, CategorySet};
use crate::frame::Frame;
use crate::ingest::{Capture, FrameSource};
use crate::labels;
use crate::signal::SignalChannel;
use crate::trigger::{Edge, EdgeTrigger, PresenceState};

const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(5);

// -------------------- Stop Flag --------------------

/// Cooperative stop request, polled once per iteration.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Route Ctrl-C to this flag.
    pub fn install_ctrlc(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            if flag.is_requested() {
                log::warn!("second interrupt received; still waiting for the current frame");
            }
            flag.request();
        })?;
        Ok(())
    }
}

// -------------------- Frame Sink --------------------

/// Peripheral consumer of each processed frame (overlay, preview, ...).
///
/// Nothing it does feeds back into the trigger.
pub trait FrameSink {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        matched: &BTreeSet<u32>,
        inference: Duration,
    );
}

/// Discards everything.
pub struct NullSink;

impl FrameSink for NullSink {
    fn render(&mut self, _: &Frame, _: &[Detection], _: &BTreeSet<u32>, _: Duration) {}
}

/// Writes what an overlay would draw to the debug log.
pub struct LogSink {
    threshold: f32,
}

impl LogSink {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl FrameSink for LogSink {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        matched: &BTreeSet<u32>,
        inference: Duration,
    ) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let shown: Vec<String> = detections
            .iter()
            .filter(|d| d.confidence >= self.threshold)
            .map(|d| {
                let (x0, y0, x1, y1) = d.bbox.to_pixels(frame.width, frame.height);
                format!(
                    "{}: {:.2}% [{},{} {},{}]",
                    labels::display_label(d.class_id),
                    d.confidence * 100.0,
                    x0,
                    y0,
                    x1,
                    y1
                )
            })
            .collect();
        log::debug!(
            "frame #{} {:.2} ms (age {} ms) matched={:?} {}",
            frame.sequence,
            inference.as_secs_f64() * 1000.0,
            frame.age_ms(),
            matched,
            shown.join(", ")
        );
    }
}

// -------------------- Run Results --------------------

#[derive(Debug)]
pub enum ExitReason {
    EndOfStream,
    /// External stop request.
    Stopped,
    /// Configured frame limit reached.
    FrameLimit,
    CaptureFailed(PipelineError),
    InferenceFailed(PipelineError),
}

impl ExitReason {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ExitReason::CaptureFailed(_) | ExitReason::InferenceFailed(_)
        )
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        if self.is_failure() {
            1
        } else {
            0
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunStats {
    pub frames: u64,
    pub rising_edges: u64,
    pub falling_edges: u64,
    pub signals_sent: u64,
    pub link_failures: u64,
    pub total_inference: Duration,
    pub max_inference: Duration,
}

impl RunStats {
    fn record_inference(&mut self, elapsed: Duration) {
        self.total_inference += elapsed;
        self.max_inference = self.max_inference.max(elapsed);
    }

    pub fn mean_inference_ms(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.total_inference.as_secs_f64() * 1000.0 / self.frames as f64
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub exit: ExitReason,
    pub stats: RunStats,
    pub final_state: PresenceState,
}

// -------------------- Startup --------------------

/// Everything the loop owns.
pub struct Components {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn DetectorBackend>,
    pub channel: Box<dyn SignalChannel>,
}

impl Components {
    /// Acquire link, detector and source, in that order.
    ///
    /// If a later step fails, whatever was already acquired is released
    /// before the error is returned.
    pub fn acquire<C, D, S>(
        open_channel: C,
        load_detector: D,
        open_source: S,
    ) -> Result<Self, PipelineError>
    where
        C: FnOnce() -> Result<Box<dyn SignalChannel>, PipelineError>,
        D: FnOnce() -> Result<Box<dyn DetectorBackend>, PipelineError>,
        S: FnOnce() -> Result<Box<dyn FrameSource>, PipelineError>,
    {
        let mut channel = open_channel()?;

        let detector = match load_detector() {
            Ok(detector) => detector,
            Err(err) => {
                close_channel(channel.as_mut());
                return Err(err);
            }
        };

        let source = match open_source() {
            Ok(source) => source,
            Err(err) => {
                close_channel(channel.as_mut());
                return Err(err);
            }
        };

        Ok(Self {
            source,
            detector,
            channel,
        })
    }
}

fn close_channel(channel: &mut dyn SignalChannel) {
    if let Err(err) = channel.close() {
        log::warn!("closing {} failed: {:#}", channel.describe(), err);
    }
}

// -------------------- Control Loop --------------------

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub categories: CategorySet,
    /// Inclusive confidence threshold.
    pub threshold: f32,
    pub max_frames: Option<u64>,
    pub health_interval: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            categories: CategorySet::default(),
            threshold: 0.3,
            max_frames: None,
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }
}

pub struct ControlLoop {
    components: Components,
    sink: Box<dyn FrameSink>,
    trigger: EdgeTrigger,
    settings: LoopSettings,
    stop: StopFlag,
}

impl ControlLoop {
    pub fn new(components: Components, settings: LoopSettings, stop: StopFlag) -> Self {
        Self {
            components,
            sink: Box::new(NullSink),
            trigger: EdgeTrigger::new(),
            settings,
            stop,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run until end of stream, a fatal error, the frame limit or a stop
    /// request, then release the source and the link.
    pub fn run(mut self) -> RunReport {
        log::info!(
            "control loop running: source={} detector={} link={} categories={:?} threshold={}",
            self.components.source.describe(),
            self.components.detector.name(),
            self.components.channel.describe(),
            self.settings.categories.names(),
            self.settings.threshold
        );

        let mut stats = RunStats::default();
        let exit = self.drive(&mut stats);
        match &exit {
            ExitReason::CaptureFailed(err) | ExitReason::InferenceFailed(err) => {
                log::error!("control loop halted: {}", err)
            }
            other => log::info!("control loop finished: {:?}", other),
        }
        self.shutdown();

        RunReport {
            exit,
            stats,
            final_state: self.trigger.state(),
        }
    }

    fn drive(&mut self, stats: &mut RunStats) -> ExitReason {
        let mut last_health_log = Instant::now();

        loop {
            let frame = match self.components.source.next_frame() {
                Ok(Capture::Frame(frame)) => frame,
                Ok(Capture::EndOfStream) => return ExitReason::EndOfStream,
                Err(err) => {
                    return ExitReason::CaptureFailed(PipelineError::CaptureFailed(err));
                }
            };

            let started = Instant::now();
            let mut detections = match self.components.detector.detect(&frame) {
                Ok(detections) => detections,
                Err(err) => {
                    return ExitReason::InferenceFailed(PipelineError::Inference(
                        err.context(format!("frame #{}", frame.sequence)),
                    ));
                }
            };
            let inference = started.elapsed();
            detections.truncate(MAX_DETECTIONS);
            stats.frames += 1;
            stats.record_inference(inference);

            let matched = filter(
                &detections,
                &self.settings.categories,
                self.settings.threshold,
            );
            if let Some(edge) = self.trigger.update(!matched.is_empty()) {
                self.on_edge(edge, &matched, stats);
            }

            self.sink.render(&frame, &detections, &matched, inference);
            drop(frame);

            if last_health_log.elapsed() >= self.settings.health_interval {
                log::info!(
                    "health: frames={} signals={} link_failures={} mean_inference={:.2}ms state={:?}",
                    stats.frames,
                    stats.signals_sent,
                    stats.link_failures,
                    stats.mean_inference_ms(),
                    self.trigger.state()
                );
                last_health_log = Instant::now();
            }

            if self.stop.is_requested() {
                return ExitReason::Stopped;
            }
            if let Some(limit) = self.settings.max_frames {
                if stats.frames >= limit {
                    return ExitReason::FrameLimit;
                }
            }
        }
    }

    fn on_edge(&mut self, edge: Edge, matched: &BTreeSet<u32>, stats: &mut RunStats) {
        match edge {
            Edge::Rising => {
                stats.rising_edges += 1;
                let names: Vec<String> =
                    matched.iter().map(|&id| labels::display_label(id)).collect();
                log::info!("object detected: {}", names.join(", "));
            }
            Edge::Falling => {
                stats.falling_edges += 1;
                log::info!("object cleared");
            }
        }

        let Some(byte) = edge.signal() else {
            return;
        };
        match self.components.channel.send(byte) {
            Ok(()) => stats.signals_sent += 1,
            Err(err) => {
                // The state has already moved; the next rising edge sends again.
                stats.link_failures += 1;
                log::warn!("{}", PipelineError::Link(err));
            }
        }
    }

    fn shutdown(&mut self) {
        let source_stats = self.components.source.stats();
        log::info!(
            "closing {} after {} captured frames",
            source_stats.device,
            source_stats.frames_captured
        );
        if let Err(err) = self.components.source.close() {
            log::warn!(
                "releasing {} failed: {:#}",
                self.components.source.describe(),
                err
            );
        }
        close_channel(self.components.channel.as_mut());
    }
}

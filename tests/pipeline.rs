use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use presence_trigger::detect::StubBackend;
use presence_trigger::ingest::SyntheticSource;
use presence_trigger::{
    BoundingBox, CameraConfig, Capture, Components, ControlLoop, Detection, DetectorBackend,
    ExitReason, Frame, FrameSource, LoopSettings, PipelineError, PresenceState, SignalChannel,
    StopFlag,
};

#[derive(Clone, Debug, PartialEq)]
enum Event {
    Capture(u64),
    Detect(u64),
    Send(u8),
    CloseSource,
    CloseChannel,
}

type Journal = Arc<Mutex<Vec<Event>>>;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(journal: &Journal, event: Event) {
    journal.lock().unwrap().push(event);
}

enum Step {
    Frame,
    Fail,
    End,
}

struct ScriptedSource {
    steps: VecDeque<Step>,
    sequence: u64,
    journal: Journal,
}

impl ScriptedSource {
    fn new(steps: Vec<Step>, journal: &Journal) -> Self {
        Self {
            steps: steps.into(),
            sequence: 0,
            journal: journal.clone(),
        }
    }

    fn frames(count: usize, journal: &Journal) -> Self {
        let mut steps: Vec<Step> = (0..count).map(|_| Step::Frame).collect();
        steps.push(Step::End);
        Self::new(steps, journal)
    }
}

impl FrameSource for ScriptedSource {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    fn next_frame(&mut self) -> Result<Capture> {
        match self.steps.pop_front().unwrap_or(Step::End) {
            Step::Frame => {
                self.sequence += 1;
                record(&self.journal, Event::Capture(self.sequence));
                Ok(Capture::Frame(Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, self.sequence)?))
            }
            Step::Fail => Err(anyhow!("device read error")),
            Step::End => Ok(Capture::EndOfStream),
        }
    }

    fn close(&mut self) -> Result<()> {
        record(&self.journal, Event::CloseSource);
        Ok(())
    }

    fn stats(&self) -> presence_trigger::ingest::SourceStats {
        presence_trigger::ingest::SourceStats {
            frames_captured: self.sequence,
            device: self.describe(),
        }
    }
}

/// Returns one scripted detection list per frame, in order.
struct ScriptedDetector {
    per_frame: VecDeque<Result<Vec<Detection>>>,
    journal: Journal,
}

impl ScriptedDetector {
    fn new(per_frame: Vec<Result<Vec<Detection>>>, journal: &Journal) -> Self {
        Self {
            per_frame: per_frame.into(),
            journal: journal.clone(),
        }
    }

    fn presence(pattern: &[bool], journal: &Journal) -> Self {
        let per_frame = pattern
            .iter()
            .map(|&present| {
                Ok(if present {
                    vec![detection(1, 0.85)]
                } else {
                    Vec::new()
                })
            })
            .collect();
        Self::new(per_frame, journal)
    }
}

impl DetectorBackend for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        record(&self.journal, Event::Detect(frame.sequence));
        self.per_frame.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

struct RecordingChannel {
    journal: Journal,
    fail_sends: bool,
}

impl RecordingChannel {
    fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            fail_sends: false,
        }
    }

    fn failing(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            fail_sends: true,
        }
    }
}

impl SignalChannel for RecordingChannel {
    fn describe(&self) -> String {
        "recording".to_string()
    }

    fn send(&mut self, byte: u8) -> Result<()> {
        if self.fail_sends {
            return Err(anyhow!("write timed out"));
        }
        record(&self.journal, Event::Send(byte));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        record(&self.journal, Event::CloseChannel);
        Ok(())
    }
}

fn detection(class_id: u32, confidence: f32) -> Detection {
    Detection {
        class_id,
        confidence,
        bbox: BoundingBox::new(0.2, 0.2, 0.4, 0.6),
    }
}

fn components(
    source: impl FrameSource + 'static,
    detector: impl DetectorBackend + 'static,
    channel: impl SignalChannel + 'static,
) -> Components {
    Components {
        source: Box::new(source),
        detector: Box::new(detector),
        channel: Box::new(channel),
    }
}

fn sent_bytes(journal: &Journal) -> Vec<u8> {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            Event::Send(byte) => Some(*byte),
            _ => None,
        })
        .collect()
}

fn count(journal: &Journal, wanted: &Event) -> usize {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter(|event| *event == wanted)
        .count()
}

#[test]
fn one_signal_per_present_run() {
    let journal = journal();
    let pattern = [false, true, true, false, true];
    let report = ControlLoop::new(
        components(
            ScriptedSource::frames(pattern.len(), &journal),
            ScriptedDetector::presence(&pattern, &journal),
            RecordingChannel::new(&journal),
        ),
        LoopSettings::default(),
        StopFlag::new(),
    )
    .run();

    assert!(matches!(report.exit, ExitReason::EndOfStream));
    assert_eq!(report.exit.exit_code(), 0);
    assert_eq!(sent_bytes(&journal), vec![b'A', b'A']);
    assert_eq!(report.stats.frames, 5);
    assert_eq!(report.stats.rising_edges, 2);
    assert_eq!(report.stats.falling_edges, 1);
    assert_eq!(report.stats.signals_sent, 2);
    assert_eq!(report.final_state, PresenceState::Present);

    // The signal for frame 2 goes out after frame 2 is detected and before
    // frame 3 is captured.
    let events = journal.lock().unwrap().clone();
    let send_at = events.iter().position(|e| *e == Event::Send(b'A')).unwrap();
    assert_eq!(events[send_at - 1], Event::Detect(2));
    assert_eq!(events[send_at + 1], Event::Capture(3));
}

#[test]
fn consecutive_present_frames_send_once() {
    let journal = journal();
    let pattern = [true, true];
    let report = ControlLoop::new(
        components(
            ScriptedSource::frames(pattern.len(), &journal),
            ScriptedDetector::presence(&pattern, &journal),
            RecordingChannel::new(&journal),
        ),
        LoopSettings::default(),
        StopFlag::new(),
    )
    .run();

    assert_eq!(sent_bytes(&journal), vec![b'A']);
    assert_eq!(report.stats.rising_edges, 1);
}

#[test]
fn detections_below_threshold_or_outside_categories_are_ignored() {
    let journal = journal();
    let per_frame = vec![
        Ok(vec![detection(1, 0.29)]),
        Ok(vec![detection(18, 0.99)]),
        Ok(vec![detection(3, 0.3)]),
    ];
    let report = ControlLoop::new(
        components(
            ScriptedSource::frames(3, &journal),
            ScriptedDetector::new(per_frame, &journal),
            RecordingChannel::new(&journal),
        ),
        LoopSettings::default(),
        StopFlag::new(),
    )
    .run();

    assert_eq!(sent_bytes(&journal), vec![b'A']);
    let events = journal.lock().unwrap().clone();
    let send_at = events.iter().position(|e| *e == Event::Send(b'A')).unwrap();
    assert_eq!(events[send_at - 1], Event::Detect(3));
    assert_eq!(report.final_state, PresenceState::Present);
}

#[test]
fn capture_failure_stops_and_releases_in_order() {
    let journal = journal();
    let steps = vec![Step::Frame, Step::Frame, Step::Frame, Step::Frame, Step::Fail];
    let report = ControlLoop::new(
        components(
            ScriptedSource::new(steps, &journal),
            ScriptedDetector::presence(&[false, true, true, true], &journal),
            RecordingChannel::new(&journal),
        ),
        LoopSettings::default(),
        StopFlag::new(),
    )
    .run();

    assert!(matches!(
        report.exit,
        ExitReason::CaptureFailed(PipelineError::CaptureFailed(_))
    ));
    assert_eq!(report.exit.exit_code(), 1);

    let events = journal.lock().unwrap().clone();
    let tail = &events[events.len() - 2..];
    assert_eq!(tail, &[Event::CloseSource, Event::CloseChannel]);
    assert_eq!(count(&journal, &Event::CloseSource), 1);
    assert_eq!(count(&journal, &Event::CloseChannel), 1);
    assert_eq!(count(&journal, &Event::Detect(5)), 0);
    assert_eq!(sent_bytes(&journal), vec![b'A']);
}

#[test]
fn inference_failure_is_fatal() {
    let journal = journal();
    let per_frame = vec![Ok(Vec::new()), Err(anyhow!("tensor shape mismatch"))];
    let report = ControlLoop::new(
        components(
            ScriptedSource::frames(4, &journal),
            ScriptedDetector::new(per_frame, &journal),
            RecordingChannel::new(&journal),
        ),
        LoopSettings::default(),
        StopFlag::new(),
    )
    .run();

    match &report.exit {
        ExitReason::InferenceFailed(err) => assert_eq!(err.code(), "inference"),
        other => panic!("unexpected exit {:?}", other),
    }
    assert_eq!(report.stats.frames, 1);
    assert_eq!(count(&journal, &Event::Capture(3)), 0);
    assert_eq!(count(&journal, &Event::CloseSource), 1);
    assert_eq!(count(&journal, &Event::CloseChannel), 1);
}

#[test]
fn link_failure_is_not_fatal() {
    let journal = journal();
    let pattern = [true, false, true, true];
    let report = ControlLoop::new(
        components(
            ScriptedSource::frames(pattern.len(), &journal),
            ScriptedDetector::presence(&pattern, &journal),
            RecordingChannel::failing(&journal),
        ),
        LoopSettings::default(),
        StopFlag::new(),
    )
    .run();

    assert!(matches!(report.exit, ExitReason::EndOfStream));
    assert_eq!(report.stats.frames, 4);
    assert_eq!(report.stats.rising_edges, 2);
    assert_eq!(report.stats.link_failures, 2);
    assert_eq!(report.stats.signals_sent, 0);
    assert_eq!(report.final_state, PresenceState::Present);
}

#[test]
fn stop_request_ends_after_current_frame() {
    let journal = journal();
    let stop = StopFlag::new();
    stop.request();
    let report = ControlLoop::new(
        components(
            ScriptedSource::frames(10, &journal),
            ScriptedDetector::presence(&[true; 10], &journal),
            RecordingChannel::new(&journal),
        ),
        LoopSettings::default(),
        stop,
    )
    .run();

    assert!(matches!(report.exit, ExitReason::Stopped));
    assert_eq!(report.exit.exit_code(), 0);
    assert_eq!(report.stats.frames, 1);
    assert_eq!(sent_bytes(&journal), vec![b'A']);
    assert_eq!(count(&journal, &Event::CloseChannel), 1);
}

#[test]
fn frame_limit_ends_run() {
    let journal = journal();
    let settings = LoopSettings {
        max_frames: Some(3),
        ..LoopSettings::default()
    };
    let report = ControlLoop::new(
        components(
            ScriptedSource::frames(10, &journal),
            ScriptedDetector::presence(&[false; 10], &journal),
            RecordingChannel::new(&journal),
        ),
        settings,
        StopFlag::new(),
    )
    .run();

    assert!(matches!(report.exit, ExitReason::FrameLimit));
    assert_eq!(report.stats.frames, 3);
    assert!(sent_bytes(&journal).is_empty());
    assert_eq!(report.final_state, PresenceState::Absent);
}

#[test]
fn startup_failure_releases_the_link_once() {
    let journal = journal();
    let channel_journal = journal.clone();
    let detector_journal = journal.clone();

    let result = Components::acquire(
        move || Ok(Box::new(RecordingChannel::new(&channel_journal)) as Box<dyn SignalChannel>),
        move || {
            Ok(Box::new(ScriptedDetector::new(Vec::new(), &detector_journal))
                as Box<dyn DetectorBackend>)
        },
        || {
            Err(PipelineError::DeviceUnavailable(anyhow!(
                "no such device /dev/video9"
            )))
        },
    );

    match result {
        Err(err) => assert_eq!(err.code(), "device_unavailable"),
        Ok(_) => panic!("startup should fail"),
    }
    assert_eq!(*journal.lock().unwrap(), vec![Event::CloseChannel]);
}

#[test]
fn detector_failure_releases_the_link_without_opening_the_device() {
    let journal = journal();
    let channel_journal = journal.clone();
    let device_opened = Arc::new(Mutex::new(false));
    let flag = device_opened.clone();

    let result = Components::acquire(
        move || Ok(Box::new(RecordingChannel::new(&channel_journal)) as Box<dyn SignalChannel>),
        || Err(PipelineError::ModelLoad(anyhow!("weights truncated"))),
        move || {
            *flag.lock().unwrap() = true;
            Err(PipelineError::DeviceUnavailable(anyhow!("unreachable")))
        },
    );

    match result {
        Err(err) => assert_eq!(err.code(), "model_load"),
        Ok(_) => panic!("startup should fail"),
    }
    assert_eq!(*journal.lock().unwrap(), vec![Event::CloseChannel]);
    assert!(!*device_opened.lock().unwrap());
}

#[test]
fn link_failure_at_startup_acquires_nothing_else() {
    let detector_loaded = Arc::new(Mutex::new(false));
    let flag = detector_loaded.clone();

    let result = Components::acquire(
        || Err(PipelineError::Link(anyhow!("permission denied"))),
        move || {
            *flag.lock().unwrap() = true;
            Err(PipelineError::ModelLoad(anyhow!("unreachable")))
        },
        || Err(PipelineError::DeviceUnavailable(anyhow!("unreachable"))),
    );

    assert!(matches!(result, Err(PipelineError::Link(_))));
    assert!(!*detector_loaded.lock().unwrap());
}

/// Records sent bytes for the synthetic end-to-end run.
struct SharedBytes(Arc<Mutex<Vec<u8>>>);

impl SignalChannel for SharedBytes {
    fn describe(&self) -> String {
        "shared".to_string()
    }

    fn send(&mut self, byte: u8) -> Result<()> {
        self.0.lock().unwrap().push(byte);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[test]
fn synthetic_scene_with_stub_detector_end_to_end() -> Result<()> {
    let mut source = SyntheticSource::new(CameraConfig {
        device: "stub://bench".to_string(),
        width: 64,
        height: 48,
        target_fps: 30,
        frame_limit: Some(12),
        scene_period: 3,
    });
    source.connect()?;
    let bytes = Arc::new(Mutex::new(Vec::new()));

    // Empty, occupied, empty, occupied: two appearances.
    let report = ControlLoop::new(
        Components {
            source: Box::new(source),
            detector: Box::new(StubBackend::for_target("person")?),
            channel: Box::new(SharedBytes(bytes.clone())),
        },
        LoopSettings::default(),
        StopFlag::new(),
    )
    .run();

    assert!(matches!(report.exit, ExitReason::EndOfStream));
    assert_eq!(report.stats.frames, 12);
    assert_eq!(report.stats.rising_edges, 2);
    assert_eq!(report.stats.falling_edges, 1);
    assert_eq!(*bytes.lock().unwrap(), vec![b'A', b'A']);
    Ok(())
}

#[test]
fn configured_dry_run_with_prefetch() -> Result<()> {
    let mut config = presence_trigger::TriggerConfig::from_sources(None)?;
    config.model.weights = "stub://person".to_string();
    config.camera.device = Some("stub://bench".to_string());
    config.camera.width = 64;
    config.camera.height = 48;
    config.camera.frame_limit = Some(12);
    config.camera.scene_period = 3;
    config.serial.port = "stub://link".to_string();
    config.prefetch = true;
    config.validate()?;

    let report = presence_trigger::run(
        &config,
        StopFlag::new(),
        Box::new(presence_trigger::NullSink),
    )?;

    assert!(matches!(report.exit, ExitReason::EndOfStream));
    assert_eq!(report.stats.frames, 12);
    assert_eq!(report.stats.signals_sent, 2);
    Ok(())
}

//! Trace replay: drive a full monitoring session from a recorded trace.
//!
//! A trace is JSON lines, one record per line, each stamped with `t` in
//! milliseconds:
//!
//! ```text
//! {"header": {"width": 640, "height": 480, "iris_landmarks": true}}
//! {"t": 0, "landmarks": [[0.5, 0.5, 0.0], ...]}
//! {"t": 100, "landmarks": null}
//! {"t": 200, "detector_error": "frame dropped"}
//! {"t": 250, "paused": true}
//! {"t": 300, "signal": "visibility_hidden"}
//! ```
//!
//! Frame records (`landmarks`, `detector_error`) become scheduler ticks,
//! `paused` toggles video readiness and `signal` records are pushed through
//! the environment monitor.

use crate::config::Config;
use crate::core::landmarks::{
    DetectorCapabilities, LandmarkFrame, Point3D, FACE_MESH_WITH_IRIS_POINTS,
};
use crate::core::snapshot::TrackingSnapshot;
use crate::environment::monitor::{
    EnvironmentError, EnvironmentSignal, HostEnvironment, ObservedSignal,
};
use crate::events::channel::ViolationSink;
use crate::events::types::ViolationEvent;
use crate::scheduler::detection::{SchedulerStats, TickOutcome};
use crate::scheduler::ports::{DetectorError, LandmarkDetector, VideoReadiness, VideoSource};
use crate::session::MonitorSession;
use crossbeam_channel::Sender;
use serde::{Deserialize, Deserializer};
use std::cell::RefCell;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, trace};
use uuid::Uuid;

/// Errors loading a trace.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("trace contains no records")]
    Empty,
}

/// Optional first-line header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TraceHeader {
    pub width: u32,
    pub height: u32,
    pub iris_landmarks: bool,
}

impl Default for TraceHeader {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            iris_landmarks: false,
        }
    }
}

/// What happened at one instant of the trace.
#[derive(Debug, Clone, PartialEq)]
pub enum TracePayload {
    Face(LandmarkFrame),
    NoFace,
    DetectorError(String),
    Paused(bool),
    Signal(EnvironmentSignal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub t: u64,
    pub payload: TracePayload,
}

/// A parsed trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub header: TraceHeader,
    pub records: Vec<TraceRecord>,
}

/// Signal names accepted in a trace.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TraceSignal {
    VisibilityHidden,
    VisibilityVisible,
    FullscreenExit,
    FullscreenEnter,
    FocusLost,
    ContextMenu,
    Copy,
    Paste,
}

impl From<TraceSignal> for EnvironmentSignal {
    fn from(signal: TraceSignal) -> Self {
        match signal {
            TraceSignal::VisibilityHidden => EnvironmentSignal::VisibilityChanged { hidden: true },
            TraceSignal::VisibilityVisible => {
                EnvironmentSignal::VisibilityChanged { hidden: false }
            }
            TraceSignal::FullscreenExit => EnvironmentSignal::FullscreenChanged { active: false },
            TraceSignal::FullscreenEnter => EnvironmentSignal::FullscreenChanged { active: true },
            TraceSignal::FocusLost => EnvironmentSignal::FocusLost,
            TraceSignal::ContextMenu => EnvironmentSignal::ContextMenu,
            TraceSignal::Copy => EnvironmentSignal::Copy,
            TraceSignal::Paste => EnvironmentSignal::Paste,
        }
    }
}

/// One line as written on disk.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLine {
    header: Option<TraceHeader>,
    t: Option<u64>,
    /// Absent: not a frame. `null`: no face.
    #[serde(default, deserialize_with = "present")]
    landmarks: Option<Option<Vec<[f64; 3]>>>,
    detector_error: Option<String>,
    paused: Option<bool>,
    signal: Option<TraceSignal>,
}

/// Distinguishes a present `null` from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl Trace {
    /// Read and parse a trace file.
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let content = std::fs::read_to_string(path).map_err(|e| ReplayError::Io(e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse JSON-lines trace text.
    pub fn parse(text: &str) -> Result<Self, ReplayError> {
        let mut header = None;
        let mut records: Vec<TraceRecord> = Vec::new();
        let mut saw_iris = false;

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parse_err = |message: String| ReplayError::Parse {
                line: line_no,
                message,
            };

            let raw: RawLine = serde_json::from_str(line).map_err(|e| parse_err(e.to_string()))?;

            if let Some(h) = raw.header {
                if header.is_some() || !records.is_empty() {
                    return Err(parse_err("header must be the first record".into()));
                }
                header = Some(h);
                continue;
            }

            let t = raw.t.ok_or_else(|| parse_err("missing \"t\"".into()))?;
            if let Some(last) = records.last() {
                if t < last.t {
                    return Err(parse_err(format!(
                        "time {t} goes backwards (previous record at {})",
                        last.t
                    )));
                }
            }

            let mut payloads = Vec::with_capacity(1);
            if let Some(landmarks) = raw.landmarks {
                payloads.push(match landmarks {
                    Some(points) => {
                        saw_iris |= points.len() >= FACE_MESH_WITH_IRIS_POINTS;
                        TracePayload::Face(LandmarkFrame::new(
                            points.into_iter().map(Point3D::from).collect(),
                        ))
                    }
                    None => TracePayload::NoFace,
                });
            }
            if let Some(message) = raw.detector_error {
                payloads.push(TracePayload::DetectorError(message));
            }
            if let Some(paused) = raw.paused {
                payloads.push(TracePayload::Paused(paused));
            }
            if let Some(signal) = raw.signal {
                payloads.push(TracePayload::Signal(signal.into()));
            }

            let payload = match payloads.len() {
                1 => payloads.remove(0),
                0 => return Err(parse_err("record has no payload".into())),
                _ => return Err(parse_err("record has more than one payload".into())),
            };
            records.push(TraceRecord { t, payload });
        }

        if records.is_empty() {
            return Err(ReplayError::Empty);
        }

        // Without a header, infer iris support from the frames themselves.
        let header = header.unwrap_or(TraceHeader {
            iris_landmarks: saw_iris,
            ..TraceHeader::default()
        });
        Ok(Self { header, records })
    }

    /// Time of the last record.
    pub fn duration_ms(&self) -> u64 {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => last.t - first.t,
            _ => 0,
        }
    }
}

/// The frame the replayed detector will see next.
#[derive(Debug, Clone, PartialEq)]
enum CurrentFrame {
    Face(LandmarkFrame),
    NoFace,
    Error(String),
}

/// Video source backed by trace records.
#[derive(Debug)]
pub struct ReplaySource {
    readiness: RefCell<VideoReadiness>,
    current: RefCell<CurrentFrame>,
}

impl ReplaySource {
    pub fn new(header: &TraceHeader) -> Self {
        Self {
            readiness: RefCell::new(VideoReadiness::playing(header.width, header.height)),
            current: RefCell::new(CurrentFrame::NoFace),
        }
    }

    fn set_paused(&self, paused: bool) {
        self.readiness.borrow_mut().paused = paused;
    }

    fn show(&self, frame: CurrentFrame) {
        *self.current.borrow_mut() = frame;
    }
}

impl VideoSource for ReplaySource {
    fn readiness(&self) -> VideoReadiness {
        *self.readiness.borrow()
    }
}

/// Landmark detector that returns whatever the trace recorded.
#[derive(Debug)]
pub struct ReplayDetector {
    capabilities: DetectorCapabilities,
    last_timestamp: Option<u64>,
    disposed: bool,
}

impl ReplayDetector {
    pub fn new(iris_landmarks: bool) -> Self {
        Self {
            capabilities: DetectorCapabilities { iris_landmarks },
            last_timestamp: None,
            disposed: false,
        }
    }
}

impl LandmarkDetector for ReplayDetector {
    type Source = ReplaySource;

    fn capabilities(&self) -> DetectorCapabilities {
        self.capabilities
    }

    fn detect(
        &mut self,
        source: &ReplaySource,
        timestamp_ms: u64,
    ) -> Result<Option<LandmarkFrame>, DetectorError> {
        if self.disposed {
            return Err(DetectorError::Disposed);
        }
        if let Some(last) = self.last_timestamp {
            if timestamp_ms <= last {
                return Err(DetectorError::Detection(format!(
                    "timestamp {timestamp_ms} not after {last}"
                )));
            }
        }
        self.last_timestamp = Some(timestamp_ms);

        match &*source.current.borrow() {
            CurrentFrame::Face(frame) => Ok(Some(frame.clone())),
            CurrentFrame::NoFace => Ok(None),
            CurrentFrame::Error(message) => Err(DetectorError::Detection(message.clone())),
        }
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}

/// Host environment fed from trace signal records.
#[derive(Debug, Default)]
pub struct ReplayEnvironment {
    sender: Option<Sender<ObservedSignal>>,
    fullscreen: bool,
}

impl ReplayEnvironment {
    /// Deliver a recorded signal. Dropped while detached.
    pub fn emit(&mut self, signal: EnvironmentSignal, timestamp_ms: u64) {
        if let EnvironmentSignal::FullscreenChanged { active } = signal {
            self.fullscreen = active;
        }
        if let Some(sender) = &self.sender {
            if sender
                .try_send(ObservedSignal {
                    signal,
                    timestamp_ms,
                })
                .is_err()
            {
                debug!(?signal, "replay signal dropped");
            }
        }
    }
}

impl HostEnvironment for ReplayEnvironment {
    fn attach(&mut self, signals: Sender<ObservedSignal>) -> Result<(), EnvironmentError> {
        self.sender = Some(signals);
        Ok(())
    }

    fn detach(&mut self) {
        self.sender = None;
    }

    fn request_fullscreen(&mut self) -> Result<(), EnvironmentError> {
        self.fullscreen = true;
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn exit_fullscreen(&mut self) -> Result<(), EnvironmentError> {
        self.fullscreen = false;
        Ok(())
    }
}

/// Final state of a replay.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub session_id: Uuid,
    pub snapshot: TrackingSnapshot,
    pub stats: SchedulerStats,
    pub environment_violations: u64,
}

/// Step-by-step replay of a trace through a live session.
pub struct Replay {
    session: MonitorSession<ReplayDetector, ReplayEnvironment>,
    source: ReplaySource,
    records: std::vec::IntoIter<TraceRecord>,
}

impl Replay {
    /// Start an enabled session with a ready detector.
    pub fn new(trace: Trace, config: Config, sink: ViolationSink) -> Self {
        let source = ReplaySource::new(&trace.header);
        let mut session = MonitorSession::new(config, ReplayEnvironment::default(), sink);
        session.set_enabled(true);
        session.detector_ready(Ok(ReplayDetector::new(trace.header.iris_landmarks)));

        Self {
            session,
            source,
            records: trace.records.into_iter(),
        }
    }

    pub fn session(&self) -> &MonitorSession<ReplayDetector, ReplayEnvironment> {
        &self.session
    }

    /// Time of the next record, if any remain.
    pub fn next_time(&self) -> Option<u64> {
        self.records.as_slice().first().map(|r| r.t)
    }

    /// Apply the next record. Returns `None` when the trace is exhausted;
    /// otherwise the tick outcome for frame records.
    pub fn step(&mut self) -> Option<Option<TickOutcome>> {
        let record = self.records.next()?;
        trace!(t = record.t, "replay record");

        let outcome = match record.payload {
            TracePayload::Face(frame) => {
                self.source.show(CurrentFrame::Face(frame));
                Some(self.session.tick(&self.source, record.t))
            }
            TracePayload::NoFace => {
                self.source.show(CurrentFrame::NoFace);
                Some(self.session.tick(&self.source, record.t))
            }
            TracePayload::DetectorError(message) => {
                self.source.show(CurrentFrame::Error(message));
                Some(self.session.tick(&self.source, record.t))
            }
            TracePayload::Paused(paused) => {
                self.source.set_paused(paused);
                None
            }
            TracePayload::Signal(signal) => {
                let environment = self.session.environment_mut();
                environment.host_mut().emit(signal, record.t);
                environment.drain();
                None
            }
        };
        Some(outcome)
    }

    /// Apply every remaining record.
    pub fn run_to_end(&mut self) {
        while self.step().is_some() {}
    }

    /// Disable the session and report its final state.
    pub fn finish(mut self) -> ReplayOutcome {
        self.session.set_enabled(false);
        ReplayOutcome {
            session_id: self.session.id(),
            snapshot: self.session.snapshot(),
            stats: self.session.stats(),
            environment_violations: self.session.environment().reported_count(),
        }
    }
}

/// Replay a whole trace and collect every violation in emission order.
pub fn replay_trace(trace: Trace, config: Config) -> (Vec<ViolationEvent>, ReplayOutcome) {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let collected = Arc::clone(&collected);
        ViolationSink::new(move |event| {
            if let Ok(mut events) = collected.lock() {
                events.push(event);
            }
        })
    };

    let mut replay = Replay::new(trace, config, sink);
    replay.run_to_end();
    let outcome = replay.finish();

    let events = collected
        .lock()
        .map(|mut events| std::mem::take(&mut *events))
        .unwrap_or_default();
    (events, outcome)
}

//! The detection scheduler.
//!
//! The host offers ticks at its redraw cadence; the scheduler decides which
//! ticks become samples. A tick is skipped, never failed, when it arrives
//! too soon, when the detector is still loading, or when the video is not
//! playing. Detector errors on a tick are swallowed and the next tick
//! proceeds normally. After [`DetectionScheduler::dispose`] no tick does
//! any work.

use crate::config::{DetectionThresholds, SamplingConfig};
use crate::core::detector::{Observation, ViolationDetector};
use crate::core::geometry::extract_features;
use crate::core::snapshot::{
    SnapshotPublisher, TrackingSnapshot, MESSAGE_ACTIVE, MESSAGE_UNAVAILABLE,
};
use crate::events::channel::ViolationSink;
use crate::scheduler::ports::{DetectorError, LandmarkDetector, VideoSource};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Lifecycle of the landmark detector resource.
#[derive(Debug)]
enum DetectorSlot<D> {
    Initializing,
    Ready(D),
    Unavailable,
    Disposed,
}

/// Why a tick did no detection work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Less than one sample interval since the last processed sample
    RateLimited,
    /// Detector still initializing
    DetectorLoading,
    /// Detector failed to initialize for this session
    DetectorUnavailable,
    /// Video has no dimensions, or is paused or ended
    SourceNotReady,
    /// The detector returned an error for this frame
    DetectionFailed,
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A sample was processed.
    Processed {
        face_detected: bool,
        events_emitted: usize,
    },
    Skipped(SkipReason),
    /// The scheduler has been disposed.
    Stopped,
}

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub processed: u64,
    pub skipped: u64,
    pub detection_failures: u64,
    pub events_emitted: u64,
}

/// Drives feature extraction and violation detection from a video source.
#[derive(Debug)]
pub struct DetectionScheduler<D: LandmarkDetector> {
    sample_interval: Duration,
    slot: DetectorSlot<D>,
    detector: ViolationDetector,
    publisher: SnapshotPublisher,
    sink: ViolationSink,
    last_sample_ms: Option<u64>,
    last_detector_timestamp: u64,
    stats: SchedulerStats,
}

impl<D: LandmarkDetector> DetectionScheduler<D> {
    /// Create a scheduler waiting for its detector.
    pub fn new(
        sampling: &SamplingConfig,
        thresholds: DetectionThresholds,
        sink: ViolationSink,
    ) -> Self {
        Self::with_publisher(sampling, thresholds, sink, SnapshotPublisher::new())
    }

    /// Create a scheduler that publishes into an existing snapshot slot.
    ///
    /// The slot is reset to its initial state.
    pub fn with_publisher(
        sampling: &SamplingConfig,
        thresholds: DetectionThresholds,
        sink: ViolationSink,
        publisher: SnapshotPublisher,
    ) -> Self {
        publisher.reset();
        Self {
            sample_interval: sampling.sample_interval(),
            slot: DetectorSlot::Initializing,
            detector: ViolationDetector::new(thresholds),
            publisher,
            sink,
            last_sample_ms: None,
            last_detector_timestamp: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Complete asynchronous detector initialization.
    ///
    /// A detector that arrives after disposal is disposed immediately.
    pub fn on_detector_ready(&mut self, result: Result<D, DetectorError>) {
        match self.slot {
            DetectorSlot::Initializing => match result {
                Ok(detector) => {
                    info!(
                        iris = detector.capabilities().iris_landmarks,
                        "face tracking active"
                    );
                    self.slot = DetectorSlot::Ready(detector);
                    self.publisher.set_status_message(MESSAGE_ACTIVE);
                }
                Err(e) => {
                    warn!(error = %e, "face tracking unavailable");
                    self.slot = DetectorSlot::Unavailable;
                    self.publisher.set_status_message(MESSAGE_UNAVAILABLE);
                }
            },
            DetectorSlot::Disposed => {
                if let Ok(mut detector) = result {
                    debug!("landmark detector ready after disposal, releasing it");
                    detector.dispose();
                }
            }
            DetectorSlot::Ready(_) | DetectorSlot::Unavailable => match result {
                Ok(mut detector) => {
                    warn!("landmark detector initialized twice, releasing the duplicate");
                    detector.dispose();
                }
                Err(e) => debug!(error = %e, "ignoring late detector initialization error"),
            },
        }
    }

    /// Offer one scheduling opportunity at `now_ms`.
    pub fn tick(&mut self, source: &D::Source, now_ms: u64) -> TickOutcome {
        let outcome = self.run_tick(source, now_ms);
        match outcome {
            TickOutcome::Processed { events_emitted, .. } => {
                self.stats.processed += 1;
                self.stats.events_emitted += events_emitted as u64;
            }
            TickOutcome::Skipped(reason) => {
                self.stats.skipped += 1;
                if reason == SkipReason::DetectionFailed {
                    self.stats.detection_failures += 1;
                }
            }
            TickOutcome::Stopped => {}
        }
        outcome
    }

    fn run_tick(&mut self, source: &D::Source, now_ms: u64) -> TickOutcome {
        if self.is_disposed() {
            return TickOutcome::Stopped;
        }

        if let Some(last) = self.last_sample_ms {
            if Duration::from_millis(now_ms.saturating_sub(last)) < self.sample_interval {
                return TickOutcome::Skipped(SkipReason::RateLimited);
            }
        }

        let landmark_detector = match &mut self.slot {
            DetectorSlot::Ready(detector) => detector,
            DetectorSlot::Initializing => {
                trace!("tick skipped, detector loading");
                return TickOutcome::Skipped(SkipReason::DetectorLoading);
            }
            DetectorSlot::Unavailable => {
                return TickOutcome::Skipped(SkipReason::DetectorUnavailable);
            }
            DetectorSlot::Disposed => return TickOutcome::Stopped,
        };

        let readiness = source.readiness();
        if !readiness.is_ready() {
            trace!(?readiness, "tick skipped, video not ready");
            return TickOutcome::Skipped(SkipReason::SourceNotReady);
        }

        self.last_sample_ms = Some(now_ms);

        let timestamp = if now_ms > self.last_detector_timestamp {
            now_ms
        } else {
            self.last_detector_timestamp + 1
        };
        self.last_detector_timestamp = timestamp;

        let iris_available = landmark_detector.capabilities().iris_landmarks;
        let frame = match landmark_detector.detect(source, timestamp) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, timestamp, "detection failed, skipping tick");
                return TickOutcome::Skipped(SkipReason::DetectionFailed);
            }
        };

        let observation = match frame.as_ref().filter(|f| !f.is_empty()) {
            Some(frame) => Observation::Face(extract_features(frame, iris_available)),
            None => Observation::NoFace,
        };

        let step = self.detector.step(&observation, now_ms);

        let previous = self.publisher.latest();
        let snapshot = match observation {
            Observation::Face(features) => TrackingSnapshot {
                face_detected: true,
                head_pose: features.head_pose,
                gaze_score: features.gaze_score,
                status: step.status,
                status_message: step.status_message.to_string(),
            },
            Observation::NoFace => TrackingSnapshot {
                face_detected: false,
                status: step.status,
                status_message: step.status_message.to_string(),
                ..previous
            },
        };
        self.publisher.publish(snapshot);

        let events_emitted = step.events.len();
        for event in step.events {
            info!(
                subtype = %event.subtype,
                severity = %event.severity,
                "{}",
                event.message
            );
            self.sink.deliver(event);
        }

        TickOutcome::Processed {
            face_detected: matches!(observation, Observation::Face(_)),
            events_emitted,
        }
    }

    /// Release the detector and stop all further work. Idempotent.
    pub fn dispose(&mut self) {
        if let DetectorSlot::Ready(mut detector) =
            std::mem::replace(&mut self.slot, DetectorSlot::Disposed)
        {
            detector.dispose();
            info!("landmark detector disposed");
        }
        self.detector.clear_pending();
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.slot, DetectorSlot::Disposed)
    }

    /// True once the detector has loaded and until disposal.
    pub fn is_ready(&self) -> bool {
        matches!(self.slot, DetectorSlot::Ready(_))
    }

    /// The most recent timestamp handed to the detector.
    pub fn last_detector_timestamp(&self) -> u64 {
        self.last_detector_timestamp
    }

    pub fn publisher(&self) -> &SnapshotPublisher {
        &self.publisher
    }

    pub fn violation_detector(&self) -> &ViolationDetector {
        &self.detector
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

//! Temporal violation detection.
//!
//! Each video-derived subtype (head turn, gaze aversion, face absent) runs an
//! independent three-state machine:
//!
//! ```text
//!   idle ──condition holds──▶ pending ──held ≥ min duration──▶ armed
//!    ▲                           │                               │
//!    └──────condition clears─────┴───────────────────────────────┘
//! ```
//!
//! Entering or re-checking `armed` attempts an emission, which succeeds only
//! when the subtype's cooldown has elapsed since its previous emission. The
//! cooldown timestamp survives a return to `idle`, so a condition that
//! flaps on and off cannot re-trigger inside the window.

use crate::config::DetectionThresholds;
use crate::core::geometry::FaceFeatures;
use crate::core::snapshot::TrackingStatus;
use crate::events::types::{Severity, ViolationEvent, ViolationSubtype};
use std::time::Duration;

/// What the scheduler observed on one processed tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// A face was found and its features extracted.
    Face(FaceFeatures),
    /// The detector ran but found no face.
    NoFace,
}

/// Phase of a single subtype's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Pending,
    Armed,
}

/// Debounce and cooldown timestamps for one subtype.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubtypeTimers {
    condition_start: Option<u64>,
    last_emitted: Option<u64>,
}

impl SubtypeTimers {
    /// When the current run of the condition started, if it holds.
    pub fn condition_start(&self) -> Option<u64> {
        self.condition_start
    }

    /// When this subtype last produced an event.
    pub fn last_emitted(&self) -> Option<u64> {
        self.last_emitted
    }

    /// Current phase relative to `now`.
    pub fn phase(&self, now_ms: u64, min_duration: Duration) -> TimerPhase {
        match self.condition_start {
            None => TimerPhase::Idle,
            Some(start) if elapsed(now_ms, start) >= min_duration => TimerPhase::Armed,
            Some(_) => TimerPhase::Pending,
        }
    }

    /// Feed one observation of the condition. Returns true when an event
    /// should be emitted now.
    pub fn observe(
        &mut self,
        holds: bool,
        now_ms: u64,
        min_duration: Duration,
        cooldown: Duration,
    ) -> bool {
        if !holds {
            self.condition_start = None;
            return false;
        }

        let start = *self.condition_start.get_or_insert(now_ms);
        if elapsed(now_ms, start) < min_duration {
            return false;
        }

        if let Some(last) = self.last_emitted {
            if elapsed(now_ms, last) < cooldown {
                return false;
            }
        }

        self.last_emitted = Some(now_ms);
        true
    }

    /// Clear the condition run but keep the cooldown anchor.
    pub fn clear_condition(&mut self) {
        self.condition_start = None;
    }
}

fn elapsed(now_ms: u64, since_ms: u64) -> Duration {
    Duration::from_millis(now_ms.saturating_sub(since_ms))
}

/// Result of feeding one observation to the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorStep {
    /// Events to deliver, in emission order
    pub events: Vec<ViolationEvent>,
    /// Instantaneous status, independent of whether anything was emitted
    pub status: TrackingStatus,
    pub status_message: &'static str,
}

/// Per-session debounce/cooldown state for the video-derived subtypes.
#[derive(Debug, Clone)]
pub struct ViolationDetector {
    thresholds: DetectionThresholds,
    head_turn: SubtypeTimers,
    gaze_aversion: SubtypeTimers,
    face_absent: SubtypeTimers,
}

impl ViolationDetector {
    pub fn new(thresholds: DetectionThresholds) -> Self {
        Self {
            thresholds,
            head_turn: SubtypeTimers::default(),
            gaze_aversion: SubtypeTimers::default(),
            face_absent: SubtypeTimers::default(),
        }
    }

    pub fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    /// Timers for a video-derived subtype; `None` for environment subtypes.
    pub fn timers(&self, subtype: ViolationSubtype) -> Option<&SubtypeTimers> {
        match subtype {
            ViolationSubtype::HeadTurn => Some(&self.head_turn),
            ViolationSubtype::GazeAversion => Some(&self.gaze_aversion),
            ViolationSubtype::FaceAbsent => Some(&self.face_absent),
            _ => None,
        }
    }

    /// Whether a yaw angle counts as a head turn.
    pub fn is_head_turned(&self, yaw: f64) -> bool {
        yaw.abs() > self.thresholds.head_yaw_degrees
    }

    /// Whether a gaze score counts as averted.
    pub fn is_gaze_averted(&self, gaze_score: f64) -> bool {
        gaze_score > self.thresholds.gaze_score
    }

    /// Advance all subtype machines by one tick.
    pub fn step(&mut self, observation: &Observation, now_ms: u64) -> DetectorStep {
        let t = &self.thresholds;
        let mut events = Vec::new();

        match observation {
            Observation::Face(features) => {
                let yaw = features.head_pose.yaw;
                let head_turned = self.is_head_turned(yaw);
                let gaze_averted = self.is_gaze_averted(features.gaze_score);

                self.face_absent.clear_condition();

                if self
                    .head_turn
                    .observe(head_turned, now_ms, t.head_turn_duration, t.cooldown)
                {
                    let severity = if yaw.abs() > t.head_yaw_high_degrees {
                        Severity::High
                    } else {
                        Severity::Medium
                    };
                    events.push(ViolationEvent::new(
                        ViolationSubtype::HeadTurn,
                        now_ms,
                        format!(
                            "Candidate is looking away (head turned {:.0}°)",
                            yaw.abs()
                        ),
                        severity,
                    ));
                }

                if self
                    .gaze_aversion
                    .observe(gaze_averted, now_ms, t.gaze_duration, t.cooldown)
                {
                    events.push(ViolationEvent::new(
                        ViolationSubtype::GazeAversion,
                        now_ms,
                        "Candidate's eyes are wandering off-screen",
                        Severity::Medium,
                    ));
                }

                let (status, status_message) = if head_turned {
                    (TrackingStatus::Alert, "Head turned")
                } else if gaze_averted {
                    (TrackingStatus::Warning, "Eyes wandering")
                } else {
                    (TrackingStatus::Ok, "Face OK")
                };

                DetectorStep {
                    events,
                    status,
                    status_message,
                }
            }
            Observation::NoFace => {
                if self
                    .face_absent
                    .observe(true, now_ms, t.face_absent_duration, t.cooldown)
                {
                    events.push(ViolationEvent::new(
                        ViolationSubtype::FaceAbsent,
                        now_ms,
                        "Candidate face is not visible in the camera",
                        Severity::High,
                    ));
                }

                self.head_turn.clear_condition();
                self.gaze_aversion.clear_condition();

                DetectorStep {
                    events,
                    status: TrackingStatus::Warning,
                    status_message: "No face detected",
                }
            }
        }
    }

    /// Drop every pending condition run. Cooldown anchors are kept.
    pub fn clear_pending(&mut self) {
        self.head_turn.clear_condition();
        self.gaze_aversion.clear_condition();
        self.face_absent.clear_condition();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::HeadPose;

    fn face(yaw: f64, gaze: f64) -> Observation {
        Observation::Face(FaceFeatures {
            head_pose: HeadPose {
                yaw,
                pitch: 0.0,
                roll: 0.0,
            },
            gaze_score: gaze,
        })
    }

    fn detector() -> ViolationDetector {
        ViolationDetector::new(DetectionThresholds::default())
    }

    fn count(events: &[ViolationEvent], subtype: ViolationSubtype) -> usize {
        events.iter().filter(|e| e.subtype == subtype).count()
    }

    #[test]
    fn test_timer_phases() {
        let mut timers = SubtypeTimers::default();
        let min = Duration::from_millis(1000);
        let cooldown = Duration::from_millis(5000);

        assert_eq!(timers.phase(0, min), TimerPhase::Idle);
        assert!(!timers.observe(true, 100, min, cooldown));
        assert_eq!(timers.phase(500, min), TimerPhase::Pending);
        assert!(timers.observe(true, 1100, min, cooldown));
        assert_eq!(timers.phase(1100, min), TimerPhase::Armed);
        assert!(!timers.observe(false, 1200, min, cooldown));
        assert_eq!(timers.phase(1200, min), TimerPhase::Idle);
        assert_eq!(timers.last_emitted(), Some(1100));
    }

    #[test]
    fn test_sustained_head_turn_emits_once_per_cooldown() {
        let mut detector = detector();
        let mut events = Vec::new();

        // 31° from t=0, sampled every 100 ms up to 9.9 s
        for t in (0..10_000).step_by(100) {
            events.extend(detector.step(&face(31.0, 0.0), t).events);
        }

        let head_turns: Vec<_> = events
            .iter()
            .filter(|e| e.subtype == ViolationSubtype::HeadTurn)
            .collect();
        // Fires at 2000 ms, then again at 10_000 which is outside the loop.
        assert_eq!(head_turns.len(), 1);
        assert_eq!(head_turns[0].timestamp_ms, 2_000);
        assert_eq!(head_turns[0].severity, Severity::Medium);

        let second = detector.step(&face(31.0, 0.0), 10_000).events;
        assert_eq!(count(&second, ViolationSubtype::HeadTurn), 1);
    }

    #[test]
    fn test_retriggers_inside_cooldown_are_suppressed() {
        let mut detector = detector();
        let mut emitted = Vec::new();
        let mut run = |detector: &mut ViolationDetector, yaw: f64, from: u64, to: u64| {
            for t in (from..=to).step_by(250) {
                for e in detector.step(&face(yaw, 0.0), t).events {
                    emitted.push(e.timestamp_ms);
                }
            }
        };

        run(&mut detector, 40.0, 0, 2_000); // first emission at 2000
        run(&mut detector, 0.0, 2_250, 2_750);
        run(&mut detector, 40.0, 3_000, 5_500); // duration met at 5000, cooldown blocks
        run(&mut detector, 0.0, 5_750, 6_000);
        run(&mut detector, 40.0, 6_250, 9_000); // duration met at 8250, cooldown blocks
        run(&mut detector, 40.0, 9_250, 10_500); // cooldown over at 10_000

        assert_eq!(emitted, vec![2_000, 10_000]);
    }

    #[test]
    fn test_head_turn_severity_high_beyond_45() {
        let mut detector = detector();
        detector.step(&face(-50.0, 0.0), 0);
        let step = detector.step(&face(-50.0, 0.0), 2_000);
        assert_eq!(step.events.len(), 1);
        assert_eq!(step.events[0].severity, Severity::High);
        assert!(step.events[0].message.contains("50°"));
    }

    #[test]
    fn test_face_absent_boundaries() {
        let mut short = detector();
        for t in (0..3_000).step_by(100).chain([2_999]) {
            assert!(short.step(&Observation::NoFace, t).events.is_empty());
        }
        assert!(short.step(&face(0.0, 0.0), 3_100).events.is_empty());

        let mut long = detector();
        let mut events = Vec::new();
        for t in [0, 1_000, 2_000, 3_001] {
            events.extend(long.step(&Observation::NoFace, t).events);
        }
        events.extend(long.step(&face(0.0, 0.0), 3_100).events);
        assert_eq!(count(&events, ViolationSubtype::FaceAbsent), 1);
        assert_eq!(events[0].severity, Severity::High);
    }

    #[test]
    fn test_gaze_aversion_needs_three_seconds() {
        let mut d = detector();
        assert!(d.step(&face(0.0, 0.6), 0).events.is_empty());
        assert!(d.step(&face(0.0, 0.6), 2_999).events.is_empty());
        let step = d.step(&face(0.0, 0.6), 3_000);
        assert_eq!(count(&step.events, ViolationSubtype::GazeAversion), 1);
        assert_eq!(step.events[0].severity, Severity::Medium);

        // 0.55 itself is not above the threshold.
        let mut boundary = detector();
        boundary.step(&face(0.0, 0.55), 0);
        assert!(boundary.step(&face(0.0, 0.55), 5_000).events.is_empty());
    }

    #[test]
    fn test_threshold_predicates_are_strict() {
        let d = detector();
        assert!(!d.is_head_turned(30.0));
        assert!(d.is_head_turned(-30.5));
        assert!(!d.is_gaze_averted(0.55));
        assert!(d.is_gaze_averted(0.56));

        // step agrees with the predicates at the boundary
        let mut d = detector();
        assert_eq!(d.step(&face(30.0, 0.55), 0).status, TrackingStatus::Ok);
        assert_eq!(d.step(&face(30.5, 0.0), 100).status, TrackingStatus::Alert);
    }

    #[test]
    fn test_no_face_resets_pose_timers() {
        let mut detector = detector();
        detector.step(&face(35.0, 0.7), 0);
        assert!(detector.timers(ViolationSubtype::HeadTurn).unwrap().condition_start().is_some());

        detector.step(&Observation::NoFace, 500);
        assert_eq!(detector.timers(ViolationSubtype::HeadTurn).unwrap().condition_start(), None);
        assert_eq!(
            detector.timers(ViolationSubtype::GazeAversion).unwrap().condition_start(),
            None
        );

        // Head-turn run restarts from scratch once the face is back.
        detector.step(&face(35.0, 0.0), 1_000);
        assert!(detector.step(&face(35.0, 0.0), 2_500).events.is_empty());
        assert_eq!(detector.step(&face(35.0, 0.0), 3_000).events.len(), 1);
    }

    #[test]
    fn test_subtypes_are_independent() {
        let mut detector = detector();
        let mut events = Vec::new();
        for t in (0..=3_000).step_by(500) {
            events.extend(detector.step(&face(35.0, 0.9), t).events);
        }
        assert_eq!(count(&events, ViolationSubtype::HeadTurn), 1);
        assert_eq!(count(&events, ViolationSubtype::GazeAversion), 1);
        assert_eq!(events[0].timestamp_ms, 2_000);
        assert_eq!(events[1].timestamp_ms, 3_000);
    }

    #[test]
    fn test_status_reflects_instantaneous_condition() {
        let mut detector = detector();
        let step = detector.step(&face(35.0, 0.9), 0);
        assert_eq!(step.status, TrackingStatus::Alert);
        assert_eq!(step.status_message, "Head turned");
        assert!(step.events.is_empty());

        let step = detector.step(&face(5.0, 0.9), 100);
        assert_eq!(step.status, TrackingStatus::Warning);
        assert_eq!(step.status_message, "Eyes wandering");

        let step = detector.step(&Observation::NoFace, 200);
        assert_eq!(step.status, TrackingStatus::Warning);
        assert_eq!(step.status_message, "No face detected");

        let step = detector.step(&face(5.0, 0.1), 300);
        assert_eq!(step.status, TrackingStatus::Ok);
        assert_eq!(step.status_message, "Face OK");
    }

    #[test]
    fn test_clear_pending_keeps_cooldown() {
        let mut detector = detector();
        detector.step(&face(35.0, 0.0), 0);
        detector.step(&face(35.0, 0.0), 2_000);
        detector.clear_pending();

        let timers = detector.timers(ViolationSubtype::HeadTurn).unwrap();
        assert_eq!(timers.condition_start(), None);
        assert_eq!(timers.last_emitted(), Some(2_000));
        assert!(detector.timers(ViolationSubtype::Copy).is_none());
    }
}

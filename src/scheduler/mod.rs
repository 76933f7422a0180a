//! Video-driven detection scheduling.
//!
//! The scheduler samples a live video source at a bounded rate, hands frames
//! to an external landmark detector, and feeds the results through feature
//! extraction and violation detection.

pub mod detection;
pub mod ports;

pub use detection::{DetectionScheduler, SchedulerStats, SkipReason, TickOutcome};
pub use ports::{DetectorError, LandmarkDetector, VideoReadiness, VideoSource};

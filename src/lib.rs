//! Interview Integrity Monitor - real-time integrity signals for remote interviews.
//!
//! This library watches a candidate during a remote interview and raises
//! discrete, rate-limited violation events when they look away, their eyes
//! wander off-screen, their face leaves the camera, or they tamper with the
//! interview environment.
//!
//! # What is observed
//!
//! - **Head pose and gaze**: derived from face landmarks, never from raw pixels
//! - **Face presence**: whether a face is in frame at all
//! - **Environment**: tab switches, fullscreen exits, focus loss, clipboard and
//!   context-menu attempts
//!
//! No video, audio or keystroke content is stored.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Interview Integrity Monitor                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │  Landmark   │──▶│  Features   │──▶│  Violation  │──┐     │
//! │  │  Scheduler  │   │ (pose,gaze) │   │  Detector   │  │     │
//! │  └─────────────┘   └─────────────┘   └─────────────┘  │     │
//! │         │                                             ▼     │
//! │         ▼                                      ┌──────────┐ │
//! │  ┌─────────────┐   ┌─────────────┐             │Violation │ │
//! │  │  Snapshot   │   │ Environment │────────────▶│   Sink   │ │
//! │  │  Publisher  │   │   Monitor   │             └──────────┘ │
//! │  └─────────────┘   └─────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use integrity_monitor::replay::{replay_trace, Trace};
//! use integrity_monitor::Config;
//!
//! let trace = Trace::load(std::path::Path::new("session.jsonl")).expect("readable trace");
//! let (events, outcome) = replay_trace(trace, Config::default());
//! for event in &events {
//!     println!("{} {}", event.subtype, event.message);
//! }
//! println!("{:?}", outcome.snapshot.status);
//! ```

pub mod config;
pub mod core;
pub mod environment;
pub mod events;
pub mod integrity;
pub mod replay;
pub mod scheduler;
pub mod session;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, DetectionThresholds, EnvironmentConfig, SamplingConfig};
pub use self::core::{
    extract_features, DetectorCapabilities, FaceFeatures, HeadPose, LandmarkFrame, Point3D,
    SnapshotPublisher, TrackingSnapshot, TrackingStatus, ViolationDetector,
};
pub use environment::{EnvironmentError, EnvironmentMonitor, EnvironmentSignal, HostEnvironment};
pub use events::{Severity, ViolationEvent, ViolationKind, ViolationSink, ViolationSubtype};
pub use integrity::{IntegrityLevel, IntegrityReport, IntegrityTally};
pub use scheduler::{
    DetectionScheduler, DetectorError, LandmarkDetector, TickOutcome, VideoReadiness, VideoSource,
};
pub use session::{Clock, ManualClock, MonitorSession, SystemClock};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice shown to candidates before monitoring starts.
pub const MONITORING_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║          INTERVIEW INTEGRITY MONITOR - CANDIDATE NOTICE          ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This interview is monitored for integrity.                      ║
║                                                                  ║
║  ✓ WHAT WE OBSERVE:                                              ║
║    • Which way your head is turned (angles only)                 ║
║    • Whether your eyes look away from the screen                 ║
║    • Whether your face is visible to the camera                  ║
║    • Tab switches, fullscreen exits and focus changes            ║
║    • Copy, paste and context-menu attempts                       ║
║                                                                  ║
║  ✗ WHAT WE NEVER STORE:                                          ║
║    • Video or images of you                                      ║
║    • Audio                                                       ║
║    • What you type or what is on your clipboard                  ║
║                                                                  ║
║  Face analysis runs locally. Only short violation notes          ║
║  (type, time, severity) leave this machine.                      ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitoring_notice_contents() {
        assert!(MONITORING_NOTICE.contains("CANDIDATE NOTICE"));
        assert!(MONITORING_NOTICE.contains("NEVER STORE"));
        assert!(MONITORING_NOTICE.contains("clipboard"));
    }
}

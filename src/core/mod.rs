//! Core signal processing for the integrity monitor.
//!
//! This module contains:
//! - Landmark frame types and face mesh indices
//! - Geometric feature extraction (head pose, gaze score)
//! - The temporal violation detector (debounce and cooldown per subtype)
//! - The tracking snapshot and its publisher

pub mod detector;
pub mod geometry;
pub mod landmarks;
pub mod snapshot;

// Re-export commonly used types
pub use detector::{DetectorStep, Observation, SubtypeTimers, TimerPhase, ViolationDetector};
pub use geometry::{compute_gaze_score, compute_head_pose, extract_features, FaceFeatures, HeadPose};
pub use landmarks::{DetectorCapabilities, LandmarkFrame, Point3D};
pub use snapshot::{SnapshotPublisher, TrackingSnapshot, TrackingStatus};

//! The tracking snapshot and its publisher.
//!
//! The publisher keeps only the latest snapshot. Display surfaces either read
//! it on demand or subscribe and wake on change; no history is retained.

use crate::core::geometry::HeadPose;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Coarse status for a status badge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
    #[default]
    Ok,
    Warning,
    Alert,
}

/// Status message while the landmark detector is loading.
pub const MESSAGE_INITIALIZING: &str = "Initializing...";
/// Status message once the landmark detector is ready.
pub const MESSAGE_ACTIVE: &str = "Face tracking active";
/// Status message when the landmark detector failed to load.
pub const MESSAGE_UNAVAILABLE: &str = "Face tracking unavailable";

/// Current tracking state, overwritten on every processed tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub face_detected: bool,
    pub head_pose: HeadPose,
    pub gaze_score: f64,
    pub status: TrackingStatus,
    pub status_message: String,
}

impl Default for TrackingSnapshot {
    fn default() -> Self {
        Self {
            face_detected: true,
            head_pose: HeadPose::default(),
            gaze_score: 0.0,
            status: TrackingStatus::Ok,
            status_message: MESSAGE_INITIALIZING.to_string(),
        }
    }
}

/// Holder of the latest [`TrackingSnapshot`].
///
/// Clones share the same slot, so a session can hand one publisher to each
/// scheduler it builds and subscribers keep receiving updates.
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    sender: Arc<watch::Sender<TrackingSnapshot>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(TrackingSnapshot::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Return to the initial "Initializing..." snapshot.
    pub fn reset(&self) {
        self.sender.send_replace(TrackingSnapshot::default());
    }

    /// Replace the current snapshot.
    pub fn publish(&self, snapshot: TrackingSnapshot) {
        self.sender.send_replace(snapshot);
    }

    /// Update only the status message, keeping everything else.
    pub fn set_status_message(&self, message: &str) {
        self.sender.send_if_modified(|snapshot| {
            if snapshot.status_message == message {
                false
            } else {
                snapshot.status_message = message.to_string();
                true
            }
        });
    }

    /// A copy of the current snapshot.
    pub fn latest(&self) -> TrackingSnapshot {
        self.sender.borrow().clone()
    }

    /// Subscribe for change notifications.
    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.sender.subscribe()
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let publisher = SnapshotPublisher::new();
        let snapshot = publisher.latest();
        assert!(snapshot.face_detected);
        assert_eq!(snapshot.status, TrackingStatus::Ok);
        assert_eq!(snapshot.status_message, MESSAGE_INITIALIZING);
    }

    #[test]
    fn test_publish_overwrites() {
        let publisher = SnapshotPublisher::new();
        let receiver = publisher.subscribe();

        publisher.publish(TrackingSnapshot {
            face_detected: false,
            status: TrackingStatus::Warning,
            status_message: "No face detected".to_string(),
            ..TrackingSnapshot::default()
        });

        assert!(receiver.has_changed().unwrap());
        assert!(!receiver.borrow().face_detected);
        assert_eq!(publisher.latest().status, TrackingStatus::Warning);
    }

    #[test]
    fn test_set_status_message_only_touches_message() {
        let publisher = SnapshotPublisher::new();
        publisher.publish(TrackingSnapshot {
            gaze_score: 0.4,
            ..TrackingSnapshot::default()
        });
        publisher.set_status_message(MESSAGE_ACTIVE);

        let snapshot = publisher.latest();
        assert_eq!(snapshot.status_message, MESSAGE_ACTIVE);
        assert_eq!(snapshot.gaze_score, 0.4);
    }

    #[test]
    fn test_clones_share_the_slot() {
        let publisher = SnapshotPublisher::new();
        let mut receiver = publisher.subscribe();
        let clone = publisher.clone();

        clone.set_status_message(MESSAGE_UNAVAILABLE);
        assert!(receiver.has_changed().unwrap());
        assert_eq!(receiver.borrow_and_update().status_message, MESSAGE_UNAVAILABLE);

        clone.reset();
        assert_eq!(publisher.latest().status_message, MESSAGE_INITIALIZING);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TrackingStatus::Alert).unwrap(),
            "\"alert\""
        );
    }
}

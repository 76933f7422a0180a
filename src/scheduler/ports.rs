//! Boundaries to the external collaborators the scheduler drives.

use crate::core::landmarks::{DetectorCapabilities, LandmarkFrame};
use thiserror::Error;

/// Errors raised by a landmark detector implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectorError {
    #[error("Landmark detector failed to initialize: {0}")]
    Initialization(String),
    #[error("Landmark detection failed: {0}")]
    Detection(String),
    #[error("Landmark detector already disposed")]
    Disposed,
}

/// A face landmark detector running in video mode.
///
/// Construction (model loading) is the asynchronous part and happens outside
/// this trait; the scheduler receives a ready detector or an initialization
/// error through `DetectionScheduler::on_detector_ready`.
pub trait LandmarkDetector {
    /// Video source type this detector reads frames from.
    type Source: VideoSource + ?Sized;

    /// What the detector produces.
    fn capabilities(&self) -> DetectorCapabilities;

    /// Detect landmarks on the source's current frame.
    ///
    /// `timestamp_ms` is strictly greater than on any previous call.
    /// Returns `Ok(None)` when no face is found.
    fn detect(
        &mut self,
        source: &Self::Source,
        timestamp_ms: u64,
    ) -> Result<Option<LandmarkFrame>, DetectorError>;

    /// Release the detector's resources. Called at most once.
    fn dispose(&mut self);
}

/// Readiness of a live video source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoReadiness {
    pub width: u32,
    pub height: u32,
    pub paused: bool,
    pub ended: bool,
}

impl VideoReadiness {
    /// A playing source with the given dimensions.
    pub fn playing(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            paused: false,
            ended: false,
        }
    }

    /// True when frames can be handed to the detector.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0 && !self.paused && !self.ended
    }
}

/// A live video element or stream.
pub trait VideoSource {
    fn readiness(&self) -> VideoReadiness;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_checks() {
        assert!(VideoReadiness::playing(640, 480).is_ready());
        assert!(!VideoReadiness::playing(0, 480).is_ready());
        assert!(!VideoReadiness::playing(640, 0).is_ready());
        assert!(!VideoReadiness {
            paused: true,
            ..VideoReadiness::playing(640, 480)
        }
        .is_ready());
        assert!(!VideoReadiness {
            ended: true,
            ..VideoReadiness::playing(640, 480)
        }
        .is_ready());
    }
}

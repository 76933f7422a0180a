//! Violation event types shared by the video pipeline and the environment monitor.

use serde::{Deserialize, Serialize};

/// Which part of the monitor produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Derived from the landmark stream (head turn, gaze, face absent).
    FaceTracking,
    /// Raised directly by a host environment signal.
    Environment,
}

/// The specific violation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSubtype {
    HeadTurn,
    GazeAversion,
    FaceAbsent,
    Visibility,
    Fullscreen,
    Focus,
    #[serde(rename = "contextmenu")]
    ContextMenu,
    Copy,
    Paste,
}

impl ViolationSubtype {
    /// Every subtype, in a stable order.
    pub const ALL: [ViolationSubtype; 9] = [
        ViolationSubtype::HeadTurn,
        ViolationSubtype::GazeAversion,
        ViolationSubtype::FaceAbsent,
        ViolationSubtype::Visibility,
        ViolationSubtype::Fullscreen,
        ViolationSubtype::Focus,
        ViolationSubtype::ContextMenu,
        ViolationSubtype::Copy,
        ViolationSubtype::Paste,
    ];

    /// The producer family this subtype belongs to.
    pub fn kind(self) -> ViolationKind {
        match self {
            ViolationSubtype::HeadTurn
            | ViolationSubtype::GazeAversion
            | ViolationSubtype::FaceAbsent => ViolationKind::FaceTracking,
            _ => ViolationKind::Environment,
        }
    }

    /// Position in [`ViolationSubtype::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationSubtype::HeadTurn => "head_turn",
            ViolationSubtype::GazeAversion => "gaze_aversion",
            ViolationSubtype::FaceAbsent => "face_absent",
            ViolationSubtype::Visibility => "visibility",
            ViolationSubtype::Fullscreen => "fullscreen",
            ViolationSubtype::Focus => "focus",
            ViolationSubtype::ContextMenu => "contextmenu",
            ViolationSubtype::Copy => "copy",
            ViolationSubtype::Paste => "paste",
        }
    }
}

impl std::fmt::Display for ViolationSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity attached to a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A discrete, already rate-limited violation.
///
/// Events are immutable once created; ownership passes to the consumer
/// handler as soon as the event is delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub subtype: ViolationSubtype,
    /// Milliseconds on the session clock at which the event was raised
    pub timestamp_ms: u64,
    pub message: String,
    pub severity: Severity,
}

impl ViolationEvent {
    /// Build an event; the kind is derived from the subtype.
    pub fn new(
        subtype: ViolationSubtype,
        timestamp_ms: u64,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            kind: subtype.kind(),
            subtype,
            timestamp_ms,
            message: message.into(),
            severity,
        }
    }

    /// Wrap this event in the message the interview backend ingests.
    pub fn to_envelope(&self) -> ProctoringEnvelope {
        ProctoringEnvelope {
            message_type: ProctoringEnvelope::MESSAGE_TYPE.to_string(),
            event: ProctoringEventBody {
                event_type: self.subtype,
                source: EventSource::from(self.kind),
                severity: self.severity,
                message: self.message.clone(),
                timestamp: self.timestamp_ms,
            },
        }
    }
}

/// Origin label used on the backend wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    #[serde(rename = "browser")]
    Browser,
    #[serde(rename = "mediapipe")]
    Landmarks,
}

impl From<ViolationKind> for EventSource {
    fn from(kind: ViolationKind) -> Self {
        match kind {
            ViolationKind::Environment => EventSource::Browser,
            ViolationKind::FaceTracking => EventSource::Landmarks,
        }
    }
}

/// `{"type": "proctoring_event", "event": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctoringEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub event: ProctoringEventBody,
}

impl ProctoringEnvelope {
    pub const MESSAGE_TYPE: &'static str = "proctoring_event";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctoringEventBody {
    #[serde(rename = "type")]
    pub event_type: ViolationSubtype,
    pub source: EventSource,
    pub severity: Severity,
    pub message: String,
    pub timestamp: u64,
}

//! Violation events and the channel that carries them to the consumer.

pub mod channel;
pub mod types;

pub use channel::{ViolationSink, DEFAULT_CHANNEL_CAPACITY};
pub use types::{
    EventSource, ProctoringEnvelope, ProctoringEventBody, Severity, ViolationEvent, ViolationKind,
    ViolationSubtype,
};

//! The violation channel: a single, fire-and-forget sink for every event.
//!
//! Both the detection scheduler and the environment monitor hold a clone of
//! the same [`ViolationSink`]. Events reach the handler in emission order.
//! A misbehaving handler (one that panics) is logged and otherwise ignored,
//! so the monitor keeps running whatever the consumer does.

use crate::events::types::ViolationEvent;
use crossbeam_channel::{bounded, Receiver, TrySendError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default capacity for channel-backed sinks.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

type Handler = dyn Fn(ViolationEvent) + Send + Sync;

/// Append-only delivery point for violation events.
#[derive(Clone)]
pub struct ViolationSink {
    handler: Arc<Handler>,
    delivered: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl ViolationSink {
    /// Create a sink around a consumer callback.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(ViolationEvent) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            delivered: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a sink that forwards into a bounded channel.
    ///
    /// When the channel is full the event is dropped with a warning; the
    /// monitor never blocks on a slow consumer.
    pub fn channel(capacity: usize) -> (Self, Receiver<ViolationEvent>) {
        let (sender, receiver) = bounded(capacity);
        let sink = Self::new(move |event: ViolationEvent| match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(subtype = %event.subtype, "violation channel full, event dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("violation channel receiver dropped");
            }
        });
        (sink, receiver)
    }

    /// A sink that discards everything.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Hand an event to the consumer.
    pub fn deliver(&self, event: ViolationEvent) {
        let subtype = event.subtype;
        let handler: &Handler = self.handler.as_ref();
        match catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%subtype, "violation handler panicked; continuing");
            }
        }
    }

    /// Number of events the handler accepted without panicking.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of events whose handler panicked.
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ViolationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViolationSink")
            .field("delivered", &self.delivered_count())
            .field("failed", &self.failed_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{Severity, ViolationSubtype};
    use std::sync::Mutex;

    fn event(subtype: ViolationSubtype, t: u64) -> ViolationEvent {
        ViolationEvent::new(subtype, t, "test", Severity::Medium)
    }

    #[test]
    fn test_delivery_preserves_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sink = ViolationSink::new(move |e| seen_clone.lock().unwrap().push(e.timestamp_ms));

        sink.deliver(event(ViolationSubtype::Copy, 1));
        sink.clone().deliver(event(ViolationSubtype::Paste, 2));
        sink.deliver(event(ViolationSubtype::Focus, 3));

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(sink.delivered_count(), 3);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let sink = ViolationSink::new(|e| {
            if e.subtype == ViolationSubtype::Copy {
                panic!("consumer bug");
            }
        });

        sink.deliver(event(ViolationSubtype::Copy, 1));
        sink.deliver(event(ViolationSubtype::Paste, 2));

        assert_eq!(sink.failed_count(), 1);
        assert_eq!(sink.delivered_count(), 1);
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, receiver) = ViolationSink::channel(1);
        sink.deliver(event(ViolationSubtype::Copy, 1));
        sink.deliver(event(ViolationSubtype::Paste, 2));

        let received: Vec<_> = receiver.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].subtype, ViolationSubtype::Copy);
    }
}

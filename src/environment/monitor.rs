//! Environment tamper monitoring.
//!
//! The host environment (a browser document, a desktop shell, a replay
//! harness) pushes raw signals into a bounded channel while the monitor is
//! attached. Every meaningful signal becomes a violation immediately; there
//! is no debounce or cooldown on this path.

use crate::events::channel::ViolationSink;
use crate::events::types::{Severity, ViolationEvent, ViolationSubtype};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Capacity of the signal channel between host and monitor.
const SIGNAL_CHANNEL_CAPACITY: usize = 1_024;

/// A raw environment signal as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentSignal {
    /// Document visibility changed
    VisibilityChanged { hidden: bool },
    /// Fullscreen state changed
    FullscreenChanged { active: bool },
    /// The interview window lost focus
    FocusLost,
    /// A context menu was requested
    ContextMenu,
    /// A copy was attempted
    Copy,
    /// A paste was attempted
    Paste,
}

impl EnvironmentSignal {
    /// Whether the host should cancel the default action for this signal.
    pub fn suppresses_default(&self) -> bool {
        matches!(
            self,
            EnvironmentSignal::ContextMenu | EnvironmentSignal::Copy | EnvironmentSignal::Paste
        )
    }

    /// Translate into a violation. Signals that restore a good state
    /// (tab visible again, fullscreen re-entered) produce nothing.
    pub fn to_violation(&self, timestamp_ms: u64) -> Option<ViolationEvent> {
        let (subtype, message, severity) = match self {
            EnvironmentSignal::VisibilityChanged { hidden: true } => (
                ViolationSubtype::Visibility,
                "Candidate switched to another tab or window.",
                Severity::Medium,
            ),
            EnvironmentSignal::FullscreenChanged { active: false } => (
                ViolationSubtype::Fullscreen,
                "Candidate exited fullscreen mode.",
                Severity::High,
            ),
            EnvironmentSignal::FocusLost => (
                ViolationSubtype::Focus,
                "Interview window lost focus.",
                Severity::Medium,
            ),
            EnvironmentSignal::ContextMenu => (
                ViolationSubtype::ContextMenu,
                "Candidate attempted to open context menu.",
                Severity::Medium,
            ),
            EnvironmentSignal::Copy => (
                ViolationSubtype::Copy,
                "Candidate attempted to copy content.",
                Severity::Medium,
            ),
            EnvironmentSignal::Paste => (
                ViolationSubtype::Paste,
                "Candidate attempted to paste content.",
                Severity::Medium,
            ),
            EnvironmentSignal::VisibilityChanged { hidden: false }
            | EnvironmentSignal::FullscreenChanged { active: true } => return None,
        };
        Some(ViolationEvent::new(subtype, timestamp_ms, message, severity))
    }
}

/// A signal stamped with the time the host observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedSignal {
    pub signal: EnvironmentSignal,
    pub timestamp_ms: u64,
}

/// Errors from host environment operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("Fullscreen request denied: {0}")]
    FullscreenDenied(String),
    #[error("Failed to attach listeners: {0}")]
    AttachFailed(String),
}

/// The host surface the monitor subscribes to.
pub trait HostEnvironment {
    /// Start delivering signals into `signals`.
    fn attach(&mut self, signals: Sender<ObservedSignal>) -> Result<(), EnvironmentError>;

    /// Stop delivering signals. Must be safe to call when not attached.
    fn detach(&mut self);

    fn request_fullscreen(&mut self) -> Result<(), EnvironmentError>;

    fn is_fullscreen(&self) -> bool;

    fn exit_fullscreen(&mut self) -> Result<(), EnvironmentError>;
}

/// Translates host signals into violations on the shared sink.
pub struct EnvironmentMonitor<H: HostEnvironment> {
    host: H,
    sink: ViolationSink,
    enforce_fullscreen: bool,
    receiver: Option<Receiver<ObservedSignal>>,
    reported: u64,
}

impl<H: HostEnvironment> EnvironmentMonitor<H> {
    pub fn new(host: H, sink: ViolationSink, enforce_fullscreen: bool) -> Self {
        Self {
            host,
            sink,
            enforce_fullscreen,
            receiver: None,
            reported: 0,
        }
    }

    /// Attach to the host and request fullscreen. Idempotent.
    ///
    /// Neither a failed attach nor a denied fullscreen request is fatal;
    /// both are logged and monitoring continues with what is available.
    pub fn enable(&mut self) {
        if self.receiver.is_some() {
            return;
        }

        let (sender, receiver) = bounded(SIGNAL_CHANNEL_CAPACITY);
        match self.host.attach(sender) {
            Ok(()) => {
                self.receiver = Some(receiver);
                info!("environment monitor attached");
            }
            Err(e) => {
                warn!(error = %e, "environment listeners unavailable");
                return;
            }
        }

        if self.enforce_fullscreen {
            if let Err(e) = self.host.request_fullscreen() {
                warn!(error = %e, "could not enter fullscreen mode");
            }
        }
    }

    /// Detach from the host and leave fullscreen. Idempotent.
    ///
    /// Signals queued before the detach are still reported; anything the
    /// host raises afterwards is dropped.
    pub fn disable(&mut self) {
        if self.receiver.is_none() {
            return;
        }

        self.host.detach();
        let flushed = self.drain();
        if flushed > 0 {
            debug!(flushed, "reported queued environment signals on disable");
        }
        self.receiver = None;

        if self.host.is_fullscreen() {
            if let Err(e) = self.host.exit_fullscreen() {
                debug!(error = %e, "exit fullscreen failed during disable");
            }
        }
        info!("environment monitor detached");
    }

    pub fn is_enabled(&self) -> bool {
        self.receiver.is_some()
    }

    /// Report every queued signal. Returns the number of violations raised.
    pub fn drain(&mut self) -> usize {
        let Some(receiver) = self.receiver.as_ref() else {
            return 0;
        };

        let mut raised = 0;
        while let Ok(observed) = receiver.try_recv() {
            if let Some(event) = observed.signal.to_violation(observed.timestamp_ms) {
                info!(subtype = %event.subtype, "{}", event.message);
                self.sink.deliver(event);
                raised += 1;
            }
        }
        self.reported += raised as u64;
        raised
    }

    /// Total violations raised by this monitor.
    pub fn reported_count(&self) -> u64 {
        self.reported
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: HostEnvironment> Drop for EnvironmentMonitor<H> {
    fn drop(&mut self) {
        self.disable();
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeHost;
    use super::*;

    fn monitor(host: FakeHost) -> (EnvironmentMonitor<FakeHost>, Receiver<ViolationEvent>) {
        let (sink, receiver) = ViolationSink::channel(64);
        (EnvironmentMonitor::new(host, sink, true), receiver)
    }

    #[test]
    fn test_signal_mapping() {
        let cases = [
            (EnvironmentSignal::VisibilityChanged { hidden: true }, ViolationSubtype::Visibility, Severity::Medium),
            (EnvironmentSignal::FullscreenChanged { active: false }, ViolationSubtype::Fullscreen, Severity::High),
            (EnvironmentSignal::FocusLost, ViolationSubtype::Focus, Severity::Medium),
            (EnvironmentSignal::ContextMenu, ViolationSubtype::ContextMenu, Severity::Medium),
            (EnvironmentSignal::Copy, ViolationSubtype::Copy, Severity::Medium),
            (EnvironmentSignal::Paste, ViolationSubtype::Paste, Severity::Medium),
        ];
        for (signal, subtype, severity) in cases {
            let event = signal.to_violation(7).unwrap();
            assert_eq!(event.subtype, subtype);
            assert_eq!(event.severity, severity);
            assert_eq!(event.timestamp_ms, 7);
        }

        assert!(EnvironmentSignal::VisibilityChanged { hidden: false }.to_violation(0).is_none());
        assert!(EnvironmentSignal::FullscreenChanged { active: true }.to_violation(0).is_none());
    }

    #[test]
    fn test_suppressed_defaults() {
        assert!(EnvironmentSignal::ContextMenu.suppresses_default());
        assert!(EnvironmentSignal::Copy.suppresses_default());
        assert!(EnvironmentSignal::Paste.suppresses_default());
        assert!(!EnvironmentSignal::FocusLost.suppresses_default());
    }

    #[test]
    fn test_enable_requests_fullscreen_and_reports_every_signal() {
        let (mut monitor, rx) = monitor(FakeHost::default());
        monitor.enable();
        assert!(monitor.host().fullscreen);

        monitor.host().emit(EnvironmentSignal::Copy, 10);
        monitor.host().emit(EnvironmentSignal::Copy, 11);
        monitor.host().emit(EnvironmentSignal::FocusLost, 12);
        assert_eq!(monitor.drain(), 3);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].subtype, ViolationSubtype::Copy);
        assert_eq!(events[1].timestamp_ms, 11);
        assert_eq!(events[2].subtype, ViolationSubtype::Focus);
    }

    #[test]
    fn test_fullscreen_denial_is_not_fatal() {
        let host = FakeHost {
            deny_fullscreen: true,
            ..FakeHost::default()
        };
        let (mut monitor, rx) = monitor(host);
        monitor.enable();

        assert!(monitor.is_enabled());
        monitor.host().emit(EnvironmentSignal::Paste, 1);
        monitor.drain();
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_attach_failure_leaves_monitor_disabled() {
        let host = FakeHost {
            fail_attach: true,
            ..FakeHost::default()
        };
        let (mut monitor, _rx) = monitor(host);
        monitor.enable();
        assert!(!monitor.is_enabled());
        assert!(!monitor.host().fullscreen);
        assert_eq!(monitor.drain(), 0);
    }

    #[test]
    fn test_disable_is_idempotent_and_exits_fullscreen() {
        let (mut monitor, rx) = monitor(FakeHost::default());
        monitor.enable();
        monitor.enable();
        assert_eq!(monitor.host().attach_calls, 1);

        monitor.host().emit(EnvironmentSignal::Copy, 1);
        monitor.disable();
        monitor.disable();

        assert_eq!(monitor.host().detach_calls, 1);
        assert_eq!(monitor.host().exit_calls, 1);
        assert!(!monitor.host().fullscreen);
        assert!(monitor.host().sender.is_none());

        // The signal queued before disable is flushed; late ones are dropped.
        monitor.host().emit(EnvironmentSignal::Paste, 2);
        assert_eq!(monitor.drain(), 0);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subtype, ViolationSubtype::Copy);
        assert_eq!(monitor.reported_count(), 1);
    }

    #[test]
    fn test_disable_reports_signals_queued_before_detach() {
        let (mut monitor, rx) = monitor(FakeHost::default());
        monitor.enable();

        monitor.host().emit(EnvironmentSignal::VisibilityChanged { hidden: true }, 5);
        monitor.host().emit(EnvironmentSignal::VisibilityChanged { hidden: false }, 6);
        monitor.host().emit(EnvironmentSignal::Paste, 7);
        monitor.disable();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].subtype, ViolationSubtype::Visibility);
        assert_eq!(events[1].timestamp_ms, 7);
        assert!(!monitor.is_enabled());
    }

    #[test]
    fn test_disable_skips_exit_when_not_fullscreen() {
        let (mut monitor, _rx) = monitor(FakeHost::default());
        monitor.enable();
        monitor.host_mut().fullscreen = false;
        monitor.disable();
        assert_eq!(monitor.host().exit_calls, 0);
    }
}

//! A monitoring session and its cooperative driver loop.
//!
//! [`MonitorSession`] ties the detection scheduler and the environment
//! monitor to one violation sink and one snapshot slot. Hosts that own a
//! redraw loop call [`MonitorSession::tick`] themselves; everything else can
//! use [`run`], which drives the session from a tokio interval on the current
//! task.

use crate::config::Config;
use crate::core::snapshot::{SnapshotPublisher, TrackingSnapshot};
use crate::environment::monitor::{EnvironmentMonitor, HostEnvironment};
use crate::events::channel::ViolationSink;
use crate::scheduler::detection::{DetectionScheduler, SchedulerStats, TickOutcome};
use crate::scheduler::ports::{DetectorError, LandmarkDetector};
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

/// Source of "now" in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// One candidate's monitoring session.
pub struct MonitorSession<D: LandmarkDetector, H: HostEnvironment> {
    id: Uuid,
    config: Config,
    scheduler: DetectionScheduler<D>,
    environment: EnvironmentMonitor<H>,
    publisher: SnapshotPublisher,
    sink: ViolationSink,
    enabled: bool,
}

impl<D: LandmarkDetector, H: HostEnvironment> MonitorSession<D, H> {
    /// Create a disabled session. The scheduler starts out waiting for its
    /// detector, so initialization may begin before the session is enabled.
    pub fn new(config: Config, host: H, sink: ViolationSink) -> Self {
        let publisher = SnapshotPublisher::new();
        let scheduler = DetectionScheduler::with_publisher(
            &config.sampling,
            config.thresholds.clone(),
            sink.clone(),
            publisher.clone(),
        );
        let environment =
            EnvironmentMonitor::new(host, sink.clone(), config.environment.enforce_fullscreen);

        Self {
            id: Uuid::new_v4(),
            config,
            scheduler,
            environment,
            publisher,
            sink,
            enabled: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn monitoring on or off. Idempotent in both directions.
    ///
    /// Disabling releases the detector, drops pending debounce timers and
    /// detaches from the host. Re-enabling after that starts a fresh
    /// scheduler that needs a new detector.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;

        if enabled {
            if self.scheduler.is_disposed() {
                self.scheduler = DetectionScheduler::with_publisher(
                    &self.config.sampling,
                    self.config.thresholds.clone(),
                    self.sink.clone(),
                    self.publisher.clone(),
                );
                debug!(session = %self.id, "fresh scheduler created");
            }
            self.environment.enable();
            info!(session = %self.id, "monitoring enabled");
        } else {
            self.scheduler.dispose();
            self.environment.disable();
            info!(session = %self.id, "monitoring disabled");
        }
    }

    /// Complete asynchronous detector initialization.
    pub fn detector_ready(&mut self, result: Result<D, DetectorError>) {
        self.scheduler.on_detector_ready(result);
    }

    /// Report pending environment signals, then offer one scheduler tick.
    pub fn tick(&mut self, source: &D::Source, now_ms: u64) -> TickOutcome {
        if !self.enabled {
            return TickOutcome::Stopped;
        }
        self.environment.drain();
        self.scheduler.tick(source, now_ms)
    }

    /// The latest tracking snapshot.
    pub fn snapshot(&self) -> TrackingSnapshot {
        self.publisher.latest()
    }

    /// Subscribe to snapshot changes. Survives disable and re-enable.
    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.publisher.subscribe()
    }

    pub fn scheduler(&self) -> &DetectionScheduler<D> {
        &self.scheduler
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn environment(&self) -> &EnvironmentMonitor<H> {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut EnvironmentMonitor<H> {
        &mut self.environment
    }

    pub fn sink(&self) -> &ViolationSink {
        &self.sink
    }
}

impl<D: LandmarkDetector, H: HostEnvironment> Drop for MonitorSession<D, H> {
    fn drop(&mut self) {
        self.set_enabled(false);
    }
}

/// Drive a session until `shutdown` turns true or its sender is dropped.
///
/// The session is enabled on entry and disabled on exit. Detector
/// initialization runs concurrently with ticking on the same task; an
/// initialization still pending at shutdown is abandoned.
pub async fn run<D, H, F, C>(
    session: &mut MonitorSession<D, H>,
    source: &D::Source,
    init: F,
    clock: &C,
    mut shutdown: watch::Receiver<bool>,
) -> SchedulerStats
where
    D: LandmarkDetector,
    H: HostEnvironment,
    F: Future<Output = Result<D, DetectorError>>,
    C: Clock + ?Sized,
{
    session.set_enabled(true);

    let mut ticker = interval(session.config().sampling.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(init);
    let mut init_pending = true;
    let mut stopping = *shutdown.borrow_and_update();

    while !stopping {
        tokio::select! {
            result = &mut init, if init_pending => {
                init_pending = false;
                session.detector_ready(result);
            }
            _ = ticker.tick() => {
                session.tick(source, clock.now_ms());
            }
            changed = shutdown.changed() => {
                stopping = changed.is_err() || *shutdown.borrow_and_update();
            }
        }
    }

    session.set_enabled(false);
    let stats = session.stats();
    info!(
        session = %session.id(),
        processed = stats.processed,
        events = stats.events_emitted,
        "monitoring loop stopped"
    );
    stats
}

//! Demonstration of a monitoring session driven by the async loop.
//!
//! This example shows how to:
//! 1. Implement a landmark detector, video source and host environment
//! 2. Build a session with a channel-backed violation sink
//! 3. Drive it with `session::run` until a shutdown signal
//! 4. Read violations and the final snapshot
//!
//! The synthetic detector reports a face turned 40° away after the first
//! second, so a head-turn violation fires about two seconds later.
//!
//! Run with: cargo run --example session_demo

use crossbeam_channel::Sender;
use integrity_monitor::core::landmarks::{
    CHIN, FACE_MESH_POINTS, FOREHEAD, LEFT_EYE_INNER, LEFT_EYE_OUTER, NOSE_TIP, RIGHT_EYE_INNER,
    RIGHT_EYE_OUTER,
};
use integrity_monitor::environment::ObservedSignal;
use integrity_monitor::integrity::IntegrityTally;
use integrity_monitor::session::{run, SystemClock};
use integrity_monitor::{
    Config, DetectorCapabilities, DetectorError, EnvironmentError, HostEnvironment,
    LandmarkDetector, LandmarkFrame, MonitorSession, Point3D, VideoReadiness, VideoSource,
    ViolationSink, MONITORING_NOTICE,
};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// A camera that is always playing.
struct Camera;

impl VideoSource for Camera {
    fn readiness(&self) -> VideoReadiness {
        VideoReadiness::playing(1280, 720)
    }
}

/// Looks straight ahead for a second, then turns away.
struct SyntheticDetector {
    started: Instant,
}

impl SyntheticDetector {
    async fn load() -> Result<Self, DetectorError> {
        // Stand-in for model download and warm-up.
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(Self {
            started: Instant::now(),
        })
    }

    fn frame(yaw_deg: f64) -> LandmarkFrame {
        let mut points = vec![Point3D::new(0.5, 0.5, 0.0); FACE_MESH_POINTS];
        points[LEFT_EYE_OUTER] = Point3D::new(0.4, 0.4, 0.0);
        points[LEFT_EYE_INNER] = Point3D::new(0.46, 0.4, 0.0);
        points[RIGHT_EYE_INNER] = Point3D::new(0.54, 0.4, 0.0);
        points[RIGHT_EYE_OUTER] = Point3D::new(0.6, 0.4, 0.0);
        points[NOSE_TIP] = Point3D::new(0.5 + yaw_deg.to_radians().tan() * 0.1, 0.5, 0.0);
        points[FOREHEAD] = Point3D::new(0.5, 0.2, 0.0);
        points[CHIN] = Point3D::new(0.5, 0.8, 0.0);
        LandmarkFrame::new(points)
    }
}

impl LandmarkDetector for SyntheticDetector {
    type Source = Camera;

    fn capabilities(&self) -> DetectorCapabilities {
        DetectorCapabilities::default()
    }

    fn detect(
        &mut self,
        _source: &Camera,
        _timestamp_ms: u64,
    ) -> Result<Option<LandmarkFrame>, DetectorError> {
        let yaw = if self.started.elapsed() < Duration::from_secs(1) {
            0.0
        } else {
            40.0
        };
        Ok(Some(Self::frame(yaw)))
    }

    fn dispose(&mut self) {
        println!("  [detector] disposed");
    }
}

/// A desktop shell with no tamper signals of its own.
#[derive(Default)]
struct Desktop {
    signals: Option<Sender<ObservedSignal>>,
    fullscreen: bool,
}

impl HostEnvironment for Desktop {
    fn attach(&mut self, signals: Sender<ObservedSignal>) -> Result<(), EnvironmentError> {
        self.signals = Some(signals);
        Ok(())
    }

    fn detach(&mut self) {
        self.signals = None;
    }

    fn request_fullscreen(&mut self) -> Result<(), EnvironmentError> {
        self.fullscreen = true;
        println!("  [host] fullscreen on");
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn exit_fullscreen(&mut self) -> Result<(), EnvironmentError> {
        self.fullscreen = false;
        println!("  [host] fullscreen off");
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("Interview Integrity Monitor - Session Demo");
    println!("==========================================");
    println!("{MONITORING_NOTICE}");

    let (sink, violations) = ViolationSink::channel(64);
    let mut session: MonitorSession<SyntheticDetector, Desktop> =
        MonitorSession::new(Config::default(), Desktop::default(), sink);
    let tally = IntegrityTally::new(session.id());
    println!("Session ID: {}", session.id());
    println!();

    let (stop_tx, stop_rx) = watch::channel(false);
    let stopper = async move {
        tokio::time::sleep(Duration::from_secs(4)).await;
        let _ = stop_tx.send(true);
    };

    println!("Monitoring for 4 seconds...");
    let (stats, ()) = tokio::join!(
        run(
            &mut session,
            &Camera,
            SyntheticDetector::load(),
            &SystemClock,
            stop_rx
        ),
        stopper
    );

    println!();
    for event in violations.try_iter() {
        tally.record(&event);
        println!(
            "  VIOLATION [{}] {}: {}",
            event.severity, event.subtype, event.message
        );
    }

    let snapshot = session.snapshot();
    println!();
    println!(
        "Final snapshot: yaw {:.1}°, status {:?} ({})",
        snapshot.head_pose.yaw, snapshot.status, snapshot.status_message
    );
    println!(
        "Ticks: {} processed, {} skipped",
        stats.processed, stats.skipped
    );
    println!();
    println!("{}", tally.summary());
}

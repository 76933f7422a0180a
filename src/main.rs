//! Interview Integrity Monitor CLI
//!
//! Replays recorded monitoring traces and manages configuration.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::Receiver;
use integrity_monitor::{
    config::Config,
    events::{ViolationEvent, ViolationSink, DEFAULT_CHANNEL_CAPACITY},
    integrity::IntegrityTally,
    replay::{Replay, Trace},
    MONITORING_NOTICE, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "integrity-monitor")]
#[command(version = VERSION)]
#[command(about = "Integrity monitoring for remote interviews", long_about = None)]
struct Cli {
    /// Use this configuration file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded landmark and environment trace
    Replay {
        /// JSON-lines trace file
        trace: PathBuf,

        /// How each violation is printed
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Write the integrity report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Pace records by their timestamps (Ctrl+C stops)
        #[arg(long)]
        realtime: bool,
    },

    /// Show configuration
    Config,

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display the candidate monitoring notice
    Notice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One human-readable line per violation
    Text,
    /// One violation event per line as JSON
    Json,
    /// One backend proctoring envelope per line
    Envelope,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::config_path);

    match cli.command {
        Commands::Replay {
            trace,
            format,
            report,
            realtime,
        } => cmd_replay(&config_path, trace, format, report, realtime),
        Commands::Config => cmd_config(&config_path),
        Commands::InitConfig { force } => cmd_init_config(&config_path, force),
        Commands::Notice => {
            println!("{MONITORING_NOTICE}");
            Ok(())
        }
    }
}

fn cmd_replay(
    config_path: &std::path::Path,
    trace_path: PathBuf,
    format: OutputFormat,
    report: Option<PathBuf>,
    realtime: bool,
) -> Result<()> {
    let config = Config::load_from(config_path)
        .with_context(|| format!("loading configuration from {config_path:?}"))?;
    let trace = Trace::load(&trace_path).with_context(|| format!("reading trace {trace_path:?}"))?;

    if format == OutputFormat::Text {
        println!("Interview Integrity Monitor v{VERSION}");
        println!(
            "Replaying {} records ({} ms) from {:?}",
            trace.records.len(),
            trace.duration_ms(),
            trace_path
        );
        println!();
    }

    let running = Arc::new(AtomicBool::new(true));
    if realtime {
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .context("setting Ctrl+C handler")?;
    }

    let (sink, events) = ViolationSink::channel(DEFAULT_CHANNEL_CAPACITY);
    let mut replay = Replay::new(trace, config, sink);
    let tally = IntegrityTally::new(replay.session().id());

    let mut previous_t = replay.next_time();
    while running.load(Ordering::SeqCst) {
        let Some(t) = replay.next_time() else {
            break;
        };
        if realtime {
            let wait = t.saturating_sub(previous_t.unwrap_or(t));
            sleep_while_running(Duration::from_millis(wait), &running);
            if !running.load(Ordering::SeqCst) {
                break;
            }
        }
        previous_t = Some(t);

        replay.step();
        print_events(&events, format, &tally)?;
    }

    if !running.load(Ordering::SeqCst) {
        eprintln!("Replay interrupted");
    }

    let outcome = replay.finish();
    print_events(&events, format, &tally)?;

    let summary = format!(
        "Final snapshot: face_detected={} yaw={:.1} pitch={:.1} roll={:.1} gaze={:.2} status={:?} ({})\n\
         Ticks: {} processed, {} skipped, {} detector failures\n\n{}",
        outcome.snapshot.face_detected,
        outcome.snapshot.head_pose.yaw,
        outcome.snapshot.head_pose.pitch,
        outcome.snapshot.head_pose.roll,
        outcome.snapshot.gaze_score,
        outcome.snapshot.status,
        outcome.snapshot.status_message,
        outcome.stats.processed,
        outcome.stats.skipped,
        outcome.stats.detection_failures,
        tally.summary()
    );
    if format == OutputFormat::Text {
        println!();
        println!("{summary}");
    } else {
        eprintln!("{summary}");
    }

    if let Some(path) = report {
        tally
            .save(&path)
            .with_context(|| format!("writing report to {path:?}"))?;
        eprintln!("Report written to {path:?}");
    }

    Ok(())
}

/// Print and tally every violation emitted so far.
fn print_events(
    events: &Receiver<ViolationEvent>,
    format: OutputFormat,
    tally: &IntegrityTally,
) -> Result<()> {
    for event in events.try_iter() {
        tally.record(&event);
        match format {
            OutputFormat::Text => println!(
                "[{:>8} ms] {:<8} {:<14} {}",
                event.timestamp_ms,
                event.severity.to_string(),
                event.subtype.as_str(),
                event.message
            ),
            OutputFormat::Json => println!("{}", serde_json::to_string(&event)?),
            OutputFormat::Envelope => {
                println!("{}", serde_json::to_string(&event.to_envelope())?)
            }
        }
    }
    Ok(())
}

/// Sleep in short slices so Ctrl+C is honored promptly.
fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let slice = Duration::from_millis(50);
    let mut remaining = total;
    while !remaining.is_zero() && running.load(Ordering::SeqCst) {
        let step = remaining.min(slice);
        thread::sleep(step);
        remaining -= step;
    }
}

fn cmd_config(config_path: &std::path::Path) -> Result<()> {
    let config = Config::load_from(config_path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!(
        "Config file: {:?}{}",
        config_path,
        if config_path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_init_config(config_path: &std::path::Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!("{config_path:?} already exists (use --force to overwrite)");
    }
    Config::default().save_to(config_path)?;
    println!("Wrote default configuration to {config_path:?}");
    Ok(())
}

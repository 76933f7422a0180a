//! Session integrity tally.
//!
//! Consumes violation events and keeps lock-free counters for the session.
//! The tally is a consumer of the violation channel; it never influences
//! detection.

use crate::events::types::{Severity, ViolationEvent, ViolationKind, ViolationSubtype};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Score every session starts from.
pub const BASE_SCORE: u64 = 100;

/// Violation count at which the level turns yellow.
const YELLOW_AT: u64 = 2;
/// Violation count at which the level turns red.
const RED_AT: u64 = 5;

/// Traffic-light integrity level shown to the interviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityLevel {
    Green,
    Yellow,
    Red,
}

impl IntegrityLevel {
    pub fn from_count(count: u64) -> Self {
        if count >= RED_AT {
            IntegrityLevel::Red
        } else if count >= YELLOW_AT {
            IntegrityLevel::Yellow
        } else {
            IntegrityLevel::Green
        }
    }
}

impl std::fmt::Display for IntegrityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntegrityLevel::Green => "green",
            IntegrityLevel::Yellow => "yellow",
            IntegrityLevel::Red => "red",
        };
        f.write_str(s)
    }
}

/// Score deduction for a single event.
pub fn deduction(event: &ViolationEvent) -> u64 {
    match event.kind {
        ViolationKind::Environment => match event.subtype {
            ViolationSubtype::Fullscreen => 10,
            ViolationSubtype::Visibility | ViolationSubtype::Focus => 5,
            _ => 3,
        },
        ViolationKind::FaceTracking => match event.severity {
            Severity::Critical => 15,
            Severity::High => 8,
            Severity::Medium => 3,
        },
    }
}

/// Running totals for one session.
#[derive(Debug)]
pub struct IntegrityTally {
    session_id: Uuid,
    /// Per-subtype counts, indexed by `ViolationSubtype::index`
    counts: [AtomicU64; 9],
    environment_deduction: AtomicU64,
    face_tracking_deduction: AtomicU64,
    critical_flags: Mutex<Vec<String>>,
    session_start: DateTime<Utc>,
}

impl IntegrityTally {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            counts: Default::default(),
            environment_deduction: AtomicU64::new(0),
            face_tracking_deduction: AtomicU64::new(0),
            critical_flags: Mutex::new(Vec::new()),
            session_start: Utc::now(),
        }
    }

    /// Count one violation.
    pub fn record(&self, event: &ViolationEvent) {
        self.counts[event.subtype.index()].fetch_add(1, Ordering::Relaxed);

        let points = deduction(event);
        match event.kind {
            ViolationKind::Environment => {
                self.environment_deduction.fetch_add(points, Ordering::Relaxed);
            }
            ViolationKind::FaceTracking => {
                self.face_tracking_deduction
                    .fetch_add(points, Ordering::Relaxed);
                if event.severity == Severity::Critical {
                    if let Ok(mut flags) = self.critical_flags.lock() {
                        flags.push(event.message.clone());
                    }
                }
            }
        }
    }

    pub fn count(&self, subtype: ViolationSubtype) -> u64 {
        self.counts[subtype.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn level(&self) -> IntegrityLevel {
        IntegrityLevel::from_count(self.total())
    }

    /// 100 minus all deductions, floored at 0.
    pub fn score(&self) -> u64 {
        let deducted = self.environment_deduction.load(Ordering::Relaxed)
            + self.face_tracking_deduction.load(Ordering::Relaxed);
        BASE_SCORE.saturating_sub(deducted)
    }

    /// Build a report of the session so far.
    pub fn report(&self) -> IntegrityReport {
        let now = Utc::now();
        let counts = ViolationSubtype::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), self.count(*s)))
            .collect();
        let critical_flags = self
            .critical_flags
            .lock()
            .map(|flags| flags.clone())
            .unwrap_or_default();

        IntegrityReport {
            session_id: self.session_id,
            host: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            session_start: self.session_start,
            session_duration_secs: (now - self.session_start).num_seconds().max(0) as u64,
            counts,
            total_violations: self.total(),
            score: self.score(),
            level: self.level(),
            critical_flags,
            environment_deduction: self.environment_deduction.load(Ordering::Relaxed),
            face_tracking_deduction: self.face_tracking_deduction.load(Ordering::Relaxed),
            generated_at: now,
        }
    }

    /// Write the current report as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.report()).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Human-readable summary block.
    pub fn summary(&self) -> String {
        let report = self.report();
        let mut out = format!(
            "Integrity Summary:\n\
             - Session: {}\n\
             - Violations: {}\n\
             - Score: {}/{}\n\
             - Level: {}\n",
            report.session_id, report.total_violations, report.score, BASE_SCORE, report.level
        );
        for subtype in ViolationSubtype::ALL {
            let count = report.counts.get(subtype.as_str()).copied().unwrap_or(0);
            if count > 0 {
                out.push_str(&format!("   {subtype}: {count}\n"));
            }
        }
        if !report.critical_flags.is_empty() {
            out.push_str("Critical flags:\n");
            for flag in &report.critical_flags {
                out.push_str(&format!("   {flag}\n"));
            }
        }
        out
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
        self.environment_deduction.store(0, Ordering::Relaxed);
        self.face_tracking_deduction.store(0, Ordering::Relaxed);
        if let Ok(mut flags) = self.critical_flags.lock() {
            flags.clear();
        }
    }
}

/// Serialized integrity report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub session_id: Uuid,
    pub host: String,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
    pub counts: BTreeMap<String, u64>,
    pub total_violations: u64,
    pub score: u64,
    pub level: IntegrityLevel,
    pub critical_flags: Vec<String>,
    pub environment_deduction: u64,
    pub face_tracking_deduction: u64,
    pub generated_at: DateTime<Utc>,
}

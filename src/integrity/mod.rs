//! Consumer-side integrity scoring for a session.

pub mod tally;

pub use tally::{deduction, IntegrityLevel, IntegrityReport, IntegrityTally, BASE_SCORE};

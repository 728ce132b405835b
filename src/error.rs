use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the detection core.
///
/// Analysis-path failures are absorbed before they reach callers: analyzer
/// errors fall back to the deterministic heuristic, and thin signal
/// categories degrade to neutral values instead of erroring.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// A new event's timestamp precedes the most recently recorded event.
    /// Surfaced synchronously to the event producer.
    #[error("event timestamp {incoming} precedes last recorded event {last}")]
    OrderingViolation {
        incoming: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    /// A required signal field is malformed at the scoring boundary.
    #[error("invalid feature state: {0}")]
    InvalidFeatureState(String),

    /// The reasoning analyzer failed or returned an unusable response.
    /// Converted to the heuristic fallback at the orchestrator boundary.
    #[error("reasoning analyzer error: {0}")]
    Analyzer(String),
}

pub type Result<T> = std::result::Result<T, DetectionError>;

//! Error types for the abduction monitor.
//!
//! Detection misses, low visibility and degenerate geometry are not errors:
//! they surface as unusable frames. Only the entry points that can actually
//! fail (arming, export, replay parsing, a session task dying) return [`MonitorError`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid patient code {0:?}: expected 1-10 digits")]
    InvalidPatientCode(String),

    #[error("Device tilted {tilt_deg:.1}° (limit {threshold_deg:.1}°)")]
    TiltExceeded { tilt_deg: f64, threshold_deg: f64 },

    #[error("Recording has not been finalized")]
    NotFinalized,

    #[error("Replay line {line}: {message}")]
    Replay { line: usize, message: String },

    #[error("Session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

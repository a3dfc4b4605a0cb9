//! Error types for the strength_core library.

use crate::types::MaxType;
use std::io;
use uuid::Uuid;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for strength_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No max of the requested type is recorded for the lift
    #[error("no {max_type} recorded for lift {lift}")]
    MaxNotFound { lift: Uuid, max_type: MaxType },

    /// An IN_PROGRESS session already exists for the enrollment
    #[error("a session is already in progress for enrollment {enrollment}")]
    SessionAlreadyActive { enrollment: Uuid },

    /// Program data references a week that does not exist
    #[error("week {week_number} not found in cycle {cycle}")]
    WeekNotFound { cycle: Uuid, week_number: u32 },

    /// Program data references a day that does not exist
    #[error("day not found: {0}")]
    DayNotFound(String),

    /// A stage list was exhausted and the progression has no retest path
    #[error("stage list exhausted at stage {stage} with no retest path")]
    InvalidStageTransition { stage: u32 },

    /// Terminal sessions cannot change state
    #[error("session {session} is {status} and cannot be changed")]
    InvalidSessionTransition { session: Uuid, status: String },

    /// The user has no enrollment
    #[error("user '{0}' is not enrolled in a program")]
    EnrollmentNotFound(String),

    /// A stored entity could not be found
    #[error("{0} not found")]
    NotFound(String),

    /// A stored configuration blob could not be decoded
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input rejected before touching the store
    #[error("validation error: {0}")]
    Validation(String),

    /// Store-level failure (corrupt file, poisoned lock, constraint)
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Whether this error only affects one prescription of a day
    pub fn is_per_prescription(&self) -> bool {
        matches!(self, Error::MaxNotFound { .. } | Error::InvalidConfig(_))
    }
}

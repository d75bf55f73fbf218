//! Error types shared by the workout model and the store.

use thiserror::Error;

/// Rejection raised before a workout is constructed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInputError {
    /// A numeric field was NaN, infinite, or could not be parsed.
    #[error("{field} must be a finite number (got {value})")]
    NotFinite {
        /// Name of the offending field.
        field: &'static str,
        /// Value that was supplied.
        value: f64,
    },
    /// A field that must be strictly positive was zero or negative.
    #[error("{field} must be a positive number (got {value})")]
    NotPositive {
        /// Name of the offending field.
        field: &'static str,
        /// Value that was supplied.
        value: f64,
    },
    /// The workout type tag is not one the model knows.
    #[error("unknown workout type '{0}'")]
    UnknownKind(String),
}

/// Failures surfaced by [`crate::store::WorkoutStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Input validation failed; nothing was changed.
    #[error(transparent)]
    Invalid(#[from] InvalidInputError),

    /// The session has not been loaded (or was reset) yet.
    #[error("workouts must be loaded before they can be modified")]
    NotLoaded,

    /// The session was already loaded; loading twice would discard new entries.
    #[error("workouts are already loaded for this session")]
    AlreadyLoaded,

    /// The persisted payload could not be decoded or encoded.
    #[error("failed to {operation}: {source}")]
    Decode {
        /// What was being attempted.
        operation: &'static str,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The persistence medium failed.
    #[error("failed to {operation}: {source:#}")]
    Storage {
        /// What was being attempted.
        operation: &'static str,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
}

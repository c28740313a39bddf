//! Error types for resource-loader
//!
//! This module defines the error types used throughout the crate.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::retry::FailureClass;

/// Terminal failure of a resource load
///
/// Produced only once the retry policy has given up. Aborting a request is
/// not an error and never produces a `LoadError`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    /// The policy declined to retry this failure
    #[error("Error status: {failure} - Unable to load {url} (attempt {attempt})")]
    Transport {
        /// URL that was requested, including the base URL prefix
        url: String,
        /// Classification of the last failure
        failure: FailureClass,
        /// Attempt index at which the load gave up
        attempt: u32,
    },

    /// Retries were exhausted
    #[error("Error status: {failure} - Unable to load {url} after {attempts} retries")]
    PolicyExhausted {
        /// URL that was requested, including the base URL prefix
        url: String,
        /// Classification of the last failure
        failure: FailureClass,
        /// Attempt index of the final attempt
        attempts: u32,
    },
}

impl LoadError {
    /// Attempt index at which the load gave up
    pub fn attempt_index(&self) -> u32 {
        match self {
            LoadError::Transport { attempt, .. } => *attempt,
            LoadError::PolicyExhausted { attempts, .. } => *attempts,
        }
    }

    /// Classification of the failure that ended the load
    pub fn failure(&self) -> &FailureClass {
        match self {
            LoadError::Transport { failure, .. } | LoadError::PolicyExhausted { failure, .. } => {
                failure
            }
        }
    }
}

/// Transport-level errors (no usable response was received)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Connection could not be established
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Generic network error while sending or receiving
    #[error("Network error: {0}")]
    Network(String),

    /// Local file could not be read
    #[error("IO error: {0}")]
    Io(String),
}

/// Cache gateway errors
///
/// The loader never surfaces these; any cache failure falls back to the transport.
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error during cache operation
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// The backing store cannot be used
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Chunked scheduler errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScheduleError {
    /// Burst size must be at least one
    #[error("Burst size must be greater than zero")]
    ZeroBurst,

    /// Offset lies past the last iteration
    #[error("Offset {offset} is out of range for {total} iterations")]
    OffsetOutOfRange {
        /// Requested starting offset
        offset: usize,
        /// Total iterations of the plan
        total: usize,
    },
}

/// Logging initialization errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TelemetryError {
    /// Failed to install the tracing subscriber
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

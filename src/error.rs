// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Error taxonomy for the analytics engine

use thiserror::Error;

/// Errors raised inside the engine.
///
/// Every variant carries owned strings so the error is `Clone` and a single
/// failed computation can be handed to every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalyticsError {
    /// Input data could not be analyzed (empty or malformed)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An analyzer failed while computing a section
    #[error("analysis failed: {0}")]
    Computation(String),

    /// The background worker could not be reached or reported a failure
    #[error("worker transport failed: {0}")]
    Transport(String),

    /// The background worker did not answer in time
    #[error("worker timed out after {0} ms")]
    Timeout(u64),

    /// Configuration could not be read
    #[error("configuration unavailable: {0}")]
    Config(String),

    /// Data storage failed
    #[error("storage error: {0}")]
    Storage(String),

    /// The AI collaborator failed
    #[error("AI analysis failed: {0}")]
    Ai(String),

    /// Payload (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A component was used after shutdown
    #[error("{0} has shut down")]
    Shutdown(&'static str),
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        AnalyticsError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for AnalyticsError {
    fn from(err: rusqlite::Error) -> Self {
        AnalyticsError::Storage(err.to_string())
    }
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, AnalyticsError>;

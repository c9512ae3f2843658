// SPDX-License-Identifier: MIT
//
// Unified error types for Printrelay.

use thiserror::Error as ThisError;

use crate::types::JobId;

/// Top-level error type for all Printrelay operations.
#[derive(Debug, ThisError)]
pub enum Error {
    // -- Submission errors (user-correctable, returned synchronously) --
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("the PDF is password protected; a password is required")]
    PasswordRequired,

    #[error("the supplied PDF password is not valid")]
    PasswordInvalid,

    // -- Backend / dispatch errors (captured on the job record) --
    #[error("no print backend available: {0}")]
    BackendUnavailable(String),

    #[error("print dispatch failed: {0}")]
    Dispatch(String),

    #[error("print dispatch exceeded the {0}s timeout")]
    DispatchTimeout(u64),

    // -- Polling --
    #[error("no job with id {0}")]
    NotFound(JobId),

    // -- Non-fatal, logged only --
    #[error("cleanup failed: {0}")]
    Cleanup(String),

    // -- Document errors --
    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Helper for building a `Validation` error naming the offending field.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Error>;

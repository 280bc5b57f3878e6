//! Error and warning types shared across the sync pipeline.
//!
//! MIT License
//!
//! Copyright (c) 2026 66f94eae
//!
//! Permission is hereby granted, free of charge, to any person obtaining a copy
//! of this software and associated documentation files (the "Software"), to deal
//! in the Software without restriction, including without limitation the rights
//! to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//! copies of the Software, and to permit persons to whom the Software is
//! furnished to do so, subject to the following conditions:
//!
//! The above copyright notice and this permission notice shall be included in all
//! copies or substantial portions of the Software.
//!
//! THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//! IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//! FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//! AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//! LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//! OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//! SOFTWARE.

use serde_json::{Value, json};
use thiserror::Error;

/// Unified error type for every component edge of the pipeline.
///
/// Warnings are not errors: recoverable conditions (a skipped VEVENT,
/// a dropped series, a failed fetch) accumulate into the `warnings`
/// channel of the run report and never abort the run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The planner produced more managed entries than the host scheduler cap allows
    #[error("scheduler entry limit exceeded: attempted {attempted}, limit {limit}")]
    EntryLimitExceeded {
        /// Hard cap on managed entries
        limit: usize,
        /// Number of entries the plan attempted to emit
        attempted: usize,
    },

    /// The scheduler file could not be read in strict mode during apply
    #[error("schedule file unreadable: {0}")]
    ScheduleUnreadable(String),

    /// Post-write verification found the scheduler file in an unexpected state
    #[error("schedule write verification failed: {0}")]
    VerifyFailed(String),

    /// An intent could not be mapped to a host scheduler entry
    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    /// The manifest file could not be persisted
    #[error("manifest commit failed: {0}")]
    ManifestCommit(String),

    /// Rollback requested with no previous snapshot available
    #[error("no previous snapshot to roll back to")]
    NothingToRollback,

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all with a human-readable message
    #[error("{0}")]
    Message(String),
}

impl SyncError {
    /// Renders the error in the JSON shape consumed by the status endpoints.
    ///
    /// # Returns
    /// * Structured object for machine-readable kinds, plain string otherwise
    pub fn to_status_json(&self) -> Value {
        match self {
            SyncError::EntryLimitExceeded { limit, attempted } => json!({
                "type": "scheduler_entry_limit_exceeded",
                "limit": limit,
                "attempted": attempted,
            }),
            other => Value::String(other.to_string()),
        }
    }
}

/// Result alias used at every component edge
pub type SyncResult<T> = Result<T, SyncError>;

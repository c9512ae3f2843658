// SPDX-License-Identifier: MIT
//
// Core domain types for the Printrelay job orchestrator.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Colour rendition requested for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    #[default]
    BlackAndWhite,
    Color,
}

/// Validated print options, immutable after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintOptions {
    pub color_mode: ColorMode,
    pub copies: u32,
    pub duplex: bool,
    /// Present only for password-protected PDFs.
    pub password: Option<String>,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::BlackAndWhite,
            copies: 1,
            duplex: false,
            password: None,
        }
    }
}

/// Lifecycle states of a print job.
///
/// Transitions are strictly forward; no state is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Accepted, waiting for its dispatcher task.
    Queued,
    /// Document inspection / password unlock in progress.
    Preparing,
    /// The backend invocation is being built and executed.
    Dispatching,
    /// The backend accepted the document; waiting for the queue to release it.
    Printing,
    /// Successfully handed to the printer.
    Done,
    /// Terminal failure — see the job's error field.
    Failed,
}

impl JobState {
    /// Whether `next` is a legal successor of `self`.
    ///
    /// `Failed` is reachable from `Preparing`, `Dispatching`, and `Printing`
    /// but not from `Queued`; terminal states have no successors.
    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Preparing)
                | (Preparing, Dispatching)
                | (Preparing, Failed)
                | (Dispatching, Printing)
                | (Dispatching, Failed)
                | (Printing, Done)
                | (Printing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// One print request's tracked lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub original_filename: String,
    /// Temp file owned exclusively by this job until cleanup removes it.
    pub temp_path: PathBuf,
    /// Unlocked working copy, when distinct from the original upload.
    pub working_path: Option<PathBuf>,
    pub options: PrintOptions,
    pub state: JobState,
    /// Identifier of the backend that handled (or attempted) the job.
    pub backend_used: Option<String>,
    /// Backend-reported print-queue identifier, set only on success.
    pub queue_id: Option<String>,
    /// Set only when `state == Failed`.
    pub error_message: Option<String>,
    pub submitted_at: DateTime<Utc>,
    /// Set exactly once, on entering `Done` or `Failed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Latch ensuring temp files are claimed for deletion exactly once.
    pub cleaned: bool,
}

impl Job {
    pub fn new(original_filename: String, temp_path: PathBuf, options: PrintOptions) -> Self {
        Self::with_id(JobId::new(), original_filename, temp_path, options)
    }

    /// Build a job around a pre-generated identifier, used when the temp
    /// file name already embeds the id.
    pub fn with_id(
        id: JobId,
        original_filename: String,
        temp_path: PathBuf,
        options: PrintOptions,
    ) -> Self {
        Self {
            id,
            original_filename,
            temp_path,
            working_path: None,
            options,
            state: JobState::Queued,
            backend_used: None,
            queue_id: None,
            error_message: None,
            submitted_at: Utc::now(),
            completed_at: None,
            cleaned: false,
        }
    }

    /// The path the dispatcher should hand to the backend.
    pub fn printable_path(&self) -> &PathBuf {
        self.working_path.as_ref().unwrap_or(&self.temp_path)
    }
}

/// Printer state as reported by the active backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterState {
    Idle,
    Printing,
    Stopped,
    Unknown,
}

/// Cached printer-status snapshot served to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub name: String,
    pub state: PrinterState,
    /// Toner-colour label to percentage, absent when the backend does not
    /// expose marker levels.
    pub toner_levels: Option<BTreeMap<String, u8>>,
    /// Count of pending jobs in the backend queue, when reported.
    pub queue_depth: Option<u32>,
    pub last_checked: DateTime<Utc>,
    pub stale_after: Duration,
}

impl PrinterStatus {
    /// Placeholder snapshot when the backend cannot be queried.
    pub fn unknown(name: impl Into<String>, stale_after: Duration) -> Self {
        Self {
            name: name.into(),
            state: PrinterState::Unknown,
            toner_levels: None,
            queue_depth: None,
            last_checked: Utc::now(),
            stale_after,
        }
    }
}

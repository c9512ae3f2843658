// SPDX-License-Identifier: MIT
//
// Temp-file cleanup after a job reaches a terminal state.
//
// Failures here are logged and swallowed: a file that could not be removed
// never changes a job's outcome.

use std::path::Path;

use printrelay_core::error::Error;
use printrelay_core::types::JobId;
use tracing::{debug, warn};

/// Remove a finished job's upload and, when present, its unlocked working
/// copy. Missing files are fine; anything else is logged and ignored.
pub fn remove_files(job_id: JobId, original: &Path, working: Option<&Path>) {
    remove_one(job_id, original);
    if let Some(working) = working {
        remove_one(job_id, working);
    }
}

fn remove_one(job_id: JobId, path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(%job_id, path = %path.display(), "temp file removed"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            let err = Error::Cleanup(format!("{}: {err}", path.display()));
            warn!(%job_id, error = %err, "temp file not removed");
        }
    }
}

// SPDX-License-Identifier: MIT
//
// In-memory job registry.
//
// All reads hand out cloned snapshots so callers never observe a record
// mid-update; all writes go through `advance`, which enforces the lifecycle
// state machine. Records live for the process lifetime.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::Utc;
use printrelay_core::error::{Error, Result};
use printrelay_core::types::{Job, JobId, JobState};
use tracing::{debug, warn};

/// Fields applied together with a state transition.
#[derive(Debug, Default)]
pub struct JobUpdate {
    pub backend_used: Option<String>,
    pub queue_id: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) {
        debug!(job_id = %job.id, filename = %job.original_filename, "job registered");
        self.write_lock().insert(job.id, job);
    }

    /// Snapshot of one job record.
    pub fn get(&self, id: JobId) -> Result<Job> {
        self.read_lock().get(&id).cloned().ok_or(Error::NotFound(id))
    }

    /// Advance a job along a legal lifecycle edge, applying `update`
    /// atomically with the transition.
    ///
    /// An illegal edge leaves the record untouched and returns `Ok(false)`;
    /// late writes racing a terminal state must not corrupt it.
    pub fn advance(&self, id: JobId, next: JobState, update: JobUpdate) -> Result<bool> {
        let mut jobs = self.write_lock();
        let job = jobs.get_mut(&id).ok_or(Error::NotFound(id))?;

        if !job.state.can_advance_to(next) {
            warn!(
                job_id = %id,
                from = ?job.state,
                to = ?next,
                "illegal state transition ignored"
            );
            return Ok(false);
        }

        debug!(job_id = %id, from = ?job.state, to = ?next, "job advanced");
        job.state = next;
        if let Some(backend) = update.backend_used {
            job.backend_used = Some(backend);
        }
        if let Some(queue_id) = update.queue_id {
            job.queue_id = Some(queue_id);
        }
        if let Some(message) = update.error_message {
            job.error_message = Some(message);
        }
        if next.is_terminal() && job.completed_at.is_none() {
            job.completed_at = Some(Utc::now());
        }
        Ok(true)
    }

    /// Record the unlocked working copy produced during preparation.
    pub fn record_working_copy(&self, id: JobId, path: PathBuf) -> Result<()> {
        let mut jobs = self.write_lock();
        let job = jobs.get_mut(&id).ok_or(Error::NotFound(id))?;
        job.working_path = Some(path);
        Ok(())
    }

    /// Claim a terminal job's files for deletion.
    ///
    /// Returns the paths exactly once; repeated calls and calls on
    /// non-terminal jobs yield `None`.
    pub fn claim_cleanup(&self, id: JobId) -> Option<(PathBuf, Option<PathBuf>)> {
        let mut jobs = self.write_lock();
        let job = jobs.get_mut(&id)?;
        if !job.state.is_terminal() || job.cleaned {
            return None;
        }
        job.cleaned = true;
        Some((job.temp_path.clone(), job.working_path.clone()))
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, Job>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

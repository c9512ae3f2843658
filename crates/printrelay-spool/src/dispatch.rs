// SPDX-License-Identifier: MIT
//
// Per-job dispatcher task: drives one job from `Queued` through preparation
// and backend submission to a terminal state, then hands its temp files to
// cleanup. One task per job, spawned at submission.

use std::sync::Arc;
use std::time::Duration;

use printrelay_core::error::{Error, Result};
use printrelay_core::types::{JobId, JobState};
use tracing::{info, instrument, warn};

use crate::backend::{PrintBackend, resolve_printer};
use crate::cleanup;
use crate::registry::{JobRegistry, JobUpdate};

/// Run one job to completion.
///
/// Every failure path converges on `fail`, so the job always reaches a
/// terminal state and its files are always claimed for cleanup.
#[instrument(skip_all, fields(job_id = %id))]
pub async fn run_job(
    registry: Arc<JobRegistry>,
    backend: Arc<dyn PrintBackend>,
    configured_printer: Option<String>,
    id: JobId,
    submit_limit: Duration,
) {
    if let Err(err) = drive(&registry, &backend, configured_printer.as_deref(), id, submit_limit).await
    {
        fail(&registry, id, &err);
    }
}

async fn drive(
    registry: &Arc<JobRegistry>,
    backend: &Arc<dyn PrintBackend>,
    configured_printer: Option<&str>,
    id: JobId,
    submit_limit: Duration,
) -> Result<()> {
    registry.advance(id, JobState::Preparing, JobUpdate::default())?;

    let job = registry.get(id)?;
    let temp_path = job.temp_path.clone();
    let password = job.options.password.clone();

    // PDF parsing and decryption are CPU-bound; keep them off the runtime.
    let working_copy = tokio::task::spawn_blocking(move || {
        printrelay_document::prepare(&temp_path, password.as_deref())
    })
    .await
    .map_err(|err| Error::Pdf(format!("preparation task aborted: {err}")))??;

    if let Some(path) = working_copy {
        registry.record_working_copy(id, path)?;
    }

    registry.advance(
        id,
        JobState::Dispatching,
        JobUpdate {
            backend_used: Some(backend.name().to_string()),
            ..JobUpdate::default()
        },
    )?;

    let printer = resolve_printer(backend, configured_printer).await?;
    let job = registry.get(id)?;

    // Outer bound on the submission so a stuck backend cannot hold the job
    // in Dispatching forever.
    let queue_id = tokio::time::timeout(
        submit_limit,
        backend.print_file(job.printable_path(), &printer, &job.options),
    )
    .await
    .map_err(|_| Error::DispatchTimeout(submit_limit.as_secs()))??;

    registry.advance(
        id,
        JobState::Printing,
        JobUpdate {
            queue_id: queue_id.clone(),
            ..JobUpdate::default()
        },
    )?;

    backend.await_completion(&printer, queue_id.as_deref()).await?;

    registry.advance(id, JobState::Done, JobUpdate::default())?;
    info!(printer, ?queue_id, "job printed");

    finish_cleanup(registry, id);
    Ok(())
}

/// Move the job to `Failed` with the error text, then release its files.
fn fail(registry: &Arc<JobRegistry>, id: JobId, err: &Error) {
    warn!(error = %err, "job failed");
    let outcome = registry.advance(
        id,
        JobState::Failed,
        JobUpdate {
            error_message: Some(err.to_string()),
            ..JobUpdate::default()
        },
    );
    if let Err(registry_err) = outcome {
        warn!(error = %registry_err, "failed job could not be recorded");
        return;
    }
    finish_cleanup(registry, id);
}

fn finish_cleanup(registry: &Arc<JobRegistry>, id: JobId) {
    if let Some((original, working)) = registry.claim_cleanup(id) {
        cleanup::remove_files(id, &original, working.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockBackend;
    use printrelay_core::types::{ColorMode, Job, PrintOptions};

    fn spooled_job(dir: &std::path::Path, options: PrintOptions) -> Job {
        let temp_path = dir.join("t_report.txt");
        std::fs::write(&temp_path, b"hello").expect("write");
        Job::new("report.txt".into(), temp_path, options)
    }

    #[tokio::test]
    async fn successful_job_reaches_done() {
        crate::test_support::init_tracing();
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(JobRegistry::new());
        let backend = Arc::new(MockBackend::ok());
        let job = spooled_job(dir.path(), PrintOptions::default());
        let id = job.id;
        let temp_path = job.temp_path.clone();
        registry.insert(job);

        run_job(
            Arc::clone(&registry),
            backend.clone() as Arc<dyn PrintBackend>,
            None,
            id,
            Duration::from_secs(5),
        )
        .await;

        let job = registry.get(id).expect("present");
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.backend_used.as_deref(), Some("mock"));
        assert_eq!(job.queue_id.as_deref(), Some("Mock-Office-1"));
        assert!(job.error_message.is_none());
        assert!(job.completed_at.is_some());
        // Temp file is gone once the job is terminal.
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn options_reach_the_backend_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(JobRegistry::new());
        let backend = Arc::new(MockBackend::ok());
        let options = PrintOptions {
            color_mode: ColorMode::Color,
            copies: 2,
            duplex: true,
            password: None,
        };
        let job = spooled_job(dir.path(), options);
        let id = job.id;
        registry.insert(job);

        run_job(
            Arc::clone(&registry),
            backend.clone() as Arc<dyn PrintBackend>,
            Some("Front-Office".into()),
            id,
            Duration::from_secs(5),
        )
        .await;

        let prints = backend.recorded_prints();
        assert_eq!(prints.len(), 1);
        assert_eq!(prints[0].printer, "Front-Office");
        assert_eq!(prints[0].options.copies, 2);
        assert!(prints[0].options.duplex);
        assert_eq!(prints[0].options.color_mode, ColorMode::Color);
    }

    #[tokio::test]
    async fn backend_failure_marks_the_job_failed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(JobRegistry::new());
        let backend = Arc::new(MockBackend::failing("printer on fire"));
        let job = spooled_job(dir.path(), PrintOptions::default());
        let id = job.id;
        let temp_path = job.temp_path.clone();
        registry.insert(job);

        run_job(
            Arc::clone(&registry),
            backend as Arc<dyn PrintBackend>,
            None,
            id,
            Duration::from_secs(5),
        )
        .await;

        let job = registry.get(id).expect("present");
        assert_eq!(job.state, JobState::Failed);
        let message = job.error_message.expect("recorded");
        assert!(message.contains("printer on fire"), "got: {message}");
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn stuck_backend_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(JobRegistry::new());
        let backend = Arc::new(MockBackend::slow(Duration::from_secs(30)));
        let job = spooled_job(dir.path(), PrintOptions::default());
        let id = job.id;
        registry.insert(job);

        run_job(
            Arc::clone(&registry),
            backend as Arc<dyn PrintBackend>,
            None,
            id,
            Duration::from_millis(50),
        )
        .await;

        let job = registry.get(id).expect("present");
        assert_eq!(job.state, JobState::Failed);
        let message = job.error_message.expect("recorded");
        assert!(message.contains("timeout"), "got: {message}");
    }

    #[tokio::test]
    async fn missing_password_fails_during_preparation() {
        // A file with a .pdf extension that is not a valid PDF fails in
        // Preparing before any backend contact.
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(JobRegistry::new());
        let backend = Arc::new(MockBackend::ok());
        let temp_path = dir.path().join("t_broken.pdf");
        std::fs::write(&temp_path, b"not a pdf").expect("write");
        let job = Job::new("broken.pdf".into(), temp_path, PrintOptions::default());
        let id = job.id;
        registry.insert(job);

        run_job(
            Arc::clone(&registry),
            backend.clone() as Arc<dyn PrintBackend>,
            None,
            id,
            Duration::from_secs(5),
        )
        .await;

        let job = registry.get(id).expect("present");
        assert_eq!(job.state, JobState::Failed);
        assert!(job.backend_used.is_none());
        assert!(backend.recorded_prints().is_empty());
    }
}

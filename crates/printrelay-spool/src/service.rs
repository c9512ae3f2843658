// SPDX-License-Identifier: MIT
//
// Service façade consumed by the serving process: accepts uploads, rejects
// bad submissions before anything is spooled, spawns the per-job dispatcher
// task, and exposes job records and printer status.

use std::sync::Arc;

use printrelay_core::config::AppConfig;
use printrelay_core::error::{Error, Result};
use printrelay_core::options::{RawOptions, validate_filename};
use printrelay_core::types::{Job, JobId, PrinterStatus};
use printrelay_document::is_encrypted;
use tracing::{info, warn};

use crate::backend::{PrintBackend, select_backend};
use crate::dispatch;
use crate::monitor::PrinterMonitor;
use crate::registry::JobRegistry;

pub struct PrintService {
    config: AppConfig,
    registry: Arc<JobRegistry>,
    backend: Option<Arc<dyn PrintBackend>>,
    /// Why no backend is available, reported on every submission attempt.
    backend_error: Option<String>,
    monitor: PrinterMonitor,
}

impl PrintService {
    /// Probe the platform for a backend and set up the spool directory.
    ///
    /// A host without any print mechanism still gets a working service:
    /// submissions fail with `BackendUnavailable`, status reports `Unknown`.
    pub fn init(config: AppConfig) -> Result<Self> {
        let (backend, backend_error) = match select_backend(&config) {
            Ok(backend) => (Some(backend), None),
            Err(err) => {
                warn!(error = %err, "starting without a print backend");
                (None, Some(err.to_string()))
            }
        };
        Self::assemble(config, backend, backend_error)
    }

    /// Build the service around a caller-supplied backend.
    pub fn with_backend(config: AppConfig, backend: Arc<dyn PrintBackend>) -> Result<Self> {
        Self::assemble(config, Some(backend), None)
    }

    fn assemble(
        config: AppConfig,
        backend: Option<Arc<dyn PrintBackend>>,
        backend_error: Option<String>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.spool_dir)?;
        let monitor = PrinterMonitor::new(backend.clone(), &config);
        Ok(Self {
            config,
            registry: Arc::new(JobRegistry::new()),
            backend,
            backend_error,
            monitor,
        })
    }

    /// Accept one upload for printing.
    ///
    /// Validation happens before the file touches the spool directory, and a
    /// password-protected PDF without a password is rejected here rather
    /// than surfacing later as a failed job. On success the job is `Queued`
    /// and its dispatcher task is already running.
    pub fn submit(&self, filename: &str, bytes: &[u8], raw: &RawOptions) -> Result<JobId> {
        let Some(backend) = self.backend.clone() else {
            let reason = self
                .backend_error
                .clone()
                .unwrap_or_else(|| "no print backend available".into());
            return Err(Error::BackendUnavailable(reason));
        };

        let sanitized = validate_filename(filename)?;
        let options = raw.validate()?;

        let id = JobId::new();
        let temp_path = self.config.spool_dir.join(format!("{id}_{sanitized}"));
        std::fs::write(&temp_path, bytes)?;

        // Catch the missing-password case synchronously so the submitter
        // sees it; a wrong password still fails asynchronously.
        if options.password.is_none() && is_encrypted(&temp_path) {
            if let Err(err) = std::fs::remove_file(&temp_path) {
                warn!(path = %temp_path.display(), error = %err, "rejected upload not removed");
            }
            return Err(Error::PasswordRequired);
        }

        let job = Job::with_id(id, filename.to_string(), temp_path, options);
        self.registry.insert(job);
        info!(job_id = %id, filename, "job accepted");

        tokio::spawn(dispatch::run_job(
            Arc::clone(&self.registry),
            backend,
            self.config.printer_name.clone(),
            id,
            self.config.dispatch_timeout,
        ));
        Ok(id)
    }

    /// Snapshot of one job record.
    pub fn job(&self, id: JobId) -> Result<Job> {
        self.registry.get(id)
    }

    /// Cached printer status; never errors.
    pub async fn printer_status(&self) -> PrinterStatus {
        self.monitor.status().await
    }

    /// Printers reachable through the active backend.
    pub async fn printers(&self) -> Result<Vec<String>> {
        match &self.backend {
            Some(backend) => backend.list_printers().await,
            None => Ok(Vec::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockBackend;
    use printrelay_core::types::{ColorMode, JobState};
    use std::time::Duration;

    fn test_config() -> AppConfig {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        // Leak the tempdir handle so the directory outlives the test body.
        config.spool_dir = dir.keep();
        config
    }

    async fn wait_terminal(service: &PrintService, id: JobId) -> Job {
        for _ in 0..100 {
            let job = service.job(id).expect("present");
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn text_upload_prints_and_completes() {
        crate::test_support::init_tracing();
        let backend = Arc::new(MockBackend::ok());
        let service = PrintService::with_backend(
            test_config(),
            backend.clone() as Arc<dyn PrintBackend>,
        )
        .expect("service");

        let id = service
            .submit("notes.txt", b"hello printer", &RawOptions::default())
            .expect("accepted");
        let job = wait_terminal(&service, id).await;

        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.backend_used.as_deref(), Some("mock"));
        assert!(job.error_message.is_none());
        assert_eq!(backend.recorded_prints().len(), 1);
    }

    #[tokio::test]
    async fn options_flow_through_to_the_backend() {
        let backend = Arc::new(MockBackend::ok());
        let service = PrintService::with_backend(
            test_config(),
            backend.clone() as Arc<dyn PrintBackend>,
        )
        .expect("service");

        let raw = RawOptions {
            color_mode: Some("color".into()),
            copies: Some("2".into()),
            duplex: Some("yes".into()),
            password: None,
        };
        let id = service.submit("notes.txt", b"hello", &raw).expect("accepted");
        wait_terminal(&service, id).await;

        let prints = backend.recorded_prints();
        assert_eq!(prints[0].options.copies, 2);
        assert!(prints[0].options.duplex);
        assert_eq!(prints[0].options.color_mode, ColorMode::Color);
        assert_eq!(prints[0].printer, MockBackend::DEFAULT_PRINTER);
    }

    #[tokio::test]
    async fn invalid_options_leave_no_spool_file() {
        let service = PrintService::with_backend(
            test_config(),
            Arc::new(MockBackend::ok()) as Arc<dyn PrintBackend>,
        )
        .expect("service");
        let spool_dir = service.config().spool_dir.clone();

        let raw = RawOptions {
            copies: Some("500".into()),
            ..RawOptions::default()
        };
        let err = service.submit("notes.txt", b"hello", &raw).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "copies", .. }));

        let entries: Vec<_> = std::fs::read_dir(&spool_dir)
            .expect("readable")
            .collect();
        assert!(entries.is_empty(), "spool dir must stay empty");
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let service = PrintService::with_backend(
            test_config(),
            Arc::new(MockBackend::ok()) as Arc<dyn PrintBackend>,
        )
        .expect("service");

        let err = service
            .submit("payload.exe", b"MZ", &RawOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "filename", .. }));
    }

    #[tokio::test]
    async fn protected_pdf_without_password_is_rejected_at_submit() {
        let service = PrintService::with_backend(
            test_config(),
            Arc::new(MockBackend::ok()) as Arc<dyn PrintBackend>,
        )
        .expect("service");
        let spool_dir = service.config().spool_dir.clone();

        let bytes = crate::test_support::locked_pdf_bytes("letmein");
        let err = service
            .submit("secret.pdf", &bytes, &RawOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::PasswordRequired));

        // The rejected upload leaves no spool residue and no job record.
        let entries: Vec<_> = std::fs::read_dir(&spool_dir).expect("readable").collect();
        assert!(entries.is_empty(), "spool dir must stay empty");
    }

    #[tokio::test]
    async fn wrong_password_fails_during_preparation() {
        let backend = Arc::new(MockBackend::ok());
        let service = PrintService::with_backend(
            test_config(),
            backend.clone() as Arc<dyn PrintBackend>,
        )
        .expect("service");

        let bytes = crate::test_support::locked_pdf_bytes("letmein");
        let raw = RawOptions {
            password: Some("open sesame".into()),
            ..RawOptions::default()
        };
        let id = service.submit("secret.pdf", &bytes, &raw).expect("accepted");
        let job = wait_terminal(&service, id).await;

        assert_eq!(job.state, JobState::Failed);
        let message = job.error_message.expect("recorded");
        assert!(message.contains("password"), "got: {message}");
        // The failure precedes any backend contact.
        assert!(job.backend_used.is_none());
        assert!(backend.recorded_prints().is_empty());
    }

    #[tokio::test]
    async fn correct_password_unlocks_prints_and_cleans_both_files() {
        let backend = Arc::new(MockBackend::ok());
        let service = PrintService::with_backend(
            test_config(),
            backend.clone() as Arc<dyn PrintBackend>,
        )
        .expect("service");

        let bytes = crate::test_support::locked_pdf_bytes("letmein");
        let raw = RawOptions {
            password: Some("letmein".into()),
            ..RawOptions::default()
        };
        let id = service.submit("secret.pdf", &bytes, &raw).expect("accepted");
        let job = wait_terminal(&service, id).await;

        assert_eq!(job.state, JobState::Done);
        let working_path = job.working_path.expect("unlocked copy recorded");
        assert!(
            working_path.to_string_lossy().ends_with("_unlocked.pdf"),
            "got: {}",
            working_path.display()
        );

        // The backend printed the unlocked copy, not the protected upload.
        let prints = backend.recorded_prints();
        assert_eq!(prints.len(), 1);
        assert_eq!(prints[0].path, working_path);

        // Both the upload and the working copy are removed after cleanup.
        assert!(!job.temp_path.exists());
        assert!(!working_path.exists());
    }

    #[tokio::test]
    async fn failed_job_records_its_error() {
        let service = PrintService::with_backend(
            test_config(),
            Arc::new(MockBackend::failing("out of paper")) as Arc<dyn PrintBackend>,
        )
        .expect("service");

        let id = service
            .submit("notes.txt", b"hello", &RawOptions::default())
            .expect("accepted");
        let job = wait_terminal(&service, id).await;

        assert_eq!(job.state, JobState::Failed);
        assert!(job.error_message.expect("recorded").contains("out of paper"));
    }

    #[tokio::test]
    async fn unknown_job_id_is_not_found() {
        let service = PrintService::with_backend(
            test_config(),
            Arc::new(MockBackend::ok()) as Arc<dyn PrintBackend>,
        )
        .expect("service");
        assert!(matches!(service.job(JobId::new()), Err(Error::NotFound(_))));
    }
}

// SPDX-License-Identifier: MIT
//
// Shared test doubles for the spool crate.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use printrelay_core::error::{Error, Result};
use printrelay_core::types::{PrintOptions, PrinterState};
use printrelay_document::TextRenderer;

use crate::backend::{PrintBackend, StatusProbe};

/// Route test logs through the standard subscriber, honouring `RUST_LOG`.
/// Repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Bytes of a small password-protected PDF.
pub fn locked_pdf_bytes(password: &str) -> Vec<u8> {
    use lopdf::encryption::{EncryptionState, EncryptionVersion, Permissions};

    let plain = TextRenderer::a4()
        .render("for internal distribution only")
        .expect("render");
    let mut doc = lopdf::Document::load_mem(&plain).expect("parse rendered PDF");
    let version = EncryptionVersion::V1 {
        document: &doc,
        owner_password: password,
        user_password: password,
        permissions: Permissions::all(),
    };
    let state = EncryptionState::try_from(version).expect("encryption state");
    doc.encrypt(&state).expect("encrypt");
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize");
    bytes
}

/// One recorded `print_file` invocation.
#[derive(Debug, Clone)]
pub struct RecordedPrint {
    pub path: PathBuf,
    pub printer: String,
    pub options: PrintOptions,
}

/// Scripted in-memory backend.
pub struct MockBackend {
    /// Error text returned by `print_file`, when scripted to fail.
    print_failure: Option<String>,
    /// Artificial latency applied to `print_file`.
    print_delay: Duration,
    /// Queue identifier reported on success.
    queue_id: Option<String>,
    /// When set, `printer_status` fails with this text.
    status_failure: Option<String>,
    status_state: PrinterState,
    pub prints: Mutex<Vec<RecordedPrint>>,
    pub status_calls: AtomicUsize,
}

impl MockBackend {
    pub const DEFAULT_PRINTER: &'static str = "Mock-Office";

    /// A backend where everything succeeds immediately.
    pub fn ok() -> Self {
        Self {
            print_failure: None,
            print_delay: Duration::ZERO,
            queue_id: Some("Mock-Office-1".into()),
            status_failure: None,
            status_state: PrinterState::Idle,
            prints: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            print_failure: Some(message.to_string()),
            ..Self::ok()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            print_delay: delay,
            ..Self::ok()
        }
    }

    pub fn with_status_failure(message: &str) -> Self {
        Self {
            status_failure: Some(message.to_string()),
            ..Self::ok()
        }
    }

    pub fn with_state(state: PrinterState) -> Self {
        Self {
            status_state: state,
            ..Self::ok()
        }
    }

    pub fn recorded_prints(&self) -> Vec<RecordedPrint> {
        match self.prints.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl PrintBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        Ok(vec![Self::DEFAULT_PRINTER.to_string(), "Mock-Lab".to_string()])
    }

    async fn default_printer(&self) -> Result<Option<String>> {
        Ok(Some(Self::DEFAULT_PRINTER.to_string()))
    }

    async fn print_file(
        &self,
        path: &Path,
        printer: &str,
        options: &PrintOptions,
    ) -> Result<Option<String>> {
        if !self.print_delay.is_zero() {
            tokio::time::sleep(self.print_delay).await;
        }
        if let Ok(mut prints) = self.prints.lock() {
            prints.push(RecordedPrint {
                path: path.to_path_buf(),
                printer: printer.to_string(),
                options: options.clone(),
            });
        }
        match &self.print_failure {
            Some(message) => Err(Error::Dispatch(message.clone())),
            None => Ok(self.queue_id.clone()),
        }
    }

    async fn printer_status(&self, _printer: &str) -> Result<StatusProbe> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match &self.status_failure {
            Some(message) => Err(Error::Dispatch(message.clone())),
            None => Ok(StatusProbe {
                state: self.status_state,
                queue_depth: Some(0),
                toner_levels: None,
            }),
        }
    }
}

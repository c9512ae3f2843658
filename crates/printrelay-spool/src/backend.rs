// SPDX-License-Identifier: MIT
//
// The print backend seam and the one-time startup capability probe.
//
// Two concrete variants exist: the CUPS command backend (`cups`) used where
// a local print spooler is present, and the local PDF-renderer backend
// (`renderer`) for hosts that print through a standalone executable.
// Selection happens once at process start; a job never switches backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use printrelay_core::config::AppConfig;
use printrelay_core::error::{Error, Result};
use printrelay_core::types::{PrintOptions, PrinterState};
use tracing::info;

use crate::cups::CupsBackend;
use crate::renderer::RendererBackend;

/// Raw printer probe data a backend can gather about one printer.
///
/// The monitor turns this into the cached `PrinterStatus` view.
#[derive(Debug, Clone)]
pub struct StatusProbe {
    pub state: PrinterState,
    pub queue_depth: Option<u32>,
    /// Toner-colour label to percentage; `None` when the backend's tooling
    /// does not expose marker levels.
    pub toner_levels: Option<BTreeMap<String, u8>>,
}

/// Capability interface over the concrete print mechanisms.
#[async_trait]
pub trait PrintBackend: Send + Sync {
    /// Stable identifier recorded on job records as `backend_used`.
    fn name(&self) -> &'static str;

    /// Names of the printers this backend can reach.
    async fn list_printers(&self) -> Result<Vec<String>>;

    /// The system default printer, if one is configured.
    async fn default_printer(&self) -> Result<Option<String>>;

    /// Submit one prepared file for printing.
    ///
    /// Returns the backend's queue identifier when it reports one. Called
    /// exactly once per job.
    async fn print_file(
        &self,
        path: &Path,
        printer: &str,
        options: &PrintOptions,
    ) -> Result<Option<String>>;

    /// Wait for the backend queue to release a submitted job.
    ///
    /// Best-effort: backends without queue visibility return immediately.
    async fn await_completion(&self, _printer: &str, _queue_id: Option<&str>) -> Result<()> {
        Ok(())
    }

    /// Query live printer state, queue depth, and toner levels.
    async fn printer_status(&self, printer: &str) -> Result<StatusProbe>;
}

/// One-time capability probe choosing the platform backend.
///
/// CUPS wins where `lp` and `lpstat` are on PATH; otherwise a configured or
/// well-known renderer executable is used. With neither present every
/// submission fails fast with `BackendUnavailable`.
pub fn select_backend(config: &AppConfig) -> Result<Arc<dyn PrintBackend>> {
    if binary_on_path("lp").is_some() && binary_on_path("lpstat").is_some() {
        info!("selected CUPS command backend");
        return Ok(Arc::new(CupsBackend::new(
            config.printer_uri.clone(),
            config.dispatch_timeout,
        )));
    }

    if let Some(renderer) = RendererBackend::locate(config) {
        info!(executable = %renderer.executable().display(), "selected PDF renderer backend");
        return Ok(Arc::new(renderer));
    }

    Err(Error::BackendUnavailable(
        "no print backend found: install CUPS ('lp' and 'lpstat') or configure \
         a PDF renderer executable"
            .into(),
    ))
}

/// Resolve the printer a job or status query should target: the configured
/// name if set, else the backend default, else the first printer listed.
pub async fn resolve_printer(
    backend: &Arc<dyn PrintBackend>,
    configured: Option<&str>,
) -> Result<String> {
    if let Some(name) = configured.map(str::trim).filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }
    if let Ok(Some(default)) = backend.default_printer().await {
        return Ok(default);
    }
    backend
        .list_printers()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Dispatch("no printers available".into()))
}

/// Locate an executable on PATH, `shutil.which` style.
pub fn binary_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

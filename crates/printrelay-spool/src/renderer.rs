// SPDX-License-Identifier: MIT
//
// PDF-renderer backend for hosts without a CUPS spooler.
//
// Printing goes through a standalone renderer executable (SumatraPDF or a
// compatible tool taking `-silent -print-to`); printer discovery and status
// come from PowerShell's printer cmdlets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use printrelay_core::config::AppConfig;
use printrelay_core::error::{Error, Result};
use printrelay_core::types::{ColorMode, PrintOptions, PrinterState};
use printrelay_document::TextRenderer;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::backend::{PrintBackend, StatusProbe, binary_on_path};
use crate::exec;

/// Bound for the PowerShell status queries.
const STATUS_TIMEOUT: Duration = Duration::from_secs(15);

/// Install locations probed when no renderer path is configured.
const WELL_KNOWN_PATHS: &[&str] = &[
    r"C:\Program Files\SumatraPDF\SumatraPDF.exe",
    r"C:\Program Files (x86)\SumatraPDF\SumatraPDF.exe",
    r"C:\Users\Public\SumatraPDF\SumatraPDF.exe",
];

/// Backend printing through a local PDF-renderer executable.
pub struct RendererBackend {
    executable: PathBuf,
    submit_timeout: Duration,
}

impl RendererBackend {
    /// Find a usable renderer executable: the configured path first, then
    /// well-known install locations, then PATH.
    pub fn locate(config: &AppConfig) -> Option<Self> {
        let configured = config
            .renderer_path
            .as_deref()
            .map(PathBuf::from)
            .filter(|p| p.is_file());
        let executable = configured
            .or_else(|| {
                WELL_KNOWN_PATHS
                    .iter()
                    .map(PathBuf::from)
                    .find(|p| p.is_file())
            })
            .or_else(|| binary_on_path("SumatraPDF.exe"))?;
        Some(Self {
            executable,
            submit_timeout: config.dispatch_timeout,
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Run a PowerShell expression and parse its JSON output.
    async fn query_json<T: for<'de> Deserialize<'de>>(&self, script: &str) -> Result<T> {
        let output = exec::run(
            "powershell",
            ["-NoProfile", "-NonInteractive", "-Command", script],
            STATUS_TIMEOUT,
        )
        .await?;
        if !output.success() {
            return Err(Error::Dispatch(format!(
                "printer query failed: {}",
                output.diagnostic()
            )));
        }
        let trimmed = output.stdout.trim();
        if trimmed.is_empty() {
            return Err(Error::Dispatch("printer query returned no data".into()));
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    /// Render a text file to a throwaway PDF next to the original.
    ///
    /// The renderer executable prints PDFs and images but not plain text.
    fn render_text_scratch(&self, path: &Path) -> Result<PathBuf> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let scratch = path.with_file_name(format!("{stem}_render.pdf"));
        TextRenderer::a4().render_file(path, &scratch)?;
        Ok(scratch)
    }
}

#[async_trait]
impl PrintBackend for RendererBackend {
    fn name(&self) -> &'static str {
        "renderer"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        // -InputObject keeps single-element results as JSON arrays.
        let script = "ConvertTo-Json -Compress -InputObject \
                      @(Get-Printer | Select-Object -ExpandProperty Name)";
        let names: Vec<String> = self.query_json(script).await?;
        Ok(names)
    }

    async fn default_printer(&self) -> Result<Option<String>> {
        let script = "ConvertTo-Json -Compress -InputObject \
                      @(Get-CimInstance Win32_Printer -Filter 'Default=true' \
                      | Select-Object -ExpandProperty Name)";
        let names: Vec<String> = self.query_json(script).await?;
        Ok(names.into_iter().next())
    }

    async fn print_file(
        &self,
        path: &Path,
        printer: &str,
        options: &PrintOptions,
    ) -> Result<Option<String>> {
        if !path.exists() {
            return Err(Error::Dispatch(format!(
                "file to print does not exist: {}",
                path.display()
            )));
        }

        // Plain text goes through a scratch PDF that is removed afterwards.
        let is_text = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        let scratch = if is_text {
            Some(self.render_text_scratch(path)?)
        } else {
            None
        };
        let print_path = scratch.as_deref().unwrap_or(path);

        let settings = print_settings(options);
        let args = [
            std::ffi::OsString::from("-silent"),
            "-print-to".into(),
            printer.into(),
            "-print-settings".into(),
            settings.clone().into(),
            print_path.as_os_str().to_owned(),
        ];
        let program = self.executable.to_string_lossy().into_owned();
        debug!(printer, settings, "invoking renderer");
        let outcome = exec::run(&program, args, self.submit_timeout).await;

        if let Some(scratch) = scratch {
            if let Err(err) = std::fs::remove_file(&scratch) {
                warn!(path = %scratch.display(), error = %err, "scratch PDF not removed");
            }
        }

        let output = outcome?;
        if !output.success() {
            return Err(Error::Dispatch(format!(
                "renderer failed: {}",
                output.diagnostic()
            )));
        }
        // The renderer reports no queue identifier.
        Ok(None)
    }

    async fn printer_status(&self, printer: &str) -> Result<StatusProbe> {
        let script = format!(
            "Get-Printer -Name '{name}' | Select-Object Name,PrinterStatus,WorkOffline,JobCount \
             | ConvertTo-Json -Compress",
            name = ps_escape(printer)
        );
        let payload: PrinterPayload = self.query_json(&script).await?;
        Ok(StatusProbe {
            state: payload.state(),
            queue_depth: payload.job_count,
            // The PowerShell cmdlets expose no marker levels.
            toner_levels: None,
        })
    }
}

/// `-print-settings` value: copies, colour mode, duplex.
fn print_settings(options: &PrintOptions) -> String {
    let color = match options.color_mode {
        ColorMode::Color => "color",
        ColorMode::BlackAndWhite => "monochrome",
    };
    let sides = if options.duplex { "duplexlong" } else { "simplex" };
    format!("{}x,{color},{sides}", options.copies)
}

/// Escape a value for a single-quoted PowerShell string.
fn ps_escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// `Get-Printer` record as serialized by `ConvertTo-Json`.
///
/// `PrinterStatus` arrives as an enum number or a display string depending
/// on the cmdlet and host version, so both are accepted.
#[derive(Debug, Deserialize)]
struct PrinterPayload {
    #[serde(rename = "PrinterStatus")]
    printer_status: Option<serde_json::Value>,
    #[serde(rename = "WorkOffline")]
    work_offline: Option<bool>,
    #[serde(rename = "JobCount")]
    job_count: Option<u32>,
}

impl PrinterPayload {
    fn state(&self) -> PrinterState {
        if self.work_offline == Some(true) {
            return PrinterState::Stopped;
        }
        match &self.printer_status {
            Some(serde_json::Value::Number(code)) => {
                map_status_code(code.as_i64().unwrap_or(-1))
            }
            Some(serde_json::Value::String(text)) => map_status_text(text),
            _ => PrinterState::Unknown,
        }
    }
}

/// Map the numeric `PrinterStatus` enum onto the closed state set.
fn map_status_code(code: i64) -> PrinterState {
    match code {
        3 => PrinterState::Idle,
        4 | 5 => PrinterState::Printing,
        6 | 7 => PrinterState::Stopped,
        _ => PrinterState::Unknown,
    }
}

/// Map a textual status onto the closed state set.
fn map_status_text(text: &str) -> PrinterState {
    let text = text.to_ascii_lowercase();
    if text.contains("print") || text.contains("busy") {
        PrinterState::Printing
    } else if text.contains("idle") || text.contains("normal") {
        PrinterState::Idle
    } else if text.contains("offline") || text.contains("stop") || text.contains("error") {
        PrinterState::Stopped
    } else {
        PrinterState::Unknown
    }
}

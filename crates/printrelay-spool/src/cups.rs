// SPDX-License-Identifier: MIT
//
// CUPS command backend: submits jobs with `lp`, reads printer and queue
// state with `lpstat`, and pulls marker (toner) levels over IPP via
// `ipptool` when the printer exposes them.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use printrelay_core::error::{Error, Result};
use printrelay_core::types::{ColorMode, PrintOptions, PrinterState};
use tracing::{debug, warn};

use crate::backend::{PrintBackend, StatusProbe, binary_on_path};
use crate::exec;

/// Bound for the quick `lpstat`/`ipptool` status commands; the configured
/// dispatch timeout applies only to `lp` submissions.
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// How often and how long to poll the queue after an `lp` submission.
const RELEASE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const RELEASE_POLL_ATTEMPTS: u32 = 12;

/// Where CUPS installs the standard get-printer-attributes request.
const IPPTOOL_TEST_CANDIDATES: &[&str] = &[
    "/usr/share/cups/ipptool/get-printer-attributes.test",
    "/usr/local/share/cups/ipptool/get-printer-attributes.test",
];

/// Backend driving a local CUPS spooler through its command-line tools.
pub struct CupsBackend {
    /// Configured printer network URI, tried for IPP introspection in
    /// addition to the local queue URI.
    printer_uri: Option<String>,
    /// Bound on one `lp` submission.
    submit_timeout: Duration,
}

impl CupsBackend {
    pub fn new(printer_uri: Option<String>, submit_timeout: Duration) -> Self {
        Self {
            printer_uri,
            submit_timeout,
        }
    }

    /// Query marker levels over IPP, if the tooling and printer support it.
    ///
    /// Absence is not an error: no `ipptool`, no test file, or a printer
    /// that does not expose markers all yield `None`.
    async fn load_toner_levels(&self, printer: &str) -> Option<BTreeMap<String, u8>> {
        if binary_on_path("ipptool").is_none() {
            debug!("ipptool not on PATH, skipping toner levels");
            return None;
        }
        let test_path = IPPTOOL_TEST_CANDIDATES
            .iter()
            .map(Path::new)
            .find(|p| p.exists())?;

        let mut uris: Vec<String> = vec![format!("ipp://localhost/printers/{printer}")];
        if let Some(uri) = self.printer_uri.as_deref() {
            let lower = uri.to_ascii_lowercase();
            if (lower.starts_with("ipp://") || lower.starts_with("ipps://"))
                && !uris.iter().any(|u| u == uri)
            {
                uris.push(uri.to_string());
            }
        }

        for uri in &uris {
            let args = [
                OsString::from("-c"),
                OsString::from("-t"),
                OsString::from(uri),
                test_path.as_os_str().to_owned(),
            ];
            match exec::run("ipptool", args, STATUS_TIMEOUT).await {
                Ok(output) if output.success() => {
                    let attributes = parse_ipp_attributes(&output.stdout);
                    return toner_levels_from(&attributes);
                }
                Ok(output) => {
                    debug!(uri, diagnostic = %output.diagnostic(), "ipptool query failed");
                }
                Err(err) => {
                    debug!(uri, error = %err, "ipptool did not run");
                }
            }
        }
        None
    }
}

#[async_trait]
impl PrintBackend for CupsBackend {
    fn name(&self) -> &'static str {
        "cups"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        let output = exec::run("lpstat", ["-a"], STATUS_TIMEOUT).await?;
        if !output.success() {
            return Err(Error::Dispatch(format!(
                "cannot list printers: {}",
                output.diagnostic()
            )));
        }
        Ok(parse_printer_list(&output.stdout))
    }

    async fn default_printer(&self) -> Result<Option<String>> {
        let output = exec::run("lpstat", ["-d"], STATUS_TIMEOUT).await?;
        if !output.success() {
            return Ok(None);
        }
        Ok(parse_default_printer(&output.stdout))
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

        let mut args: Vec<OsString> = Vec::new();
        for arg in lp_option_args(printer, options) {
            args.push(OsString::from(arg));
        }
        args.push(path.as_os_str().to_owned());

        let output = exec::run("lp", args, self.submit_timeout).await?;
        if !output.success() {
            return Err(Error::Dispatch(format!(
                "lp failed: {}",
                output.diagnostic()
            )));
        }

        let queue_id = parse_queue_id(&output.stdout);
        debug!(printer, ?queue_id, "lp accepted the document");
        Ok(queue_id)
    }

    /// Poll `lpstat -o` until the local queue releases the job.
    ///
    /// Polling failures end the wait quietly: once `lp` accepted the
    /// document, queue visibility is advisory.
    async fn await_completion(&self, printer: &str, queue_id: Option<&str>) -> Result<()> {
        let Some(queue_id) = queue_id else {
            return Ok(());
        };

        for attempt in 1..=RELEASE_POLL_ATTEMPTS {
            tokio::time::sleep(RELEASE_POLL_INTERVAL).await;
            let output = match exec::run("lpstat", ["-o", printer], STATUS_TIMEOUT).await {
                Ok(output) if output.success() => output,
                _ => return Ok(()),
            };
            if !output.stdout.contains(queue_id) {
                debug!(printer, queue_id, attempt, "queue released the job");
                return Ok(());
            }
        }
        debug!(printer, queue_id, "job still queued after release polling");
        Ok(())
    }

    async fn printer_status(&self, printer: &str) -> Result<StatusProbe> {
        if printer.is_empty() {
            return Err(Error::Dispatch("no printer selected".into()));
        }

        let output = exec::run("lpstat", ["-p", printer, "-l"], STATUS_TIMEOUT).await?;
        if !output.success() {
            return Err(Error::Dispatch(format!(
                "cannot read state of '{printer}': {}",
                output.diagnostic()
            )));
        }
        let summary = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        let state = map_cups_state(summary);

        let queue_depth = match exec::run("lpstat", ["-o", printer], STATUS_TIMEOUT).await {
            Ok(output) if output.success() => {
                Some(output.stdout.lines().filter(|l| !l.trim().is_empty()).count() as u32)
            }
            Ok(output) => {
                warn!(printer, diagnostic = %output.diagnostic(), "queue listing failed");
                None
            }
            Err(_) => None,
        };

        let toner_levels = self.load_toner_levels(printer).await;

        Ok(StatusProbe {
            state,
            queue_depth,
            toner_levels,
        })
    }
}

// -- lp invocation ------------------------------------------------------------

/// Option arguments of an `lp` submission for the given printer and options.
fn lp_option_args(printer: &str, options: &PrintOptions) -> Vec<String> {
    let sides = if options.duplex {
        "sides=two-sided-long-edge"
    } else {
        "sides=one-sided"
    };
    let (mode, model) = match options.color_mode {
        ColorMode::Color => ("print-color-mode=color", "ColorModel=RGB"),
        ColorMode::BlackAndWhite => ("print-color-mode=monochrome", "ColorModel=Gray"),
    };

    vec![
        "-d".into(),
        printer.into(),
        "-n".into(),
        options.copies.to_string(),
        "-o".into(),
        sides.into(),
        "-o".into(),
        mode.into(),
        "-o".into(),
        model.into(),
    ]
}

/// Extract the queue identifier from `lp` stdout.
///
/// Normal output is `request id is <printer>-<n> (1 file(s))`; as a
/// fallback the first token of any non-empty output is used.
fn parse_queue_id(stdout: &str) -> Option<String> {
    if let Some(rest) = stdout.split("request id is ").nth(1) {
        if let Some(id) = rest.split_whitespace().next() {
            return Some(id.to_string());
        }
    }
    stdout.split_whitespace().next().map(str::to_string)
}

// -- lpstat parsing -----------------------------------------------------------

/// Map an `lpstat -p` summary line onto the closed printer-state set.
fn map_cups_state(summary: &str) -> PrinterState {
    let text = summary.to_ascii_lowercase();
    if text.contains("printing") || text.contains("processing") {
        PrinterState::Printing
    } else if text.contains("idle") || text.contains("ready") {
        PrinterState::Idle
    } else if text.contains("disabled") || text.contains("stopped") {
        PrinterState::Stopped
    } else {
        PrinterState::Unknown
    }
}

/// Printer names from `lpstat -a`: first token per line, sorted, deduplicated.
fn parse_printer_list(stdout: &str) -> Vec<String> {
    let names: BTreeSet<String> = stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect();
    names.into_iter().collect()
}

/// Default destination from `lpstat -d`.
fn parse_default_printer(stdout: &str) -> Option<String> {
    let marker = "system default destination:";
    stdout
        .split_once(marker)
        .map(|(_, rest)| rest.trim().to_string())
        .filter(|name| !name.is_empty())
}

// -- ipptool parsing ----------------------------------------------------------

/// Parse `attribute (tag) = value` lines from ipptool output.
fn parse_ipp_attributes(output: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    for raw_line in output.lines() {
        let line = raw_line.trim();
        let Some((lhs, value)) = line.split_once('=') else {
            continue;
        };
        let mut lhs_parts = lhs.split_whitespace();
        let (Some(key), Some(tag)) = (lhs_parts.next(), lhs_parts.next()) else {
            continue;
        };
        if lhs_parts.next().is_some() || !tag.starts_with('(') || !tag.ends_with(')') {
            continue;
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            continue;
        }
        attributes.insert(key.to_ascii_lowercase(), value.trim().to_string());
    }
    attributes
}

/// Build the toner-label → percentage map from IPP marker attributes.
///
/// Returns `None` when the printer exposes no usable marker data.
fn toner_levels_from(attributes: &BTreeMap<String, String>) -> Option<BTreeMap<String, u8>> {
    let names = split_ipp_values(attributes.get("marker-names").map(String::as_str));
    let levels = split_ipp_values(attributes.get("marker-levels").map(String::as_str));
    let colors = split_ipp_values(attributes.get("marker-colors").map(String::as_str));

    let count = names.len().max(levels.len()).max(colors.len());
    if count == 0 {
        return None;
    }

    let mut toner = BTreeMap::new();
    for index in 0..count {
        let level = levels
            .get(index)
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(normalize_marker_level);
        let Some(percent) = level else {
            continue;
        };
        let label = toner_label(
            names.get(index).map(String::as_str),
            colors.get(index).map(String::as_str),
            index,
        );
        toner.insert(label, percent);
    }

    if toner.is_empty() { None } else { Some(toner) }
}

/// Split a comma-separated IPP value list, trimming quotes.
fn split_ipp_values(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|chunk| chunk.trim().trim_matches('"').to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

/// Normalize an IPP marker level to a percentage.
///
/// Printers report either 0–100 directly or the IPP 0–10000 scale; negative
/// values mean "unknown".
fn normalize_marker_level(level: i64) -> Option<u8> {
    match level {
        0..=100 => Some(level as u8),
        101..=10000 => Some(((level as f64) / 100.0).round().clamp(0.0, 100.0) as u8),
        _ => None,
    }
}

/// Stable colour label for one marker entry.
fn toner_label(name: Option<&str>, color: Option<&str>, index: usize) -> String {
    let text = format!("{} {}", color.unwrap_or_default(), name.unwrap_or_default())
        .to_ascii_lowercase();
    for known in ["black", "cyan", "magenta", "yellow"] {
        if text.contains(known) {
            return known.to_string();
        }
    }
    match name {
        Some(name) if !name.is_empty() => name.to_ascii_lowercase(),
        _ => format!("toner-{}", index + 1),
    }
}

// SPDX-License-Identifier: MIT
//
// Runtime configuration, sourced from the environment.
//
// The legacy deployment exposed the printer network address under three
// misspelled environment variables left behind by earlier renames. The
// canonical key is PRINTRELAY_PRINTER_URI; the old spellings are still read
// as deprecated synonyms and logged when used.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Canonical environment keys.
pub const ENV_PRINTER: &str = "PRINTRELAY_PRINTER";
pub const ENV_PRINTER_URI: &str = "PRINTRELAY_PRINTER_URI";
pub const ENV_HOST: &str = "PRINTRELAY_HOST";
pub const ENV_PORT: &str = "PRINTRELAY_PORT";
pub const ENV_RENDERER_PATH: &str = "PRINTRELAY_RENDERER_PATH";
pub const ENV_SPOOL_DIR: &str = "PRINTRELAY_SPOOL_DIR";

/// Deprecated synonyms for `PRINTRELAY_PRINTER_URI`, first match wins.
pub const DEPRECATED_PRINTER_URI_ALIASES: &[&str] =
    &["PRINTER_ADDRESS", "PRINTER_ADRESS", "PRINTER_ADDRES"];

/// Deprecated synonym for `PRINTRELAY_RENDERER_PATH`.
pub const DEPRECATED_RENDERER_ALIAS: &str = "SUMATRA_PDF_PATH";

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Display name of the target printer; `None` means resolve the
    /// backend's default printer at submission time.
    pub printer_name: Option<String>,
    /// Network address/URI of the printer, used for IPP introspection.
    pub printer_uri: Option<String>,
    /// Bind host for the serving process (consumed by the outer layer).
    pub host: String,
    /// Bind port for the serving process (consumed by the outer layer).
    pub port: u16,
    /// Override path for the alternate-platform PDF renderer executable.
    pub renderer_path: Option<PathBuf>,
    /// Directory for per-job temp files.
    pub spool_dir: PathBuf,
    /// Bound on a single backend print invocation.
    pub dispatch_timeout: Duration,
    /// TTL for cached printer status.
    pub status_ttl: Duration,
    /// Hard ceiling past which a stale cached status is no longer served.
    pub status_ceiling: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            printer_name: None,
            printer_uri: None,
            host: "0.0.0.0".into(),
            port: 8000,
            renderer_path: None,
            spool_dir: std::env::temp_dir().join("printrelay-spool"),
            dispatch_timeout: Duration::from_secs(180),
            status_ttl: Duration::from_secs(10),
            status_ceiling: Duration::from_secs(120),
        }
    }
}

impl AppConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Split out from [`AppConfig::from_env`] so tests can supply a map
    /// instead of mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.printer_name = lookup(ENV_PRINTER).filter(|v| !v.is_empty());
        config.printer_uri = resolve_printer_uri(&lookup);

        if let Some(host) = lookup(ENV_HOST).filter(|v| !v.is_empty()) {
            config.host = host;
        }
        if let Some(raw) = lookup(ENV_PORT) {
            match raw.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => warn!(value = %raw, "ignoring unparseable {ENV_PORT}"),
            }
        }

        config.renderer_path = lookup(ENV_RENDERER_PATH)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                lookup(DEPRECATED_RENDERER_ALIAS)
                    .filter(|v| !v.is_empty())
                    .map(|v| {
                        warn!(
                            alias = DEPRECATED_RENDERER_ALIAS,
                            "deprecated renderer-path variable used; set {ENV_RENDERER_PATH}"
                        );
                        PathBuf::from(v)
                    })
            });

        if let Some(dir) = lookup(ENV_SPOOL_DIR).filter(|v| !v.is_empty()) {
            config.spool_dir = PathBuf::from(dir);
        }

        config
    }
}

/// Resolve the printer URI from the canonical key, falling back to the
/// deprecated aliases in declared order.
fn resolve_printer_uri(lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(uri) = lookup(ENV_PRINTER_URI).filter(|v| !v.is_empty()) {
        return Some(uri);
    }
    for alias in DEPRECATED_PRINTER_URI_ALIASES {
        if let Some(uri) = lookup(alias).filter(|v| !v.is_empty()) {
            warn!(
                alias,
                "deprecated printer-address variable used; set {ENV_PRINTER_URI}"
            );
            return Some(uri);
        }
    }
    None
}

// SPDX-License-Identifier: MIT
//
// Cached printer-status monitor.
//
// Pollers always get an answer: a fresh snapshot within the TTL, a joined
// refresh when the cache has expired, a stale-but-recent snapshot when the
// backend is unreachable, and an `Unknown` placeholder past the staleness
// ceiling. Status never errors out to callers.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use printrelay_core::config::AppConfig;
use printrelay_core::types::PrinterStatus;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::{PrintBackend, resolve_printer};

pub struct PrinterMonitor {
    backend: Option<Arc<dyn PrintBackend>>,
    configured_printer: Option<String>,
    ttl: Duration,
    ceiling: Duration,
    cache: RwLock<Option<PrinterStatus>>,
    /// Serializes refreshes so concurrent expired polls trigger one probe.
    refresh: Mutex<()>,
}

impl PrinterMonitor {
    pub fn new(backend: Option<Arc<dyn PrintBackend>>, config: &AppConfig) -> Self {
        Self {
            backend,
            configured_printer: config.printer_name.clone(),
            ttl: config.status_ttl,
            ceiling: config.status_ceiling,
            cache: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Current printer status, served from cache when fresh.
    pub async fn status(&self) -> PrinterStatus {
        if let Some(cached) = self.cached_within(self.ttl) {
            return cached;
        }

        let _refresh = self.refresh.lock().await;
        // Another poller may have refreshed while this one waited.
        if let Some(cached) = self.cached_within(self.ttl) {
            return cached;
        }

        match self.probe().await {
            Some(status) => {
                self.store(status.clone());
                status
            }
            None => {
                // Degrade to a stale snapshot while it is recent enough,
                // then admit ignorance.
                if let Some(stale) = self.cached_within(self.ceiling) {
                    debug!("serving stale printer status");
                    return stale;
                }
                // Pollers never see a nameless printer.
                let name = self
                    .configured_printer
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                PrinterStatus::unknown(name, self.ttl)
            }
        }
    }

    async fn probe(&self) -> Option<PrinterStatus> {
        let backend = self.backend.as_ref()?;
        let printer = match resolve_printer(backend, self.configured_printer.as_deref()).await {
            Ok(printer) => printer,
            Err(err) => {
                warn!(error = %err, "cannot resolve printer for status probe");
                return None;
            }
        };
        match backend.printer_status(&printer).await {
            Ok(probe) => Some(PrinterStatus {
                name: printer,
                state: probe.state,
                toner_levels: probe.toner_levels,
                queue_depth: probe.queue_depth,
                last_checked: Utc::now(),
                stale_after: self.ttl,
            }),
            Err(err) => {
                warn!(printer, error = %err, "printer status probe failed");
                None
            }
        }
    }

    /// Cached snapshot no older than `max_age`, if any.
    fn cached_within(&self, max_age: Duration) -> Option<PrinterStatus> {
        let guard = match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let status = guard.as_ref()?;
        let age = Utc::now().signed_duration_since(status.last_checked);
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        (age <= max_age).then(|| status.clone())
    }

    fn store(&self, status: PrinterStatus) {
        let mut guard = match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(status);
    }
}

// SPDX-License-Identifier: MIT
//
// Printrelay Spool — print backends, the job dispatcher and registry, the
// cached printer monitor, and the service layer consumed by the outer
// serving process.

pub mod backend;
pub mod cleanup;
pub mod cups;
pub mod dispatch;
pub mod exec;
pub mod monitor;
pub mod registry;
pub mod renderer;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{PrintBackend, select_backend};
pub use monitor::PrinterMonitor;
pub use registry::JobRegistry;
pub use service::PrintService;

// SPDX-License-Identifier: MIT
//
// Printrelay — Core types, error taxonomy, and configuration shared across
// all crates.

pub mod config;
pub mod error;
pub mod options;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use types::*;

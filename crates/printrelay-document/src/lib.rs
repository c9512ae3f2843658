// SPDX-License-Identifier: MIT
//
// Printrelay Document — PDF inspection and unlock for password-protected
// uploads, plus plain-text rendering for backends that only accept PDF.

pub mod prepare;
pub mod text;

pub use prepare::{is_encrypted, prepare};
pub use text::TextRenderer;

// SPDX-License-Identifier: MIT
//
// Document preparation — detects password protection on PDF uploads and
// produces an unlocked working copy for the dispatcher.
//
// An unlock failure is always surfaced; a protected document is never
// silently printed as-is.

use std::path::{Path, PathBuf};

use lopdf::Document;
use printrelay_core::error::{Error, Result};
use printrelay_core::options::extension_of;
use tracing::{debug, info};

/// Fast probe: does this file look like a password-protected PDF?
///
/// Non-PDF files are never considered encrypted. Files that fail to parse
/// are reported as unencrypted here; the full [`prepare`] pass surfaces the
/// parse error with context.
pub fn is_encrypted(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    if !has_pdf_extension(path) {
        return false;
    }
    match Document::load(path) {
        Ok(doc) => doc.trailer.get(b"Encrypt").is_ok(),
        Err(_) => false,
    }
}

/// Prepare a submitted file for printing.
///
/// Returns `Ok(None)` when the original can be printed directly (non-PDF
/// input, or an unprotected PDF). For a protected PDF, unlocks it with
/// `password` and returns `Ok(Some(working_copy))`; the caller owns both
/// the original and the copy for cleanup purposes.
pub fn prepare(path: &Path, password: Option<&str>) -> Result<Option<PathBuf>> {
    if !has_pdf_extension(path) {
        return Ok(None);
    }

    let mut document = Document::load(path).map_err(|err| {
        Error::Pdf(format!("cannot parse {}: {err}", path.display()))
    })?;

    if document.trailer.get(b"Encrypt").is_err() {
        debug!(path = %path.display(), "PDF is not encrypted, passing through");
        return Ok(None);
    }

    let password = password.ok_or(Error::PasswordRequired)?;

    document
        .decrypt(password)
        .map_err(|_| Error::PasswordInvalid)?;
    document.trailer.remove(b"Encrypt");

    let working_copy = unlocked_copy_path(path);
    if let Err(err) = document.save(&working_copy) {
        // Don't leave a half-written copy behind.
        if working_copy.exists() {
            let _ = std::fs::remove_file(&working_copy);
        }
        return Err(Error::Pdf(format!(
            "cannot write unlocked copy {}: {err}",
            working_copy.display()
        )));
    }

    info!(
        original = %path.display(),
        working_copy = %working_copy.display(),
        "protected PDF unlocked"
    );
    Ok(Some(working_copy))
}

/// Path for the unlocked working copy, next to the original.
fn unlocked_copy_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    path.with_file_name(format!("{stem}_unlocked.pdf"))
}

fn has_pdf_extension(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(extension_of)
        .is_some_and(|ext| ext == "pdf")
}

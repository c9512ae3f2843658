// SPDX-License-Identifier: MIT
//
// Option validation — normalizes raw submitted fields into `PrintOptions`
// and vets uploaded filenames before anything touches the spool directory.

use crate::error::{Error, Result};
use crate::types::{ColorMode, PrintOptions};

/// Upload formats accepted for printing: PDF, plain text, and the common
/// raster image formats CUPS filters handle natively.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "txt", "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp",
];

/// Maximum accepted copy count per job.
pub const MAX_COPIES: u32 = 99;

/// Raw submitted option fields, exactly as the outer layer received them.
#[derive(Debug, Clone, Default)]
pub struct RawOptions {
    pub color_mode: Option<String>,
    pub copies: Option<String>,
    pub duplex: Option<String>,
    pub password: Option<String>,
}

impl RawOptions {
    /// Validate and normalize into `PrintOptions`.
    ///
    /// Absent fields take their defaults; present fields must map onto the
    /// closed value sets or the submission is rejected naming the field.
    pub fn validate(&self) -> Result<PrintOptions> {
        let color_mode = match self.color_mode.as_deref().map(str::trim) {
            None | Some("") => ColorMode::BlackAndWhite,
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "bw" | "monochrome" => ColorMode::BlackAndWhite,
                "color" | "colour" => ColorMode::Color,
                other => {
                    return Err(Error::validation(
                        "color_mode",
                        format!("unrecognized value '{other}'"),
                    ));
                }
            },
        };

        let copies = match self.copies.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => {
                let parsed: u32 = raw.parse().map_err(|_| {
                    Error::validation("copies", format!("'{raw}' is not a positive integer"))
                })?;
                if parsed < 1 || parsed > MAX_COPIES {
                    return Err(Error::validation(
                        "copies",
                        format!("must be between 1 and {MAX_COPIES}, got {parsed}"),
                    ));
                }
                parsed
            }
        };

        let duplex = match self.duplex.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(Error::validation(
                        "duplex",
                        format!("unrecognized value '{other}'"),
                    ));
                }
            },
        };

        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(str::to_owned);

        Ok(PrintOptions {
            color_mode,
            copies,
            duplex,
            password,
        })
    }
}

/// Validate an uploaded filename and return a sanitized base name.
///
/// Path components are stripped, the extension must be on the allow-list,
/// and characters outside `[A-Za-z0-9._-]` are replaced so the name is safe
/// to embed in a spool path.
pub fn validate_filename(filename: &str) -> Result<String> {
    let base = filename
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    if base.is_empty() {
        return Err(Error::validation("filename", "no file name supplied"));
    }

    let ext = extension_of(base).ok_or_else(|| {
        Error::validation("filename", format!("'{base}' has no file extension"))
    })?;
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(Error::validation(
            "filename",
            format!(
                "extension '.{ext}' is not supported (accepted: {})",
                ALLOWED_EXTENSIONS.join(", ")
            ),
        ));
    }

    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    Ok(sanitized)
}

/// Lowercased extension of a filename, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

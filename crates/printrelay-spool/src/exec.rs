// SPDX-License-Identifier: MIT
//
// Bounded external command execution.
//
// Every backend invocation goes through here: output is captured, the
// process is killed if the bound elapses (`kill_on_drop`), and diagnostic
// text is truncated before it can reach a job record.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use printrelay_core::error::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Upper bound on diagnostic text copied out of a failed tool invocation.
pub const DIAGNOSTIC_LIMIT: usize = 512;

/// Captured outcome of a completed external command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Bounded diagnostic for error reporting: stderr if present, stdout
    /// otherwise, truncated to [`DIAGNOSTIC_LIMIT`].
    pub fn diagnostic(&self) -> String {
        let text = match self.stderr.trim() {
            "" => self.stdout.trim(),
            stderr => stderr,
        };
        if text.is_empty() {
            return "unknown error".into();
        }
        truncate_diagnostic(text)
    }
}

/// Run `program` with `args`, waiting at most `limit`.
///
/// On timeout the child is killed (the future drop triggers `kill_on_drop`)
/// and `Error::DispatchTimeout` is returned; the process is never left
/// running unattended.
pub async fn run<I, S>(program: &str, args: I, limit: Duration) -> Result<ExecOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|err| Error::Dispatch(format!("cannot start '{program}': {err}")))?;

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            return Err(Error::Dispatch(format!(
                "cannot collect output of '{program}': {err}"
            )));
        }
        Err(_elapsed) => {
            debug!(program, limit_secs = limit.as_secs(), "command timed out, killed");
            return Err(Error::DispatchTimeout(limit.as_secs()));
        }
    };

    let result = ExecOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(program, exit_code = ?result.exit_code, "command finished");
    Ok(result)
}

/// Truncate to [`DIAGNOSTIC_LIMIT`] bytes on a character boundary.
pub fn truncate_diagnostic(text: &str) -> String {
    if text.len() <= DIAGNOSTIC_LIMIT {
        return text.to_string();
    }
    let mut end = DIAGNOSTIC_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Shared subprocess-invocation helper: spawns a command, tees stdout and
//! stderr into one combined, append-ready buffer (§4.3's "capture combined
//! stdout/stderr" requirement), and reports a non-zero exit as an error
//! carrying the tail of that output.

use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::{ExecutorError, Result};

const TAIL_BYTES: usize = 4096;

pub struct CapturedOutput {
    pub combined: String,
    pub success: bool,
}

/// Runs `program` with `args` in `working_dir`, creating the directory
/// (mode 0700 per the workspace layout contract) if it does not exist yet.
pub async fn run(program: &str, args: &[&str], working_dir: &Path, env: &[(&str, &str)]) -> Result<CapturedOutput> {
    ensure_workspace_dir(working_dir)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (k, v) in env {
        command.env(k, v);
    }

    let mut child = command.spawn()?;
    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut stderr = child.stderr.take().expect("piped stderr");

    let mut stdout_buf = String::new();
    let mut stderr_buf = String::new();
    let (stdout_result, stderr_result, status) = tokio::join!(
        stdout.read_to_string(&mut stdout_buf),
        stderr.read_to_string(&mut stderr_buf),
        child.wait()
    );
    stdout_result?;
    stderr_result?;
    let status = status?;

    let mut combined = stdout_buf;
    if !stderr_buf.is_empty() {
        combined.push_str("\n--- stderr ---\n");
        combined.push_str(&stderr_buf);
    }

    let success = status.success();
    if !success {
        let tail_start = combined.len().saturating_sub(TAIL_BYTES);
        return Err(ExecutorError::NonZeroExit {
            status: status.code().unwrap_or(-1),
            tail: combined[tail_start..].to_string(),
        });
    }

    Ok(CapturedOutput { combined, success })
}

#[cfg(unix)]
fn ensure_workspace_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.exists() {
        return Ok(());
    }
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(ExecutorError::Spawn)
}

#[cfg(not(unix))]
fn ensure_workspace_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(ExecutorError::Spawn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_combined_output_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let output = run("sh", &["-c", "echo out; echo err 1>&2"], dir.path(), &[])
            .await
            .unwrap();
        assert!(output.combined.contains("out"));
        assert!(output.combined.contains("err"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = run("sh", &["-c", "echo failing; exit 3"], dir.path(), &[]).await;
        assert!(matches!(result, Err(ExecutorError::NonZeroExit { status: 3, .. })));
    }
}

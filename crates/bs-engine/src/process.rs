//! Child-process runner for the gradient-boosting command-line tools.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use bs_types::{BackendError, BsResult};
use tokio::process::Command;
use tracing::debug;

/// Lines of stderr kept in a `ToolFailed` error.
const STDERR_TAIL_LINES: usize = 20;

/// Captured output of a finished tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Both streams, stdout first. Tools disagree on where they log.
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        text.push_str(&self.stdout);
        text.push('\n');
        text.push_str(&self.stderr);
        text
    }
}

/// An external executable identified by a display name.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub tool: String,
    pub program: PathBuf,
}

impl ToolCommand {
    pub fn new(tool: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
        }
    }

    /// Run the tool to completion in `cwd` and capture its output.
    pub async fn run<I, S>(&self, args: I, cwd: &Path) -> BsResult<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let args: Vec<std::ffi::OsString> =
            args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        debug!(
            "Running {} {}",
            self.program.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => BackendError::ToolNotFound {
                    tool: self.tool.clone(),
                    message: format!("{} is not on PATH", self.program.display()),
                },
                _ => BackendError::ToolFailed {
                    tool: self.tool.clone(),
                    status: "spawn failed".to_string(),
                    stderr: e.to_string(),
                },
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(BackendError::ToolFailed {
                tool: self.tool.clone(),
                status: output.status.to_string(),
                stderr: tail(&stderr, STDERR_TAIL_LINES),
            }
            .into());
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

//! Child process helpers.
//!
//! On Windows, spawning a console interpreter from a GUI host opens a console
//! window per invocation; [`configure_tokio_command`] sets the creation flag
//! that suppresses it. [`run_streaming`] runs a command to completion while
//! handing each stdout line to a callback.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::core::{CoreError, CoreResult};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Apply platform-specific flags to a tokio process command.
pub fn configure_tokio_command(cmd: &mut tokio::process::Command) {
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}

/// How a finished child process ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub success: bool,
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout_lines: usize,
    pub stderr: String,
}

impl ProcessOutcome {
    /// Last non-empty stderr line, for short error messages
    pub fn stderr_tail(&self) -> Option<&str> {
        self.stderr.lines().rev().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Runs `cmd` to completion, passing each stdout line to `on_line`.
///
/// Stderr is drained on a separate task so a chatty child cannot fill the
/// pipe and stall.
pub async fn run_streaming<F>(mut cmd: tokio::process::Command, mut on_line: F) -> CoreResult<ProcessOutcome>
where
    F: FnMut(&str),
{
    configure_tokio_command(&mut cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| CoreError::BridgeError(format!("Failed to spawn process: {e}")))?;

    let stderr_handle = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut stderr = stderr;
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).to_string()
        })
    });

    let mut stdout_lines = 0;
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| CoreError::BridgeError(format!("Failed to read process output: {e}")))?
        {
            stdout_lines += 1;
            on_line(&line);
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| CoreError::BridgeError(format!("Failed to wait for process: {e}")))?;

    let stderr = match stderr_handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };

    Ok(ProcessOutcome {
        success: status.success(),
        exit_code: status.code(),
        stdout_lines,
        stderr,
    })
}

//! Runs ffmpeg as a subprocess and decides whether the render is usable.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::command::OverlayCommand;
use crate::error::TranscodeError;

/// Bytes of stderr kept for failure reports.
pub const DEFAULT_STDERR_LIMIT: usize = 1500;

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to keep reading stderr once the process has exited. A detached
/// descendant can hold the pipe open long after ffmpeg is gone.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A render that exited cleanly and left a non-empty file behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeSuccess {
    pub output: PathBuf,
    pub bytes: u64,
}

/// Composites `input` over `background` into `output`.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn invoke(
        &self,
        background: &Path,
        input: &Path,
        output: &Path,
    ) -> Result<TranscodeSuccess, TranscodeError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegInvoker {
    program: PathBuf,
    timeout: Duration,
    stderr_limit: usize,
}

impl FfmpegInvoker {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            stderr_limit: DEFAULT_STDERR_LIMIT,
        }
    }

    #[cfg(test)]
    pub fn with_stderr_limit(mut self, limit: usize) -> Self {
        self.stderr_limit = limit;
        self
    }

    /// First line of `ffmpeg -version`, to check the executable is runnable.
    pub async fn version(&self) -> Result<String, TranscodeError> {
        let run = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(VERSION_TIMEOUT, run).await {
            Ok(result) => result.map_err(|e| self.spawn_error(&e))?,
            Err(_) => {
                return Err(TranscodeError::TimedOut {
                    secs: VERSION_TIMEOUT.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(TranscodeError::NonZeroExit {
                exit_code: output.status.code(),
                stderr: truncate_diagnostic(
                    &String::from_utf8_lossy(&output.stderr),
                    self.stderr_limit,
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    fn spawn_error(&self, err: &std::io::Error) -> TranscodeError {
        TranscodeError::Spawn {
            program: self.program.display().to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegInvoker {
    async fn invoke(
        &self,
        background: &Path,
        input: &Path,
        output: &Path,
    ) -> Result<TranscodeSuccess, TranscodeError> {
        let args = OverlayCommand::new(background, input, output).build_args();
        debug!(program = %self.program.display(), args = ?args, "Running transcoder");

        // stdout is never read; only the exit status and stderr matter.
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(&e))?;

        let stderr = child.stderr.take();
        let keep = self.stderr_limit * 4;
        let mut stderr_task = tokio::spawn(async move {
            match stderr {
                Some(reader) => read_tail(reader, keep).await,
                None => Vec::new(),
            }
        });

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stderr_task.abort();
                return Err(TranscodeError::Wait(e.to_string()));
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Transcoder timed out, killing process"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill transcoder");
                }
                stderr_task.abort();
                return Err(TranscodeError::TimedOut {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let raw = match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut stderr_task).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                warn!("Transcoder stderr still open after exit, giving up on it");
                stderr_task.abort();
                Vec::new()
            }
        };
        let stderr = truncate_diagnostic(&String::from_utf8_lossy(&raw), self.stderr_limit);

        let output_len = tokio::fs::metadata(output)
            .await
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len());

        debug!(exit_code = ?status.code(), output_len = ?output_len, "Transcoder exited");
        classify_exit(status.code(), output_len, stderr).map(|bytes| TranscodeSuccess {
            output: output.to_path_buf(),
            bytes,
        })
    }
}

/// Success requires exit code 0 AND a non-empty output file.
pub fn classify_exit(
    exit_code: Option<i32>,
    output_len: Option<u64>,
    stderr: String,
) -> Result<u64, TranscodeError> {
    match (exit_code, output_len) {
        (Some(0), Some(len)) if len > 0 => Ok(len),
        (Some(0), Some(_)) => Err(TranscodeError::EmptyOutput { stderr }),
        (Some(0), None) => Err(TranscodeError::MissingOutput { stderr }),
        (exit_code, _) => Err(TranscodeError::NonZeroExit { exit_code, stderr }),
    }
}

/// Keep the last `limit` bytes of `text`, cut on a char boundary.
///
/// ffmpeg prints the actual error last, so the tail is what matters.
pub fn truncate_diagnostic(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.len() <= limit {
        return text.to_string();
    }

    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}

async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, keep: usize) -> Vec<u8> {
    let mut tail = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > keep {
                    let excess = tail.len() - keep;
                    tail.drain(..excess);
                }
            }
        }
    }
    tail
}

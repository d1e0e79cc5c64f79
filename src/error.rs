use std::path::PathBuf;

use thiserror::Error;

use crate::messaging::MessagingError;
use crate::state_machine::JobState;

/// Errors raised while wiring the bot together at startup.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Download client error: {0}")]
    Download(#[from] DownloadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,

    #[error("background image not found: {}", .0.display())]
    BackgroundMissing(PathBuf),

    #[error("DISCORD_TOKEN is not set")]
    MissingToken,
}

/// Scratch workspace failures. Creation failures abort the job; removal
/// failures are only ever logged.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to create workspace under {}: {source}", .root.display())]
    Create {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove workspace {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace cleanup task for {} did not finish: {message}", .path.display())]
    CleanupTask { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download returned HTTP {status}")]
    Status { status: u16 },

    #[error("download timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Timeout
        } else {
            DownloadError::Transport(err.to_string())
        }
    }
}

/// Why a transcode attempt did not yield a usable output file.
///
/// A zero exit code is not enough on its own: `MissingOutput` and
/// `EmptyOutput` cover the cases where ffmpeg claims success anyway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscodeError {
    #[error("failed to launch {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("transcoder exited with status {}", describe_exit(.exit_code))]
    NonZeroExit {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("transcoder exited successfully but wrote no output file")]
    MissingOutput { stderr: String },

    #[error("transcoder wrote an empty output file")]
    EmptyOutput { stderr: String },

    #[error("transcoder timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("failed waiting for transcoder: {0}")]
    Wait(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl TranscodeError {
    /// Captured (already truncated) stderr, when there is any worth showing.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            TranscodeError::NonZeroExit { stderr, .. }
            | TranscodeError::MissingOutput { stderr }
            | TranscodeError::EmptyOutput { stderr } => {
                Some(stderr.as_str()).filter(|s| !s.trim().is_empty())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("job {job_id} is already terminal ({state})")]
    AlreadyTerminal { job_id: String, state: JobState },
}

#[derive(Debug, Error)]
#[error("concurrency gate is closed")]
pub struct GateClosed;

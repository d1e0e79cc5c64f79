use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobState;
use crate::error::{DownloadError, ResourceError, TranscodeError};
use crate::messaging::{Attachment, MessageEvent};

const OUTPUT_FILE: &str = "output.mp4";

/// Classified reason a job ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The attachment could not be fetched (non-2xx, transport error, timeout).
    DownloadError,
    /// ffmpeg failed, timed out, or produced no usable output.
    TranscodeError,
    /// The render succeeded but the result could not be posted back.
    DeliveryError,
    /// Anything else, including workspace creation failures.
    InternalError,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::DownloadError => write!(f, "DownloadError"),
            FailureReason::TranscodeError => write!(f, "TranscodeError"),
            FailureReason::DeliveryError => write!(f, "DeliveryError"),
            FailureReason::InternalError => write!(f, "InternalError"),
        }
    }
}

/// Failure recorded on a job once it reaches `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub reason: FailureReason,
    pub message: String,
    /// Truncated stderr from the transcoder, when there is any.
    pub diagnostic: Option<String>,
}

impl JobError {
    fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            diagnostic: None,
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::new(FailureReason::DownloadError, message)
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::new(FailureReason::DeliveryError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureReason::InternalError, message)
    }

    /// Short, human-readable text posted back to the originating channel.
    pub fn user_message(&self) -> String {
        let headline = match self.reason {
            FailureReason::DownloadError => "Could not download the video",
            FailureReason::TranscodeError => "Processing failed",
            FailureReason::DeliveryError => "The video was processed but could not be uploaded",
            FailureReason::InternalError => "Something went wrong",
        };
        match &self.diagnostic {
            Some(diag) => format!("❌ {headline}: {}\n```\n{diag}\n```", self.message),
            None => format!("❌ {headline}: {}", self.message),
        }
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

impl From<DownloadError> for JobError {
    fn from(err: DownloadError) -> Self {
        JobError::download(err.to_string())
    }
}

impl From<TranscodeError> for JobError {
    fn from(err: TranscodeError) -> Self {
        Self {
            reason: FailureReason::TranscodeError,
            message: err.to_string(),
            diagnostic: err.diagnostic().map(str::to_string),
        }
    }
}

impl From<ResourceError> for JobError {
    fn from(err: ResourceError) -> Self {
        JobError::internal(err.to_string())
    }
}

/// The result of executing a job step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Success,
    Failure(JobError),
}

/// Where a job came from: the channel and message to answer, and the
/// attachment to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSource {
    pub channel_id: String,
    pub message_id: String,
    pub attachment: Attachment,
}

impl JobSource {
    pub fn from_event(event: &MessageEvent, attachment: &Attachment) -> Self {
        Self {
            channel_id: event.channel_id.clone(),
            message_id: event.id.clone(),
            attachment: attachment.clone(),
        }
    }
}

/// One attempt to render one attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source: JobSource,
    pub workspace: Option<PathBuf>,
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub state: JobState,
    pub state_history: Vec<JobState>,
    pub error: Option<JobError>,
    pub workspace_released: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(source: JobSource) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            workspace: None,
            input_path: None,
            output_path: None,
            state: JobState::Pending,
            state_history: vec![JobState::Pending],
            error: None,
            workspace_released: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Point the job's input and output paths into its workspace.
    pub fn attach_workspace(&mut self, dir: &Path) {
        let input_name = format!("input.{}", self.source.attachment.safe_extension());
        self.input_path = Some(dir.join(input_name));
        self.output_path = Some(dir.join(OUTPUT_FILE));
        self.workspace = Some(dir.to_path_buf());
        self.updated_at = Utc::now();
    }

    pub(super) fn enter(&mut self, state: JobState) {
        self.state = state;
        self.state_history.push(state);
        self.updated_at = Utc::now();
    }
}

/// Structured record produced once a job is terminal and cleaned up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub filename: String,
    pub channel_id: String,
    pub state: JobState,
    pub state_transitions: Vec<JobState>,
    pub failure: Option<JobError>,
    pub workspace_released: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl JobReport {
    pub fn from_job(job: &Job) -> Self {
        let now = Utc::now();
        Self {
            job_id: job.id.clone(),
            filename: job.source.attachment.filename.clone(),
            channel_id: job.source.channel_id.clone(),
            state: job.state,
            state_transitions: job.state_history.clone(),
            failure: job.error.clone(),
            workspace_released: job.workspace_released,
            started_at: job.created_at,
            finished_at: now,
            duration_ms: (now - job.created_at).num_milliseconds(),
        }
    }
}

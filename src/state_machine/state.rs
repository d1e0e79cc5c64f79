use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::{Job, JobOutcome};
use crate::error::TransitionError;

/// The six states of an overlay job.
///
/// Each job flows through: PENDING → DOWNLOADING → PROCESSING → UPLOADING →
/// COMPLETED, and may drop to FAILED from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Downloading,
    Processing,
    Uploading,
    Completed,
    Failed,
}

impl JobState {
    /// `Completed` and `Failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// States during which the job occupies a concurrency gate slot.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobState::Downloading | JobState::Processing | JobState::Uploading
        )
    }

    /// The state reached when the current step succeeds. Terminal states
    /// map to themselves.
    fn successor(self) -> JobState {
        match self {
            JobState::Pending => JobState::Downloading,
            JobState::Downloading => JobState::Processing,
            JobState::Processing => JobState::Uploading,
            JobState::Uploading => JobState::Completed,
            JobState::Completed | JobState::Failed => self,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Downloading => write!(f, "DOWNLOADING"),
            JobState::Processing => write!(f, "PROCESSING"),
            JobState::Uploading => write!(f, "UPLOADING"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

/// The result of applying a step outcome to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Advance to the next working state.
    Next(JobState),
    /// The job reached a terminal state.
    Complete(JobOutcome),
}

/// Drives a `Job` through the state machine.
pub struct StateMachine;

impl StateMachine {
    /// Apply the outcome of the current step to `job`.
    ///
    /// - Success moves one state forward; from `Uploading` that is
    ///   `Completed`, reported as `Complete(Success)`.
    /// - Failure moves straight to `Failed` and records the error.
    /// - Terminal jobs reject every outcome and are left untouched.
    pub fn next(job: &mut Job, outcome: JobOutcome) -> Result<Transition, TransitionError> {
        if job.state.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                job_id: job.id.clone(),
                state: job.state,
            });
        }

        let transition = match outcome {
            JobOutcome::Success => {
                let next = job.state.successor();
                job.enter(next);
                if next == JobState::Completed {
                    Transition::Complete(JobOutcome::Success)
                } else {
                    Transition::Next(next)
                }
            }
            JobOutcome::Failure(error) => {
                job.enter(JobState::Failed);
                job.error = Some(error.clone());
                Transition::Complete(JobOutcome::Failure(error))
            }
        };

        Ok(transition)
    }
}

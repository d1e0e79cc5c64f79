mod job;
mod state;

pub use job::{FailureReason, Job, JobError, JobOutcome, JobReport, JobSource};
pub use state::{JobState, StateMachine, Transition};

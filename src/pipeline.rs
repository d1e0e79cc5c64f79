use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{Instrument, error, info, info_span, warn};

use crate::download::Downloader;
use crate::gate::GatePermit;
use crate::messaging::Messenger;
use crate::state_machine::{Job, JobError, JobOutcome, JobReport, StateMachine, Transition};
use crate::transcode::Transcoder;
use crate::workspace::WorkspaceManager;

/// Drives one job through download, transcode and delivery.
///
/// Every job ends in exactly one terminal state, after which its workspace
/// is removed and its gate slot freed.
pub struct JobPipeline {
    workspaces: WorkspaceManager,
    downloader: Downloader,
    transcoder: Arc<dyn Transcoder>,
    messenger: Arc<dyn Messenger>,
    background: PathBuf,
}

impl JobPipeline {
    pub fn new(
        workspaces: WorkspaceManager,
        downloader: Downloader,
        transcoder: Arc<dyn Transcoder>,
        messenger: Arc<dyn Messenger>,
        background: PathBuf,
    ) -> Self {
        Self {
            workspaces,
            downloader,
            transcoder,
            messenger,
            background,
        }
    }

    /// Run `job` to a terminal state. `permit` is the gate slot the job was
    /// admitted with; it is released before this returns.
    pub async fn run_job(&self, job: &mut Job, permit: GatePermit) -> JobReport {
        let span = info_span!(
            "job",
            job_id = %job.id,
            filename = %job.source.attachment.filename,
        );
        self.drive(job, permit).instrument(span).await
    }

    async fn drive(&self, job: &mut Job, permit: GatePermit) -> JobReport {
        info!(
            channel_id = %job.source.channel_id,
            url = %job.source.attachment.url,
            scratch = %self.workspaces.root().display(),
            "Job admitted"
        );

        let notice = match self.workspaces.acquire(&job.id).await {
            Ok(workspace) => {
                job.attach_workspace(workspace.path());

                let result = AssertUnwindSafe(self.execute(job))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(JobError::internal(format!(
                            "job panicked: {}",
                            panic_message(panic.as_ref())
                        )))
                    });
                let notice = finish(job, result);

                // Cleanup never overrides the outcome recorded above.
                if let Err(e) = workspace.release().await {
                    warn!(error = %e, "Workspace cleanup failed");
                }
                job.workspace_released = true;
                notice
            }
            Err(e) => finish(job, Err(JobError::from(e))),
        };

        debug_assert!(job.is_terminal());
        permit.release();

        if let Some(notice) = notice {
            self.notify(&job.source.channel_id, &notice).await;
        }

        let report = JobReport::from_job(job);
        info!(
            state = %report.state,
            duration_ms = report.duration_ms,
            report = %serde_json::to_string(&report).unwrap_or_default(),
            "Job finished"
        );
        report
    }

    async fn execute(&self, job: &mut Job) -> Result<(), JobError> {
        let channel_id = job.source.channel_id.clone();
        let attachment = job.source.attachment.clone();
        let (Some(input), Some(output)) = (job.input_path.clone(), job.output_path.clone()) else {
            return Err(JobError::internal("job has no workspace attached"));
        };

        // DOWNLOADING
        advance(job)?;
        self.notify(
            &channel_id,
            &format!("⏬ Downloading `{}`...", attachment.filename),
        )
        .await;
        let bytes = self
            .downloader
            .fetch_to(&attachment.url, &input)
            .await
            .map_err(JobError::from)?;
        info!(bytes, "Download complete");

        // PROCESSING
        advance(job)?;
        self.notify(&channel_id, "🎬 Processing video...").await;
        let rendered = self
            .transcoder
            .invoke(&self.background, &input, &output)
            .await?;
        info!(bytes = rendered.bytes, "Transcode complete");

        // UPLOADING
        advance(job)?;
        self.notify(&channel_id, "⏫ Uploading result...").await;
        self.messenger
            .send_file(&channel_id, &rendered.output)
            .await
            .map_err(|e| JobError::delivery(e.to_string()))?;

        Ok(())
    }

    /// Progress notices are best effort.
    async fn notify(&self, channel_id: &str, text: &str) {
        if let Err(e) = self.messenger.send_text(channel_id, text).await {
            warn!(error = %e, "Failed to send notice");
        }
    }
}

/// Move the job into its terminal state and build the final notice.
fn finish(job: &mut Job, result: Result<(), JobError>) -> Option<String> {
    let outcome = match result {
        Ok(()) => JobOutcome::Success,
        Err(e) => JobOutcome::Failure(e),
    };

    match StateMachine::next(job, outcome) {
        Ok(Transition::Complete(JobOutcome::Success)) => {
            info!("Job completed");
            Some("✅ Done!".to_string())
        }
        Ok(Transition::Complete(JobOutcome::Failure(err))) => {
            error!(
                reason = %err.reason,
                error = %err.message,
                diagnostic = err.diagnostic.as_deref().unwrap_or_default(),
                "Job failed"
            );
            Some(err.user_message())
        }
        Ok(Transition::Next(state)) => {
            // A step reported success without reaching delivery.
            let err = JobError::internal(format!("job stopped early in {state}"));
            if let Err(e) = StateMachine::next(job, JobOutcome::Failure(err.clone())) {
                warn!(error = %e, "Could not mark job as failed");
            }
            error!(error = %err.message, "Job failed");
            Some(err.user_message())
        }
        Err(e) => {
            warn!(error = %e, "Job was already terminal");
            None
        }
    }
}

fn advance(job: &mut Job) -> Result<(), JobError> {
    match StateMachine::next(job, JobOutcome::Success) {
        Ok(Transition::Next(state)) => {
            debug_assert!(state.is_active());
            info!(%state, "State changed");
            Ok(())
        }
        Ok(Transition::Complete(_)) => Err(JobError::internal("job completed before delivery")),
        Err(e) => Err(JobError::internal(e.to_string())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

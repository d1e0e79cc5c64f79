//! Turns incoming message events into jobs and admits them through the gate.
//!
//! [`Dispatcher::on_message`] never blocks: jobs go onto an unbounded queue
//! and a single worker task admits them in arrival order, one gate permit
//! per job.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::classifier::select_attachment;
use crate::gate::ConcurrencyGate;
use crate::messaging::MessageEvent;
use crate::pipeline::JobPipeline;
use crate::state_machine::{Job, JobReport, JobSource, JobState};

/// Totals gathered by the worker until shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub completed: usize,
    pub failed: usize,
    /// Job tasks that died without producing a report.
    pub crashed: usize,
}

impl DispatchSummary {
    fn record(&mut self, result: Result<JobReport, JoinError>) {
        match result {
            Ok(report) if report.state == JobState::Completed => self.completed += 1,
            Ok(_) => self.failed += 1,
            Err(e) => {
                error!(error = %e, "Job task ended abnormally");
                self.crashed += 1;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed + self.crashed
    }
}

pub struct Dispatcher {
    queue: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<DispatchSummary>,
}

impl Dispatcher {
    pub fn start(pipeline: Arc<JobPipeline>, gate: ConcurrencyGate) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(admit_jobs(rx, pipeline, gate));
        Self { queue, worker }
    }

    /// Queue a job for the first eligible attachment of `event`.
    ///
    /// Returns the new job id, or `None` when the message is ignored.
    pub fn on_message(&self, event: &MessageEvent) -> Option<String> {
        if event.author.bot {
            debug!(message_id = %event.id, author_id = %event.author.id, "Ignoring bot message");
            return None;
        }

        let Some(attachment) = select_attachment(&event.attachments) else {
            debug!(
                message_id = %event.id,
                attachments = event.attachments.len(),
                "No eligible attachment"
            );
            return None;
        };

        let job = Job::new(JobSource::from_event(event, attachment));
        let job_id = job.id.clone();
        info!(
            job_id = %job_id,
            channel_id = %event.channel_id,
            filename = %attachment.filename,
            size = attachment.size,
            "Job queued"
        );

        if self.queue.send(job).is_err() {
            warn!(job_id = %job_id, "Dispatcher is no longer accepting jobs");
            return None;
        }
        Some(job_id)
    }

    /// Queue jobs from newline-delimited `MessageEvent` JSON until EOF and
    /// return how many were queued.
    ///
    /// Lines that do not decode are skipped. A read error ends intake the same
    /// way EOF does, so the caller always gets to [`shutdown`](Self::shutdown).
    pub async fn consume<R: AsyncBufRead + Unpin>(&self, mut reader: R) -> usize {
        let mut buf = Vec::new();
        let mut queued = 0;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if self.dispatch_line(&String::from_utf8_lossy(&buf)).is_some() {
                        queued += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read events; stopping intake");
                    break;
                }
            }
        }

        queued
    }

    /// Decode one JSON event line and hand it to [`on_message`](Self::on_message).
    pub fn dispatch_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<MessageEvent>(line) {
            Ok(event) => self.on_message(&event),
            Err(e) => {
                warn!(error = %e, "Skipping malformed event");
                None
            }
        }
    }

    /// Stop intake and wait for every queued and running job to finish.
    pub async fn shutdown(self) -> DispatchSummary {
        drop(self.queue);
        match self.worker.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Dispatcher worker failed");
                DispatchSummary::default()
            }
        }
    }
}

async fn admit_jobs(
    mut rx: mpsc::UnboundedReceiver<Job>,
    pipeline: Arc<JobPipeline>,
    gate: ConcurrencyGate,
) -> DispatchSummary {
    let mut running = JoinSet::new();
    let mut summary = DispatchSummary::default();

    while let Some(mut job) = rx.recv().await {
        while let Some(result) = running.try_join_next() {
            summary.record(result);
        }

        let permit = match gate.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(error = %e, job_id = %job.id, "Gate closed; dropping queued jobs");
                break;
            }
        };
        debug!(job_id = %job.id, in_use = gate.in_use(), "Job admitted");

        let pipeline = Arc::clone(&pipeline);
        running.spawn(async move { pipeline.run_job(&mut job, permit).await });
    }

    while let Some(result) = running.join_next().await {
        summary.record(result);
    }

    info!(
        completed = summary.completed,
        failed = summary.failed,
        crashed = summary.crashed,
        "Dispatcher drained"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::download::Downloader;
    use crate::test_support::{
        FakeTranscoder, RecordingMessenger, Sent, attachment, attachment_at, message,
    };
    use crate::workspace::WorkspaceManager;

    fn pipeline(
        scratch: &TempDir,
        transcoder: Arc<FakeTranscoder>,
        messenger: Arc<RecordingMessenger>,
    ) -> Arc<JobPipeline> {
        Arc::new(JobPipeline::new(
            WorkspaceManager::new(scratch.path().join("work")),
            Downloader::new(Duration::from_secs(5)).unwrap(),
            transcoder,
            messenger,
            scratch.path().join("background.jpg"),
        ))
    }

    async fn serve_any_video() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/attachments/.+"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video".to_vec()))
            .mount(&server)
            .await;
        server
    }

    /// Counts workspace directories until stopped. A job holds its workspace
    /// from before `Downloading` until after it turns terminal.
    fn sample_active_jobs(root: PathBuf, stop: Arc<AtomicBool>) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let mut peak = 0;
            while !stop.load(Ordering::SeqCst) {
                let active = std::fs::read_dir(&root).map(|d| d.count()).unwrap_or(0);
                peak = peak.max(active);
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            peak
        })
    }

    #[tokio::test]
    async fn never_runs_more_jobs_than_capacity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/attachments/.+"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"video".to_vec())
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;

        let scratch = TempDir::new().unwrap();
        let transcoder =
            Arc::new(FakeTranscoder::succeeding().with_delay(Duration::from_millis(50)));
        let messenger =
            Arc::new(RecordingMessenger::default().with_upload_delay(Duration::from_millis(150)));
        let gate = ConcurrencyGate::new(2);
        let dispatcher = Dispatcher::start(
            pipeline(&scratch, transcoder.clone(), messenger.clone()),
            gate.clone(),
        );

        let stop = Arc::new(AtomicBool::new(false));
        let sampler = sample_active_jobs(scratch.path().join("work"), stop.clone());

        for name in ["a.mp4", "b.mp4", "c.mp4"] {
            let event = message("42", vec![attachment_at(&server.uri(), name)]);
            assert!(dispatcher.on_message(&event).is_some());
        }

        let summary = dispatcher.shutdown().await;
        stop.store(true, Ordering::SeqCst);
        let peak_active = sampler.await.unwrap();

        assert_eq!(
            summary,
            DispatchSummary {
                completed: 3,
                failed: 0,
                crashed: 0
            }
        );
        assert_eq!(peak_active, 2);
        assert_eq!(transcoder.calls(), 3);
        assert!(transcoder.peak() <= 2);
        assert_eq!(gate.available(), 2);

        // The third job may only start downloading once an earlier job has
        // finished its upload and left the gate.
        let sent = messenger.sent();
        let first_delivery = sent
            .iter()
            .position(|s| matches!(s, Sent::File { .. }))
            .unwrap();
        let third_download = sent
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Sent::Text { text, .. } if text.contains("Downloading")))
            .nth(2)
            .map(|(i, _)| i)
            .unwrap();
        assert!(
            first_delivery < third_download,
            "third job started before any job finished: {sent:?}"
        );
    }

    #[tokio::test]
    async fn capacity_of_one_serializes_jobs() {
        let server = serve_any_video().await;
        let scratch = TempDir::new().unwrap();
        let transcoder =
            Arc::new(FakeTranscoder::succeeding().with_delay(Duration::from_millis(50)));
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::start(
            pipeline(&scratch, transcoder.clone(), messenger),
            ConcurrencyGate::new(1),
        );

        for name in ["a.mp4", "b.mp4"] {
            dispatcher.on_message(&message("42", vec![attachment_at(&server.uri(), name)]));
        }

        assert_eq!(dispatcher.shutdown().await.completed, 2);
        assert_eq!(transcoder.peak(), 1);
    }

    #[tokio::test]
    async fn only_first_eligible_attachment_is_downloaded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/attachments/clip.mov"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mov".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/attachments/image.png"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let scratch = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder::succeeding());
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::start(
            pipeline(&scratch, transcoder.clone(), messenger.clone()),
            ConcurrencyGate::new(2),
        );

        let event = message(
            "42",
            vec![
                attachment_at(&server.uri(), "image.png"),
                attachment_at(&server.uri(), "clip.mov"),
            ],
        );
        assert!(dispatcher.on_message(&event).is_some());

        let summary = dispatcher.shutdown().await;
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.total(), 1);
        assert_eq!(transcoder.calls(), 1);
        assert_eq!(messenger.files().len(), 1);
    }

    #[tokio::test]
    async fn ignores_bots_and_messages_without_video() {
        let scratch = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder::succeeding());
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::start(
            pipeline(&scratch, transcoder.clone(), messenger.clone()),
            ConcurrencyGate::new(2),
        );

        let mut from_bot = message("42", vec![attachment("clip.mp4", Some("video/mp4"))]);
        from_bot.author.bot = true;
        assert!(dispatcher.on_message(&from_bot).is_none());

        let no_video = message("42", vec![attachment("notes.txt", Some("text/plain"))]);
        assert!(dispatcher.on_message(&no_video).is_none());

        assert!(dispatcher.on_message(&message("42", vec![])).is_none());

        assert_eq!(dispatcher.shutdown().await, DispatchSummary::default());
        assert_eq!(transcoder.calls(), 0);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_jobs_are_counted_separately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let scratch = TempDir::new().unwrap();
        let dispatcher = Dispatcher::start(
            pipeline(
                &scratch,
                Arc::new(FakeTranscoder::succeeding()),
                Arc::new(RecordingMessenger::default()),
            ),
            ConcurrencyGate::new(2),
        );
        dispatcher.on_message(&message("42", vec![attachment_at(&server.uri(), "a.mp4")]));

        let summary = dispatcher.shutdown().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 0);
    }

    /// Always fails, like a closed or broken stdin.
    struct BrokenInput;

    impl AsyncRead for BrokenInput {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "input went away")))
        }
    }

    fn event_line(base_url: &str, filename: &str) -> Vec<u8> {
        let event = message("42", vec![attachment_at(base_url, filename)]);
        let mut line = serde_json::to_vec(&event).unwrap();
        line.push(b'\n');
        line
    }

    #[tokio::test]
    async fn undecodable_lines_are_skipped() {
        let server = serve_any_video().await;
        let scratch = TempDir::new().unwrap();
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::start(
            pipeline(&scratch, Arc::new(FakeTranscoder::succeeding()), messenger.clone()),
            ConcurrencyGate::new(2),
        );

        let mut input = b"\xff\xfe\n".to_vec();
        input.extend_from_slice(b"{\"not\": \"an event\"}\n\n");
        input.extend(event_line(&server.uri(), "a.mp4"));
        input.extend(event_line(&server.uri(), "b.mp4"));
        // Last line without a trailing newline still counts.
        input.pop();

        assert_eq!(dispatcher.consume(&input[..]).await, 2);

        let summary = dispatcher.shutdown().await;
        assert_eq!(summary.completed, 2);
        assert_eq!(messenger.files().len(), 2);
    }

    #[tokio::test]
    async fn read_error_stops_intake_and_jobs_still_finish() {
        let server = serve_any_video().await;
        let scratch = TempDir::new().unwrap();
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::start(
            pipeline(&scratch, Arc::new(FakeTranscoder::succeeding()), messenger.clone()),
            ConcurrencyGate::new(2),
        );

        let first = event_line(&server.uri(), "a.mp4");
        let reader = BufReader::new((&first[..]).chain(BrokenInput));

        assert_eq!(dispatcher.consume(reader).await, 1);

        let summary = dispatcher.shutdown().await;
        assert_eq!(summary.completed, 1);
        assert_eq!(
            messenger.texts().last().map(String::as_str),
            Some("✅ Done!")
        );
    }
}

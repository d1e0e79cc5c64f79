//! Shared fixtures and fakes for unit tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TranscodeError;
use crate::messaging::{Attachment, Author, MessageEvent, MessagingError, Messenger};
use crate::state_machine::{Job, JobSource};
use crate::transcode::{TranscodeSuccess, Transcoder};

pub fn attachment(filename: &str, content_type: Option<&str>) -> Attachment {
    Attachment {
        id: "900".into(),
        url: format!("https://cdn.example.com/attachments/{filename}"),
        filename: filename.into(),
        content_type: content_type.map(str::to_string),
        size: 1024,
    }
}

pub fn attachment_at(base_url: &str, filename: &str) -> Attachment {
    Attachment {
        url: format!("{base_url}/attachments/{filename}"),
        ..attachment(filename, None)
    }
}

pub fn message(channel_id: &str, attachments: Vec<Attachment>) -> MessageEvent {
    MessageEvent {
        id: "1100".into(),
        channel_id: channel_id.into(),
        author: Author {
            id: "7".into(),
            bot: false,
        },
        content: String::new(),
        attachments,
    }
}

pub fn sample_job(filename: &str) -> Job {
    Job::new(JobSource {
        channel_id: "42".into(),
        message_id: "1100".into(),
        attachment: attachment(filename, None),
    })
}

/// Write an executable `/bin/sh` script.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { channel_id: String, text: String },
    File { channel_id: String, name: String, bytes: usize },
}

/// Records everything sent; optionally rejects or slows down uploads.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    fail_files: bool,
    fail_texts: bool,
    upload_delay: Duration,
}

impl RecordingMessenger {
    pub fn failing_files() -> Self {
        Self {
            fail_files: true,
            ..Self::default()
        }
    }

    pub fn failing_texts() -> Self {
        Self {
            fail_texts: true,
            ..Self::default()
        }
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn files(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::File { .. }))
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                Sent::File { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), MessagingError> {
        if self.fail_texts {
            return Err(MessagingError::ApiError {
                status: 403,
                message: "Missing Permissions".into(),
            });
        }
        self.sent.lock().unwrap().push(Sent::Text {
            channel_id: channel_id.into(),
            text: text.into(),
        });
        Ok(())
    }

    async fn send_file(&self, channel_id: &str, path: &Path) -> Result<(), MessagingError> {
        if self.fail_files {
            return Err(MessagingError::ApiError {
                status: 413,
                message: "Request entity too large".into(),
            });
        }
        if !self.upload_delay.is_zero() {
            tokio::time::sleep(self.upload_delay).await;
        }
        let bytes = std::fs::read(path).map_err(|source| MessagingError::File {
            path: path.to_path_buf(),
            source,
        })?;
        self.sent.lock().unwrap().push(Sent::File {
            channel_id: channel_id.into(),
            name: path.file_name().unwrap().to_string_lossy().into(),
            bytes: bytes.len(),
        });
        Ok(())
    }
}

/// What the fake transcoder does when invoked.
#[derive(Debug, Clone)]
pub enum FakeRender {
    Write(&'static [u8]),
    Fail(TranscodeError),
    Panic,
}

/// In-memory transcoder that counts calls and tracks peak concurrency.
pub struct FakeTranscoder {
    behaviour: FakeRender,
    delay: Duration,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeTranscoder {
    pub fn new(behaviour: FakeRender) -> Self {
        Self {
            behaviour,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(FakeRender::Write(b"rendered-video"))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn invoke(
        &self,
        _background: &Path,
        input: &Path,
        output: &Path,
    ) -> Result<TranscodeSuccess, TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        assert!(input.exists(), "input must be downloaded before transcoding");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        match &self.behaviour {
            FakeRender::Write(bytes) => {
                tokio::fs::write(output, bytes).await.unwrap();
                Ok(TranscodeSuccess {
                    output: output.to_path_buf(),
                    bytes: bytes.len() as u64,
                })
            }
            FakeRender::Fail(err) => Err(err.clone()),
            FakeRender::Panic => panic!("encoder exploded"),
        }
    }
}

//! Streams attachment bytes to disk.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::DownloadError;

pub struct Downloader {
    client: Client,
}

impl Downloader {
    /// `timeout` bounds the whole transfer, not just the connection.
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// GET `url` and write the body to `dest`, returning the byte count.
    ///
    /// Any non-2xx status is a failure. No size limit is enforced here.
    pub async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
            });
        }

        let write_err = |source| DownloadError::Write {
            path: dest.to_path_buf(),
            source,
        };

        let mut file = File::create(dest).await.map_err(write_err)?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;

        debug!(url, bytes = written, "Download finished");
        Ok(written)
    }
}

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};

use super::error::MessagingError;
use super::types::CreateMessage;

const USER_AGENT: &str = concat!("overlay-bot/", env!("CARGO_PKG_VERSION"));

/// Outbound side of the chat platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), MessagingError>;

    async fn send_file(&self, channel_id: &str, path: &Path) -> Result<(), MessagingError>;
}

/// Minimal Discord REST client: plain messages and single-file uploads.
pub struct DiscordClient {
    token: String,
    client: Client,
    base_url: String,
}

impl DiscordClient {
    /// `base_url` is the API root, e.g. `https://discord.com/api/v10`.
    pub fn with_base_url(token: String, base_url: String) -> Result<Self, MessagingError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            token,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{channel_id}/messages", self.base_url)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }
}

#[async_trait]
impl Messenger for DiscordClient {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), MessagingError> {
        let response = self
            .client
            .post(self.messages_url(channel_id))
            .header(AUTHORIZATION, self.auth_header())
            .json(&CreateMessage { content: text })
            .send()
            .await?;

        check_response(response).await
    }

    async fn send_file(&self, channel_id: &str, path: &Path) -> Result<(), MessagingError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| MessagingError::File {
                path: path.to_path_buf(),
                source,
            })?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("output.mp4")
            .to_string();

        let part = Part::bytes(bytes).file_name(filename).mime_str("video/mp4")?;
        let form = Form::new().part("files[0]", part);

        let response = self
            .client
            .post(self.messages_url(channel_id))
            .header(AUTHORIZATION, self.auth_header())
            .multipart(form)
            .send()
            .await?;

        check_response(response).await
    }
}

async fn check_response(response: Response) -> Result<(), MessagingError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        // Discord sends fractional seconds here.
        let retry_after_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .map(|secs| (secs * 1000.0).round() as u64)
            .unwrap_or(1000);
        return Err(MessagingError::RateLimited { retry_after_ms });
    }

    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(MessagingError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    Ok(())
}

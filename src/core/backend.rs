//! Client for the chat backend that fronts the inference provider.

use std::error::Error;
use std::fmt;
use std::time::Instant;

use tracing::debug;

use crate::api::SubmitRequest;
use crate::core::envelope::ResponseEnvelope;
use crate::core::side_channel::SideChannel;
use crate::utils::api_error::summarize_error_body;
use crate::utils::url::construct_api_url;

pub const CHAT_ENDPOINT: &str = "api/chat";

#[derive(Debug)]
pub enum BackendError {
    Transport(reqwest::Error),
    Status { status: u16, message: String },
    InvalidEnvelope(serde_json::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Transport(err) => write!(f, "Chat request failed: {err}"),
            BackendError::Status { status, message } => {
                write!(f, "API request failed with status {status}: {message}")
            }
            BackendError::InvalidEnvelope(err) => {
                write!(f, "Chat response is not a valid envelope: {err}")
            }
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Transport(err) => Some(err),
            BackendError::InvalidEnvelope(err) => Some(err),
            BackendError::Status { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub envelope: ResponseEnvelope,
    pub side_channel: SideChannel,
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Post the transcript and decode the reply. Side-channel headers are read
    /// before the body.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<BackendReply, BackendError> {
        let started = Instant::now();
        let response = self
            .client
            .post(construct_api_url(&self.base_url, CHAT_ENDPOINT))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(BackendError::Transport)?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = response.status().as_u16(),
            "chat backend responded"
        );

        let side_channel = SideChannel::from_headers(response.headers());
        let status = response.status();
        let body = response.text().await.map_err(BackendError::Transport)?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: summarize_error_body(&body),
            });
        }

        let mut envelope = ResponseEnvelope::parse(&body).map_err(BackendError::InvalidEnvelope)?;
        side_channel.merge_into(&mut envelope);
        debug!(total_ms = started.elapsed().as_millis() as u64, "chat response decoded");

        Ok(BackendReply {
            envelope,
            side_channel,
        })
    }
}

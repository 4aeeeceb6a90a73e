use crate::assistant::protocol::{AssistantQuery, AssistantReply, RawReply};
use crate::chat::Message;
use crate::config::Config;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure of one assistant round trip, classified so the dispatcher can
/// treat the authentication case differently from plain unavailability.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant endpoint requires authentication")]
    AuthRequired,

    #[error("assistant endpoint returned HTTP {0}")]
    Http(StatusCode),

    #[error("request to assistant endpoint failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("assistant reply carried no response text")]
    MalformedReply,
}

impl AssistantError {
    pub fn is_auth_required(&self) -> bool {
        matches!(self, AssistantError::AuthRequired)
    }
}

pub struct AssistantClient {
    http: reqwest::Client,
    endpoint: String,
    user_id: String,
}

impl AssistantClient {
    pub fn new(config: &Config) -> Result<Self> {
        // Redirects stay visible: a 302 here is an auth challenge, not a
        // page we want to follow.
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build assistant HTTP client")?;

        Ok(Self {
            http,
            endpoint: config.assistant_url.clone(),
            user_id: config.user_id.clone(),
        })
    }

    /// One query round trip. `history` is the conversation log so far; only
    /// its trailing window is put on the wire.
    pub async fn ask(
        &self,
        session_id: &str,
        query: &str,
        history: &[Message],
    ) -> Result<AssistantReply, AssistantError> {
        let body = AssistantQuery::new(query, session_id, &self.user_id, history);

        debug!("-> Querying assistant endpoint for {}", session_id);

        let response = self
            .http
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FOUND {
            return Err(AssistantError::AuthRequired);
        }
        if !status.is_success() {
            return Err(AssistantError::Http(status));
        }

        let raw: RawReply = response
            .json()
            .await
            .map_err(|_| AssistantError::MalformedReply)?;

        debug!("<- Assistant reply received for {}", session_id);

        raw.into_reply().ok_or(AssistantError::MalformedReply)
    }
}

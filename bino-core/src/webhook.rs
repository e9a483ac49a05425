//! Conversation webhook client
//!
//! One POST per message, no retries. The outcome is folded into a
//! [`SendOutcome`] so the widget can pick a transcript entry without matching
//! on transport details:
//! - **Reply** — the body carried a non-empty `output` (preferred) or `message`
//! - **EmptyResponse** — 2xx with valid JSON but no usable text
//! - **TransportError** — connection failure, timeout, non-2xx, unparseable body

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::WebhookConfig;

/// Value of the `action` field on every outbound request.
pub const SEND_MESSAGE_ACTION: &str = "sendMessage";

// ============================================================================
// Outcome and error types
// ============================================================================

/// Result of one exchange with the conversation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Reply(String),
    EmptyResponse,
    TransportError(String),
}

impl SendOutcome {
    pub fn is_reply(&self) -> bool {
        matches!(self, SendOutcome::Reply(_))
    }
}

impl From<Result<Option<String>, WebhookError>> for SendOutcome {
    fn from(result: Result<Option<String>, WebhookError>) -> Self {
        match result {
            Ok(Some(text)) => SendOutcome::Reply(text),
            Ok(None) => SendOutcome::EmptyResponse,
            Err(e) => SendOutcome::TransportError(e.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("Missing webhook URL")]
    MissingUrl,
}

// ============================================================================
// ConversationEndpoint trait
// ============================================================================

/// Abstraction over the remote conversation backend.
#[async_trait]
pub trait ConversationEndpoint: Send + Sync {
    /// Send one user message. Never retries.
    async fn send(&self, session_id: &str, chat_input: &str) -> SendOutcome;

    /// Endpoint name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Wire structs
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    action: &'a str,
    session_id: &'a str,
    chat_input: &'a str,
}

/// Only string fields count; anything else in the body is ignored.
#[derive(Debug, Default, Deserialize)]
struct ChatReply {
    #[serde(default, deserialize_with = "lenient_string")]
    output: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    message: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

/// Pick the reply text out of a successful response body.
///
/// `output` wins over `message`; empty strings do not count. Non-object JSON
/// (arrays, numbers, `null`) has no usable text.
pub fn extract_reply(body: &str) -> Result<Option<String>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    if !value.is_object() {
        return Ok(None);
    }

    let reply: ChatReply = serde_json::from_value(value)?;
    Ok(reply
        .output
        .filter(|s| !s.is_empty())
        .or_else(|| reply.message.filter(|s| !s.is_empty())))
}

// ============================================================================
// WebhookClient
// ============================================================================

/// reqwest-backed client for the configured webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
    url: String,
}

impl WebhookClient {
    pub fn new(config: &WebhookConfig) -> Result<Self, WebhookError> {
        if config.url.trim().is_empty() {
            return Err(WebhookError::MissingUrl);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// Create a client with an explicit timeout (for testing)
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, WebhookError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Perform the exchange, surfacing transport errors as `Err`.
    pub async fn post_message(
        &self,
        session_id: &str,
        chat_input: &str,
    ) -> Result<Option<String>, WebhookError> {
        let request = ChatRequest {
            action: SEND_MESSAGE_ACTION,
            session_id,
            chat_input,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(extract_reply(&body)?)
    }
}

#[async_trait]
impl ConversationEndpoint for WebhookClient {
    async fn send(&self, session_id: &str, chat_input: &str) -> SendOutcome {
        self.post_message(session_id, chat_input).await.into()
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

// ============================================================================
// TESTS
// ============================================================================

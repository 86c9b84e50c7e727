//! Core delivery types shared by every adapter.

use async_trait::async_trait;
use pulsecrm_types::conversation::Channel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{platform} API error {status}: {body}")]
    Api {
        platform: &'static str,
        status: u16,
        body: String,
    },
    #[error("recipient not allowed: {0}")]
    NotAllowed(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("no delivery adapter for channel {0}")]
    NoAdapter(Channel),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// A text message addressed to one recipient on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    /// Platform address: phone number, PSID/IGSID or email address.
    pub recipient: String,
    /// Used by email only.
    pub subject: Option<String>,
    pub text: String,
}

impl OutboundMessage {
    pub fn new(channel: Channel, recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel,
            recipient: recipient.into(),
            subject: None,
            text: text.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// Trait implemented by every outbound delivery adapter.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    /// Human-readable adapter name.
    fn name(&self) -> &str;

    /// The channel this adapter delivers to.
    fn channel(&self) -> Channel;

    /// Deliver one message, splitting it if the platform requires.
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError>;
}

/// Split `text` into chunks of at most `max_len` bytes.
///
/// Splits prefer the last newline inside the window and never cut through
/// a UTF-8 character.
pub fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if max_len == 0 || text.len() <= max_len {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max_len {
        let mut cut = max_len;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        } else if let Some(nl) = rest[..cut].rfind('\n') {
            if nl > 0 {
                cut = nl;
            }
        }
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail.trim_start_matches('\n');
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Turn a non-success response into [`ChannelError::Api`].
pub(crate) async fn check_response(
    platform: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ChannelError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ChannelError::Api {
        platform,
        status: status.as_u16(),
        body,
    })
}

//! Outbound delivery to the configured destination chats.
//!
//! # Delivery contract
//!
//! Both operations are *deliver-and-ignore*: each destination is attempted once, in configured
//! order, and a failure for one destination (network error, timeout, non-2xx) neither stops the
//! fan-out nor reaches the caller. Outcomes are only visible through logs and the
//! `relay_deliveries_total` counter. Implementations must not add retries and must not surface
//! per-destination errors, since the HTTP contract of `/upload` reports success regardless.

use std::path::Path;

use async_trait::async_trait;

pub mod telegram;

pub use telegram::TelegramNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `message` to every destination.
    async fn send_text(&self, message: &str);

    /// Send the file at `path` to every destination, presented under `filename`.
    ///
    /// The file is read again for each destination.
    async fn send_file(&self, path: &Path, filename: &str);
}

/// What a single destination attempt turned into. Never leaves the notifier.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(reqwest::Error),

    #[error("provider rejected delivery with status {status}: {}", .description.as_deref().unwrap_or("no description"))]
    Rejected {
        status: reqwest::StatusCode,
        description: Option<String>,
    },

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

// The request URL carries the bot credential, so it is stripped before the error is logged.
impl From<reqwest::Error> for DeliveryError {
    fn from(error: reqwest::Error) -> Self {
        DeliveryError::Transport(error.without_url())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum DeliveryKind {
    Text,
    File,
}

impl DeliveryKind {
    fn label(self) -> &'static str {
        match self {
            DeliveryKind::Text => "text",
            DeliveryKind::File => "file",
        }
    }
}

/// Log and count the outcome of one destination attempt, then drop it.
pub(crate) fn record_outcome(kind: DeliveryKind, chat_id: &str, outcome: Result<(), DeliveryError>) {
    match outcome {
        Ok(()) => {
            tracing::debug!(chat_id = %chat_id, kind = kind.label(), "Delivered notification");
            metrics::counter!("relay_deliveries_total", "kind" => kind.label(), "outcome" => "delivered").increment(1);
        }
        Err(e) => {
            tracing::warn!(chat_id = %chat_id, kind = kind.label(), error = %e, "Notification delivery failed");
            metrics::counter!("relay_deliveries_total", "kind" => kind.label(), "outcome" => "failed").increment(1);
        }
    }
}

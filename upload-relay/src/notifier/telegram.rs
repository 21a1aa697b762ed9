//! Telegram Bot API notifier.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{DeliveryError, DeliveryKind, Notifier, record_outcome};
use crate::config::{ChatIds, TelegramConfig};

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// The relevant part of the Bot API error envelope.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    description: Option<String>,
}

/// Posts messages and documents through `sendMessage` and `sendDocument`.
pub struct TelegramNotifier {
    client: Client,
    /// `{base}/bot{token}`; never logged
    api_root: String,
    chat_ids: ChatIds,
    parse_mode: String,
    text_timeout: Duration,
    file_timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> anyhow::Result<Self> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| anyhow::anyhow!("telegram.bot_token is not configured"))?;

        let client = Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e.without_url()))?;

        Ok(Self {
            client,
            api_root: format!("{}/bot{}", config.api_base_url.as_str().trim_end_matches('/'), token),
            chat_ids: config.chat_ids.clone(),
            parse_mode: config.parse_mode.clone(),
            text_timeout: config.text_timeout,
            file_timeout: config.file_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_root, method)
    }

    async fn deliver_text(&self, chat_id: &str, message: &str) -> Result<(), DeliveryError> {
        let request = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(self.text_timeout)
            .json(&SendMessageRequest {
                chat_id,
                text: message,
                parse_mode: &self.parse_mode,
            });

        send(request).await
    }

    async fn deliver_file(&self, chat_id: &str, path: &Path, filename: &str) -> Result<(), DeliveryError> {
        // A multipart body can't be replayed, so every destination gets a fresh read.
        let contents = tokio::fs::read(path).await?;
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        let document = Part::bytes(contents).file_name(filename.to_string()).mime_str(mime.as_ref())?;
        let form = Form::new().text("chat_id", chat_id.to_string()).part("document", document);

        let request = self
            .client
            .post(self.method_url("sendDocument"))
            .timeout(self.file_timeout)
            .multipart(form);

        send(request).await
    }
}

async fn send(request: RequestBuilder) -> Result<(), DeliveryError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let description = response.json::<ApiErrorBody>().await.ok().and_then(|body| body.description);
    Err(DeliveryError::Rejected { status, description })
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip_all)]
    async fn send_text(&self, message: &str) {
        for chat_id in self.chat_ids.iter() {
            let outcome = self.deliver_text(chat_id, message).await;
            record_outcome(DeliveryKind::Text, chat_id, outcome);
        }
    }

    #[instrument(skip_all, fields(filename = %filename))]
    async fn send_file(&self, path: &Path, filename: &str) {
        for chat_id in self.chat_ids.iter() {
            let outcome = self.deliver_file(chat_id, path, filename).await;
            record_outcome(DeliveryKind::File, chat_id, outcome);
        }
    }
}

//! Application configuration management.
//!
//! Configuration is loaded from an optional YAML file with environment variable overrides. The
//! configuration file path defaults to `config.yaml` but can be specified via `-f` flag or
//! `RELAY_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`, may be absent)
//! 2. **Environment variables** - Variables prefixed with `RELAY_` override YAML values
//! 3. **Flat variables** - `TG_BOT_TOKEN`, `TG_CHAT_ID`, `SECRET_TOKEN` and `PORT`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `RELAY_UPLOAD__MAX_FILE_SIZE=1048576` sets the `upload.max_file_size` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Bot credential and destinations
//! TG_BOT_TOKEN="123456:ABC-DEF"
//! TG_CHAT_ID="123456789,-100987654321"
//!
//! # Shared secret expected in the `token` form field
//! SECRET_TOKEN="change-me"
//!
//! # Override nested values
//! RELAY_TELEGRAM__FILE_TIMEOUT=2m
//! RELAY_ENABLE_METRICS=true
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "RELAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Loaded once at startup and never mutated afterwards. All fields have defaults, but
/// [`Config::validate`] requires the secret token and bot credential to be present.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Shared secret every `/upload` submission must carry in its `token` field
    #[serde(skip_serializing)]
    pub secret_token: Option<String>,
    /// Messaging provider settings
    pub telegram: TelegramConfig,
    /// Upload validation and staging settings
    pub upload: UploadConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

// Hand-written so the secrets never end up in debug logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret_token", &self.secret_token.as_ref().map(|_| "<redacted>"))
            .field("telegram", &self.telegram)
            .field("upload", &self.upload)
            .field("enable_metrics", &self.enable_metrics)
            .field("enable_otel_export", &self.enable_otel_export)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            secret_token: None,
            telegram: TelegramConfig::default(),
            upload: UploadConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

/// Telegram Bot API settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot credential, interpolated into every API path as `bot<token>`
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,
    /// Destination chats, in delivery order
    pub chat_ids: ChatIds,
    /// API root, overridable for testing or self-hosted Bot API servers
    pub api_base_url: Url,
    /// `parse_mode` sent with text messages
    pub parse_mode: String,
    /// Timeout applied to each `sendMessage` call
    #[serde(with = "humantime_serde")]
    pub text_timeout: Duration,
    /// Timeout applied to each `sendDocument` call
    #[serde(with = "humantime_serde")]
    pub file_timeout: Duration,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("chat_ids", &self.chat_ids)
            .field("api_base_url", &self.api_base_url.as_str())
            .field("parse_mode", &self.parse_mode)
            .field("text_timeout", &self.text_timeout)
            .field("file_timeout", &self.file_timeout)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_ids: ChatIds::default(),
            api_base_url: Url::parse("https://api.telegram.org").expect("static URL is valid"),
            parse_mode: "Markdown".to_string(),
            text_timeout: Duration::from_secs(20),
            file_timeout: Duration::from_secs(60),
        }
    }
}

/// Ordered list of destination chat identifiers.
///
/// Deserializes from a comma-separated string (`"123,-100987"`), a bare integer, or a list of
/// strings and integers. Entries are trimmed and empty ones dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChatIds(Vec<String>);

impl ChatIds {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            ids.into_iter()
                .flat_map(|id| id.as_ref().split(',').map(str::trim).map(str::to_string).collect::<Vec<_>>())
                .filter(|id| !id.is_empty())
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatIdValue {
    Text(String),
    Number(i64),
}

impl ChatIdValue {
    fn into_string(self) -> String {
        match self {
            ChatIdValue::Text(s) => s,
            ChatIdValue::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChatIds {
    List(Vec<ChatIdValue>),
    One(ChatIdValue),
}

impl<'de> Deserialize<'de> for ChatIds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Vec<String> = match RawChatIds::deserialize(deserializer)? {
            RawChatIds::List(values) => values.into_iter().map(ChatIdValue::into_string).collect(),
            RawChatIds::One(value) => vec![value.into_string()],
        };
        Ok(ChatIds::new(raw))
    }
}

/// Upload validation and staging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Largest accepted file payload in bytes
    pub max_file_size: u64,
    /// Accepted filename extensions (compared lower-case)
    pub allowed_extensions: Vec<String>,
    /// Hard cap on the request body, enforced before the form is parsed
    pub max_request_size: usize,
    /// Directory for staged uploads (defaults to the OS temp dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 12 * 1024 * 1024,
            allowed_extensions: ["jpg", "jpeg", "png", "webm", "mp3", "m4a", "wav", "ogg"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_request_size: 32 * 1024 * 1024,
            temp_dir: None,
        }
    }
}

impl UploadConfig {
    /// Whether an already lower-cased extension is on the allow-list.
    pub fn is_allowed(&self, extension: &str) -> bool {
        self.allowed_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }

    /// Directory where staged uploads are written.
    pub fn staging_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_token.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "Config validation: secret_token is not configured. \
                     Please set SECRET_TOKEN (or RELAY_SECRET_TOKEN) or add secret_token to the config file."
                    .to_string(),
            });
        }

        if self.telegram.bot_token.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "Config validation: telegram.bot_token is not configured. \
                     Please set TG_BOT_TOKEN (or RELAY_TELEGRAM__BOT_TOKEN)."
                    .to_string(),
            });
        }

        if (self.upload.max_request_size as u64) < self.upload.max_file_size {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: upload.max_request_size ({}) cannot be smaller than upload.max_file_size ({})",
                    self.upload.max_request_size, self.upload.max_file_size
                ),
            });
        }

        if self.telegram.chat_ids.is_empty() {
            tracing::warn!("No destination chats configured; uploads will be accepted but not forwarded");
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("RELAY_").ignore(&["config"]).split("__"))
            // Flat variables used by existing deployments
            .merge(Env::raw().only(&["TG_BOT_TOKEN"]).map(|_| "telegram.bot_token".into()))
            .merge(Env::raw().only(&["TG_CHAT_ID"]).map(|_| "telegram.chat_ids".into()))
            .merge(Env::raw().only(&["SECRET_TOKEN", "PORT"]))
    }

    /// The configured shared secret; empty if unset (which [`Config::validate`] rejects).
    pub fn secret_token(&self) -> &str {
        self.secret_token.as_deref().unwrap_or_default()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

//! Test utilities shared by unit and integration tests.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use axum::extract::connect_info::MockConnectInfo;
use axum_test::TestServer;

use crate::config::{ChatIds, Config, TelegramConfig};
use crate::notifier::Notifier;
use crate::templates::Templates;
use crate::{AppState, build_router};

/// Peer address every request to a test server appears to come from.
pub const TEST_CLIENT_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)), 4567);

/// reqwest is built without a bundled crypto provider, so tests install one like `main` does.
pub fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_token: Some("test-secret".to_string()),
        telegram: TelegramConfig {
            bot_token: Some("test-bot-token".to_string()),
            chat_ids: ChatIds::new(["111", "-222"]),
            api_base_url: "http://127.0.0.1:9".parse().unwrap(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn create_test_state(config: Config, notifier: Arc<dyn Notifier>) -> AppState {
    AppState::builder()
        .config(Arc::new(config))
        .notifier(notifier)
        .templates(Arc::new(Templates::new().expect("Failed to load templates")))
        .build()
}

pub fn create_test_server(config: Config, notifier: Arc<dyn Notifier>) -> TestServer {
    let router = build_router(create_test_state(config, notifier)).expect("Failed to build router");
    TestServer::new(router.layer(MockConnectInfo(TEST_CLIENT_ADDR))).expect("Failed to create test server")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    Text(String),
    File {
        filename: String,
        path: PathBuf,
        /// File contents at call time; `None` if the file was missing
        contents: Option<Vec<u8>>,
    },
}

/// Notifier that records calls instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<NotifierCall>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NotifierCall::Text(message) => Some(message),
                NotifierCall::File { .. } => None,
            })
            .collect()
    }

    pub fn files(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NotifierCall::File { filename, .. } => Some(filename),
                NotifierCall::Text(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(&self, message: &str) {
        self.calls.lock().unwrap().push(NotifierCall::Text(message.to_string()));
    }

    async fn send_file(&self, path: &Path, filename: &str) {
        let contents = std::fs::read(path).ok();
        self.calls.lock().unwrap().push(NotifierCall::File {
            filename: filename.to_string(),
            path: path.to_path_buf(),
            contents,
        });
    }
}

//! # upload-relay: authenticated form relay to Telegram chats
//!
//! `upload-relay` accepts HTTP form submissions, checks them against a static shared secret and
//! forwards their payload to a fixed list of Telegram chats through the Bot API.
//!
//! ## Routes
//!
//! - `GET /` serves the upload form, with the shared secret embedded as a hidden field.
//! - `POST /upload` takes either a short text (`type=info`) or a file and relays it. Files must
//!   carry an allowed extension and fit under the size ceiling; they are staged on disk for the
//!   duration of the request and always removed before the response is sent.
//! - `GET /healthz` answers `OK`.
//! - `GET /internal/metrics` exposes Prometheus metrics when `enable_metrics` is set.
//!
//! ## Delivery
//!
//! Delivery goes through the [`notifier::Notifier`] trait and is best-effort: every destination
//! is attempted once, in order, and failures are logged rather than reported. Once a submission
//! passes validation the client always receives `{"ok": true}`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use upload_relay::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = upload_relay::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     upload_relay::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     Application::new(config)?
//!         .serve(async {
//!             tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!         })
//!         .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod errors;
mod messages;
pub mod notifier;
mod staging;
pub mod telemetry;
pub mod templates;

#[cfg(test)]
mod test;
#[cfg(test)]
pub mod test_utils;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use axum_prometheus::metrics_exporter_prometheus::PrometheusHandle;
use bon::Builder;
pub use config::Config;
use notifier::{Notifier, TelegramNotifier};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use templates::Templates;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};

/// Application state shared across all request handlers.
///
/// Everything in here is read-only for the lifetime of the process.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(Arc::new(config))
///     .notifier(Arc::new(notifier))
///     .templates(Arc::new(Templates::new()?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Arc<Config>,
    pub notifier: Arc<dyn Notifier>,
    pub templates: Arc<Templates>,
}

/// Build the HTTP router for the given state.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let body_limit = state.config.upload.max_request_size;
    let enable_metrics = state.config.enable_metrics;

    let mut router = Router::new()
        .route("/", get(api::handlers::index::index))
        .route(
            "/upload",
            post(api::handlers::upload::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/healthz", get(|| async { "OK" }))
        .with_state(state);

    if enable_metrics {
        let prometheus_layer = PrometheusMetricLayer::new();
        let metric_handle = metrics_handle();
        router = router
            .route(
                "/internal/metrics",
                get(move || {
                    let handle = metric_handle.clone();
                    async move { handle.render() }
                }),
            )
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Handle to the process-wide Prometheus recorder, installed on first use.
fn metrics_handle() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE.get_or_init(|| PrometheusMetricLayer::pair().1).clone()
}

/// The relay server: configuration, notifier and router, ready to serve.
pub struct Application {
    router: Router,
    config: Arc<Config>,
}

impl Application {
    /// Create an application that delivers through the Telegram Bot API
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let notifier = TelegramNotifier::new(&config.telegram)?;
        Self::with_notifier(config, Arc::new(notifier))
    }

    /// Create an application that delivers through the given notifier
    pub fn with_notifier(config: Config, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        debug!("Starting upload relay with configuration: {:#?}", config);

        let config = Arc::new(config);
        let state = AppState::builder()
            .config(config.clone())
            .notifier(notifier)
            .templates(Arc::new(Templates::new()?))
            .build();

        let router = build_router(state)?;
        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        use axum::extract::connect_info::MockConnectInfo;

        let router = self.router.layer(MockConnectInfo(test_utils::TEST_CLIENT_ADDR));
        axum_test::TestServer::new(router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            destinations = self.config.telegram.chat_ids.len(),
            "Upload relay listening on http://{}", bind_addr
        );

        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

//! End-to-end tests: HTTP in, Telegram Bot API (mocked with wiremock) out.

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::Application;
use crate::config::Config;
use crate::test_utils::{TEST_CLIENT_ADDR, create_test_config, install_crypto_provider};

async fn start_bot_api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bottest-bot-token/sendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bottest-bot-token/sendDocument"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer, staging: &std::path::Path) -> Config {
    install_crypto_provider();
    let mut config = create_test_config();
    config.telegram.api_base_url = server.uri().parse().unwrap();
    config.upload.temp_dir = Some(staging.to_path_buf());
    config
}

fn paths_of(requests: &[wiremock::Request]) -> Vec<String> {
    requests.iter().map(|r| r.url.path().to_string()).collect()
}

#[test_log::test(tokio::test)]
async fn test_e2e_info_reaches_every_chat() {
    let bot_api = start_bot_api().await;
    let staging = tempfile::tempdir().unwrap();
    let server = Application::new(config_for(&bot_api, staging.path())).unwrap().into_test_server();

    let response = server
        .post("/upload")
        .form(&[("token", "test-secret"), ("type", "info"), ("info", "hello")])
        .await;

    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "ok": true }));

    let requests = bot_api.received_requests().await.unwrap();
    assert_eq!(paths_of(&requests), vec!["/bottest-bot-token/sendMessage"; 2]);
    for (request, chat_id) in requests.iter().zip(["111", "-222"]) {
        let body: Value = request.body_json().unwrap();
        assert_eq!(body["chat_id"], chat_id);
        assert_eq!(body["parse_mode"], "Markdown");
        let text = body["text"].as_str().unwrap();
        assert!(text.contains("hello"));
        assert!(text.contains(&TEST_CLIENT_ADDR.ip().to_string()));
    }
}

#[test_log::test(tokio::test)]
async fn test_e2e_file_announced_then_sent_to_every_chat() {
    let bot_api = start_bot_api().await;
    let staging = tempfile::tempdir().unwrap();
    let server = Application::new(config_for(&bot_api, staging.path())).unwrap().into_test_server();

    let form = MultipartForm::new()
        .add_text("token", "test-secret")
        .add_part("file", Part::bytes(vec![0x42; 2048]).file_name("photo.JPG"));
    let response = server.post("/upload").multipart(form).await;

    response.assert_status(StatusCode::OK);

    let requests = bot_api.received_requests().await.unwrap();
    assert_eq!(
        paths_of(&requests),
        vec![
            "/bottest-bot-token/sendMessage",
            "/bottest-bot-token/sendMessage",
            "/bottest-bot-token/sendDocument",
            "/bottest-bot-token/sendDocument",
        ]
    );

    let announcement: Value = requests[0].body_json().unwrap();
    let text = announcement["text"].as_str().unwrap();
    assert!(text.contains("photo.JPG"));
    assert!(text.contains("2048"));

    for request in &requests[2..] {
        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains("filename=\"photo.JPG\""));
        assert!(body.contains(&"B".repeat(2048)));
    }

    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_e2e_provider_failures_are_not_surfaced() {
    let bot_api = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&bot_api)
        .await;
    let staging = tempfile::tempdir().unwrap();
    let server = Application::new(config_for(&bot_api, staging.path())).unwrap().into_test_server();

    let form = MultipartForm::new()
        .add_text("token", "test-secret")
        .add_part("file", Part::bytes(b"ID3".to_vec()).file_name("song.mp3"));
    let response = server.post("/upload").multipart(form).await;

    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "ok": true }));
    assert_eq!(bot_api.received_requests().await.unwrap().len(), 4);
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_e2e_rejections_never_reach_provider() {
    let bot_api = start_bot_api().await;
    let staging = tempfile::tempdir().unwrap();
    let server = Application::new(config_for(&bot_api, staging.path())).unwrap().into_test_server();

    let bad_token = server
        .post("/upload")
        .form(&[("token", "wrong"), ("type", "info"), ("info", "x")])
        .await;
    bad_token.assert_status(StatusCode::UNAUTHORIZED);

    let bad_ext = MultipartForm::new()
        .add_text("token", "test-secret")
        .add_part("file", Part::bytes(b"PK".to_vec()).file_name("archive.zip"));
    let response = server.post("/upload").multipart(bad_ext).await;
    response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(response.json::<Value>(), json!({ "ok": false, "err": "bad ext" }));

    assert!(bot_api.received_requests().await.unwrap().is_empty());
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_e2e_delivery_outcomes_exported_as_metrics() {
    let bot_api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(wiremock::matchers::body_partial_json(json!({ "chat_id": "111" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .mount(&bot_api)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "ok": false, "description": "bot was blocked" })))
        .mount(&bot_api)
        .await;
    let staging = tempfile::tempdir().unwrap();
    let mut config = config_for(&bot_api, staging.path());
    config.enable_metrics = true;
    let server = Application::new(config).unwrap().into_test_server();

    server
        .post("/upload")
        .form(&[("token", "test-secret"), ("type", "info"), ("info", "hello")])
        .await
        .assert_status_ok();

    let response = server.get("/internal/metrics").await;
    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("relay_deliveries_total"));
    assert!(body.contains(r#"outcome="delivered""#));
    assert!(body.contains(r#"outcome="failed""#));
    assert!(body.contains("relay_uploads_total"));
}

#[tokio::test]
async fn test_healthz() {
    install_crypto_provider();
    let server = Application::new(create_test_config()).unwrap().into_test_server();

    let response = server.get("/healthz").await;

    response.assert_status(StatusCode::OK);
    response.assert_text("OK");
}

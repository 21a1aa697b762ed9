//! HTTP handler for the upload form.

use axum::{extract::State, response::Html};

use crate::AppState;
use crate::errors::Result;

#[tracing::instrument(skip_all)]
pub async fn index(State(state): State<AppState>) -> Result<Html<String>> {
    let page = state.templates.render_index(&state.config)?;
    Ok(Html(page))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{RecordingNotifier, create_test_config, create_test_server};
    use axum::http::StatusCode;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_index_serves_form_with_token() {
        let notifier = Arc::new(RecordingNotifier::default());
        let server = create_test_server(create_test_config(), notifier.clone());

        let response = server.get("/").await;

        response.assert_status(StatusCode::OK);
        let html = response.text();
        assert!(html.contains(r#"action="/upload""#));
        assert!(html.contains(r#"value="test-secret""#));
        assert!(notifier.calls().is_empty());
    }
}

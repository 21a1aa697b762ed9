//! HTTP handler for `POST /upload`.
//!
//! Validation runs in a fixed order: token, then `type`, then (file path only) presence of the
//! `file` part, its extension and its size. Once validation passes the response is always
//! `{ok:true}`; delivery outcomes are not reported back (see [`crate::notifier`]).

use axum::{Json, extract::State};

use crate::AppState;
use crate::api::models::upload::{ClientAddr, UploadForm, UploadKind, UploadResponse, UploadedFile};
use crate::errors::{Error, Result};
use crate::messages;
use crate::staging::StagedUpload;

#[tracing::instrument(skip_all, fields(client = %client))]
pub async fn upload(State(state): State<AppState>, client: ClientAddr, form: UploadForm) -> Result<Json<UploadResponse>> {
    if form.token.is_none() || form.token != state.config.secret_token {
        return Err(Error::Unauthenticated);
    }

    match form.kind {
        UploadKind::Info => relay_info(&state, &form.info, &client).await,
        UploadKind::File => relay_file(&state, form.file).await?,
    }

    metrics::counter!("relay_uploads_total", "outcome" => "accepted").increment(1);
    Ok(Json(UploadResponse::success()))
}

async fn relay_info(state: &AppState, info: &str, client: &ClientAddr) {
    tracing::info!(info_len = info.len(), "Relaying client info");
    state.notifier.send_text(&messages::client_connected(info, client)).await;
}

async fn relay_file(state: &AppState, file: Option<UploadedFile>) -> Result<()> {
    let upload = &state.config.upload;
    let file = file.ok_or(Error::MissingFile)?;

    let extension = file.extension();
    if !upload.is_allowed(&extension) {
        return Err(Error::UnsupportedExtension { extension });
    }

    if file.size > upload.max_file_size {
        return Err(Error::PayloadTooLarge {
            limit: upload.max_file_size,
        });
    }

    tracing::info!(filename = %file.filename, size = file.size, "Relaying file");

    // Dropping `staged` deletes the file, covering every exit below including panics.
    let staged = StagedUpload::write(upload.staging_dir(), file.data.clone()).await?;
    state.notifier.send_text(&messages::new_file(&file.filename, file.size)).await;
    state.notifier.send_file(staged.path(), &file.filename).await;
    staged.remove();

    Ok(())
}

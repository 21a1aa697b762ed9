//! Request and response shapes for `POST /upload`.

use std::{
    collections::HashMap,
    convert::Infallible,
    fmt,
    net::{IpAddr, SocketAddr},
};

use axum::{
    Form,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Multipart, Request, multipart::MultipartError},
    http::{StatusCode, header::CONTENT_TYPE, request::Parts},
};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::errors::{Error, Result};

/// Body of every `/upload` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl UploadResponse {
    pub fn success() -> Self {
        Self { ok: true, err: None }
    }

    pub fn failed(err: impl Into<String>) -> Self {
        Self {
            ok: false,
            err: Some(err.into()),
        }
    }
}

/// Which path a submission takes, selected by the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// `type=info`: forward the `info` text
    Info,
    /// Anything else: forward the `file` part
    File,
}

impl UploadKind {
    pub fn from_field(value: Option<&str>) -> Self {
        match value {
            Some("info") => UploadKind::Info,
            _ => UploadKind::File,
        }
    }
}

/// The `file` part of a multipart submission.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Filename as supplied by the client
    pub filename: String,
    /// Total payload size, counted even past the size ceiling
    pub size: u64,
    /// Payload bytes; empty once `size` exceeded the ceiling during parsing
    pub data: Bytes,
}

impl UploadedFile {
    /// Lower-cased text after the last `.`, or the whole filename when there is no `.`.
    pub fn extension(&self) -> String {
        file_extension(&self.filename)
    }
}

pub fn file_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map_or(filename, |(_, extension)| extension)
        .to_lowercase()
}

/// A parsed `/upload` submission, from either a multipart or a urlencoded body.
///
/// Bodies with any other (or no) content type parse as an empty form, which the handler
/// then rejects for its missing token.
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub token: Option<String>,
    pub kind: UploadKind,
    pub info: String,
    pub file: Option<UploadedFile>,
}

impl Default for UploadForm {
    fn default() -> Self {
        Self::from_fields(HashMap::new(), None)
    }
}

impl UploadForm {
    fn from_fields(mut fields: HashMap<String, String>, file: Option<UploadedFile>) -> Self {
        Self {
            kind: UploadKind::from_field(fields.get("type").map(String::as_str)),
            token: fields.remove("token"),
            info: fields.remove("info").unwrap_or_default(),
            file,
        }
    }

    async fn from_multipart(mut multipart: Multipart, max_file_size: u64, max_request_size: u64) -> Result<Self> {
        let mut fields = HashMap::new();
        let mut file: Option<UploadedFile> = None;

        loop {
            let mut field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    malformed(e, max_request_size)?;
                    break;
                }
            };
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(filename) if name == "file" => {
                    if file.is_some() {
                        tracing::debug!(filename = %filename, "Ignoring additional file part");
                        continue;
                    }

                    let mut data = BytesMut::new();
                    let mut size = 0u64;
                    let complete = loop {
                        match field.chunk().await {
                            Ok(Some(chunk)) => {
                                size += chunk.len() as u64;
                                if size <= max_file_size {
                                    data.extend_from_slice(&chunk);
                                } else if !data.is_empty() {
                                    data = BytesMut::new();
                                }
                            }
                            Ok(None) => break true,
                            Err(e) => {
                                malformed(e, max_request_size)?;
                                break false;
                            }
                        }
                    };

                    // A part cut short is dropped, never relayed.
                    if !complete {
                        break;
                    }

                    tracing::debug!(filename = %filename, size, "Read file part");
                    file = Some(UploadedFile {
                        filename,
                        size,
                        data: data.freeze(),
                    });
                }
                _ => match field.text().await {
                    Ok(value) => {
                        fields.entry(name).or_insert(value);
                    }
                    Err(e) => {
                        malformed(e, max_request_size)?;
                        break;
                    }
                },
            }
        }

        Ok(Self::from_fields(fields, file))
    }
}

/// The body limit is the only multipart failure that is reported. Anything else ends the form
/// at the point it broke, leaving the token check to reject it.
fn malformed(error: MultipartError, max_request_size: u64) -> Result<()> {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Err(Error::PayloadTooLarge { limit: max_request_size });
    }

    tracing::debug!(error = %error, "Malformed multipart body, keeping the fields read so far");
    Ok(())
}

impl FromRequest<AppState> for UploadForm {
    type Rejection = Error;

    async fn from_request(req: Request, state: &AppState) -> Result<Self> {
        let upload = &state.config.upload;
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            match Multipart::from_request(req, state).await {
                Ok(multipart) => {
                    Self::from_multipart(multipart, upload.max_file_size, upload.max_request_size as u64).await
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Unreadable multipart body, treating as empty form");
                    Ok(Self::default())
                }
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            match Form::<Vec<(String, String)>>::from_request(req, state).await {
                Ok(Form(pairs)) => {
                    let mut fields = HashMap::new();
                    for (name, value) in pairs {
                        fields.entry(name).or_insert(value);
                    }
                    Ok(Self::from_fields(fields, None))
                }
                Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => Err(Error::PayloadTooLarge {
                    limit: upload.max_request_size as u64,
                }),
                Err(e) => {
                    tracing::debug!(error = %e, "Unreadable form body, treating as empty form");
                    Ok(Self::default())
                }
            }
        } else {
            tracing::debug!(content_type = %content_type, "Unsupported upload content type, treating as empty form");
            Ok(Self::default())
        }
    }
}

/// Network address of the submitting client, if the server recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> std::result::Result<Self, Self::Rejection> {
        // Goes through the extractor so `MockConnectInfo` is honoured as well.
        let peer = ConnectInfo::<SocketAddr>::from_request_parts(parts, state).await.ok();
        Ok(ClientAddr(peer.map(|ConnectInfo(addr)| addr.ip())))
    }
}

impl fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ip) => write!(f, "{ip}"),
            None => f.write_str("unknown"),
        }
    }
}

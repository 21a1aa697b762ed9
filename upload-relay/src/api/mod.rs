//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers (`GET /`, `POST /upload`)
//! - **[`models`]**: Form extraction and response bodies

pub mod handlers;
pub mod models;

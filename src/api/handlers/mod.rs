//! Reference credential exchange handlers plus service endpoints.
//!
//! Every error body has the shape `{"message": "..."}` so clients can surface
//! it verbatim.

pub mod auth;
pub mod health;
pub mod root;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

pub(crate) fn message_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(MessageResponse {
            message: message.into(),
        }),
    )
        .into_response()
}

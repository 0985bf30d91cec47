//! Reference credential exchange: register, login, and identity lookup.
//!
//! Flow Overview:
//! 1) `POST /register` stores a hashed password and a profile built from the body.
//! 2) `POST /login` verifies credentials and issues an opaque token.
//! 3) `GET /user/me` resolves the token from `Authorization` (bearer or raw).
//!
//! Tokens and passwords are never logged.

use super::message_response;
use crate::api::directory::{Directory, DirectoryError};
use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

pub const MISSING_CREDENTIALS: &str = "Username and password are required.";
pub const MISSING_TOKEN: &str = "Missing authorization token.";

/// Required part of a registration body. Any other fields are kept on the
/// profile as submitted.
#[derive(ToSchema, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    #[schema(value_type = Object)]
    pub user: Value,
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered"),
        (status = 400, description = "Missing username or password", body = super::MessageResponse),
        (status = 409, description = "Username already exists", body = super::MessageResponse),
    ),
    tag = "auth"
)]
pub async fn register(
    directory: Extension<Arc<Directory>>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Response {
    let Ok(Json(fields)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, MISSING_CREDENTIALS);
    };

    let request: RegisterRequest = match serde_json::from_value(Value::Object(fields.clone())) {
        Ok(request) => request,
        Err(err) => {
            debug!("Rejected registration body: {err}");
            return message_response(StatusCode::BAD_REQUEST, MISSING_CREDENTIALS);
        }
    };

    let Some((username, password)) = required_credentials(request.username, request.password)
    else {
        return message_response(StatusCode::BAD_REQUEST, MISSING_CREDENTIALS);
    };

    match directory.register(&username, &password, fields).await {
        Ok(_) => {
            debug!("Registered user {username}");
            (StatusCode::CREATED, Json(json!({}))).into_response()
        }
        Err(err) => directory_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted", body = TokenResponse),
        (status = 400, description = "Missing username or password", body = super::MessageResponse),
        (status = 401, description = "Invalid username or password", body = super::MessageResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    directory: Extension<Arc<Directory>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, MISSING_CREDENTIALS);
    };

    let Some((username, password)) = required_credentials(request.username, request.password)
    else {
        return message_response(StatusCode::BAD_REQUEST, MISSING_CREDENTIALS);
    };

    match directory.authenticate(&username, &password).await {
        Ok(token) => (StatusCode::OK, Json(TokenResponse { token })).into_response(),
        Err(err) => directory_error(&err),
    }
}

#[utoipa::path(
    get,
    path = "/user/me",
    responses(
        (status = 200, description = "Profile of the token's owner", body = UserResponse),
        (status = 401, description = "Missing or unknown token", body = super::MessageResponse),
    ),
    tag = "auth"
)]
pub async fn me(directory: Extension<Arc<Directory>>, headers: HeaderMap) -> Response {
    let Some(token) = extract_token(&headers) else {
        return message_response(StatusCode::UNAUTHORIZED, MISSING_TOKEN);
    };

    match directory.resolve(token).await {
        Ok(user) => (StatusCode::OK, Json(UserResponse { user })).into_response(),
        Err(err) => directory_error(&err),
    }
}

/// Accepts `Bearer <token>` (any case) or the raw token value.
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        Some(_) => return None,
        None if value.eq_ignore_ascii_case("bearer") => return None,
        None => value,
    };

    (!token.is_empty()).then_some(token)
}

fn required_credentials(
    username: Option<String>,
    password: Option<String>,
) -> Option<(String, String)> {
    let username = username?.trim().to_string();
    let password = password?;
    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some((username, password))
}

fn directory_error(err: &DirectoryError) -> Response {
    match err {
        DirectoryError::Duplicate => message_response(StatusCode::CONFLICT, err.to_string()),
        DirectoryError::InvalidCredentials | DirectoryError::UnknownToken => {
            message_response(StatusCode::UNAUTHORIZED, err.to_string())
        }
        DirectoryError::Internal(source) => {
            error!("Directory failure: {source:#}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
        }
    }
}

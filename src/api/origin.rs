//! Origin guard. Decides per request whether the declared `Origin` may proceed
//! at all, before any handler or identity check runs.
//!
//! Browsers and configuration disagree on trailing slashes and implicit ports,
//! so every origin is normalized to `scheme://host[:port]` before comparison.

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{
        HeaderValue, Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, ORIGIN},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{collections::BTreeSet, sync::Arc};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, warn};
use url::Url;

/// Primary frontend origin used when none is configured.
pub const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:5173";

/// Local development origins that are always allowed.
pub const DEV_FALLBACK_ORIGINS: [&str; 4] = [
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:4173",
    "http://127.0.0.1:4173",
];

pub const CORS_DENIED_MESSAGE: &str = "Not allowed by CORS";

/// Normalize an origin to `scheme://host[:port]`, dropping paths, trailing
/// slashes, and default ports. Values that do not parse as a URL with a host are
/// kept as the trimmed raw string without trailing slashes.
#[must_use]
pub fn normalize_origin(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_string();
    };
    // `Url::origin` is opaque ("null") for non-special schemes like capacitor://
    let Some(host) = url.host_str() else {
        return trimmed.trim_end_matches('/').to_string();
    };
    let port = url
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    format!("{}://{}{}", url.scheme(), host.to_ascii_lowercase(), port)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OriginDecision {
    Allowed,
    Denied,
}

/// Immutable set of normalized origins, built once at startup.
#[derive(Clone, Debug)]
pub struct AllowedOrigins {
    origins: BTreeSet<String>,
}

impl AllowedOrigins {
    /// Build from the configured primary origin plus [`DEV_FALLBACK_ORIGINS`].
    #[must_use]
    pub fn new(primary: &str) -> Self {
        let origins = std::iter::once(primary)
            .chain(DEV_FALLBACK_ORIGINS)
            .map(normalize_origin)
            .filter(|origin| !origin.is_empty())
            .collect();
        Self { origins }
    }

    #[must_use]
    pub fn contains(&self, origin: &str) -> bool {
        self.origins.contains(&normalize_origin(origin))
    }

    /// A missing origin (same-origin or non-browser caller) is allowed.
    #[must_use]
    pub fn check(&self, origin: Option<&str>) -> OriginDecision {
        match origin {
            None => OriginDecision::Allowed,
            Some(origin) if self.contains(origin) => OriginDecision::Allowed,
            Some(_) => OriginDecision::Denied,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.origins.iter().map(String::as_str)
    }

    /// CORS response headers for the same set. Rejection itself is done by
    /// [`guard`]; this layer only answers preflights and decorates responses.
    #[must_use]
    pub fn cors_layer(self: &Arc<Self>) -> CorsLayer {
        let allowed = Arc::clone(self);
        CorsLayer::new()
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .allow_methods([Method::GET, Method::POST])
            .allow_origin(AllowOrigin::predicate(
                move |origin: &HeaderValue, _parts: &Parts| {
                    origin.to_str().is_ok_and(|origin| allowed.contains(origin))
                },
            ))
    }
}

/// Middleware rejecting requests whose `Origin` is not allowed.
pub async fn guard(
    State(allowed): State<Arc<AllowedOrigins>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let decision = match request.headers().get(ORIGIN) {
        None => OriginDecision::Allowed,
        // Non-UTF-8 origins can never match a normalized entry.
        Some(value) => value
            .to_str()
            .map_or(OriginDecision::Denied, |origin| allowed.check(Some(origin))),
    };

    match decision {
        OriginDecision::Allowed => next.run(request).await,
        OriginDecision::Denied => {
            if let Some(origin) = request.headers().get(ORIGIN).and_then(|v| v.to_str().ok()) {
                warn!("Rejected cross-origin request from {}", normalize_origin(origin));
            } else {
                debug!("Rejected request with unreadable origin");
            }
            denied()
        }
    }
}

fn denied() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "message": CORS_DENIED_MESSAGE })),
    )
        .into_response()
}

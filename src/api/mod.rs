//! Backend HTTP surface: the origin guard in front of the reference credential
//! exchange.
//!
//! Layer order, outermost first: request id, trace span, origin guard, CORS
//! headers, handlers. A denied origin never reaches CORS or a handler.

pub mod directory;
pub(crate) mod handlers;
mod openapi;
pub mod origin;

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

use self::{directory::Directory, origin::AllowedOrigins};

pub use openapi::openapi;

const REQUEST_ID: &str = "x-request-id";

#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Build the full application with its middleware stack.
#[must_use]
pub fn app(allowed: Arc<AllowedOrigins>, directory: Arc<Directory>) -> Router {
    let (router, _openapi) = router().split_for_parts();

    router
        .layer(Extension(directory))
        .layer(allowed.cors_layer())
        .layer(middleware::from_fn_with_state(allowed, origin::guard))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

/// Serve on `port` until ctrl-c.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn new(port: u16, frontend_url: &str) -> Result<()> {
    let allowed = Arc::new(AllowedOrigins::new(frontend_url));
    info!(
        "Allowed origins: {}",
        allowed.iter().collect::<Vec<_>>().join(", ")
    );

    let app = app(allowed, Arc::new(Directory::new()));

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::to_bytes,
        http::{Method, StatusCode, header::ORIGIN},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_app() -> Router {
        app(
            Arc::new(AllowedOrigins::new("https://app.example.com")),
            Arc::new(Directory::new()),
        )
    }

    #[allow(clippy::unwrap_used)]
    fn post(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[allow(clippy::unwrap_used)]
    async fn json_body(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn register_login_lookup() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post(
                "/register",
                &json!({"username": "ana", "password": "pw", "email": "ana@example.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(post("/login", &json!({"username": "ana", "password": "pw"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let token = json_body(response).await["token"]
            .as_str()
            .unwrap()
            .to_string();

        for authorization in [format!("Bearer {token}"), token.clone()] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/user/me")
                        .header("authorization", authorization)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let user = json_body(response).await["user"].clone();
            assert_eq!(user["username"], "ana");
            assert_eq!(user["email"], "ana@example.com");
            assert!(user.get("password").is_none());
        }
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn duplicate_register_conflicts() {
        let app = test_app();
        let body = json!({"username": "ana", "password": "pw"});

        app.clone().oneshot(post("/register", &body)).await.unwrap();
        let response = app.oneshot(post("/register", &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            json_body(response).await,
            json!({"message": "Username already exists."})
        );
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn bad_login_is_unauthorized() {
        let response = test_app()
            .oneshot(post("/login", &json!({"username": "nobody", "password": "x"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(response).await,
            json!({"message": "Invalid username or password."})
        );
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn missing_fields_are_bad_requests() {
        let app = test_app();
        for uri in ["/register", "/login"] {
            let response = app
                .clone()
                .oneshot(post(uri, &json!({"username": "ana"})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn unknown_token_is_unauthorized() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/user/me")
                    .header("authorization", "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn denied_origin_never_reaches_login() {
        let mut request = post("/login", &json!({"username": "ana", "password": "pw"}));
        request
            .headers_mut()
            .insert(ORIGIN, HeaderValue::from_static("http://evil.example"));

        let response = test_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().contains_key(REQUEST_ID));
        assert_eq!(
            json_body(response).await,
            json!({"message": origin::CORS_DENIED_MESSAGE})
        );
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn request_id_is_propagated() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(REQUEST_ID, "abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(REQUEST_ID).and_then(|v| v.to_str().ok()),
            Some("abc123")
        );
    }
}

//! Client wrappers for the backend credential exchange: login, register, and
//! identity lookup. Each call maps its outcome into a typed result so the
//! reconciler decides policy in explicit match arms. Request bodies carry
//! passwords and must never be logged.

use crate::{APP_USER_AGENT, session::identity::Profile};
use reqwest::{Client, Response, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned, ser::SerializeMap,
};
use serde_json::{Map, Value};
use std::{fmt, future::Future, str::FromStr, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument};

const LOGIN_PATH: &str = "/login";
const REGISTER_PATH: &str = "/register";
const IDENTITY_PATH: &str = "/user/me";

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The backend answered with a non-success status.
    #[error("request rejected ({status})")]
    Rejected {
        status: u16,
        message: Option<String>,
    },
    #[error("request timed out")]
    Timeout,
    #[error("unable to reach the server: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("client configuration error: {0}")]
    Config(String),
}

impl ExchangeError {
    /// Backend-supplied message for a rejection, if it sent one.
    #[must_use]
    pub fn rejection_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Username/password pair submitted to the login capability.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl Serialize for Credentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("username", &self.username)?;
        map.serialize_entry("password", self.password.expose_secret())?;
        map.end()
    }
}

/// Registration payload: credentials plus arbitrary extra profile fields.
#[derive(Clone, Debug)]
pub struct Registration {
    pub credentials: Credentials,
    pub fields: Map<String, Value>,
}

impl Registration {
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            fields: Map::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

impl Serialize for Registration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 2))?;
        for (key, value) in &self.fields {
            if key != "username" && key != "password" {
                map.serialize_entry(key, value)?;
            }
        }
        map.serialize_entry("username", &self.credentials.username)?;
        map.serialize_entry("password", self.credentials.password.expose_secret())?;
        map.end()
    }
}

/// Successful login body. `token` is optional so the reconciler can tell a
/// success-without-token apart from a transport failure.
#[derive(Debug, Default, Deserialize)]
pub struct LoginGrant {
    #[serde(default, deserialize_with = "usable_token")]
    pub token: Option<String>,
}

/// Anything other than a non-blank string counts as no token.
fn usable_token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(token)) if !token.trim().is_empty() => Some(token),
        _ => None,
    })
}

/// How the stored token is presented in the `Authorization` header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    #[default]
    Bearer,
    /// `Authorization: <token>`
    Raw,
}

impl AuthScheme {
    #[must_use]
    pub fn header_value(self, token: &str) -> String {
        match self {
            Self::Bearer => format!("Bearer {token}"),
            Self::Raw => token.to_string(),
        }
    }
}

impl FromStr for AuthScheme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "bearer" => Ok(Self::Bearer),
            "raw" => Ok(Self::Raw),
            other => Err(format!("unknown auth scheme: {other}")),
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer => f.write_str("bearer"),
            Self::Raw => f.write_str("raw"),
        }
    }
}

/// Backend capabilities consumed by the session reconciler.
pub trait CredentialExchange: Send + Sync {
    /// Submit credentials and receive a token grant.
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<LoginGrant, ExchangeError>> + Send;

    /// Create a user. The success body is ignored.
    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<(), ExchangeError>> + Send;

    /// Resolve a token to the user profile it belongs to.
    fn lookup_identity(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Profile, ExchangeError>> + Send;
}

impl<T: CredentialExchange> CredentialExchange for Arc<T> {
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<LoginGrant, ExchangeError>> + Send {
        (**self).login(credentials)
    }

    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<(), ExchangeError>> + Send {
        (**self).register(registration)
    }

    fn lookup_identity(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Profile, ExchangeError>> + Send {
        (**self).lookup_identity(token)
    }
}

#[derive(Deserialize)]
struct IdentityBody {
    #[serde(default)]
    user: Option<Value>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// [`CredentialExchange`] over HTTP/JSON.
#[derive(Clone, Debug)]
pub struct HttpExchange {
    client: Client,
    base_url: String,
    scheme: AuthScheme,
}

impl HttpExchange {
    /// Build an exchange against `base_url` with a per-request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        scheme: AuthScheme,
        timeout: Duration,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| ExchangeError::Config(format!("failed to build client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            scheme,
        })
    }

    fn url(&self, path: &str) -> String {
        build_url_with_base(&self.base_url, path)
    }
}

impl CredentialExchange for HttpExchange {
    #[instrument(skip_all, fields(username = %credentials.username))]
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, ExchangeError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(credentials)
            .send()
            .await
            .map_err(map_request_error)?;

        handle_json_response(response).await
    }

    #[instrument(skip_all, fields(username = %registration.credentials.username))]
    async fn register(&self, registration: &Registration) -> Result<(), ExchangeError> {
        let response = self
            .client
            .post(self.url(REGISTER_PATH))
            .json(registration)
            .send()
            .await
            .map_err(map_request_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }

    #[instrument(skip_all)]
    async fn lookup_identity(&self, token: &str) -> Result<Profile, ExchangeError> {
        let response = self
            .client
            .get(self.url(IDENTITY_PATH))
            .header(AUTHORIZATION, self.scheme.header_value(token))
            .send()
            .await
            .map_err(map_request_error)?;

        let body: IdentityBody = handle_json_response(response).await?;
        match body.user {
            Some(Value::Null) | None => Err(ExchangeError::Malformed(
                "identity response has no user".to_string(),
            )),
            Some(user) => Ok(Profile::new(user)),
        }
    }
}

/// Builds a URL from an explicit base URL and the provided path.
fn build_url_with_base(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

fn map_request_error(err: reqwest::Error) -> ExchangeError {
    if err.is_timeout() {
        ExchangeError::Timeout
    } else {
        ExchangeError::Transport(err.to_string())
    }
}

async fn handle_json_response<T: DeserializeOwned>(response: Response) -> Result<T, ExchangeError> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| ExchangeError::Malformed(format!("failed to decode response: {err}")))
    } else {
        Err(rejection(response).await)
    }
}

/// Reads `{message}` from a rejection body, verbatim. Anything else, or an
/// empty message, yields no message.
async fn rejection(response: Response) -> ExchangeError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    debug!("Exchange rejected with status {status}");
    ExchangeError::Rejected {
        status,
        message: parse_error_message(&body),
    }
}

fn parse_error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.message.filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn auth_scheme_header_values() {
        assert_eq!(AuthScheme::Bearer.header_value("abc"), "Bearer abc");
        assert_eq!(AuthScheme::Raw.header_value("abc"), "abc");
    }

    #[test]
    fn auth_scheme_parses_case_insensitively() {
        assert_eq!("Bearer".parse::<AuthScheme>(), Ok(AuthScheme::Bearer));
        assert_eq!(" raw ".parse::<AuthScheme>(), Ok(AuthScheme::Raw));
        assert!("basic".parse::<AuthScheme>().is_err());
    }

    #[test]
    fn build_url_with_base_joins_slashes() {
        assert_eq!(
            build_url_with_base("http://localhost:3000/", "/login"),
            "http://localhost:3000/login"
        );
        assert_eq!(build_url_with_base("", "/login"), "/login");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn credentials_serialize_password() {
        let credentials = Credentials::new("bob", "hunter2");
        let value = serde_json::to_value(&credentials).unwrap();
        assert_eq!(value, json!({"username": "bob", "password": "hunter2"}));
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn registration_credentials_override_extra_fields() {
        let registration = Registration::new(Credentials::new("ana", "pw"))
            .with_field("email", json!("ana@example.com"))
            .with_field("username", json!("mallory"));
        let value = serde_json::to_value(&registration).unwrap();
        assert_eq!(
            value,
            json!({"email": "ana@example.com", "username": "ana", "password": "pw"})
        );
    }

    #[test]
    fn parse_error_message_variants() {
        assert_eq!(
            parse_error_message(r#"{"message":"invalid credentials"}"#),
            Some("invalid credentials".to_string())
        );
        assert_eq!(parse_error_message(r#"{"message":""}"#), None);
        assert_eq!(parse_error_message(r#"{"error":"x"}"#), None);
        assert_eq!(parse_error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn parse_error_message_is_verbatim() {
        let long = format!(" {} ", "x".repeat(300));
        let body = json!({ "message": long }).to_string();
        assert_eq!(parse_error_message(&body), Some(long));
    }

    #[test]
    fn login_grant_tolerates_missing_token() {
        let grant: LoginGrant = serde_json::from_str("{}").unwrap_or_default();
        assert_eq!(grant.token, None);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn login_grant_ignores_unusable_tokens() {
        for body in [
            r#"{"token":123}"#,
            r#"{"token":null}"#,
            r#"{"token":"  "}"#,
            r#"{"token":{"a":1}}"#,
        ] {
            let grant: LoginGrant = serde_json::from_str(body).unwrap();
            assert_eq!(grant.token, None, "{body}");
        }
        let grant: LoginGrant = serde_json::from_str(r#"{"token":"abc"}"#).unwrap();
        assert_eq!(grant.token.as_deref(), Some("abc"));
    }
}

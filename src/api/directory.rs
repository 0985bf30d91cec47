//! In-memory user directory and token registry backing the reference
//! credential exchange. Only password hashes and opaque tokens are kept; the
//! raw password never leaves `register`/`authenticate`.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Username already exists.")]
    Duplicate,
    #[error("Invalid username or password.")]
    InvalidCredentials,
    #[error("Invalid token.")]
    UnknownToken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug)]
struct UserRecord {
    password_hash: String,
    profile: Value,
}

#[derive(Debug, Default)]
pub struct Directory {
    users: RwLock<HashMap<String, UserRecord>>,
    /// token -> username
    tokens: RwLock<HashMap<String, String>>,
}

impl Directory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a user. `fields` become the profile, minus the password, plus a
    /// generated `id`.
    ///
    /// # Errors
    /// Returns [`DirectoryError::Duplicate`] if the username is taken.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        mut fields: Map<String, Value>,
    ) -> Result<Value, DirectoryError> {
        let password_hash = hash_password(password)?;

        fields.remove("password");
        fields.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        fields.insert("username".to_string(), Value::String(username.to_string()));
        let profile = Value::Object(fields);

        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return Err(DirectoryError::Duplicate);
        }
        users.insert(
            username.to_string(),
            UserRecord {
                password_hash,
                profile: profile.clone(),
            },
        );

        Ok(profile)
    }

    /// Verify credentials and issue a fresh token.
    ///
    /// # Errors
    /// Returns [`DirectoryError::InvalidCredentials`] for unknown users and wrong
    /// passwords alike.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String, DirectoryError> {
        let verified = {
            let users = self.users.read().await;
            users
                .get(username)
                .is_some_and(|user| verify_password(&user.password_hash, password))
        };
        if !verified {
            return Err(DirectoryError::InvalidCredentials);
        }

        let token = generate_token()?;
        self.tokens
            .write()
            .await
            .insert(token.clone(), username.to_string());
        Ok(token)
    }

    /// Resolve a token to its user's profile.
    ///
    /// # Errors
    /// Returns [`DirectoryError::UnknownToken`] if the token was never issued or
    /// its user is gone.
    pub async fn resolve(&self, token: &str) -> Result<Value, DirectoryError> {
        let username = self
            .tokens
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(DirectoryError::UnknownToken)?;

        self.users
            .read()
            .await
            .get(&username)
            .map(|user| user.profile.clone())
            .ok_or(DirectoryError::UnknownToken)
    }
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .context("failed to generate password salt")?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|err| anyhow!(err.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!(err.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// 32 random bytes, base64url without padding.
fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn register_builds_profile_without_password() {
        let directory = Directory::new();
        let profile = directory
            .register(
                "ana",
                "pw",
                fields(json!({"username": "ana", "password": "pw", "email": "ana@example.com"})),
            )
            .await
            .unwrap();

        assert_eq!(profile["username"], "ana");
        assert_eq!(profile["email"], "ana@example.com");
        assert!(profile.get("password").is_none());
        assert!(profile["id"].as_str().is_some_and(|id| Uuid::parse_str(id).is_ok()));
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn duplicate_username_is_rejected() {
        let directory = Directory::new();
        directory.register("ana", "pw", Map::new()).await.unwrap();

        let result = directory.register("ana", "other", Map::new()).await;
        assert!(matches!(result, Err(DirectoryError::Duplicate)));
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn authenticate_and_resolve() {
        let directory = Directory::new();
        let profile = directory.register("ana", "pw", Map::new()).await.unwrap();

        let token = directory.authenticate("ana", "pw").await.unwrap();
        assert_eq!(token.len(), 43);
        assert_eq!(directory.resolve(&token).await.unwrap(), profile);
        assert!(matches!(
            directory.resolve("never-issued").await,
            Err(DirectoryError::UnknownToken)
        ));
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let directory = Directory::new();
        directory.register("ana", "pw", Map::new()).await.unwrap();

        let wrong = directory.authenticate("ana", "nope").await.unwrap_err();
        let missing = directory.authenticate("bob", "pw").await.unwrap_err();
        assert_eq!(wrong.to_string(), missing.to_string());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn each_login_issues_a_distinct_token() {
        let directory = Directory::new();
        directory.register("ana", "pw", Map::new()).await.unwrap();

        let first = directory.authenticate("ana", "pw").await.unwrap();
        let second = directory.authenticate("ana", "pw").await.unwrap();
        assert_ne!(first, second);
        assert!(directory.resolve(&first).await.is_ok());
        assert!(directory.resolve(&second).await.is_ok());
    }
}

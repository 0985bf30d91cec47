//! # Passage (token sessions behind an origin guard)
//!
//! `passage` keeps a client-side session truthful with respect to a stored
//! bearer token, and guards the backend's credential endpoints by request
//! origin.
//!
//! ## Session Reconciliation
//!
//! The [`session::SessionReconciler`] owns the only authenticated-identity
//! value. It derives that value from the [`session::TokenStore`] on start,
//! updates it on login/logout, and resets it whenever the stored token fails
//! an identity lookup.
//!
//! - **Truthful identity:** `Authenticated` implies the stored token was accepted
//!   by the last identity lookup. A token that fails lookup is cleared.
//! - **Total operations:** `login`, `register`, and `initialize` never surface
//!   transport errors; failures become messages or state transitions.
//! - **Stale results are dropped:** a reload-time lookup that resolves after a
//!   fresher login, or after the session is torn down, is discarded.
//!
//! ## Origin Guard
//!
//! The backend builds a normalized allowed-origins set once at startup and
//! rejects any request whose declared `Origin` is not in it. Requests without an
//! `Origin` header (non-browser callers) are allowed.

pub mod api;
pub mod cli;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}

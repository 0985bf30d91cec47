//! Client-side session: token storage, credential exchange, and the reconciler
//! that keeps the identity value consistent with the stored token. This module
//! handles bearer tokens and passwords and must never log either.
//!
//! Flow Overview: On start the context spawns `initialize`, which replays the
//! stored token through identity lookup. Login exchanges credentials for a token,
//! verifies it with the same lookup, and only then stores it. Logout clears the
//! store and navigates to the landing route.

mod context;
mod exchange;
mod identity;
mod navigator;
mod reconciler;
mod store;

pub use context::SessionContext;
pub use exchange::{
    AuthScheme, CredentialExchange, Credentials, ExchangeError, HttpExchange, LoginGrant,
    Registration,
};
pub use identity::{Identity, Profile};
pub use navigator::{Navigator, Route, TracingNavigator};
pub use reconciler::{
    AuthFailure, GENERIC_LOGIN_FAILURE, GENERIC_REGISTER_FAILURE, INVALID_SERVER_RESPONSE,
    RegisterPolicy, SessionReconciler,
};
pub use store::{FileTokenStore, MemoryTokenStore, StoreError, TokenStore};

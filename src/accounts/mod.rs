//! Per-account OAuth credential storage.
//!
//! Every account added through `jgoogle accounts add` is kept as one
//! [`CredentialRecord`] in a single JSON file inside the state directory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       AccountStore                       │
//! │  - get / list / exists                   │
//! │  - upsert / remove (full rewrite)        │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (serialize)          (load_or_empty)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       ~/.jgoogle/accounts.json           │
//! │  - JSON array of records                 │
//! │  - mode 0600 on Unix                     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use jgoogle::accounts::{AccountStore, CredentialRecord, OAuthCredential};
//!
//! # fn main() -> jgoogle::Result<()> {
//! let mut store = AccountStore::open("/home/me/.jgoogle")?;
//!
//! store.upsert(CredentialRecord {
//!     account: "me@example.com".to_string(),
//!     oauth: OAuthCredential::new("client-id", "client-secret", "refresh-token"),
//! })?;
//!
//! for record in store.list() {
//!     println!("{}", record.account);
//! }
//!
//! store.remove("me@example.com")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! - Every mutation rewrites the whole file in place (no atomic rename)
//! - Two processes mutating the store concurrently: last writer wins

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

mod store;

#[cfg(test)]
mod tests;

pub use store::{AccountStore, ACCOUNTS_FILE};

/// Stored credentials for one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Account identifier (an email address), unique across the store
    pub account: String,

    /// OAuth client identity and tokens for this account
    pub oauth: OAuthCredential,
}

/// OAuth material for one account.
///
/// The refresh token is long-lived and only replaced by a new authorization
/// flow. The access token is a cache that may be absent or stale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredential {
    /// OAuth client ID the refresh token was issued to
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Long-lived token used to mint access tokens
    pub refresh_token: String,

    /// Most recent access token, if one has been minted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// When `access_token` expires (UTC), when the provider told us
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<DateTime<Utc>>,
}

impl OAuthCredential {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            access_token: None,
            access_token_expires_at: None,
        }
    }
}

/// Checks that an account identifier looks like `local@domain`.
pub fn validate_account_id(account: &str) -> Result<()> {
    if account.is_empty() {
        return Err(Error::InvalidInput("account id must not be empty".to_string()));
    }
    if account.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidInput(format!(
            "account id '{}' must not contain whitespace",
            account
        )));
    }
    match account.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(Error::InvalidInput(format!(
            "account id '{}' is not an email address",
            account
        ))),
    }
}

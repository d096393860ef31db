//! Access tokens for outgoing API calls.
//!
//! [`Authenticator`] hands out a cached access token while it is valid and
//! mints a new one from the stored refresh token otherwise.

use crate::accounts::AccountStore;
use crate::config::ClientCredentials;
use crate::error::{Error, Result};
use crate::oauth::TokenClient;
use chrono::{DateTime, Utc};
use tracing::info;


/// Access tokens this close to expiry are refreshed first.
pub const EXPIRY_MARGIN_SECONDS: i64 = 90;

/// Returns true if a cached access token can still be used.
///
/// A token with unknown expiry is trusted; one expiring within
/// [`EXPIRY_MARGIN_SECONDS`] (or already past) is not.
pub fn is_access_token_usable(
    access_token: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match (access_token, expires_at) {
        (None, _) => false,
        (Some(token), _) if token.is_empty() => false,
        (Some(_), None) => true,
        (Some(_), Some(expires_at)) => {
            expires_at > now + chrono::Duration::seconds(EXPIRY_MARGIN_SECONDS)
        }
    }
}

/// Hands out valid access tokens for stored accounts.
///
/// Valid cached token → returned as is. Otherwise one refresh-token grant;
/// the new access token is written back to the store. A failed refresh leaves
/// the stored record untouched and is not retried.
pub struct Authenticator {
    tokens: TokenClient,
}

impl Authenticator {
    pub fn new(tokens: TokenClient) -> Self {
        Self { tokens }
    }

    /// Returns a currently valid access token for `account`.
    ///
    /// # Returns
    /// * `Ok(token)` - Cached or freshly minted access token
    /// * `Err(Error::AccountNotFound)` - No record for `account`
    /// * `Err(Error::RefreshRejected)` - Refresh token revoked; account must be re-added
    /// * `Err(Error::Network)` - Token endpoint unreachable
    pub async fn access_token(&self, store: &mut AccountStore, account: &str) -> Result<String> {
        let record = store
            .get(account)
            .ok_or_else(|| Error::AccountNotFound(account.to_string()))?;

        if let Some(token) = record.oauth.access_token.as_deref() {
            if is_access_token_usable(Some(token), record.oauth.access_token_expires_at, Utc::now()) {
                return Ok(token.to_string());
            }
        }

        let client = ClientCredentials {
            client_id: record.oauth.client_id.clone(),
            client_secret: record.oauth.client_secret.clone(),
        };
        let grant = self
            .tokens
            .refresh(account, &client, &record.oauth.refresh_token)
            .await?;

        let mut updated = record.clone();
        // Keep the existing refresh token if the provider did not rotate it
        if let Some(rotated) = grant.refresh_token.filter(|t| !t.is_empty()) {
            updated.oauth.refresh_token = rotated;
        }
        updated.oauth.access_token = Some(grant.access_token.clone());
        updated.oauth.access_token_expires_at = grant.expires_at;
        store.upsert(updated)?;

        info!(account = %account, "Access token refreshed");
        Ok(grant.access_token)
    }

    /// Attaches `Authorization: Bearer <token>` for `account` to a downstream request.
    pub async fn authorize(
        &self,
        store: &mut AccountStore,
        account: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        let token = self.access_token(store, account).await?;
        Ok(request.bearer_auth(token))
    }
}

//! OAuth token endpoint client.
//!
//! Handles the two grants this tool uses: exchanging an authorization code
//! for tokens, and minting a fresh access token from a refresh token.

use crate::config::ClientCredentials;
use crate::error::{AuthorizationError, Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use reqwest::StatusCode;
use tracing::{debug, warn};

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// OAuth error body (RFC 6749 section 5.2)
#[derive(Deserialize, Debug)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Tokens returned by a successful grant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present on the authorization-code grant; usually absent on refresh
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A token endpoint rejection, before it is classified by the caller.
enum Rejection {
    /// 4xx with an OAuth error body
    OAuth(TokenErrorResponse),
    /// Anything else; already a final error
    Other(Error),
}

/// Client for the provider's token endpoint.
#[derive(Clone, Debug)]
pub struct TokenClient {
    http_client: reqwest::Client,
    token_url: String,
}

impl TokenClient {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            token_url: token_url.into(),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange authorization code for tokens.
    ///
    /// # Arguments
    /// * `client` - OAuth client ID and secret
    /// * `code` - Authorization code from the callback or the user's paste
    /// * `redirect_uri` - Redirect URI used in the authorization request
    /// * `code_verifier` - PKCE verifier matching the challenge sent earlier
    ///
    /// # Returns
    /// * `Ok(TokenGrant)` - Access token, refresh token, and expiration
    /// * `Err(Error::Authorization)` - Provider rejected the code
    /// * `Err(Error::Network)` - Endpoint unreachable or server error
    pub async fn exchange_code(
        &self,
        client: &ClientCredentials,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant> {
        let mut form_data = HashMap::new();
        form_data.insert("grant_type", "authorization_code");
        form_data.insert("code", code);
        form_data.insert("redirect_uri", redirect_uri);
        form_data.insert("client_id", client.client_id.as_str());
        form_data.insert("client_secret", client.client_secret.as_str());
        form_data.insert("code_verifier", code_verifier);

        debug!(token_url = %self.token_url, "Exchanging authorization code for token");

        self.request(&form_data).await.map_err(|rejection| match rejection {
            Rejection::OAuth(body) => AuthorizationError::Provider {
                error: body.error,
                description: body.error_description,
            }
            .into(),
            Rejection::Other(e) => e,
        })
    }

    /// Mint a new access token from a refresh token.
    ///
    /// An OAuth error from the provider (typically `invalid_grant`) means the
    /// refresh token itself is dead and becomes [`Error::RefreshRejected`].
    pub async fn refresh(
        &self,
        account: &str,
        client: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant> {
        let mut form_data = HashMap::new();
        form_data.insert("grant_type", "refresh_token");
        form_data.insert("refresh_token", refresh_token);
        form_data.insert("client_id", client.client_id.as_str());
        form_data.insert("client_secret", client.client_secret.as_str());

        debug!(account = %account, token_url = %self.token_url, "Refreshing access token");

        self.request(&form_data).await.map_err(|rejection| match rejection {
            Rejection::OAuth(body) => Error::RefreshRejected {
                account: account.to_string(),
                error: body.error,
                description: body.error_description,
            },
            Rejection::Other(e) => e,
        })
    }

    async fn request(
        &self,
        form_data: &HashMap<&str, &str>,
    ) -> std::result::Result<TokenGrant, Rejection> {
        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form_data)
            .send()
            .await
            .map_err(|e| Rejection::Other(Error::Network(format!("token request failed: {}", e))))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Rejection::Other(Error::Network(format!("failed to read token response: {}", e))))?;

        if status.is_server_error() {
            return Err(Rejection::Other(Error::Network(format!(
                "token endpoint returned {}: {}",
                status, body
            ))));
        }

        if !status.is_success() {
            if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(Rejection::Other(Error::Network(format!(
                    "token endpoint returned {}, retry later",
                    status
                ))));
            }
            // Only an RFC 6749 error body says the grant itself was refused
            return match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(error) => Err(Rejection::OAuth(error)),
                Err(_) => Err(Rejection::Other(Error::Network(format!(
                    "token endpoint returned {}: {}",
                    status,
                    body.trim()
                )))),
            };
        }

        let token_response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            Rejection::Other(AuthorizationError::InvalidResponse(e.to_string()).into())
        })?;

        debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "Token request successful"
        );

        Ok(TokenGrant {
            expires_at: token_response.expires_in.and_then(expiry_from_now),
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
        })
    }
}

/// Absolute expiry for an `expires_in` lifetime.
///
/// A lifetime that does not fit a timestamp is treated as unknown.
fn expiry_from_now(seconds: i64) -> Option<DateTime<Utc>> {
    let expires_at = Duration::try_seconds(seconds).and_then(|d| Utc::now().checked_add_signed(d));
    if expires_at.is_none() {
        warn!(expires_in = seconds, "Ignoring out-of-range token lifetime");
    }
    expires_at
}

//! OAuth provider configuration.
//!
//! Endpoints, scopes and redirect targets for the identity provider, plus the
//! client identity used for the authorization request.

use crate::config::{ClientCredentials, JgoogleConfig};
use crate::error::Result;
use std::time::Duration;

/// OAuth provider configuration
#[derive(Clone, Debug)]
pub struct OAuthProviderConfig {
    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    pub token_url: String,

    /// Requested OAuth scopes
    pub scopes: Vec<String>,

    /// Client ID and secret
    pub client: ClientCredentials,

    /// Path served by the local listener (e.g. "/oauth2callback")
    pub callback_path: String,

    /// Redirect target for the manual copy/paste flow
    pub oob_redirect_uri: String,

    /// Bound on the interactive wait for the browser callback
    pub callback_timeout: Duration,
}

impl OAuthProviderConfig {
    /// Builds the provider config from loaded settings.
    ///
    /// Fails with a configuration error when no client id/secret resolves.
    pub fn from_config(config: &JgoogleConfig) -> Result<Self> {
        let oauth = &config.oauth;
        Ok(Self {
            auth_url: oauth.auth_url.clone(),
            token_url: oauth.token_url.clone(),
            scopes: oauth.scopes.clone(),
            client: oauth.client_credentials()?,
            callback_path: normalize_path(&oauth.callback_path),
            oob_redirect_uri: oauth.oob_redirect_uri.clone(),
            callback_timeout: oauth.callback_timeout(),
        })
    }

    /// Build authorization URL with state, redirect_uri and PKCE challenge.
    ///
    /// Always asks for offline access with explicit consent so the provider
    /// issues a refresh token even when the user granted access before.
    pub fn build_auth_url(&self, state: &str, redirect_uri: &str, code_challenge: &str) -> String {
        let scopes = self.scopes.join(" ");
        let separator = if self.auth_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&access_type=offline&prompt=consent&code_challenge={}&code_challenge_method=S256",
            self.auth_url,
            separator,
            urlencoding::encode(&self.client.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

#[cfg(test)]
pub(crate) fn test_provider(token_url: &str) -> OAuthProviderConfig {
    OAuthProviderConfig {
        auth_url: "https://example.com/oauth/authorize".to_string(),
        token_url: token_url.to_string(),
        scopes: vec!["read".to_string(), "write".to_string()],
        client: ClientCredentials {
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
        },
        callback_path: "/oauth2callback".to_string(),
        oob_redirect_uri: "urn:ietf:wg:oauth:2.0:oob".to_string(),
        callback_timeout: Duration::from_secs(5),
    }
}

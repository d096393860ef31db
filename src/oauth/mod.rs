//! OAuth 2.0 authorization-code flow for adding accounts.
//!
//! Two modes produce a refresh token for a new account:
//!
//! Interactive (default):
//! 1. Bind a one-shot listener on `127.0.0.1:<ephemeral>`
//! 2. Open the authorization URL in the browser (print it if that fails)
//! 3. User consents; provider redirects to the listener with `code` or `error`
//! 4. Listener answers the browser and shuts down (or times out)
//! 5. Exchange the code for tokens at the token endpoint
//!
//! Manual (`--manual`):
//! 1. Print the authorization URL with the out-of-band redirect target
//! 2. User pastes the code shown by the provider
//! 3. Exchange the code for tokens
//!
//! Each run is a single, independent exchange. A failed run is never retried;
//! the caller starts over.

mod callback;
mod exchange;
mod pkce;
mod provider;

pub use callback::{CallbackListener, OAuthCallback};
pub use exchange::{TokenClient, TokenGrant};
pub use pkce::PkceChallenge;
pub use provider::OAuthProviderConfig;

use crate::error::{AuthorizationError, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a completed authorization flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub refresh_token: String,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Opens the authorization URL for the user.
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, url: &str) -> std::io::Result<()>;
}

/// Launches the platform's default browser.
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn launch(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// Asks the user for the authorization code in manual mode.
#[async_trait]
pub trait CodePrompt: Send + Sync {
    /// Shows `authorization_url` and returns what the user pasted.
    async fn read_code(&self, authorization_url: &str) -> std::io::Result<String>;
}

/// Prompts on the controlling terminal (URL and prompt on stderr, code from stdin).
pub struct TerminalPrompt;

#[async_trait]
impl CodePrompt for TerminalPrompt {
    async fn read_code(&self, authorization_url: &str) -> std::io::Result<String> {
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(
                format!(
                    "Open this URL in a browser and grant access:\n\n  {}\n\nPaste the authorization code: ",
                    authorization_url
                )
                .as_bytes(),
            )
            .await?;
        stderr.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(line)
    }
}

/// Drives the authorization-code grant against the identity provider.
pub struct AuthorizationFlow {
    provider: OAuthProviderConfig,
    tokens: TokenClient,
}

impl AuthorizationFlow {
    pub fn new(provider: OAuthProviderConfig) -> Self {
        let tokens = TokenClient::new(provider.token_url.clone());
        Self { provider, tokens }
    }

    pub fn provider(&self) -> &OAuthProviderConfig {
        &self.provider
    }

    /// Browser flow with a local redirect listener.
    ///
    /// Fails with [`AuthorizationError::Timeout`] when no callback arrives
    /// within the configured window; the listener is gone either way.
    pub async fn authorize_interactive(
        &self,
        browser: &dyn BrowserLauncher,
    ) -> Result<AuthorizationGrant> {
        let csrf_state = Uuid::new_v4().to_string();
        let pkce = PkceChallenge::new();

        let listener = CallbackListener::bind(&self.provider.callback_path, &csrf_state).await?;
        let redirect_uri = listener.redirect_uri();
        let auth_url = self
            .provider
            .build_auth_url(&csrf_state, &redirect_uri, &pkce.challenge);

        info!(redirect_uri = %redirect_uri, "Waiting for browser authorization");
        if let Err(e) = browser.launch(&auth_url) {
            warn!(error = %e, "Failed to open browser");
            eprintln!("Open this URL in a browser to continue:\n\n  {}\n", auth_url);
        }

        let callback = listener.wait(self.provider.callback_timeout).await?;

        if let Some(error) = callback.error {
            warn!(error = %error, "OAuth authorization failed");
            return Err(AuthorizationError::Provider {
                error,
                description: callback.error_description,
            }
            .into());
        }
        let code = callback.code.ok_or(AuthorizationError::MissingCode)?;

        self.complete(&code, &redirect_uri, &pkce.verifier).await
    }

    /// Copy/paste flow using the out-of-band redirect target.
    pub async fn authorize_manual(&self, prompt: &dyn CodePrompt) -> Result<AuthorizationGrant> {
        let csrf_state = Uuid::new_v4().to_string();
        let pkce = PkceChallenge::new();
        let redirect_uri = self.provider.oob_redirect_uri.clone();
        let auth_url = self
            .provider
            .build_auth_url(&csrf_state, &redirect_uri, &pkce.challenge);

        let pasted = prompt
            .read_code(&auth_url)
            .await
            .map_err(|e| Error::InvalidInput(format!("failed to read authorization code: {}", e)))?;
        let code = pasted.trim();
        if code.is_empty() {
            return Err(Error::InvalidInput(
                "no authorization code was entered".to_string(),
            ));
        }

        self.complete(code, &redirect_uri, &pkce.verifier).await
    }

    async fn complete(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<AuthorizationGrant> {
        debug!("Exchanging authorization code for tokens");
        let grant = self
            .tokens
            .exchange_code(&self.provider.client, code, redirect_uri, code_verifier)
            .await?;

        let refresh_token = grant
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthorizationError::MissingRefreshToken)?;

        info!("OAuth flow completed successfully");

        Ok(AuthorizationGrant {
            refresh_token,
            access_token: grant.access_token,
            expires_at: grant.expires_at,
        })
    }
}

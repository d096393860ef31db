//! `jgoogle accounts ...` handlers.
//!
//! Output is tab-separated, one record per line, on stdout.

use crate::accounts::{validate_account_id, AccountStore, CredentialRecord, OAuthCredential};
use crate::auth::{is_access_token_usable, Authenticator};
use crate::config::JgoogleConfig;
use crate::error::{Error, Result};
use crate::oauth::{
    AuthorizationFlow, BrowserLauncher, CodePrompt, OAuthProviderConfig, SystemBrowser,
    TerminalPrompt, TokenClient,
};
use anyhow::Context;
use chrono::Utc;
use tracing::info;

/// How the authorization code is obtained.
pub enum AuthorizationMode<'a> {
    Interactive(&'a dyn BrowserLauncher),
    Manual(&'a dyn CodePrompt),
}

/// Runs a full authorization flow for `account` and stores the result.
///
/// The store is only touched after a successful exchange: on any failure
/// (bad id, duplicate, denied consent, timeout) it is left as it was.
pub async fn add_account(
    store: &mut AccountStore,
    flow: &AuthorizationFlow,
    account: &str,
    mode: AuthorizationMode<'_>,
) -> Result<()> {
    check_can_add(store, account)?;

    let grant = match mode {
        AuthorizationMode::Interactive(browser) => flow.authorize_interactive(browser).await?,
        AuthorizationMode::Manual(prompt) => flow.authorize_manual(prompt).await?,
    };

    let client = &flow.provider().client;
    let mut oauth = OAuthCredential::new(
        client.client_id.clone(),
        client.client_secret.clone(),
        grant.refresh_token,
    );
    oauth.access_token = Some(grant.access_token);
    oauth.access_token_expires_at = grant.expires_at;

    store.upsert(CredentialRecord {
        account: account.to_string(),
        oauth,
    })?;

    info!(account = %account, "Account added");
    Ok(())
}

fn check_can_add(store: &AccountStore, account: &str) -> Result<()> {
    validate_account_id(account)?;
    if store.exists(account) {
        return Err(Error::InvalidInput(format!(
            "account '{}' already exists; remove it first",
            account
        )));
    }
    Ok(())
}

/// Deletes a stored account; an unknown id is an input error.
pub fn remove_account(store: &mut AccountStore, account: &str) -> Result<()> {
    if !store.remove(account)? {
        return Err(Error::InvalidInput(format!("unknown account '{}'", account)));
    }
    info!(account = %account, "Account removed");
    Ok(())
}

/// Access-token status column for `accounts list`.
pub fn token_status(record: &CredentialRecord) -> String {
    let oauth = &record.oauth;
    match (&oauth.access_token, oauth.access_token_expires_at) {
        (None, _) => "none".to_string(),
        (Some(token), expires_at)
            if is_access_token_usable(Some(token.as_str()), expires_at, Utc::now()) =>
        {
            match expires_at {
                Some(at) => format!("valid until {}", at.to_rfc3339()),
                None => "cached".to_string(),
            }
        }
        (Some(_), _) => "expired".to_string(),
    }
}

pub fn handle_list(store: &AccountStore) -> anyhow::Result<()> {
    for record in store.list() {
        println!("{}\t{}", record.account, token_status(record));
    }
    Ok(())
}

pub async fn handle_add(
    store: &mut AccountStore,
    config: &JgoogleConfig,
    account: &str,
    manual: bool,
) -> anyhow::Result<()> {
    // Input errors take precedence over a missing client configuration
    check_can_add(store, account)?;

    let provider = OAuthProviderConfig::from_config(config)?;
    let flow = AuthorizationFlow::new(provider);
    let mode = if manual {
        AuthorizationMode::Manual(&TerminalPrompt)
    } else {
        AuthorizationMode::Interactive(&SystemBrowser)
    };

    add_account(store, &flow, account, mode)
        .await
        .with_context(|| format!("Failed to add account {}", account))?;

    println!("{}\tadded", account);
    Ok(())
}

pub fn handle_remove(store: &mut AccountStore, account: &str) -> anyhow::Result<()> {
    remove_account(store, account)?;
    println!("{}\tremoved", account);
    Ok(())
}

pub async fn handle_token(
    store: &mut AccountStore,
    config: &JgoogleConfig,
    account: &str,
) -> anyhow::Result<()> {
    let auth = Authenticator::new(TokenClient::new(config.oauth.token_url.clone()));
    let token = auth
        .access_token(store, account)
        .await
        .with_context(|| format!("Failed to get an access token for {}", account))?;
    println!("{}", token);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(access_token: Option<&str>, expires_in: Option<Duration>) -> CredentialRecord {
        let mut oauth = OAuthCredential::new("cid", "secret", "rt");
        oauth.access_token = access_token.map(str::to_string);
        oauth.access_token_expires_at = expires_in.map(|d| Utc::now() + d);
        CredentialRecord {
            account: "a@x.com".to_string(),
            oauth,
        }
    }

    #[test]
    fn test_token_status() {
        assert_eq!(token_status(&record(None, None)), "none");
        assert_eq!(token_status(&record(Some("t"), None)), "cached");
        assert_eq!(
            token_status(&record(Some("t"), Some(Duration::minutes(-5)))),
            "expired"
        );
        assert!(token_status(&record(Some("t"), Some(Duration::hours(1)))).starts_with("valid until "));
    }

    #[test]
    fn test_remove_unknown_account_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AccountStore::open(dir.path()).unwrap();

        let err = remove_account(&mut store, "a@x.com").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_handle_add_rejects_duplicate_before_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AccountStore::open(dir.path()).unwrap();
        store.upsert(record(None, None)).unwrap();

        // Default config has no client credentials; the duplicate check must win
        let err = handle_add(&mut store, &JgoogleConfig::default(), "a@x.com", true)
            .await
            .unwrap_err();
        assert_eq!(crate::error::exit_code_for(&err), crate::error::EXIT_INVALID_INPUT);
    }

    #[tokio::test]
    async fn test_handle_add_rejects_malformed_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AccountStore::open(dir.path()).unwrap();

        let err = handle_add(&mut store, &JgoogleConfig::default(), "not-an-email", true)
            .await
            .unwrap_err();
        assert_eq!(crate::error::exit_code_for(&err), crate::error::EXIT_INVALID_INPUT);
        assert!(store.list().is_empty());
    }
}

//! Error taxonomy shared by the account store, the authorization flow and the
//! access-token helper.
//!
//! Every failure the authentication core can produce lands in one of a small
//! number of categories, and each category maps to a stable process exit code
//! so scripts can tell "re-authenticate" from "retry later" from "fix the
//! arguments".

use std::path::PathBuf;
use std::time::Duration;

/// Exit code for failures that do not belong to a known category.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for bad arguments (malformed account id, duplicate add, unknown account on remove).
pub const EXIT_INVALID_INPUT: i32 = 2;
/// Exit code for authentication failures (consent denied, refresh rejected, account missing).
pub const EXIT_AUTH: i32 = 3;
/// Exit code for network failures talking to the identity provider.
pub const EXIT_NETWORK: i32 = 4;
/// Exit code for missing or malformed configuration.
pub const EXIT_CONFIG: i32 = 5;
/// Exit code for local storage failures.
pub const EXIT_STORAGE: i32 = 6;

/// Result alias for the authentication core.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed failure of the authentication core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Client identifier/secret missing, or config file unreadable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller supplied arguments that cannot be acted on.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No stored credentials for the requested account.
    #[error("account '{0}' is not configured; run 'jgoogle accounts add {0}'")]
    AccountNotFound(String),

    /// The authorization-code flow did not produce a refresh token.
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// The stored refresh token was rejected by the provider.
    #[error(
        "refresh token for '{account}' was rejected ({error}{}); remove the account and add it again",
        .description.as_deref().map(|d| format!(": {}", d)).unwrap_or_default()
    )]
    RefreshRejected {
        account: String,
        error: String,
        description: Option<String>,
    },

    /// The identity provider could not be reached or answered with a server error.
    #[error("network error: {0}")]
    Network(String),

    /// The state directory or account file could not be created, read or written.
    #[error("storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ways an authorization-code flow can fail.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    /// The provider answered with an OAuth error (access_denied, invalid_grant, ...).
    #[error(
        "authorization failed: {error}{}",
        .description.as_deref().map(|d| format!(" - {}", d)).unwrap_or_default()
    )]
    Provider {
        error: String,
        description: Option<String>,
    },

    /// No callback reached the local listener in time.
    #[error("authorization timed out after {} seconds waiting for the browser callback", .0.as_secs())]
    Timeout(Duration),

    /// The callback carried neither a code nor an error.
    #[error("authorization callback did not include a code")]
    MissingCode,

    /// The token endpoint granted access but no refresh token.
    #[error("token response did not include a refresh_token; cannot store the account")]
    MissingRefreshToken,

    /// The token endpoint answered with something that is not a token response.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// The local callback listener could not be started.
    #[error("failed to start the local callback listener: {0}")]
    Listener(#[source] std::io::Error),
}

impl Error {
    /// Wraps an I/O failure on `path` as a storage error.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this failure category.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => EXIT_CONFIG,
            Error::InvalidInput(_) => EXIT_INVALID_INPUT,
            Error::AccountNotFound(_) | Error::Authorization(_) | Error::RefreshRejected { .. } => {
                EXIT_AUTH
            }
            Error::Network(_) => EXIT_NETWORK,
            Error::Storage { .. } => EXIT_STORAGE,
        }
    }
}

/// Picks the exit code for an error bubbled up through `anyhow` context layers.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::exit_code)
        .unwrap_or(EXIT_FAILURE)
}

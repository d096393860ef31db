use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/drive",
];
pub const DEFAULT_CALLBACK_PATH: &str = "/oauth2callback";
pub const DEFAULT_OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Name of the optional config file inside the state directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Client credentials baked in at build time, if any.
const EMBEDDED_CLIENT_ID: Option<&str> = option_env!("JGOOGLE_CLIENT_ID");
const EMBEDDED_CLIENT_SECRET: Option<&str> = option_env!("JGOOGLE_CLIENT_SECRET");

/// Complete jgoogle configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JgoogleConfig {
    #[serde(default)]
    pub oauth: OAuthSettings,
}

/// `[oauth]` section
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthSettings {
    /// OAuth client ID (falls back to env, then the embedded default)
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret (falls back to env, then the embedded default)
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Path the local listener answers on during interactive login
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    /// Redirect target used by the manual (copy/paste) flow
    #[serde(default = "default_oob_redirect_uri")]
    pub oob_redirect_uri: String,
    /// How long interactive login waits for the browser callback
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_seconds: u64,
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_callback_path() -> String {
    DEFAULT_CALLBACK_PATH.to_string()
}

fn default_oob_redirect_uri() -> String {
    DEFAULT_OOB_REDIRECT_URI.to_string()
}

fn default_callback_timeout() -> u64 {
    300
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            scopes: default_scopes(),
            callback_path: default_callback_path(),
            oob_redirect_uri: default_oob_redirect_uri(),
            callback_timeout_seconds: default_callback_timeout(),
        }
    }
}

/// OAuth client application identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthSettings {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_seconds)
    }

    /// Resolves the client identity: env > config file > embedded default.
    pub fn client_credentials(&self) -> Result<ClientCredentials> {
        self.resolve_client_credentials(
            std::env::var("JGOOGLE_CLIENT_ID").ok(),
            std::env::var("JGOOGLE_CLIENT_SECRET").ok(),
        )
    }

    fn resolve_client_credentials(
        &self,
        env_id: Option<String>,
        env_secret: Option<String>,
    ) -> Result<ClientCredentials> {
        let pick = |env: Option<String>, file: &Option<String>, embedded: Option<&str>| {
            env.or_else(|| file.clone())
                .or_else(|| embedded.map(str::to_string))
                .filter(|v| !v.trim().is_empty())
        };

        let client_id = pick(env_id, &self.client_id, EMBEDDED_CLIENT_ID).ok_or_else(|| {
            Error::Config(
                "no OAuth client id; set JGOOGLE_CLIENT_ID or oauth.client_id in config.toml"
                    .to_string(),
            )
        })?;
        let client_secret = pick(env_secret, &self.client_secret, EMBEDDED_CLIENT_SECRET)
            .ok_or_else(|| {
                Error::Config(
                    "no OAuth client secret; set JGOOGLE_CLIENT_SECRET or oauth.client_secret in config.toml"
                        .to_string(),
                )
            })?;

        Ok(ClientCredentials {
            client_id,
            client_secret,
        })
    }
}

impl JgoogleConfig {
    /// Loads `config.toml` from the state directory, or defaults when absent.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        load_config(&path).map_err(|e| Error::Config(format!("{:#}", e)))
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> anyhow::Result<JgoogleConfig> {
    use anyhow::Context;

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: JgoogleConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

/// Resolves the per-user state directory: explicit flag, `JGOOGLE_HOME`, then `~/.jgoogle`.
pub fn resolve_state_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os("JGOOGLE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".jgoogle"))
        .ok_or_else(|| Error::Config("cannot determine home directory; set JGOOGLE_HOME".to_string()))
}

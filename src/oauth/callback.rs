//! One-shot local listener for the OAuth redirect.
//!
//! Binds an ephemeral loopback port, accepts exactly one callback carrying
//! either `code` or `error`, answers the browser with a short page, and shuts
//! down. The listener is shut down on every exit path: after the callback, on
//! timeout, and on drop.

use crate::error::{AuthorizationError, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long a graceful shutdown may take before the server task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// OAuth callback query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Shared state for the callback handler
struct CallbackState {
    expected_state: String,
    /// Taken by the first accepted callback
    sender: Mutex<Option<oneshot::Sender<OAuthCallback>>>,
}

/// Running callback listener. Dropping it tears the server down.
pub struct CallbackListener {
    addr: SocketAddr,
    callback_path: String,
    result_rx: Option<oneshot::Receiver<OAuthCallback>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Binds `127.0.0.1:0` and starts serving `callback_path`.
    ///
    /// Only a callback whose `state` equals `expected_state` is accepted.
    pub async fn bind(callback_path: &str, expected_state: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(AuthorizationError::Listener)?;
        let addr = listener.local_addr().map_err(AuthorizationError::Listener)?;

        let (result_tx, result_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(CallbackState {
            expected_state: expected_state.to_string(),
            sender: Mutex::new(Some(result_tx)),
        });
        let app = Router::new()
            .route(callback_path, get(handle_callback))
            .with_state(state);

        let server = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "Callback listener error");
            }
        });

        debug!(addr = %addr, path = %callback_path, "Callback listener started");

        Ok(Self {
            addr,
            callback_path: callback_path.to_string(),
            result_rx: Some(result_rx),
            shutdown_tx: Some(shutdown_tx),
            server: Some(server),
        })
    }

    /// Redirect URI to register with the authorization request.
    pub fn redirect_uri(&self) -> String {
        format!("http://{}{}", self.addr, self.callback_path)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Waits for the single callback, bounded by `timeout`, then shuts down.
    pub async fn wait(mut self, timeout: Duration) -> Result<OAuthCallback> {
        let outcome = match self.result_rx.take() {
            Some(rx) => tokio::time::timeout(timeout, rx).await.map(|r| r.ok()),
            None => Ok(None),
        };
        self.shutdown().await;

        match outcome {
            Ok(Some(callback)) => Ok(callback),
            Ok(None) => Err(AuthorizationError::Listener(std::io::Error::other(
                "callback listener stopped before a callback arrived",
            ))
            .into()),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Timed out waiting for OAuth callback");
                Err(AuthorizationError::Timeout(timeout).into())
            }
        }
    }

    /// Signals graceful shutdown and waits briefly for in-flight responses.
    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut server) = self.server.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
                server.abort();
            }
        }
        debug!(addr = %self.addr, "Callback listener stopped");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

/// GET <callback_path>?code=...&state=... or ?error=...&state=...
///
/// The first callback with a matching state ends the wait. Requests without a
/// code or error, or with a foreign state, are rejected and the wait goes on.
/// Anything after the first accepted callback gets 410 Gone.
async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(callback): Query<OAuthCallback>,
) -> Response {
    if callback.code.is_none() && callback.error.is_none() {
        return page(
            StatusCode::BAD_REQUEST,
            "Authorization failed",
            "The request did not include an authorization code.",
        );
    }

    if callback.state.as_deref() != Some(state.expected_state.as_str()) {
        warn!("Ignoring OAuth callback with unexpected state");
        return page(
            StatusCode::BAD_REQUEST,
            "Authorization failed",
            "The state parameter does not match this login attempt.",
        );
    }

    let Some(sender) = state.sender.lock().await.take() else {
        return page(
            StatusCode::GONE,
            "Already handled",
            "This login attempt has already completed. You can close this window.",
        );
    };

    let provider_error = callback.error.clone();
    let _ = sender.send(callback);

    match provider_error {
        Some(error) => page(
            StatusCode::OK,
            "Authorization failed",
            &format!(
                "The provider returned '{}'. Return to the terminal for details.",
                escape_html(&error)
            ),
        ),
        None => page(
            StatusCode::OK,
            "Authorization complete",
            "You can close this window and return to the terminal.",
        ),
    }
}

fn page(status: StatusCode, title: &str, message: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>jgoogle</title></head>\
         <body><h1>{}</h1><p>{}</p></body></html>",
        title, message
    );
    (status, Html(body)).into_response()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_callback_deserialization() {
        // Success case
        let query = "code=4%2F0Ab&state=csrf_state_456&scope=email";
        let callback: OAuthCallback = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(callback.code.as_deref(), Some("4/0Ab"));
        assert_eq!(callback.state.as_deref(), Some("csrf_state_456"));
        assert_eq!(callback.error, None);

        // Error case
        let query = "error=access_denied&error_description=User+cancelled&state=s";
        let callback: OAuthCallback = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(callback.error.as_deref(), Some("access_denied"));
        assert_eq!(callback.error_description.as_deref(), Some("User cancelled"));
        assert_eq!(callback.code, None);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&\"x\""), "&lt;b&gt;&amp;&quot;x&quot;");
    }

    #[tokio::test]
    async fn test_single_callback_is_delivered() {
        let listener = CallbackListener::bind("/oauth2callback", "s1").await.unwrap();
        let url = format!("{}?code=abc&state=s1", listener.redirect_uri());

        let browser = tokio::spawn(async move { reqwest::get(url).await.unwrap() });
        let callback = listener.wait(Duration::from_secs(5)).await.unwrap();
        let response = browser.await.unwrap();

        assert_eq!(callback.code.as_deref(), Some("abc"));
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.text().await.unwrap().contains("Authorization complete"));
    }

    #[tokio::test]
    async fn test_foreign_state_is_rejected_and_wait_continues() {
        let listener = CallbackListener::bind("/oauth2callback", "expected").await.unwrap();
        let base = listener.redirect_uri();

        let browser = tokio::spawn(async move {
            let forged = reqwest::get(format!("{}?code=evil&state=other", base))
                .await
                .unwrap();
            assert_eq!(forged.status(), reqwest::StatusCode::BAD_REQUEST);
            let empty = reqwest::get(base.clone()).await.unwrap();
            assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);
            reqwest::get(format!("{}?code=good&state=expected", base))
                .await
                .unwrap()
        });

        let callback = listener.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(callback.code.as_deref(), Some("good"));
        assert_eq!(browser.await.unwrap().status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_provider_error_is_delivered() {
        let listener = CallbackListener::bind("/cb", "s").await.unwrap();
        let url = format!("{}?error=access_denied&state=s", listener.redirect_uri());

        let browser = tokio::spawn(async move { reqwest::get(url).await.unwrap() });
        let callback = listener.wait(Duration::from_secs(5)).await.unwrap();
        browser.await.unwrap();

        assert_eq!(callback.error.as_deref(), Some("access_denied"));
        assert!(callback.code.is_none());
    }

    #[tokio::test]
    async fn test_timeout_shuts_listener_down() {
        let listener = CallbackListener::bind("/oauth2callback", "s").await.unwrap();
        let addr = listener.local_addr();

        let err = listener.wait(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Authorization(AuthorizationError::Timeout(_))
        ));

        // Port no longer accepts connections
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_drop_shuts_listener_down() {
        let listener = CallbackListener::bind("/oauth2callback", "s").await.unwrap();
        let addr = listener.local_addr();
        drop(listener);
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}

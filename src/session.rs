//! Reusing one negotiated session across many API calls.
//!
//! [`Negotiator`] is deliberately stateless. A `Session` owns the cached
//! [`TokenBundle`] for one set of credentials and re-negotiates when the server
//! stops honouring it.

use std::fmt;

use http::StatusCode;
use tokio::sync::Mutex;
use url::Url;

use crate::auth::Credentials;
use crate::error::{self, Result};
use crate::negotiator::Negotiator;
use crate::tokens::TokenBundle;

/// A negotiated session plus the HTTP client used for the calls it
/// authorizes.
///
/// Concurrent callers share one negotiation: the bundle lock is held while a
/// negotiation is in flight.
pub struct Session {
    negotiator: Negotiator,
    credentials: Credentials,
    client: reqwest::Client,
    tokens: Mutex<Option<TokenBundle>>,
}

impl Session {
    /// No network traffic happens until the first call needs tokens.
    pub fn new(negotiator: Negotiator, credentials: Credentials) -> Result<Session> {
        let client = negotiator.transport()?;
        Ok(Session {
            negotiator,
            credentials,
            client,
            tokens: Mutex::new(None),
        })
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    /// Joins `path` onto the server address.
    pub fn url(&self, path: &str) -> Result<Url> {
        let base = self.negotiator.server().as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path)).map_err(error::builder)
    }

    /// The cached bundle, negotiating one first if there is none.
    pub async fn tokens(&self) -> Result<TokenBundle> {
        let mut cached = self.tokens.lock().await;
        if let Some(tokens) = cached.as_ref() {
            return Ok(tokens.clone());
        }

        let tokens = self.negotiator.negotiate(&self.credentials).await?;
        *cached = Some(tokens.clone());
        Ok(tokens)
    }

    /// Drops the cached bundle; the next call negotiates again.
    pub async fn invalidate(&self) {
        self.tokens.lock().await.take();
    }

    /// Sends a request built by `build` with the session cookie and CSRF
    /// header attached.
    ///
    /// A `401` or `403` answer invalidates the bundle, and the request is
    /// rebuilt and sent once more with a freshly negotiated one. Whatever the
    /// second attempt returns is handed back, error statuses included.
    pub async fn send<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let tokens = self.tokens().await?;
        let response = self.send_with(&build, &tokens).await?;

        if !is_stale(response.status()) {
            return Ok(response);
        }

        log::debug!(
            "session rejected with {}, negotiating again",
            response.status()
        );
        drop(response);
        self.invalidate_if_current(&tokens).await;

        let tokens = self.tokens().await?;
        self.send_with(&build, &tokens).await
    }

    async fn send_with<F>(&self, build: &F, tokens: &TokenBundle) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        tokens
            .apply(build(&self.client))
            .send()
            .await
            .map_err(error::request)
    }

    // Another caller may already have replaced the stale bundle.
    async fn invalidate_if_current(&self, stale: &TokenBundle) {
        let mut cached = self.tokens.lock().await;
        if cached.as_ref() == Some(stale) {
            cached.take();
        }
    }
}

fn is_stale(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session")
            .field("negotiator", &self.negotiator)
            .field("credentials", &self.credentials)
            .finish()
    }
}

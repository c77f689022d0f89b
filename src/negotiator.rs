use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderValue, StatusCode};
use tokio::time::Instant;
use url::Url;

use crate::auth::{derive_spn, execute_with_negotiate, ChallengeResponder, Credentials, SspiResponder};
use crate::error::{self, BoxError, Result};
use crate::tokens::TokenBundle;

/// Path of the authenticate call, appended to the server address.
pub const AUTHENTICATE_PATH: &str = "/OperationsManager/authenticate";

static DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

type ResponderFactory = dyn Fn(&Credentials, &str) -> std::result::Result<Box<dyn ChallengeResponder>, BoxError>
    + Send
    + Sync;

/// Establishes authenticated sessions against one server.
///
/// Every call to [`negotiate`](Negotiator::negotiate) is independent: it builds
/// its own transport, keeps nothing once it returns, and may run concurrently
/// with other calls. Cloning is cheap.
#[derive(Clone)]
pub struct Negotiator {
    inner: Arc<NegotiatorRef>,
}

/// A `NegotiatorBuilder` can be used to create a `Negotiator` with custom
/// configuration.
#[must_use]
pub struct NegotiatorBuilder {
    config: Config,
}

struct Config {
    server: String,
    accept_invalid_certs: bool,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: HeaderValue,
    responder: Arc<ResponderFactory>,
    error: Option<crate::Error>,
}

struct NegotiatorRef {
    base: Url,
    endpoint: Url,
    spn: String,
    accept_invalid_certs: bool,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: HeaderValue,
    responder: Arc<ResponderFactory>,
}

impl NegotiatorBuilder {
    /// Constructs a new `NegotiatorBuilder` for the server at `server`, the
    /// base address the authenticate path is appended to.
    pub fn new(server: impl Into<String>) -> NegotiatorBuilder {
        NegotiatorBuilder {
            config: Config {
                server: server.into(),
                accept_invalid_certs: false,
                timeout: None,
                connect_timeout: None,
                user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
                responder: Arc::new(|credentials: &Credentials, spn: &str| {
                    let responder = SspiResponder::new(credentials, spn)?;
                    Ok(Box::new(responder) as Box<dyn ChallengeResponder>)
                }),
                error: None,
            },
        }
    }

    /// Returns a `Negotiator` that uses this `NegotiatorBuilder` configuration.
    ///
    /// # Errors
    ///
    /// This method fails if the server address is not an absolute http(s) URL
    /// with a host, or if it carries a user name or password.
    pub fn build(self) -> Result<Negotiator> {
        let config = self.config;

        if let Some(err) = config.error {
            return Err(err);
        }

        let trimmed = config.server.trim_end_matches('/');
        let base = Url::parse(trimmed).map_err(error::builder)?;
        // userinfo would end up in every error and log line naming the endpoint
        if !base.username().is_empty() || base.password().is_some() {
            return Err(error::builder("server address must not carry credentials"));
        }
        if !matches!(base.scheme(), "http" | "https") {
            return Err(error::builder("server address must be an http or https URL").with_url(base));
        }
        let endpoint =
            Url::parse(&format!("{}{}", trimmed, AUTHENTICATE_PATH)).map_err(error::builder)?;
        let spn = derive_spn(&endpoint)?;

        Ok(Negotiator {
            inner: Arc::new(NegotiatorRef {
                base,
                endpoint,
                spn,
                accept_invalid_certs: config.accept_invalid_certs,
                timeout: config.timeout,
                connect_timeout: config.connect_timeout,
                user_agent: config.user_agent,
                responder: config.responder,
            }),
        })
    }

    /// Controls the use of certificate validation.
    ///
    /// Defaults to `false`.
    ///
    /// # Warning
    ///
    /// You should think very carefully before using this method. If
    /// invalid certificates are trusted, *any* certificate for *any* site
    /// will be trusted for use, and the credentials sent during negotiation
    /// are exposed to whoever presents one. Every transport built with this
    /// set logs a warning.
    pub fn danger_accept_invalid_certs(mut self, accept_invalid_certs: bool) -> NegotiatorBuilder {
        self.config.accept_invalid_certs = accept_invalid_certs;
        self
    }

    /// Enables a total timeout for each HTTP exchange of the handshake.
    ///
    /// Default is no timeout. To bound the whole negotiation use
    /// [`Negotiator::negotiate_until`].
    pub fn timeout(mut self, timeout: Duration) -> NegotiatorBuilder {
        self.config.timeout = Some(timeout);
        self
    }

    /// Set a timeout for only the connect phase.
    ///
    /// Default is `None`.
    pub fn connect_timeout(mut self, timeout: Duration) -> NegotiatorBuilder {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Sets the `User-Agent` header sent with the authenticate call.
    pub fn user_agent<V>(mut self, value: V) -> NegotiatorBuilder
    where
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        match value.try_into() {
            Ok(value) => {
                self.config.user_agent = value;
            }
            Err(e) => {
                self.config.error = Some(error::builder(e.into()));
            }
        };
        self
    }

    /// Replaces the source of NTLM messages.
    ///
    /// The factory receives the call's credentials and the target SPN
    /// (`HTTP/<host>`), and is only invoked when the server asks for NTLM.
    /// Defaults to [`SspiResponder`].
    pub fn ntlm_responder<F>(mut self, factory: F) -> NegotiatorBuilder
    where
        F: Fn(&Credentials, &str) -> std::result::Result<Box<dyn ChallengeResponder>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.config.responder = Arc::new(factory);
        self
    }
}

impl fmt::Debug for NegotiatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NegotiatorBuilder")
            .field("server", &self.config.server)
            .field("accept_invalid_certs", &self.config.accept_invalid_certs)
            .field("timeout", &self.config.timeout)
            .field("connect_timeout", &self.config.connect_timeout)
            .finish()
    }
}

impl Negotiator {
    /// Creates a `NegotiatorBuilder` to configure a `Negotiator`.
    ///
    /// This is the same as `NegotiatorBuilder::new(server)`.
    pub fn builder(server: impl Into<String>) -> NegotiatorBuilder {
        NegotiatorBuilder::new(server)
    }

    /// The server address the negotiator was built for.
    pub fn server(&self) -> &Url {
        &self.inner.base
    }

    /// The URL the authenticate call is posted to.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Whether certificate validation is disabled for this server.
    pub fn accepts_invalid_certs(&self) -> bool {
        self.inner.accept_invalid_certs
    }

    /// Authenticates `credentials` against the server and returns the
    /// session artifacts.
    ///
    /// # Errors
    ///
    /// - transport failures (`is_transport`), never retried here;
    /// - any status but `200 OK` (`is_rejected`, with `status()`);
    /// - a `200 OK` missing the session or CSRF cookie (`is_incomplete`);
    /// - a CSRF cookie that does not unescape (`is_decode`).
    pub async fn negotiate(&self, credentials: &Credentials) -> Result<TokenBundle> {
        let inner = &*self.inner;
        let client = self.transport()?;

        let request = client
            .post(inner.endpoint.clone())
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(USER_AGENT, inner.user_agent.clone())
            .body(credentials.authentication_payload())
            .build()
            .map_err(|e| error::request(e).with_url(inner.endpoint.clone()))?;

        let client = &client;
        let response = execute_with_negotiate(
            request,
            credentials,
            || (inner.responder)(credentials, &inner.spn),
            |request| async move { client.execute(request).await.map_err(error::request) },
        )
        .await
        .map_err(|e| e.with_url(inner.endpoint.clone()))?;

        let status = response.status();
        log::debug!("authenticate call answered {}", status);
        if status != StatusCode::OK {
            return Err(error::rejected(inner.endpoint.clone(), status));
        }

        TokenBundle::from_headers(response.headers(), credentials)
            .map_err(|missing| missing.into_error(inner.endpoint.clone()))
    }

    /// Like [`negotiate`](Negotiator::negotiate), but gives up with a timeout
    /// error once `deadline` passes, whichever leg of the handshake is in
    /// flight.
    pub async fn negotiate_until(
        &self,
        credentials: &Credentials,
        deadline: Instant,
    ) -> Result<TokenBundle> {
        match tokio::time::timeout_at(deadline, self.negotiate(credentials)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(error::timeout(self.inner.endpoint.clone())),
        }
    }

    /// A fresh HTTP/1.1 client for one negotiation.
    pub(crate) fn transport(&self) -> Result<reqwest::Client> {
        let inner = &*self.inner;

        let mut builder = reqwest::Client::builder()
            .http1_only()
            .redirect(reqwest::redirect::Policy::none());

        if inner.accept_invalid_certs {
            log::warn!(
                "TLS certificate verification disabled for {}",
                inner.base
            );
            builder = builder.tls_danger_accept_invalid_certs(true);
        }
        if let Some(timeout) = inner.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = inner.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        builder
            .build()
            .map_err(|e| error::builder(e).with_url(inner.base.clone()))
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("accept_invalid_certs", &self.inner.accept_invalid_certs)
            .finish()
    }
}

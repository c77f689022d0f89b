use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;
use url::Url;

/// A `Result` alias where the `Err` case is `scom_auth::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// The Errors that may occur while negotiating a session.
///
/// The message of an `Error` never contains the principal, the secret, or any
/// token value received from the server.
pub struct Error {
    inner: Box<Inner>,
}

/// Boxed error returned by [`ChallengeResponder`](crate::ChallengeResponder)
/// implementations.
pub type BoxError = Box<dyn StdError + Send + Sync>;

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    url: Option<Url>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                url: None,
            }),
        }
    }

    /// Returns the negotiation endpoint related to this error, if any.
    pub fn url(&self) -> Option<&Url> {
        self.inner.url.as_ref()
    }

    /// Add a url related to this error (overwriting any existing).
    pub fn with_url(mut self, url: Url) -> Self {
        self.inner.url = Some(url);
        self
    }

    /// Strip the related url from this error.
    pub fn without_url(mut self) -> Self {
        self.inner.url = None;
        self
    }

    /// Returns true if the error came from building the negotiator or its
    /// transport, for example an unparseable server address.
    pub fn is_builder(&self) -> bool {
        matches!(self.inner.kind, Kind::Builder)
    }

    /// Returns true if the server could not be reached or the exchange broke
    /// off: DNS, refused connections, TLS handshakes, timeouts.
    ///
    /// These are the only failures worth retrying with backoff.
    pub fn is_transport(&self) -> bool {
        matches!(self.inner.kind, Kind::Transport | Kind::Timeout)
    }

    /// Returns true if the error is related to a timeout or an expired deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::Timeout)
    }

    /// Returns true if the server answered the negotiation with a status other
    /// than `200 OK`.
    pub fn is_rejected(&self) -> bool {
        matches!(self.inner.kind, Kind::Rejected(_))
    }

    /// Returns true if the server answered `200 OK` without handing out both
    /// the session cookie and the CSRF cookie.
    pub fn is_incomplete(&self) -> bool {
        matches!(self.inner.kind, Kind::Incomplete(_))
    }

    /// Returns true if the CSRF cookie could not be unescaped.
    pub fn is_decode(&self) -> bool {
        matches!(self.inner.kind, Kind::Decode)
    }

    /// Returns true if an NTLM message could not be produced locally.
    pub fn is_negotiate(&self) -> bool {
        matches!(self.inner.kind, Kind::Negotiate)
    }

    /// Returns true if the settings could not be loaded.
    pub fn is_config(&self) -> bool {
        matches!(self.inner.kind, Kind::Config)
    }

    /// Returns true if retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        self.is_transport()
    }

    /// Returns the status code observed when the server rejected the
    /// negotiation.
    pub fn status(&self) -> Option<StatusCode> {
        match self.inner.kind {
            Kind::Rejected(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("scom_auth::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref url) = self.inner.url {
            builder.field("url", &url.as_str());
        }
        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.kind {
            Kind::Builder => f.write_str("builder error")?,
            Kind::Transport => f.write_str("error sending request")?,
            Kind::Timeout => f.write_str("negotiation timed out")?,
            Kind::Rejected(ref code) => {
                write!(f, "authentication rejected with HTTP status {code}")?;
            }
            Kind::Incomplete(what) => {
                write!(f, "session credentials incomplete: {what} missing")?;
            }
            Kind::Decode => f.write_str("malformed CSRF token cookie")?,
            Kind::Negotiate => f.write_str("NTLM negotiation failed")?,
            Kind::Config => f.write_str("invalid settings")?,
        }

        if let Some(url) = &self.inner.url {
            write!(f, " for url ({url})")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

#[derive(Debug)]
pub(crate) enum Kind {
    Builder,
    Transport,
    Timeout,
    Rejected(StatusCode),
    Incomplete(&'static str),
    Decode,
    Negotiate,
    Config,
}

// constructors

pub(crate) fn builder<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Builder, Some(e))
}

/// Classifies a failure reported by the HTTP transport.
pub(crate) fn request(e: reqwest::Error) -> Error {
    let kind = if e.is_timeout() {
        Kind::Timeout
    } else if e.is_builder() {
        Kind::Builder
    } else {
        Kind::Transport
    };
    // reqwest attaches the request url itself; keep ours as the only copy
    Error::new(kind, Some(e.without_url()))
}

pub(crate) fn timeout(url: Url) -> Error {
    Error::new(Kind::Timeout, Some(TimedOut)).with_url(url)
}

pub(crate) fn rejected(url: Url, status: StatusCode) -> Error {
    Error::new(Kind::Rejected(status), None::<Error>).with_url(url)
}

pub(crate) fn incomplete(url: Url, what: &'static str) -> Error {
    Error::new(Kind::Incomplete(what), None::<Error>).with_url(url)
}

pub(crate) fn decode<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Decode, Some(e))
}

pub(crate) fn negotiate<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Negotiate, Some(e))
}

/// Keeps a crate error raised by a responder as it is.
pub(crate) fn responder(e: BoxError) -> Error {
    match e.downcast::<Error>() {
        Ok(err) => *err,
        Err(e) => Error::new(Kind::Negotiate, Some(e)),
    }
}

pub(crate) fn config<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Config, Some(e))
}

#[derive(Debug)]
pub(crate) struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("operation timed out")
    }
}

impl StdError for TimedOut {}

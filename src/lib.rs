#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # scom-auth
//!
//! Session negotiation for the Operations Manager web console API.
//!
//! The console API authenticates with NTLM over HTTP and then hands out three
//! artifacts that every later API call needs:
//!
//! - a session cookie (`SCOMSessionId=...`), sent back as the `Cookie` header,
//! - a CSRF token, echoed in the `SCOM-CSRF-TOKEN` header,
//! - a basic token, `base64(principal:secret)`, for endpoints accepting Basic.
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), scom_auth::Error> {
//! let negotiator = scom_auth::Negotiator::builder("https://scom.contoso.com").build()?;
//! let credentials = scom_auth::Credentials::new("CONTOSO\\operator", "secret");
//!
//! let tokens = negotiator.negotiate(&credentials).await?;
//! println!("{}", tokens.session_cookie());
//! # Ok(())
//! # }
//! ```
//!
//! A [`Negotiator`] keeps no state between calls. Use a [`Session`] to reuse a
//! bundle across many API calls and re-negotiate when the server rejects it.
//!
//! ## Errors
//!
//! Every failure is classified so the caller can decide what to do:
//! [`Error::is_transport`] failures may be retried with backoff,
//! [`Error::is_rejected`], [`Error::is_incomplete`] and [`Error::is_decode`]
//! are authentication failures that retrying will not fix. Error messages
//! never contain credentials or token values.
//!
//! ## Certificate validation
//!
//! [`NegotiatorBuilder::danger_accept_invalid_certs`] turns certificate
//! validation off for one negotiator. It is never on by default and is logged
//! at `warn` level whenever a transport is built with it.
//!
//! ## Optional Features
//!
//! - **blocking**: Provides the [blocking][] negotiator API.
//!
//! [blocking]: ./blocking/index.html

pub use http::StatusCode;
pub use url::Url;

pub use self::auth::{ChallengeResponder, Credentials, SspiResponder};
pub use self::config::ServerSettings;
pub use self::error::{BoxError, Error, Result};
pub use self::negotiator::{Negotiator, NegotiatorBuilder, AUTHENTICATE_PATH};
pub use self::session::Session;
pub use self::tokens::{TokenBundle, CSRF_COOKIE, CSRF_HEADER, SESSION_COOKIE};

mod auth;
pub mod config;
mod error;
mod negotiator;
mod session;
mod tokens;

#[cfg(feature = "blocking")]
#[cfg_attr(docsrs, doc(cfg(feature = "blocking")))]
pub mod blocking;

/// Negotiates a session once and returns its tokens.
///
/// Shortcut for building a [`Negotiator`] for `server` and calling
/// [`Negotiator::negotiate`]. `skip_tls_verify` disables certificate
/// validation for this call only.
pub async fn negotiate(
    server: &str,
    principal: &str,
    secret: &str,
    skip_tls_verify: bool,
) -> Result<TokenBundle> {
    let negotiator = Negotiator::builder(server)
        .danger_accept_invalid_certs(skip_tls_verify)
        .build()?;
    negotiator
        .negotiate(&Credentials::new(principal, secret))
        .await
}

fn _assert_impls() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    fn assert_clone<T: Clone>() {}

    assert_send::<Negotiator>();
    assert_sync::<Negotiator>();
    assert_clone::<Negotiator>();

    assert_send::<Session>();
    assert_sync::<Session>();

    assert_send::<TokenBundle>();
    assert_clone::<TokenBundle>();

    assert_send::<Error>();
    assert_sync::<Error>();
}

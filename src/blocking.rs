//! A blocking negotiator.
//!
//! The blocking `Negotiator` drives the async one on a private current-thread
//! runtime. It must not be used from within an async runtime; doing so panics
//! when the runtime is entered twice.
//!
//! # Optional
//!
//! This requires the optional `blocking` feature to be enabled.

use std::fmt;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::auth::Credentials;
use crate::error::{self, Result};
use crate::tokens::TokenBundle;

/// Synchronous counterpart of [`crate::Negotiator`].
pub struct Negotiator {
    inner: crate::Negotiator,
    rt: Runtime,
}

impl Negotiator {
    pub fn new(inner: crate::Negotiator) -> Result<Negotiator> {
        let rt = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(error::builder)?;
        Ok(Negotiator { inner, rt })
    }

    /// Blocks until the negotiation completes. See [`crate::Negotiator::negotiate`].
    pub fn negotiate(&self, credentials: &Credentials) -> Result<TokenBundle> {
        self.rt.block_on(self.inner.negotiate(credentials))
    }

    /// Blocks for at most `timeout`.
    pub fn negotiate_timeout(&self, credentials: &Credentials, timeout: Duration) -> Result<TokenBundle> {
        self.rt.block_on(async {
            let deadline = tokio::time::Instant::now() + timeout;
            self.inner.negotiate_until(credentials, deadline).await
        })
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("blocking::Negotiator")
            .field("inner", &self.inner)
            .finish()
    }
}

/// One-shot negotiation: `server` base address, principal and secret, and
/// whether certificate validation is skipped.
pub fn negotiate(
    server: &str,
    principal: &str,
    secret: &str,
    skip_tls_verify: bool,
) -> Result<TokenBundle> {
    let negotiator = crate::Negotiator::builder(server)
        .danger_accept_invalid_certs(skip_tls_verify)
        .build()?;
    Negotiator::new(negotiator)?.negotiate(&Credentials::new(principal, secret))
}

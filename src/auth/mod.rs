// src/auth/mod.rs

//! Credentials and the HTTP authentication handshake.
//!
//! The handshake itself lives in [`negotiate`]; the NTLM messages it carries
//! come from a [`ChallengeResponder`], by default the `sspi` NTLM package.

mod negotiate;
mod ntlm;

pub(crate) use negotiate::{derive_spn, execute_with_negotiate};
pub use ntlm::{ChallengeResponder, SspiResponder};

use std::fmt;

use base64::Engine as _;

/// The principal and secret used for one negotiation.
///
/// The principal may be a bare account name, `DOMAIN\user` or
/// `user@domain`. The secret is never printed by `Debug`.
#[derive(Clone)]
pub struct Credentials {
    principal: String,
    secret: String,
}

impl Credentials {
    /// Empty values are accepted; the server decides whether they are valid.
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: secret.into(),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }

    /// Base64 of `principal:secret`, usable as an HTTP Basic credential.
    ///
    /// Deterministic in its inputs; it proves nothing about the server.
    pub fn basic_token(&self) -> String {
        let pair = format!("{}:{}", self.principal, self.secret);
        base64::engine::general_purpose::STANDARD.encode(pair.as_bytes())
    }

    /// The request body of the authenticate call: the base64 of
    /// `AuthenticationMode:<principal>:<secret>` wrapped in single quotes.
    pub(crate) fn authentication_payload(&self) -> String {
        let raw = format!("AuthenticationMode:{}:{}", self.principal, self.secret);
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw.as_bytes());
        format!("'{}'", encoded)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"[redacted]")
            .finish()
    }
}

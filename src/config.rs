//! Server settings as stored with a plugin instance.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::auth::Credentials;
use crate::error::{self, Result};
use crate::negotiator::{Negotiator, NegotiatorBuilder};

/// Key of the password in the decrypted secure settings.
pub const PASSWORD_KEY: &str = "password";

/// Connection settings of one server.
///
/// Deserialized from the instance JSON:
///
/// ```json
/// { "url": "https://scom.contoso.com", "userName": "CONTOSO\\svc", "isSkipTlsVerifyCheck": false }
/// ```
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub is_skip_tls_verify_check: bool,
}

impl ServerSettings {
    /// Parses the instance JSON, without secrets.
    pub fn from_json(json: &[u8]) -> Result<ServerSettings> {
        let settings: ServerSettings = serde_json::from_slice(json).map_err(error::config)?;
        if settings.url.trim().is_empty() {
            return Err(error::config("server url is not set"));
        }
        Ok(settings)
    }

    /// Parses the instance JSON and takes the password from the decrypted
    /// secure settings, which win over a password in the JSON.
    pub fn from_instance(json: &[u8], secure: &HashMap<String, String>) -> Result<ServerSettings> {
        let mut settings = ServerSettings::from_json(json)?;
        if let Some(password) = secure.get(PASSWORD_KEY) {
            settings.password = Some(password.clone());
        }
        Ok(settings)
    }

    /// Credentials for negotiation; a missing password is sent empty.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.user_name.clone(),
            self.password.clone().unwrap_or_default(),
        )
    }

    /// A builder preconfigured with the address and the TLS switch.
    pub fn negotiator_builder(&self) -> NegotiatorBuilder {
        Negotiator::builder(self.url.clone())
            .danger_accept_invalid_certs(self.is_skip_tls_verify_check)
    }

    pub fn negotiator(&self) -> Result<Negotiator> {
        self.negotiator_builder().build()
    }
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("url", &self.url)
            .field("user_name", &self.user_name)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("is_skip_tls_verify_check", &self.is_skip_tls_verify_check)
            .finish()
    }
}

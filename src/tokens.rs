//! The artifacts of a successful negotiation.

use std::fmt;

use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};

use crate::auth::Credentials;
use crate::error::{self, Result};

/// Name of the cookie carrying the server-assigned session identifier.
pub const SESSION_COOKIE: &str = "SCOMSessionId";

/// Name of the anti-forgery cookie set by the server.
pub const CSRF_COOKIE: &str = "SCOM-CSRF-TOKEN";

/// Header echoing the anti-forgery token on subsequent API calls.
pub const CSRF_HEADER: &str = "SCOM-CSRF-TOKEN";

/// Session cookie, CSRF token and basic token of one successful negotiation.
///
/// A `TokenBundle` only exists as a whole: both server-asserted values are
/// non-empty and valid header values.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenBundle {
    session_cookie: String,
    csrf_token: String,
    basic_token: String,
    cookie_header: HeaderValue,
    csrf_header: HeaderValue,
}

impl TokenBundle {
    /// Scans the `Set-Cookie` headers of the authenticate response.
    ///
    /// When a cookie name repeats, the last header wins. Values lose their
    /// surrounding double quotes, as in `name="value"`.
    pub(crate) fn from_headers(
        headers: &HeaderMap,
        credentials: &Credentials,
    ) -> std::result::Result<TokenBundle, Missing> {
        let mut session_id = None;
        let mut csrf_encoded = None;

        for value in headers.get_all(SET_COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            let Ok(cookie) = cookie_crate::Cookie::parse(value) else {
                continue;
            };

            match cookie.name() {
                SESSION_COOKIE => session_id = Some(cookie.value_trimmed().to_owned()),
                CSRF_COOKIE => csrf_encoded = Some(cookie.value_trimmed().to_owned()),
                _ => {}
            }
        }

        let csrf_token = match csrf_encoded {
            Some(raw) => query_unescape(&raw).map_err(Missing::Malformed)?,
            None => String::new(),
        };
        let session_id = session_id.unwrap_or_default();

        match (session_id.is_empty(), csrf_token.is_empty()) {
            (true, true) => Err(Missing::Both),
            (true, false) => Err(Missing::Session),
            (false, true) => Err(Missing::Csrf),
            (false, false) => {
                let session_cookie = format!("{}={}", SESSION_COOKIE, session_id);
                let cookie_header = sensitive(&session_cookie).map_err(Missing::Malformed)?;
                let csrf_header = sensitive(&csrf_token).map_err(Missing::Malformed)?;
                Ok(TokenBundle {
                    session_cookie,
                    csrf_token,
                    basic_token: credentials.basic_token(),
                    cookie_header,
                    csrf_header,
                })
            }
        }
    }

    /// The `name=value` pair ready to be sent as a `Cookie` header.
    pub fn session_cookie(&self) -> &str {
        &self.session_cookie
    }

    /// The unescaped anti-forgery token.
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Base64 of `principal:secret`.
    pub fn basic_token(&self) -> &str {
        &self.basic_token
    }

    /// `Basic <basic_token>`, for endpoints that accept Basic authentication.
    pub fn basic_authorization(&self) -> String {
        format!("Basic {}", self.basic_token)
    }

    /// Attaches the session cookie and the CSRF header to a downstream request.
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(COOKIE, self.cookie_header.clone())
            .header(CSRF_HEADER, self.csrf_header.clone())
    }
}

impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("session_cookie", &"[redacted]")
            .field("csrf_token", &"[redacted]")
            .field("basic_token", &"[redacted]")
            .finish()
    }
}

// Tokens are echoed in request headers, so control characters and
// non-ASCII text make them unusable.
fn sensitive(value: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value).map_err(error::decode)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Why a `200 OK` did not yield a bundle.
#[derive(Debug)]
pub(crate) enum Missing {
    Session,
    Csrf,
    Both,
    Malformed(error::Error),
}

impl Missing {
    pub(crate) fn into_error(self, url: url::Url) -> error::Error {
        match self {
            Missing::Session => error::incomplete(url, "session cookie"),
            Missing::Csrf => error::incomplete(url, "CSRF token"),
            Missing::Both => error::incomplete(url, "session cookie and CSRF token"),
            Missing::Malformed(err) => err.with_url(url),
        }
    }
}

/// Query-string unescaping: `+` is a space and every `%` must start a valid
/// `%XX` escape. The result must be UTF-8.
pub(crate) fn query_unescape(raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .map_or(false, |hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(error::decode(format!("invalid escape at byte {}", i)));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = raw.replace('+', " ");
    percent_encoding::percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(error::decode)
}

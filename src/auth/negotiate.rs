// src/auth/negotiate.rs

//! HTTP challenge/response driver for NTLM authentication.
//!
//! Implements the connection-oriented NTLM handshake carried by the HTTP
//! "Negotiate" and "NTLM" schemes (RFC 4559, MS-NTHT), with a Basic attempt
//! for servers that don't ask for NTLM up front:
//!
//! 1. the request is sent anonymously;
//! 2. a `401` offering neither `Negotiate` nor `NTLM` is answered once with
//!    `Basic`; if that is refused with an NTLM offer the handshake goes on;
//! 3. a `401` offering `Negotiate` or `NTLM` is answered with a NEGOTIATE_MESSAGE;
//! 4. the server's CHALLENGE_MESSAGE is answered with an AUTHENTICATE_MESSAGE,
//!    and the response to that is the result.
//!
//! NTLM authenticates the connection, so every intermediate response body is
//! drained to hand the connection back to the pool for the next leg.

use std::fmt;
use std::future::Future;

use base64::Engine as _;
use http::{HeaderMap, HeaderValue, StatusCode};
use reqwest::{Request, Response};

use super::{ChallengeResponder, Credentials};
use crate::error::{self, BoxError, Result};

/// Derive the Service Principal Name (SPN) from a URL.
///
/// For HTTP authentication, the SPN format is "HTTP/<hostname>".
///
/// # Examples
/// ```ignore
/// assert_eq!(derive_spn("http://example.com/path"), Ok("HTTP/example.com"));
/// assert_eq!(derive_spn("https://server.corp.com:8080/"), Ok("HTTP/server.corp.com"));
/// ```
pub(crate) fn derive_spn(url: &url::Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| error::builder("URL has no host for SPN"))?;

    Ok(format!("HTTP/{}", host))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scheme {
    Negotiate,
    Ntlm,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Negotiate => f.write_str("Negotiate"),
            Scheme::Ntlm => f.write_str("NTLM"),
        }
    }
}

/// NTLM challenges offered in the `WWW-Authenticate` headers of one response.
///
/// `Some(None)` for the bare scheme, `Some(Some(token))` when the scheme
/// carries a base64 token.
#[derive(Debug, Default, PartialEq)]
struct Challenges {
    negotiate: Option<Option<Vec<u8>>>,
    ntlm: Option<Option<Vec<u8>>>,
}

impl Challenges {
    /// Negotiate is preferred: IIS lists it first and accepts raw NTLM in it.
    fn ntlm_scheme(&self) -> Option<Scheme> {
        if self.negotiate.is_some() {
            Some(Scheme::Negotiate)
        } else if self.ntlm.is_some() {
            Some(Scheme::Ntlm)
        } else {
            None
        }
    }

    fn token(self, scheme: Scheme) -> Option<Vec<u8>> {
        match scheme {
            Scheme::Negotiate => self.negotiate.flatten(),
            Scheme::Ntlm => self.ntlm.flatten(),
        }
    }
}

/// Parse WWW-Authenticate headers, including comma-joined challenge lists.
fn parse_www_authenticate(headers: &HeaderMap) -> Challenges {
    let mut challenges = Challenges::default();

    for value in headers.get_all(http::header::WWW_AUTHENTICATE) {
        let Ok(value_str) = value.to_str() else {
            continue;
        };

        for part in value_str.split(',') {
            let part = part.trim();
            let (scheme, param) = match part.split_once(' ') {
                Some((scheme, param)) => (scheme, param.trim()),
                None => (part, ""),
            };

            if scheme.eq_ignore_ascii_case("negotiate") {
                challenges.negotiate = Some(decode_token(param));
            } else if scheme.eq_ignore_ascii_case("ntlm") {
                challenges.ntlm = Some(decode_token(param));
            }
        }
    }

    challenges
}

fn decode_token(param: &str) -> Option<Vec<u8>> {
    if param.is_empty() {
        return None;
    }
    base64::engine::general_purpose::STANDARD.decode(param).ok()
}

/// Execute a request, answering the server's `401` challenges.
///
/// `responder` is only invoked once the server actually asks for NTLM.
/// Any other response, including a `401` refusing Basic without an NTLM
/// offer, is returned unchanged for the caller to classify.
pub(crate) async fn execute_with_negotiate<F, Fut, R>(
    mut request: Request,
    creds: &Credentials,
    responder: R,
    mut execute_fn: F,
) -> Result<Response>
where
    F: FnMut(Request) -> Fut,
    Fut: Future<Output = Result<Response>>,
    R: FnOnce() -> std::result::Result<Box<dyn ChallengeResponder>, BoxError>,
{
    let original_request = request.try_clone().ok_or_else(|| {
        error::negotiate("request body is not replayable for NTLM authentication")
    })?;

    // Anonymous first; the server may still consider the connection authenticated.
    request.headers_mut().remove(http::header::AUTHORIZATION);
    let mut response = execute_fn(request).await?;

    if response.status() != StatusCode::UNAUTHORIZED {
        return Ok(response);
    }

    if parse_www_authenticate(response.headers()).ntlm_scheme().is_none() {
        log::debug!("401 without an NTLM offer, trying Basic");
        drain(response).await;
        response = try_basic_auth(&original_request, creds, &mut execute_fn).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
    }

    let Some(scheme) = parse_www_authenticate(response.headers()).ntlm_scheme() else {
        log::debug!("Basic refused without an NTLM offer");
        return Ok(response);
    };

    log::debug!("server offered {} authentication", scheme);
    drain(response).await;
    let mut responder = responder().map_err(error::responder)?;
    try_ntlm_auth(&original_request, scheme, responder.as_mut(), &mut execute_fn).await
}

/// NEGOTIATE_MESSAGE, then AUTHENTICATE_MESSAGE on the same connection.
async fn try_ntlm_auth<F, Fut>(
    original_request: &Request,
    scheme: Scheme,
    responder: &mut dyn ChallengeResponder,
    execute_fn: &mut F,
) -> Result<Response>
where
    F: FnMut(Request) -> Fut,
    Fut: Future<Output = Result<Response>>,
{
    let negotiate_message = responder.negotiate_message().map_err(error::responder)?;
    let response = execute_fn(authorized(original_request, scheme, &negotiate_message)?).await?;

    if response.status() != StatusCode::UNAUTHORIZED {
        log::debug!("{} negotiate leg answered {}", scheme, response.status());
        return Ok(response);
    }

    let Some(challenge) = parse_www_authenticate(response.headers()).token(scheme) else {
        log::debug!("{} negotiate leg answered 401 without a challenge token", scheme);
        return Ok(response);
    };
    drain(response).await;

    let authenticate_message = responder
        .authenticate_message(&challenge)
        .map_err(error::responder)?;
    let response =
        execute_fn(authorized(original_request, scheme, &authenticate_message)?).await?;
    log::debug!("{} authenticate leg answered {}", scheme, response.status());

    Ok(response)
}

/// Resend with `Authorization: Basic <basic token>`.
async fn try_basic_auth<F, Fut>(
    original_request: &Request,
    creds: &Credentials,
    execute_fn: &mut F,
) -> Result<Response>
where
    F: FnMut(Request) -> Fut,
    Fut: Future<Output = Result<Response>>,
{
    let mut auth_request = original_request
        .try_clone()
        .ok_or_else(|| error::negotiate("request not clonable"))?;

    let mut value = HeaderValue::from_str(&format!("Basic {}", creds.basic_token()))
        .map_err(|_| error::negotiate("invalid authorization header"))?;
    value.set_sensitive(true);
    auth_request
        .headers_mut()
        .insert(http::header::AUTHORIZATION, value);

    execute_fn(auth_request).await
}

fn authorized(original_request: &Request, scheme: Scheme, token: &[u8]) -> Result<Request> {
    let mut auth_request = original_request
        .try_clone()
        .ok_or_else(|| error::negotiate("request not clonable"))?;

    let token_base64 = base64::engine::general_purpose::STANDARD.encode(token);
    let mut value = HeaderValue::from_str(&format!("{} {}", scheme, token_base64))
        .map_err(|_| error::negotiate("invalid authorization header"))?;
    value.set_sensitive(true);
    auth_request
        .headers_mut()
        .insert(http::header::AUTHORIZATION, value);

    Ok(auth_request)
}

// An unread body closes the connection the next leg must reuse.
async fn drain(response: Response) {
    let _ = response.bytes().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_spn() {
        let url = url::Url::parse("http://example.com/path").unwrap();
        assert_eq!(derive_spn(&url).unwrap(), "HTTP/example.com");

        let url = url::Url::parse("https://server.corp.com:8080/api").unwrap();
        assert_eq!(derive_spn(&url).unwrap(), "HTTP/server.corp.com");
    }

    #[test]
    fn test_parse_www_authenticate_negotiate() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Negotiate"),
        );

        let challenges = parse_www_authenticate(&headers);
        assert_eq!(challenges.negotiate, Some(None));
        assert_eq!(challenges.ntlm_scheme(), Some(Scheme::Negotiate));
    }

    #[test]
    fn test_parse_www_authenticate_with_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("NTLM TlRMTVNTUAACAAAA"),
        );

        let challenges = parse_www_authenticate(&headers);
        assert_eq!(
            challenges.token(Scheme::Ntlm).as_deref(),
            Some(&b"NTLMSSP\0\x02\0\0\0"[..])
        );
    }

    #[test]
    fn test_parse_www_authenticate_basic() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"test\""),
        );

        let challenges = parse_www_authenticate(&headers);
        assert_eq!(challenges, Challenges::default());
        assert_eq!(challenges.ntlm_scheme(), None);
    }

    #[test]
    fn test_parse_www_authenticate_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("NTLM"),
        );
        headers.append(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Negotiate"),
        );
        headers.append(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"test\""),
        );

        let challenges = parse_www_authenticate(&headers);
        assert_eq!(challenges.negotiate, Some(None));
        assert_eq!(challenges.ntlm, Some(None));
        assert_eq!(challenges.ntlm_scheme(), Some(Scheme::Negotiate));
    }

    #[test]
    fn test_parse_www_authenticate_comma_joined() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("NTLM, Basic realm=\"scom, east\""),
        );

        let challenges = parse_www_authenticate(&headers);
        assert_eq!(challenges.ntlm, Some(None));
        assert_eq!(challenges.negotiate, None);
    }

    #[test]
    fn test_parse_www_authenticate_invalid_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static("NTLM not*base64"),
        );

        let challenges = parse_www_authenticate(&headers);
        assert_eq!(challenges.ntlm, Some(None));
    }
}

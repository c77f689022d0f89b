mod support;
use support::server;

use std::time::Duration;

use http::StatusCode;
use scom_auth::Credentials;

fn scom_console(delay: Duration) -> server::Server {
    server::http(move |_req| async move {
        tokio::time::sleep(delay).await;
        server::response(
            StatusCode::OK,
            &["SCOMSessionId=blocking", "SCOM-CSRF-TOKEN=a%20b"],
            "",
        )
    })
}

#[test]
fn test_blocking_negotiate() {
    support::init_logging();
    let server = scom_console(Duration::ZERO);

    let tokens = scom_auth::blocking::negotiate(&server.url(), "alice", "wonderland", false).unwrap();

    assert_eq!(tokens.session_cookie(), "SCOMSessionId=blocking");
    assert_eq!(tokens.csrf_token(), "a b");
    assert_eq!(tokens.basic_token(), "YWxpY2U6d29uZGVybGFuZA==");
}

#[test]
fn test_blocking_negotiator_is_reusable() {
    let server = scom_console(Duration::ZERO);

    let negotiator = scom_auth::blocking::Negotiator::new(
        scom_auth::Negotiator::builder(server.url()).build().unwrap(),
    )
    .unwrap();
    let credentials = Credentials::new("alice", "wonderland");

    let first = negotiator.negotiate(&credentials).unwrap();
    let second = negotiator.negotiate(&credentials).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_blocking_timeout() {
    let server = scom_console(Duration::from_secs(5));

    let negotiator = scom_auth::blocking::Negotiator::new(
        scom_auth::Negotiator::builder(server.url()).build().unwrap(),
    )
    .unwrap();

    let err = negotiator
        .negotiate_timeout(&Credentials::new("alice", "wonderland"), Duration::from_millis(100))
        .unwrap_err();
    assert!(err.is_timeout());
}

#[test]
fn test_blocking_rejected() {
    let server = server::http(|_req| async {
        server::response(StatusCode::SERVICE_UNAVAILABLE, &[], "")
    });

    let err = scom_auth::blocking::negotiate(&server.url(), "alice", "wonderland", false).unwrap_err();
    assert!(err.is_rejected());
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
}

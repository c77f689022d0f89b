//! Negotiates a session with an Operations Manager server and, optionally,
//! calls one API path with it.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example negotiate_scom -- https://scom.contoso.com --username 'CONTOSO\operator' --password s3cret
//! ```
//!
//! Against a lab server with a self-signed certificate, calling the alert API:
//!
//! ```bash
//! RUST_LOG=scom_auth=debug cargo run --example negotiate_scom -- https://scom-lab:443 \
//!     --username 'LAB\svc' --password s3cret --insecure --get /OperationsManager/data/alert
//! ```

use scom_auth::{Credentials, Negotiator, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: negotiate_scom <url> [OPTIONS]");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  --username <user>    Account, e.g. DOMAIN\\user");
        eprintln!("  --password <pass>    Password of the account");
        eprintln!("  --insecure           Skip TLS certificate verification");
        eprintln!("  --get <path>         Call an API path with the negotiated session");
        std::process::exit(1);
    }

    let url = &args[1];
    let option = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let insecure = args.iter().any(|a| a == "--insecure");
    let credentials = Credentials::new(
        option("--username").unwrap_or_default(),
        option("--password").unwrap_or_default(),
    );

    let negotiator = Negotiator::builder(url.as_str())
        .danger_accept_invalid_certs(insecure)
        .build()?;

    println!("=== SCOM session negotiation ===");
    println!("Endpoint: {}", negotiator.endpoint());
    println!("Account:  {}", credentials.principal());

    let Some(path) = option("--get") else {
        let tokens = negotiator.negotiate(&credentials).await?;
        // values are secrets; only show that they were handed out
        println!("\nSession cookie: {} bytes", tokens.session_cookie().len());
        println!("CSRF token:     {} bytes", tokens.csrf_token().len());
        println!("Basic token:    {} bytes", tokens.basic_token().len());
        return Ok(());
    };

    let session = Session::new(negotiator, credentials)?;
    let target = session.url(&path)?;
    println!("\nGET {}", target);

    let resp = session.send(|client| client.get(target.clone())).await?;
    println!("Status: {}", resp.status());

    let body = resp.text().await?;
    println!("\nBody ({} bytes):", body.len());
    if body.len() <= 1000 {
        println!("{}", body);
    } else {
        let cut = (0..=1000).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
        println!("{}... (truncated)", &body[..cut]);
    }

    Ok(())
}

use std::convert::Infallible;
use std::future::Future;
use std::net;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;

pub type Response = http::Response<Full<Bytes>>;

pub struct Server {
    addr: net::SocketAddr,
    scheme: &'static str,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Server {
    pub fn addr(&self) -> net::SocketAddr {
        self.addr
    }

    /// Base address, as handed to a negotiator.
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme, self.addr)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Plain HTTP/1.1 server on an ephemeral port.
pub fn http<F, Fut>(func: F) -> Server
where
    F: Fn(http::Request<Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    serve(func, None)
}

/// HTTPS server presenting a freshly generated self-signed certificate.
pub fn https_self_signed<F, Fut>(func: F) -> Server
where
    F: Fn(http::Request<Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    serve(func, Some(self_signed_acceptor()))
}

fn serve<F, Fut>(func: F, tls: Option<TlsAcceptor>) -> Server
where
    F: Fn(http::Request<Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let test_name = thread::current().name().unwrap_or("<unknown>").to_string();
    let scheme = if tls.is_some() { "https" } else { "http" };

    // a runtime can't be started from within the caller's #[tokio::test] one
    let (rt, listener, addr) = thread::spawn(|| {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("new rt");
        let listener = rt
            .block_on(TcpListener::bind(net::SocketAddr::from(([127, 0, 0, 1], 0))))
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        (rt, listener, addr)
    })
    .join()
    .expect("runtime thread");

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    thread::Builder::new()
        .name(format!("test({})-support-server", test_name))
        .spawn(move || {
            rt.block_on(async move {
                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => break,
                        accepted = listener.accept() => {
                            let Ok((stream, _)) = accepted else {
                                continue;
                            };
                            let func = func.clone();
                            let tls = tls.clone();
                            tokio::spawn(async move {
                                let service = hyper::service::service_fn(move |req| {
                                    let fut = func(req);
                                    async move { Ok::<_, Infallible>(fut.await) }
                                });
                                let http = hyper::server::conn::http1::Builder::new();
                                match tls {
                                    Some(acceptor) => {
                                        let Ok(stream) = acceptor.accept(stream).await else {
                                            return;
                                        };
                                        let _ = http.serve_connection(TokioIo::new(stream), service).await;
                                    }
                                    None => {
                                        let _ = http.serve_connection(TokioIo::new(stream), service).await;
                                    }
                                }
                            });
                        }
                    }
                }
            });
        })
        .expect("thread spawn");

    Server {
        addr,
        scheme,
        shutdown_tx: Some(shutdown_tx),
    }
}

fn self_signed_acceptor() -> TlsAcceptor {
    let rcgen::CertifiedKey { cert, signing_key } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("self-signed certificate");
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(signing_key.serialize_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("protocol versions")
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .expect("server certificate");
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    TlsAcceptor::from(Arc::new(config))
}

/// Builds a response with the given status, `Set-Cookie` headers and body.
pub fn response(status: http::StatusCode, cookies: &[&str], body: &'static str) -> Response {
    let mut builder = http::Response::builder().status(status);
    for cookie in cookies {
        builder = builder.header(http::header::SET_COOKIE, *cookie);
    }
    builder.body(body.into()).unwrap()
}

//! Transport to the Grendel inventory API.
//!
//! The API is either reachable over HTTP(S) or through a local unix domain
//! socket. [`TransportBuilder`] picks the shape from the configured endpoint
//! and wraps it into a [`RetryingClient`].
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use http::Uri;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::Config;

mod connector;
mod error;
mod retry;
mod tls;

pub use connector::{InventoryConnector, InventoryStream, UnixConnector};
pub use error::Error;
pub use retry::{RetryPolicy, RetryingClient};

/// Authority used for requests sent over a unix socket. The connector ignores it.
const UNIX_SOCKET_AUTHORITY: &str = "http://localhost";

/// Where the inventory API lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// An `http://` or `https://` base URL.
    Url(String),
    /// Anything else is taken as the path of a unix domain socket.
    UnixSocket(PathBuf),
}

impl Endpoint {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.trim_end_matches('/').to_owned())
        } else {
            Self::UnixSocket(PathBuf::from(raw))
        }
    }

    fn base(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::UnixSocket(_) => UNIX_SOCKET_AUTHORITY,
        }
    }
}

/// Builds the long-lived [`Transport`] used by the discoverer.
#[derive(Debug, Clone)]
pub struct TransportBuilder {
    endpoint: Endpoint,
    ca_path: Option<PathBuf>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl TransportBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: Endpoint::parse(&config.endpoint),
            ca_path: config.ca_path.clone(),
            policy: RetryPolicy {
                retry_max: config.retry_max,
                ..RetryPolicy::default()
            },
            timeout: config.request_timeout(),
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Fails only if a readable CA bundle contains no valid certificate, or the
    /// TLS stack refuses its default protocol versions.
    pub fn build(self) -> Result<Transport, Error> {
        let tls = tls::client_config(self.ca_path.as_deref())?;

        let inner = match &self.endpoint {
            Endpoint::Url(_) => InventoryConnector::tcp(),
            Endpoint::UnixSocket(path) => {
                log::debug!("Using unix socket `{}`", path.display());
                InventoryConnector::unix(path)
            }
        };
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(inner);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Transport {
            endpoint: self.endpoint,
            client: RetryingClient::new(client, self.policy, self.timeout),
        })
    }
}

/// A resilient client bound to one inventory endpoint.
#[derive(Debug, Clone)]
pub struct Transport {
    endpoint: Endpoint,
    client: RetryingClient,
}

impl Transport {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn client(&self) -> &RetryingClient {
        &self.client
    }

    /// Resolves an API path against the endpoint.
    pub fn uri_for(&self, path: &str) -> Result<Uri, Error> {
        let uri = format!("{}{}", self.endpoint.base(), path);
        uri.parse::<Uri>()
            .map_err(|source| Error::InvalidUri { uri, source })
    }

    /// Fetches `path` and returns the raw response body.
    pub async fn get(&self, path: &str) -> Result<Bytes, Error> {
        let uri = self.uri_for(path)?;
        self.client.get(&uri).await
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;
    use http_body_util::Full;
    use hyper_util::rt::TokioIo;
    use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

    use super::*;

    const HOST_LIST: &str = r#"[{"name":"cpn-01","interfaces":[{"ip":"10.0.0.5","bmc":false}]}]"#;

    fn fast_policy(retry_max: u32) -> RetryPolicy {
        RetryPolicy {
            retry_max,
            wait_min: Duration::from_millis(5),
            wait_max: Duration::from_millis(20),
        }
    }

    fn config(endpoint: impl Into<String>, ca_path: Option<PathBuf>) -> Config {
        Config {
            endpoint: endpoint.into(),
            ca_path,
            ..Config::default()
        }
    }

    fn build_transport(config: &Config, retry_max: u32) -> Transport {
        TransportBuilder::new(config)
            .retry_policy(fast_policy(retry_max))
            .request_timeout(Duration::from_secs(5))
            .build()
            .expect("transport should build")
    }

    fn host_list_router() -> Router {
        Router::new().route("/v1/host/list", get(|| async { HOST_LIST }))
    }

    async fn spawn_tcp_server(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        addr
    }

    struct TestPki {
        ca_pem: String,
        server_cert: CertificateDer<'static>,
        server_key: Vec<u8>,
    }

    fn test_pki() -> TestPki {
        let ca_key = rcgen::KeyPair::generate().unwrap();
        let mut ca_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "grendel test ca");
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let server_key = rcgen::KeyPair::generate().unwrap();
        let mut server_params =
            rcgen::CertificateParams::new(vec!["localhost".to_owned()]).unwrap();
        server_params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ServerAuth];
        let server_cert = server_params
            .signed_by(&server_key, &ca_cert, &ca_key)
            .unwrap();

        TestPki {
            ca_pem: ca_cert.pem(),
            server_cert: server_cert.der().clone(),
            server_key: server_key.serialize_der(),
        }
    }

    async fn spawn_tls_server(pki: &TestPki) -> SocketAddr {
        let server_config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            vec![pki.server_cert.clone()],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pki.server_key.clone())),
        )
        .unwrap();
        let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(server_config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let Ok(stream) = acceptor.accept(stream).await else {
                        return;
                    };
                    let service = hyper::service::service_fn(|_req: hyper::Request<hyper::body::Incoming>| async {
                        Ok::<_, Infallible>(hyper::Response::new(Full::new(Bytes::from_static(
                            HOST_LIST.as_bytes(),
                        ))))
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });
        addr
    }

    fn write_ca(dir: &Path, pem: &str) -> PathBuf {
        let path = dir.join("ca.pem");
        std::fs::write(&path, pem).unwrap();
        path
    }

    #[test]
    fn classifies_endpoints() {
        assert_eq!(
            Endpoint::parse("http://grendel:8080/"),
            Endpoint::Url("http://grendel:8080".to_owned())
        );
        assert_eq!(
            Endpoint::parse("https://grendel"),
            Endpoint::Url("https://grendel".to_owned())
        );
        assert_eq!(
            Endpoint::parse("/var/grendel/grendel-api.socket"),
            Endpoint::UnixSocket(PathBuf::from("/var/grendel/grendel-api.socket"))
        );
        // only the scheme prefix decides
        assert_eq!(
            Endpoint::parse("grendel:8080"),
            Endpoint::UnixSocket(PathBuf::from("grendel:8080"))
        );
    }

    #[test]
    fn builds_request_uris() {
        let transport = build_transport(&config("http://grendel:8080/", None), 0);
        assert_eq!(
            transport.uri_for("/v1/host/list").unwrap(),
            Uri::from_static("http://grendel:8080/v1/host/list")
        );

        let transport = build_transport(&config("/run/grendel.socket", None), 0);
        assert_eq!(
            transport.uri_for("/v1/host/list").unwrap(),
            Uri::from_static("http://localhost/v1/host/list")
        );
    }

    #[test]
    fn builder_takes_settings_from_config() {
        let config = Config {
            retry_max: 7,
            request_timeout_secs: 12,
            ..config("/run/grendel.socket", None)
        };
        let transport = TransportBuilder::new(&config).build().unwrap();
        assert_eq!(transport.client().policy().retry_max, 7);
        assert_eq!(transport.client().timeout(), Duration::from_secs(12));
    }

    #[tokio::test]
    async fn dials_unix_socket_for_non_url_endpoint() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let socket = dir.path().join("grendel-api.socket");
        let listener = tokio::net::UnixListener::bind(&socket).unwrap();
        tokio::spawn(async move { axum::serve(listener, host_list_router()).await.unwrap() });

        let transport = build_transport(&config(socket.to_string_lossy(), None), 0);
        assert_eq!(transport.endpoint(), &Endpoint::UnixSocket(socket));
        let body = transport.get("/v1/host/list").await.unwrap();
        assert_eq!(body, HOST_LIST.as_bytes());
    }

    #[tokio::test]
    async fn fetches_over_plain_http() {
        let addr = spawn_tcp_server(host_list_router()).await;
        let transport = build_transport(&config(format!("http://{addr}"), None), 0);
        let body = transport.get("/v1/host/list").await.unwrap();
        assert_eq!(body, HOST_LIST.as_bytes());
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/v1/host/list",
                get(|State(calls): State<Arc<AtomicUsize>>| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::SERVICE_UNAVAILABLE, "")
                    } else {
                        (StatusCode::OK, HOST_LIST)
                    }
                }),
            )
            .with_state(Arc::clone(&calls));
        let addr = spawn_tcp_server(router).await;

        let transport = build_transport(&config(format!("http://{addr}"), None), 3);
        let body = transport.get("/v1/host/list").await.unwrap();
        assert_eq!(body, HOST_LIST.as_bytes());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retry_max() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/v1/host/list",
                get(|State(calls): State<Arc<AtomicUsize>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    StatusCode::BAD_GATEWAY
                }),
            )
            .with_state(Arc::clone(&calls));
        let addr = spawn_tcp_server(router).await;

        let transport = build_transport(&config(format!("http://{addr}"), None), 2);
        let err = transport.get("/v1/host/list").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Status { status, .. } if status == StatusCode::BAD_GATEWAY
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/v1/host/list",
                get(|State(calls): State<Arc<AtomicUsize>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NOT_FOUND
                }),
            )
            .with_state(Arc::clone(&calls));
        let addr = spawn_tcp_server(router).await;

        let transport = build_transport(&config(format!("http://{addr}"), None), 4);
        let err = transport.get("/v1/host/list").await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn times_out_slow_responses() {
        let router = Router::new().route(
            "/v1/host/list",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                HOST_LIST
            }),
        );
        let addr = spawn_tcp_server(router).await;

        let transport = TransportBuilder::new(&config(format!("http://{addr}"), None))
            .retry_policy(fast_policy(0))
            .request_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let err = transport.get("/v1/host/list").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn verifies_server_against_custom_ca() {
        let pki = test_pki();
        let addr = spawn_tls_server(&pki).await;
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let ca = write_ca(dir.path(), &pki.ca_pem);

        let transport = build_transport(
            &config(format!("https://localhost:{}", addr.port()), Some(ca)),
            0,
        );
        let body = transport.get("/v1/host/list").await.unwrap();
        assert_eq!(body, HOST_LIST.as_bytes());
    }

    #[tokio::test]
    async fn rejects_server_signed_by_other_ca() {
        let pki = test_pki();
        let other = test_pki();
        let addr = spawn_tls_server(&pki).await;
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let ca = write_ca(dir.path(), &other.ca_pem);

        let transport = build_transport(
            &config(format!("https://localhost:{}", addr.port()), Some(ca)),
            3,
        );
        let err = transport.get("/v1/host/list").await.unwrap_err();
        assert!(matches!(err, Error::Request { .. }), "{err:?}");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unreadable_ca_keeps_permissive_default() {
        let pki = test_pki();
        let addr = spawn_tls_server(&pki).await;

        let transport = build_transport(
            &config(
                format!("https://localhost:{}", addr.port()),
                Some(PathBuf::from("/definitely/does/not/exist.pem")),
            ),
            0,
        );
        let body = transport.get("/v1/host/list").await.unwrap();
        assert_eq!(body, HOST_LIST.as_bytes());
    }

    #[test]
    fn malformed_ca_fails_construction() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let ca = write_ca(dir.path(), "not a pem bundle");
        let err = TransportBuilder::new(&config("https://localhost:1", Some(ca)))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCaBundle { .. }));
    }
}

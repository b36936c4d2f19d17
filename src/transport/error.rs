use std::path::PathBuf;
use std::time::Duration;

use http::{StatusCode, Uri};

/// Errors raised while building or using the inventory transport.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read cacert `{path}`: no valid PEM certificate found")]
    InvalidCaBundle { path: PathBuf },
    #[error("failed to configure TLS client: {0}")]
    Tls(#[source] rustls::Error),
    #[error("invalid request uri `{uri}`: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: http::uri::InvalidUri,
    },
    #[error("failed to build request for `{uri}`: {source}")]
    BuildRequest {
        uri: Uri,
        #[source]
        source: http::Error,
    },
    #[error("request to `{uri}` failed: {source}")]
    Request {
        uri: Uri,
        #[source]
        source: hyper_util::client::legacy::Error,
    },
    #[error("failed to read response body from `{uri}`: {source}")]
    Body {
        uri: Uri,
        #[source]
        source: hyper::Error,
    },
    #[error("request to `{uri}` timed out after {timeout:?}")]
    Timeout { uri: Uri, timeout: Duration },
    #[error("unexpected status {status} from `{uri}`")]
    Status { uri: Uri, status: StatusCode },
}

impl Error {
    /// Whether the retrying client should try the request again.
    ///
    /// Connection failures, timeouts, HTTP 429 and 5xx (except 501) are retried.
    /// Certificate verification failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Request { source, .. } => !is_certificate_error(source),
            Error::Body { .. } | Error::Timeout { .. } => true,
            Error::Status { status, .. } => super::retry::is_retryable_status(*status),
            Error::InvalidCaBundle { .. }
            | Error::Tls(_)
            | Error::InvalidUri { .. }
            | Error::BuildRequest { .. } => false,
        }
    }
}

fn is_certificate_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if matches!(
            err.downcast_ref::<rustls::Error>(),
            Some(rustls::Error::InvalidCertificate(_))
        ) {
            return true;
        }
        // io::Error::source() skips the wrapped error, so look inside explicitly.
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.get_ref().is_some_and(|inner| {
                matches!(
                    inner.downcast_ref::<rustls::Error>(),
                    Some(rustls::Error::InvalidCertificate(_))
                )
            }) {
                return true;
            }
        }
        current = err.source();
    }
    false
}

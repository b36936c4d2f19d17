use std::time::Duration;

use bytes::Bytes;
use http::{StatusCode, Uri, header};
use http_body_util::{BodyExt, Empty};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;

use super::Error;
use super::connector::InventoryConnector;

/// Retry behaviour of the [`RetryingClient`].
///
/// The defaults (4 retries, exponential backoff from 1s capped at 30s) follow
/// the usual retryable HTTP client conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_max: u32,
    pub wait_min: Duration,
    pub wait_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_max: 4,
            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.wait_min
            .checked_mul(factor)
            .map_or(self.wait_max, |wait| wait.min(self.wait_max))
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
}

pub(crate) type HttpClient = Client<HttpsConnector<InventoryConnector>, Empty<Bytes>>;

/// HTTP client that retries failed `GET` requests according to a [`RetryPolicy`].
///
/// Every attempt is bounded by `timeout`, covering both the response head and body.
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: HttpClient,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RetryingClient {
    pub(crate) fn new(client: HttpClient, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issues a `GET` request and returns the body of the first successful response.
    pub async fn get(&self, uri: &Uri) -> Result<Bytes, Error> {
        let mut attempt = 0;
        loop {
            let err = match self.attempt(uri).await {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };
            if attempt >= self.policy.retry_max || !err.is_retryable() {
                return Err(err);
            }
            let wait = self.policy.backoff(attempt);
            log::warn!(
                "{} (retrying in {:?}, {} left)",
                err,
                wait,
                self.policy.retry_max - attempt
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, uri: &Uri) -> Result<Bytes, Error> {
        let request = http::Request::get(uri.clone())
            .header(header::ACCEPT, "application/json")
            .body(Empty::new())
            .map_err(|source| Error::BuildRequest {
                uri: uri.clone(),
                source,
            })?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|source| Error::Request {
                    uri: uri.clone(),
                    source,
                })?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|source| Error::Body {
                    uri: uri.clone(),
                    source,
                })?
                .to_bytes();
            if !status.is_success() {
                return Err(Error::Status {
                    uri: uri.clone(),
                    status,
                });
            }
            log::trace!("GET {} -> {} ({} bytes)", uri, status, body.len());
            Ok(body)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout {
                uri: uri.clone(),
                timeout: self.timeout,
            })?
    }
}

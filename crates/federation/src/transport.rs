//! The request transport capability and the plain HTTP base transport.
//!
//! Every decorator in this crate (signing, bearer, proxy fallback, cache,
//! dump) implements [`Transport`] and wraps another one. Transports take the
//! request by value; a decorator that needs the request twice works on
//! [`clone_request`] copies.

#![allow(missing_docs)]

use std::{sync::Arc, time::Duration};

use apclient_common::config::{DEFAULT_USER_AGENT, HttpConfig};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Request, Response, StatusCode,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::warn;

use crate::signature::SignatureError;

/// Idle connections are kept this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Idle connections kept per host.
const POOL_MAX_IDLE_PER_HOST: usize = 20;

/// Error raised below the protocol level: nothing usable came back.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("request body is a stream and cannot be replayed")]
    Unbuffered,
    #[error("Signing failed: {0}")]
    Signature(#[from] SignatureError),
    #[error("Authorization failed: {0}")]
    Authorization(String),
}

/// Sends one request and returns the peer's response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// Transport shared between decorators and clients.
pub type SharedTransport = Arc<dyn Transport>;

#[async_trait]
impl Transport for reqwest::Client {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        Ok(self.execute(request).await?)
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        (**self).send(request).await
    }
}

/// Copy a request, headers and body included.
///
/// Streaming bodies cannot be copied; callers must build requests with
/// in-memory bodies.
pub fn clone_request(request: &Request) -> Result<Request, TransportError> {
    request.try_clone().ok_or(TransportError::Unbuffered)
}

/// Build the base HTTP client.
pub fn http_client(config: &HttpConfig) -> Result<reqwest::Client, TransportError> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .danger_accept_invalid_certs(config.skip_tls_verify)
        .build()?;

    Ok(client)
}

/// Drain a response so its body can be inspected and handed on.
pub(crate) async fn buffer_response(
    response: Response,
) -> Result<(StatusCode, HeaderMap, Bytes), TransportError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;
    Ok((status, headers, body))
}

/// Rebuild a response from buffered parts.
pub(crate) fn rebuild_response(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
    let mut response = axum::http::Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Response::from(response)
}

/// Sets `User-Agent` on requests that carry none.
pub struct UserAgentTransport {
    base: SharedTransport,
    user_agent: HeaderValue,
}

impl UserAgentTransport {
    #[must_use]
    pub fn new(base: SharedTransport, user_agent: &str) -> Self {
        let user_agent = HeaderValue::from_str(user_agent).unwrap_or_else(|e| {
            warn!(user_agent = %user_agent, error = %e, "Invalid user agent, using default");
            HeaderValue::from_static(DEFAULT_USER_AGENT)
        });

        Self { base, user_agent }
    }
}

#[async_trait]
impl Transport for UserAgentTransport {
    async fn send(&self, mut request: Request) -> Result<Response, TransportError> {
        if !request.headers().contains_key(USER_AGENT) {
            request
                .headers_mut()
                .insert(USER_AGENT, self.user_agent.clone());
        }
        self.base.send(request).await
    }
}

//! Proxy fallback transport.
//!
//! Some servers refuse to serve documents to anyone but their own users. When
//! a GET is answered with 401 or 403 and the actor advertises a `proxyUrl`
//! on another host, the fetch is replayed once through that endpoint as a
//! form POST carrying `id=<original URL>`.

use apclient_vocab::Iri;
use async_trait::async_trait;
use reqwest::{
    Method, Request, Response, StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderName, HeaderValue},
};
use tracing::{debug, info};
use url::{Url, form_urlencoded};

use crate::transport::{SharedTransport, Transport, TransportError};

const SIGNATURE: HeaderName = HeaderName::from_static("signature");
const DIGEST: HeaderName = HeaderName::from_static("digest");

/// Transport replaying refused GETs through the actor's proxy endpoint.
pub struct ProxyTransport {
    base: SharedTransport,
    proxy: Url,
}

/// Wrap `base` with proxy fallback when `proxy` is usable.
///
/// Returns `base` itself when no proxy is set or the proxy IRI does not parse.
#[must_use]
pub fn wrap(base: SharedTransport, proxy: Option<&Iri>) -> SharedTransport {
    let Some(proxy) = proxy else {
        return base;
    };
    match proxy.request_url() {
        Ok(proxy) => std::sync::Arc::new(ProxyTransport { base, proxy }),
        Err(e) => {
            debug!(proxy = %proxy, error = %e, "Ignoring unusable proxy endpoint");
            base
        }
    }
}

impl ProxyTransport {
    #[must_use]
    pub const fn new(base: SharedTransport, proxy: Url) -> Self {
        Self { base, proxy }
    }

    /// Proxying is pointless when the proxy lives on the target's own host.
    fn applies_to(&self, url: &Url) -> bool {
        self.proxy.host_str() != url.host_str()
            || self.proxy.port_or_known_default() != url.port_or_known_default()
    }

    fn proxied(&self, original: &Request) -> Request {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("id", original.url().as_str())
            .finish();

        let mut request = Request::new(Method::POST, self.proxy.clone());
        *request.headers_mut() = original.headers().clone();
        *request.timeout_mut() = original.timeout().copied();

        let headers = request.headers_mut();
        // These describe the original exchange, not this one. A signature
        // covers the GET's request target, so the POST goes out unsigned
        for name in [HOST, CONTENT_LENGTH, SIGNATURE, DIGEST] {
            headers.remove(name);
        }
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        *request.body_mut() = Some(body.into());
        request
    }
}

#[async_trait]
impl Transport for ProxyTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        if request.method() != Method::GET || !self.applies_to(request.url()) {
            return self.base.send(request).await;
        }

        let fallback = self.proxied(&request);
        let url = request.url().clone();

        let response = self.base.send(request).await?;
        if !matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(response);
        }

        info!(
            url = %url,
            status = %response.status(),
            proxy = %self.proxy,
            "Fetch refused, retrying through proxy"
        );
        self.base.send(fallback).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::testing::{MockTransport, Outcome, get};
    use reqwest::header::AUTHORIZATION;

    fn proxy_iri() -> Iri {
        Iri::from("https://home.example/proxy")
    }

    #[tokio::test]
    async fn test_forbidden_get_goes_through_proxy_once() {
        let mock = MockTransport::new(vec![
            Outcome::Reply(StatusCode::FORBIDDEN, vec![], ""),
            Outcome::Reply(StatusCode::FORBIDDEN, vec![], ""),
        ]);
        let transport = wrap(mock.clone(), Some(&proxy_iri()));

        let mut request = get("https://remote.example/notes/1");
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let seen = mock.requests();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].method, Method::POST);
        assert_eq!(seen[1].url.as_str(), "https://home.example/proxy");
        assert_eq!(
            seen[1].headers[CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
        assert_eq!(seen[1].headers[AUTHORIZATION], "Bearer abc");
        assert_eq!(
            seen[1].body.as_deref(),
            Some(&b"id=https%3A%2F%2Fremote.example%2Fnotes%2F1"[..])
        );
    }

    #[tokio::test]
    async fn test_proxied_post_drops_get_signature() {
        let mock = MockTransport::new(vec![
            Outcome::Reply(StatusCode::UNAUTHORIZED, vec![], ""),
            Outcome::Reply(StatusCode::OK, vec![], "{}"),
        ]);
        let transport = wrap(mock.clone(), Some(&proxy_iri()));

        let mut request = get("https://remote.example/notes/1");
        let headers = request.headers_mut();
        headers.insert(HOST, HeaderValue::from_static("remote.example"));
        headers.insert(SIGNATURE, HeaderValue::from_static("keyId=\"k\",signature=\"x\""));
        headers.insert(DIGEST, HeaderValue::from_static("SHA-256=abc"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        transport.send(request).await.unwrap();

        let seen = mock.requests();
        assert!(seen[0].headers.contains_key(SIGNATURE));
        for name in [HOST, SIGNATURE, DIGEST] {
            assert!(!seen[1].headers.contains_key(&name), "{name} was copied");
        }
        assert_eq!(seen[1].headers[AUTHORIZATION], "Bearer abc");
    }

    #[tokio::test]
    async fn test_unauthorized_uses_proxy_response() {
        let mock = MockTransport::new(vec![
            Outcome::Reply(StatusCode::UNAUTHORIZED, vec![], ""),
            Outcome::Reply(StatusCode::OK, vec![], r#"{"type":"Note"}"#),
        ]);
        let transport = wrap(mock.clone(), Some(&proxy_iri()));

        let response = transport.send(get("https://remote.example/notes/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), r#"{"type":"Note"}"#);
    }

    #[tokio::test]
    async fn test_no_proxy_for_same_host() {
        let mock = MockTransport::new(vec![Outcome::Reply(StatusCode::FORBIDDEN, vec![], "")]);
        let transport = wrap(mock.clone(), Some(&Iri::from("https://remote.example/proxy")));

        let response = transport.send(get("https://remote.example/notes/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_no_proxy_configured() {
        let mock = MockTransport::new(vec![Outcome::Reply(StatusCode::FORBIDDEN, vec![], "")]);
        let transport = wrap(mock.clone(), None);

        transport.send(get("https://remote.example/notes/1")).await.unwrap();
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_only_get_is_proxied() {
        let mock = MockTransport::new(vec![Outcome::Reply(StatusCode::FORBIDDEN, vec![], "")]);
        let transport = wrap(mock.clone(), Some(&proxy_iri()));

        let request = Request::new(Method::POST, Url::parse("https://remote.example/inbox").unwrap());
        transport.send(request).await.unwrap();
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_base_error_is_surfaced() {
        let mock = MockTransport::new(vec![Outcome::Fail("connection refused")]);
        let transport = wrap(mock.clone(), Some(&proxy_iri()));

        let result = transport.send(get("https://remote.example/notes/1")).await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
        assert_eq!(mock.requests().len(), 1);
    }
}

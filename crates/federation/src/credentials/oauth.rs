//! OAuth2 client pieces: tokens, token endpoint round trips and PKCE.
//!
//! Only the grants C2S clients need are implemented: client credentials,
//! authorization code with a PKCE verifier, and refresh token. Client
//! credentials travel in the form body, which every server in the wild
//! accepts.

#![allow(missing_docs)]

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, RngCore};
use reqwest::{
    Method, Request,
    header::{ACCEPT, CONTENT_TYPE, HeaderValue},
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::{Url, form_urlencoded};

use crate::{
    error::AuthorizationError,
    transport::{SharedTransport, buffer_response},
};

/// Characters a PKCE code verifier is drawn from.
pub const PKCE_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._~";

/// Length of generated code verifiers, the RFC 7636 minimum.
pub const PKCE_VERIFIER_LEN: usize = 43;

/// Tokens expiring within this many seconds are treated as expired.
const EXPIRY_DELTA_SECS: i64 = 10;

/// OAuth2 client configuration for one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_url: Url,
    pub token_url: Url,
    /// Loopback redirect URL. Chosen when the interactive flow starts if unset.
    pub redirect_url: Option<String>,
    pub scopes: Vec<String>,
}

impl OAuth2Config {
    /// URL the user is sent to for the authorization code grant.
    #[must_use]
    pub fn authorization_url(&self, state: &str, code_challenge: &str) -> Url {
        let mut url = self.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id);
            if let Some(redirect_url) = &self.redirect_url {
                query.append_pair("redirect_uri", redirect_url);
            }
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            query
                .append_pair("state", state)
                .append_pair("code_challenge", code_challenge)
                .append_pair("code_challenge_method", "S256");
        }
        url
    }

    fn client_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("client_id", self.client_id.clone())];
        if let Some(secret) = self.client_secret.as_ref().filter(|s| !s.is_empty()) {
            params.push(("client_secret", secret.clone()));
        }
        params
    }
}

/// Bearer token issued by the authorization server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Whether the token is present and not about to expire.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty()
            && self
                .expires_at
                .is_none_or(|expires_at| expires_at - Duration::seconds(EXPIRY_DELTA_SECS) > Utc::now())
    }

    /// `Authorization` header value.
    ///
    /// The type is normalised to `Bearer`; some servers answer `bearer` and
    /// then refuse it back.
    #[must_use]
    pub fn authorization(&self) -> String {
        let kind = if self.token_type.is_empty() || self.token_type.eq_ignore_ascii_case("bearer")
        {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{kind} {}", self.access_token)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenResponse {
    fn from_form(body: &[u8]) -> Self {
        let mut response = Self::default();
        for (key, value) in form_urlencoded::parse(body) {
            match key.as_ref() {
                "access_token" => response.access_token = value.into_owned(),
                "token_type" => response.token_type = value.into_owned(),
                "refresh_token" => response.refresh_token = Some(value.into_owned()),
                "expires_in" => response.expires_in = value.parse().ok(),
                "error" => response.error = Some(value.into_owned()),
                "error_description" => response.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        response
    }

    fn parse(content_type: &str, body: &[u8]) -> Self {
        if content_type.starts_with("application/x-www-form-urlencoded")
            || content_type.starts_with("text/plain")
        {
            return Self::from_form(body);
        }
        serde_json::from_slice(body).unwrap_or_default()
    }

    fn failure_reason(&self, body: &[u8]) -> String {
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => format!("{error}: {description}"),
            (Some(error), None) => error.clone(),
            _ => String::from_utf8_lossy(body).trim().to_string(),
        }
    }
}

async fn request_token(
    transport: &SharedTransport,
    config: &OAuth2Config,
    grant: &[(&'static str, String)],
) -> Result<Token, AuthorizationError> {
    let mut form = form_urlencoded::Serializer::new(String::new());
    for (key, value) in grant.iter().chain(config.client_params().iter()) {
        form.append_pair(key, value);
    }

    let mut request = Request::new(Method::POST, config.token_url.clone());
    let headers = request.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    *request.body_mut() = Some(form.finish().into());

    let response = transport.send(request).await?;
    let (status, headers, body) = buffer_response(response).await?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let parsed = TokenResponse::parse(content_type, &body);

    if !status.is_success() {
        return Err(AuthorizationError::Exchange {
            status,
            reason: parsed.failure_reason(&body),
        });
    }
    if parsed.access_token.is_empty() {
        return Err(AuthorizationError::Exchange {
            status,
            reason: match parsed.error {
                Some(_) => parsed.failure_reason(&body),
                None => "server response missing access_token".to_string(),
            },
        });
    }

    debug!(token_url = %config.token_url, "Obtained access token");
    Ok(Token {
        access_token: parsed.access_token,
        token_type: parsed.token_type,
        refresh_token: parsed.refresh_token.filter(|token| !token.is_empty()),
        expires_at: parsed
            .expires_in
            .filter(|seconds| *seconds > 0)
            .map(|seconds| Utc::now() + Duration::seconds(seconds)),
    })
}

/// Client credentials grant.
pub async fn client_credentials(
    transport: &SharedTransport,
    config: &OAuth2Config,
) -> Result<Token, AuthorizationError> {
    let mut grant = vec![("grant_type", "client_credentials".to_string())];
    if !config.scopes.is_empty() {
        grant.push(("scope", config.scopes.join(" ")));
    }
    request_token(transport, config, &grant).await
}

/// Exchange an authorization code, proving possession of the PKCE verifier.
pub async fn exchange_code(
    transport: &SharedTransport,
    config: &OAuth2Config,
    code: &str,
    code_verifier: &str,
) -> Result<Token, AuthorizationError> {
    let mut grant = vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("code_verifier", code_verifier.to_string()),
    ];
    if let Some(redirect_url) = &config.redirect_url {
        grant.push(("redirect_uri", redirect_url.clone()));
    }
    request_token(transport, config, &grant).await
}

/// Refresh token grant. A response without a new refresh token keeps the
/// old one.
pub async fn refresh_token(
    transport: &SharedTransport,
    config: &OAuth2Config,
    refresh_token: &str,
) -> Result<Token, AuthorizationError> {
    let grant = vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token.to_string()),
    ];
    let mut token = request_token(transport, config, &grant).await?;
    if token.refresh_token.is_none() {
        token.refresh_token = Some(refresh_token.to_string());
    }
    Ok(token)
}

/// Random PKCE code verifier.
#[must_use]
pub fn code_verifier() -> String {
    let mut rng = rand::thread_rng();
    (0..PKCE_VERIFIER_LEN)
        .map(|_| char::from(PKCE_ALPHABET[rng.gen_range(0..PKCE_ALPHABET.len())]))
        .collect()
}

/// S256 challenge for a code verifier.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Unpredictable state token for the authorization request.
#[must_use]
pub fn state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::testing::{MockTransport, Outcome};
    use reqwest::StatusCode;

    fn config() -> OAuth2Config {
        OAuth2Config {
            client_id: "client".to_string(),
            client_secret: Some("s3cr3t".to_string()),
            auth_url: Url::parse("https://example.com/oauth/authorize").unwrap(),
            token_url: Url::parse("https://example.com/oauth/token").unwrap(),
            redirect_url: Some("http://127.0.0.1:4567".to_string()),
            scopes: vec![],
        }
    }

    fn form(body: &[u8]) -> Vec<(String, String)> {
        form_urlencoded::parse(body).into_owned().collect()
    }

    #[test]
    fn test_code_verifier_uses_alphabet() {
        let verifier = code_verifier();
        assert_eq!(verifier.len(), PKCE_VERIFIER_LEN);
        assert!(verifier.bytes().all(|b| PKCE_ALPHABET.contains(&b)));
        assert_ne!(verifier, code_verifier());
    }

    #[test]
    fn test_alphabet_is_unreserved_set() {
        assert_eq!(PKCE_ALPHABET.len(), 66);
        assert!((b'0'..=b'9').all(|digit| PKCE_ALPHABET.contains(&digit)));
        assert!(
            PKCE_ALPHABET
                .iter()
                .all(|b| b.is_ascii_alphanumeric() || b"-._~".contains(b))
        );
    }

    #[test]
    fn test_code_challenge_rfc7636_vector() {
        // RFC 7636 appendix B
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_state_token_is_random() {
        let state = state_token();
        assert_eq!(state.len(), 43);
        assert_ne!(state, state_token());
    }

    #[test]
    fn test_authorization_url() {
        let url = config().authorization_url("xyz", "challenge");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(url.path(), "/oauth/authorize");
        assert!(query.contains(&("response_type".to_string(), "code".to_string())));
        assert!(query.contains(&("client_id".to_string(), "client".to_string())));
        assert!(query.contains(&(
            "redirect_uri".to_string(),
            "http://127.0.0.1:4567".to_string()
        )));
        assert!(query.contains(&("state".to_string(), "xyz".to_string())));
        assert!(query.contains(&("code_challenge".to_string(), "challenge".to_string())));
        assert!(query.contains(&("code_challenge_method".to_string(), "S256".to_string())));
    }

    #[test]
    fn test_token_authorization_value() {
        let token = Token {
            access_token: "abc".to_string(),
            token_type: "bearer".to_string(),
            refresh_token: None,
            expires_at: None,
        };
        assert_eq!(token.authorization(), "Bearer abc");
        assert!(token.is_valid());
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let token = Token {
            access_token: "abc".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::seconds(5)),
        };
        assert!(!token.is_valid());
    }

    #[tokio::test]
    async fn test_client_credentials_request() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::OK,
            vec![("content-type", "application/json")],
            r#"{"access_token":"tok","token_type":"bearer","expires_in":3600}"#,
        )]);
        let transport: SharedTransport = mock.clone();

        let token = client_credentials(&transport, &config()).await.unwrap();
        assert_eq!(token.access_token, "tok");
        assert!(token.expires_at.is_some());

        let seen = mock.requests();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].url.as_str(), "https://example.com/oauth/token");
        let params = form(seen[0].body.as_deref().unwrap());
        assert!(params.contains(&("grant_type".to_string(), "client_credentials".to_string())));
        assert!(params.contains(&("client_id".to_string(), "client".to_string())));
        assert!(params.contains(&("client_secret".to_string(), "s3cr3t".to_string())));
    }

    #[tokio::test]
    async fn test_exchange_code_sends_verifier() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::OK,
            vec![("content-type", "application/x-www-form-urlencoded")],
            "access_token=tok&token_type=bearer&refresh_token=again",
        )]);
        let transport: SharedTransport = mock.clone();

        let token = exchange_code(&transport, &config(), "the-code", "verifier")
            .await
            .unwrap();
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.refresh_token.as_deref(), Some("again"));

        let params = form(mock.requests()[0].body.as_deref().unwrap());
        assert!(params.contains(&("code".to_string(), "the-code".to_string())));
        assert!(params.contains(&("code_verifier".to_string(), "verifier".to_string())));
        assert!(params.contains(&(
            "redirect_uri".to_string(),
            "http://127.0.0.1:4567".to_string()
        )));
    }

    #[tokio::test]
    async fn test_provider_error_is_reported() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::BAD_REQUEST,
            vec![("content-type", "application/json")],
            r#"{"error":"invalid_client","error_description":"unknown client"}"#,
        )]);
        let transport: SharedTransport = mock;

        let error = client_credentials(&transport, &config()).await.unwrap_err();
        match error {
            AuthorizationError::Exchange { status, reason } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(reason, "invalid_client: unknown client");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_refresh_token() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::OK,
            vec![("content-type", "application/json")],
            r#"{"access_token":"fresh"}"#,
        )]);
        let transport: SharedTransport = mock.clone();

        let token = refresh_token(&transport, &config(), "old").await.unwrap();
        assert_eq!(token.access_token, "fresh");
        assert_eq!(token.refresh_token.as_deref(), Some("old"));

        let params = form(mock.requests()[0].body.as_deref().unwrap());
        assert!(params.contains(&("grant_type".to_string(), "refresh_token".to_string())));
    }

    #[tokio::test]
    async fn test_missing_access_token() {
        let mock = MockTransport::new(vec![Outcome::Reply(StatusCode::OK, vec![], "{}")]);
        let transport: SharedTransport = mock;

        let error = client_credentials(&transport, &config()).await.unwrap_err();
        assert!(error.to_string().contains("missing access_token"));
    }
}

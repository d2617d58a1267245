//! Client-to-server (C2S) authorization.
//!
//! [`authorize`] loads an actor, reads its OAuth2 endpoints and obtains a
//! bearer token for it:
//!
//! - **Client credentials**: for Application, Service and Group actors when a
//!   client secret is configured
//! - **Authorization code + PKCE**: through the user's browser and a loopback
//!   callback listener; the only grant used for Person actors
//!
//! The resulting [`C2S`] session decorates transports with the token and,
//! when the actor advertises one, its proxy endpoint.

#![allow(missing_docs)]

pub mod browser;
pub mod callback;
pub mod oauth;

use std::{fmt, sync::Arc, time::Duration};

use apclient_common::config::{DEFAULT_USER_AGENT, HttpConfig, OAuthConfig};
use apclient_vocab::{Actor, ActorType, Iri};
use async_trait::async_trait;
use rand::Rng;
use reqwest::{
    Request, Response,
    header::{AUTHORIZATION, HeaderValue},
};
use tracing::{info, warn};
use url::Url;

pub use browser::{AuthorizationPrompt, SystemBrowser};
pub use callback::CallbackSession;
pub use oauth::{OAuth2Config, Token};

use crate::{
    cache::CacheTransport,
    client::FederationClient,
    error::{AuthorizationError, FederationError, FederationResult},
    proxy,
    transport::{SharedTransport, Transport, TransportError, UserAgentTransport},
};

use browser::ProgressIndicator;

/// Default time to wait for the browser callback.
pub const DEFAULT_AUTH_WAIT: Duration = Duration::from_secs(90);

/// Lowest port picked for the callback listener.
const MIN_PORT: u16 = 1024;

/// How a client wants to be authorized.
#[derive(Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    /// Allow the browser based authorization code grant.
    pub interactive: bool,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Fixed loopback redirect URL. A random port on 127.0.0.1 otherwise.
    pub redirect_url: Option<String>,
    pub auth_wait: Duration,
    pub show_progress: bool,
    pub prompt: Arc<dyn AuthorizationPrompt>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            interactive: true,
            client_id: String::new(),
            client_secret: None,
            redirect_url: None,
            auth_wait: DEFAULT_AUTH_WAIT,
            show_progress: false,
            prompt: Arc::new(SystemBrowser),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("user_agent", &self.user_agent)
            .field("interactive", &self.interactive)
            .field("client_id", &self.client_id)
            .field("redirect_url", &self.redirect_url)
            .field("auth_wait", &self.auth_wait)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    #[must_use]
    pub fn from_config(http: &HttpConfig, oauth: &OAuthConfig) -> Self {
        Self {
            user_agent: http.user_agent.clone(),
            interactive: oauth.interactive,
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
            redirect_url: oauth.redirect_url.clone(),
            auth_wait: oauth.wait(),
            show_progress: oauth.show_progress,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    fn has_secret(&self) -> bool {
        self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    ClientCredentials,
    AuthorizationCode,
}

/// An authorized C2S session for one actor.
///
/// `refresh` takes `&mut self`; callers sharing a session across tasks
/// wrap it in a lock.
pub struct C2S {
    iri: Iri,
    config: OAuth2Config,
    token: Token,
    proxy: Option<Iri>,
    grant: Grant,
    http: SharedTransport,
}

impl fmt::Debug for C2S {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("C2S")
            .field("iri", &self.iri)
            .field("proxy", &self.proxy)
            .field("grant", &self.grant)
            .finish_non_exhaustive()
    }
}

impl C2S {
    /// Actor the token was issued for.
    #[must_use]
    pub const fn id(&self) -> &Iri {
        &self.iri
    }

    #[must_use]
    pub const fn config(&self) -> &OAuth2Config {
        &self.config
    }

    #[must_use]
    pub const fn token(&self) -> &Token {
        &self.token
    }

    /// The actor's proxy endpoint, if it advertises one.
    #[must_use]
    pub const fn proxy(&self) -> Option<&Iri> {
        self.proxy.as_ref()
    }

    /// Replace the token with a fresh one.
    ///
    /// Uses the refresh token when the server issued one. Client credentials
    /// sessions ask for a new token instead.
    pub async fn refresh(&mut self) -> Result<(), AuthorizationError> {
        let token = match (&self.token.refresh_token, self.grant) {
            (Some(refresh_token), _) => {
                oauth::refresh_token(&self.http, &self.config, refresh_token).await?
            }
            (None, Grant::ClientCredentials) => {
                oauth::client_credentials(&self.http, &self.config).await?
            }
            (None, Grant::AuthorizationCode) => return Err(AuthorizationError::NoRefreshToken),
        };
        info!(actor = %self.iri, "Refreshed access token");
        self.token = token;
        Ok(())
    }

    /// Wrap `base` so requests carry this session's token and fall back to
    /// the actor's proxy endpoint.
    #[must_use]
    pub fn transport(&self, base: SharedTransport) -> SharedTransport {
        Arc::new(BearerTransport::new(
            proxy::wrap(base, self.proxy.as_ref()),
            &self.token,
        ))
    }
}

/// Sets `Authorization` from a token snapshot.
pub struct BearerTransport {
    base: SharedTransport,
    authorization: String,
}

impl BearerTransport {
    #[must_use]
    pub fn new(base: SharedTransport, token: &Token) -> Self {
        Self {
            base,
            authorization: token.authorization(),
        }
    }
}

#[async_trait]
impl Transport for BearerTransport {
    async fn send(&self, mut request: Request) -> Result<Response, TransportError> {
        let mut value = HeaderValue::from_str(&self.authorization)
            .map_err(|e| TransportError::Authorization(e.to_string()))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        self.base.send(request).await
    }
}

/// Accept `example.com/~jd` as well as full URLs.
fn normalize_locator(locator: &str) -> Iri {
    let locator = locator.trim();
    if Url::parse(locator).is_ok() {
        Iri::from(locator)
    } else {
        Iri::from(format!("https://{locator}"))
    }
}

fn endpoint_url(iri: &Iri) -> FederationResult<Url> {
    iri.request_url()
        .map_err(|source| FederationError::InvalidIri {
            iri: iri.clone(),
            source,
        })
}

fn oauth_config(actor: &Actor, client: &ClientConfig) -> FederationResult<OAuth2Config> {
    let auth_url = actor
        .authorization_endpoint()
        .cloned()
        .unwrap_or_else(|| actor.id.join_path("oauth/authorize"));
    let token_url = actor
        .token_endpoint()
        .cloned()
        .unwrap_or_else(|| actor.id.join_path("oauth/token"));

    Ok(OAuth2Config {
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
        auth_url: endpoint_url(&auth_url)?,
        token_url: endpoint_url(&token_url)?,
        redirect_url: client.redirect_url.clone().filter(|url| !url.is_empty()),
        scopes: Vec::new(),
    })
}

fn validate_actor(actor: &Actor) -> Result<(), AuthorizationError> {
    if actor.id.is_empty() {
        return Err(AuthorizationError::InvalidActor(
            "invalid Actor with empty ID".to_string(),
        ));
    }
    if actor.kind == ActorType::Person
        && (actor.authorization_endpoint().is_none() || actor.token_endpoint().is_none())
    {
        return Err(AuthorizationError::MissingEndpoints {
            actor: actor.id.clone(),
        });
    }
    Ok(())
}

fn random_port() -> u16 {
    rand::thread_rng().gen_range(MIN_PORT..=u16::MAX)
}

/// Authorize as the actor found at `locator`.
///
/// `base` performs the actual HTTP requests; the actor fetch and token
/// requests add a user agent and a private cache on top of it.
pub async fn authorize(
    base: SharedTransport,
    locator: &str,
    client: ClientConfig,
) -> FederationResult<C2S> {
    let iri = normalize_locator(locator);
    let http: SharedTransport = Arc::new(UserAgentTransport::new(
        Arc::new(CacheTransport::new(base)),
        &client.user_agent,
    ));

    let actor = FederationClient::new(http.clone()).actor(&iri).await?;
    validate_actor(&actor)?;

    let mut config = oauth_config(&actor, &client)?;
    let proxy = actor.proxy_url().cloned();

    let mut token = None;
    let mut grant = Grant::AuthorizationCode;
    if actor.kind.is_automated() && client.has_secret() {
        match oauth::client_credentials(&http, &config).await {
            Ok(issued) => {
                token = Some(issued);
                grant = Grant::ClientCredentials;
            }
            Err(e) if client.interactive => {
                warn!(actor = %actor.id, error = %e, "Client credentials grant failed, trying interactive authorization");
            }
            Err(e) => return Err(e.into()),
        }
    }
    if token.is_none() && client.interactive {
        token = Some(authorize_interactively(&http, &mut config, &client).await?);
    }
    let token = token.ok_or(AuthorizationError::NoToken)?;

    info!(actor = %actor.id, grant = ?grant, "Authorized");
    Ok(C2S {
        iri: actor.id,
        config,
        token,
        proxy,
        grant,
        http,
    })
}

/// Authorization code grant through the browser.
///
/// A redirect URL without an explicit port is replaced by the listener's
/// own address.
async fn authorize_interactively(
    http: &SharedTransport,
    config: &mut OAuth2Config,
    client: &ClientConfig,
) -> Result<Token, AuthorizationError> {
    let state = oauth::state_token();
    let verifier = oauth::code_verifier();

    let configured_port = config
        .redirect_url
        .as_deref()
        .and_then(|url| Url::parse(url).ok())
        .and_then(|url| url.port());
    let mut session =
        CallbackSession::listen(configured_port.unwrap_or_else(random_port), state.clone())
            .await?;
    if configured_port.is_none() {
        config.redirect_url = Some(session.redirect_url());
    }

    let url = config.authorization_url(&state, &oauth::code_challenge(&verifier));
    match client.prompt.open(&url).await {
        Ok(()) => info!(url = %url, "Opened browser window for authorization"),
        Err(e) => {
            warn!(error = %e, "Unable to open browser window");
            info!(url = %url, "Please open the authorization URL in your browser");
        }
    }

    let progress = client
        .show_progress
        .then(|| ProgressIndicator::start(client.auth_wait));
    let result = session.wait(client.auth_wait).await;
    drop(progress);
    session.close().await;

    let code = result?;
    oauth::exchange_code(http, config, &code, &verifier).await
}

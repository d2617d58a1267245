//! Federation client: dereferencing and submitting documents.
//!
//! [`FederationClient`] sends every request through one [`SharedTransport`]
//! chain. [`FederationClientBuilder`] assembles that chain in a fixed order,
//! outermost first:
//!
//! cache → user agent → signing or bearer token → proxy fallback → dump → base

#![allow(missing_docs)]

use std::{path::PathBuf, sync::Arc, time::Instant};

use apclient_common::{
    AppError, Config, PrivateKey,
    config::{CacheConfig, DEFAULT_USER_AGENT, HttpConfig},
    parse_private_key,
};
use apclient_vocab::{
    Activity, Actor, Collection, DecodeError, Item, Iri, RemoteErrors, decode, encode,
};
use bytes::Bytes;
use reqwest::{
    Method, Request, Response, StatusCode,
    header::{ACCEPT, CONTENT_TYPE, HeaderValue, LOCATION},
};
use serde_json::Value;
use tracing::{debug, error, info};
use url::{Url, form_urlencoded};

use crate::{
    cache::CacheTransport,
    credentials::{BearerTransport, C2S, Token},
    debug as dump,
    error::{FederationError, FederationResult},
    proxy,
    signature::HttpSignatureTransport,
    transport::{SharedTransport, UserAgentTransport, http_client},
};

/// JSON-LD media type with the Activity Streams profile.
pub const CONTENT_TYPE_JSON_LD: &str =
    r#"application/ld+json; profile="https://www.w3.org/ns/activitystreams""#;

/// Activity Streams media type.
pub const CONTENT_TYPE_ACTIVITY_JSON: &str = "application/activity+json";

/// `Accept` values for document fetches, most preferred first.
const ACCEPT_DOCUMENTS: [&str; 3] = [
    CONTENT_TYPE_JSON_LD,
    CONTENT_TYPE_ACTIVITY_JSON,
    "application/json",
];

/// Result of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    /// `Location` the server answered with, if any.
    pub location: Option<Iri>,
    /// Document in the response body, if any.
    pub item: Option<Item>,
}

/// Query filters appended to collection IRIs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(Vec<(String, String)>);

impl Filters {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `iri` with the filters as its query string.
    #[must_use]
    pub fn apply(&self, iri: &Iri) -> Iri {
        if self.0.is_empty() {
            return iri.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.0)
            .finish();
        let separator = if iri.as_str().contains('?') { '&' } else { '?' };
        Iri::from(format!("{iri}{separator}{query}"))
    }
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn value_iri(value: &Value) -> Option<Iri> {
    match value {
        Value::String(iri) if !iri.is_empty() => Some(Iri::from(iri.as_str())),
        Value::Object(map) => map.get("id").and_then(value_iri),
        _ => None,
    }
}

/// IRI of the collection `property` of `item`.
///
/// Uses the advertised property when the document carries one, and
/// `<id>/<property>` otherwise.
fn collection_iri(item: &Item, property: &str) -> Option<Iri> {
    let advertised = match item {
        Item::Iri(_) => None,
        Item::Actor(actor) => {
            let typed = match property {
                "inbox" => actor.inbox.as_ref(),
                "outbox" => actor.outbox.as_ref(),
                "followers" => actor.followers.as_ref(),
                "following" => actor.following.as_ref(),
                "liked" => actor.liked.as_ref(),
                _ => None,
            };
            typed
                .and_then(Item::id)
                .cloned()
                .or_else(|| actor.extra.get(property).and_then(value_iri))
        }
        Item::Object(object) => object.extra.get(property).and_then(value_iri),
        Item::Activity(activity) => activity.extra.get(property).and_then(value_iri),
        Item::Collection(collection) => collection.extra.get(property).and_then(value_iri),
    };
    advertised.or_else(|| item.id().map(|id| id.join_path(property)))
}

/// Client for fetching and submitting documents.
#[derive(Clone)]
pub struct FederationClient {
    transport: SharedTransport,
}

impl FederationClient {
    /// Client sending requests through `transport` as is.
    #[must_use]
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    #[must_use]
    pub fn builder() -> FederationClientBuilder {
        FederationClientBuilder::default()
    }

    /// Client assembled from configuration.
    ///
    /// When `signing.actor` and `signing.private_key_path` are both set the
    /// actor is fetched (unsigned) and requests are signed as that actor.
    pub async fn from_config(config: &Config) -> FederationResult<Self> {
        let base: SharedTransport = Arc::new(
            http_client(&config.http).map_err(|e| FederationError::Config(e.to_string()))?,
        );
        let mut builder = Self::builder()
            .base(base.clone())
            .user_agent(&config.http.user_agent)
            .cache(config.cache.clone())
            .dump_dir(config.debug.dump_dir.clone());

        if let (Some(actor), Some(path)) = (
            config.signing.actor.as_deref(),
            config.signing.private_key_path.as_ref(),
        ) {
            let pem = tokio::fs::read_to_string(path)
                .await
                .map_err(AppError::from)?;
            let private_key = parse_private_key(&pem)?;
            let actor = Self::builder()
                .base(base)
                .user_agent(&config.http.user_agent)
                .build()?
                .actor(&Iri::from(actor))
                .await?;
            builder = builder.signer(actor, private_key);
        }

        builder.build()
    }

    #[must_use]
    pub const fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    fn request(
        method: Method,
        url: Url,
        content_type: Option<&str>,
        body: Option<Bytes>,
    ) -> FederationResult<Request> {
        let mut request = Request::new(method, url);
        let is_fetch = matches!(*request.method(), Method::GET | Method::HEAD);
        let headers = request.headers_mut();
        if is_fetch {
            for accept in ACCEPT_DOCUMENTS {
                headers.append(ACCEPT, HeaderValue::from_static(accept));
            }
        } else {
            let content_type = content_type.unwrap_or(CONTENT_TYPE_JSON_LD);
            let value = HeaderValue::from_str(content_type).map_err(|_| {
                FederationError::Config(format!("invalid content type {content_type:?}"))
            })?;
            headers.insert(CONTENT_TYPE, value);
        }
        if let Some(body) = body {
            *request.body_mut() = Some(body.into());
        }
        Ok(request)
    }

    async fn send(
        &self,
        method: Method,
        iri: &Iri,
        content_type: Option<&str>,
        body: Option<Bytes>,
    ) -> FederationResult<Response> {
        let url = iri
            .request_url()
            .map_err(|source| FederationError::InvalidIri {
                iri: iri.clone(),
                source,
            })?;
        let request = Self::request(method, url, content_type, body)?;
        debug!(iri = %iri, method = %request.method(), "Sending request");

        self.transport
            .send(request)
            .await
            .map_err(|e| FederationError::transport(iri, e))
    }

    async fn read_body(iri: &Iri, response: Response) -> FederationResult<Bytes> {
        response
            .bytes()
            .await
            .map_err(|e| FederationError::transport(iri, e.into()))
    }

    /// Load the document `iri` names.
    ///
    /// Returns `None` when the peer answers 200 or 410 with an empty body.
    /// A 410 carrying an error payload is [`FederationError::Gone`].
    pub async fn dereference(&self, iri: &Iri) -> FederationResult<Option<Item>> {
        let started = Instant::now();
        let response = self.send(Method::GET, iri, None, None).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = Self::read_body(iri, response).await?;

        if status != StatusCode::OK && status != StatusCode::GONE {
            error!(
                iri = %iri,
                status = %status,
                content_type = %headers
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default(),
                duration_ms = elapsed_ms(started),
                "Unable to load document"
            );
            return Err(FederationError::Status {
                iri: iri.clone(),
                status,
                headers,
                errors: RemoteErrors::decode(&body),
            });
        }
        info!(iri = %iri, status = %status, duration_ms = elapsed_ms(started), "Loaded document");

        if is_blank(&body) {
            return Ok(None);
        }
        if status == StatusCode::GONE {
            if let Some(errors) = RemoteErrors::decode(&body) {
                return Err(FederationError::Gone {
                    iri: iri.clone(),
                    errors,
                });
            }
            return decode(&body)
                .map(Some)
                .map_err(|_| FederationError::Unexpected { iri: iri.clone() });
        }

        decode(&body)
            .map(Some)
            .map_err(|source| FederationError::Decode {
                iri: iri.clone(),
                source,
            })
    }

    /// Post `item` to the collection `target`.
    pub async fn submit(&self, target: &Iri, item: &Item) -> FederationResult<Submitted> {
        let started = Instant::now();
        let body = encode(item)?;
        let response = self
            .send(
                Method::POST,
                target,
                Some(CONTENT_TYPE_ACTIVITY_JSON),
                Some(body.into()),
            )
            .await?;
        let status = response.status();
        let headers = response.headers().clone();
        let location = headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(Iri::from);
        let body = Self::read_body(target, response).await?;

        if status != StatusCode::GONE && status.as_u16() >= 400 {
            let errors = RemoteErrors::decode(&body);
            error!(
                target = %target,
                status = %status,
                errors = %errors.as_ref().map(ToString::to_string).unwrap_or_default(),
                duration_ms = elapsed_ms(started),
                "Submission refused"
            );
            return Err(FederationError::Status {
                iri: target.clone(),
                status,
                headers,
                errors,
            });
        }
        info!(
            target = %target,
            status = %status,
            location = %location.as_ref().map(Iri::as_str).unwrap_or_default(),
            duration_ms = elapsed_ms(started),
            "Submitted document"
        );

        if is_blank(&body) {
            return Ok(Submitted {
                location,
                item: None,
            });
        }
        let item = decode(&body).map_err(|source| FederationError::Decode {
            iri: target.clone(),
            source,
        })?;
        Ok(Submitted {
            location,
            item: Some(item),
        })
    }

    async fn document(&self, iri: &Iri) -> FederationResult<Item> {
        match self.dereference(iri).await? {
            Some(Item::Iri(_)) | None => Err(FederationError::Unexpected { iri: iri.clone() }),
            Some(item) => Ok(item),
        }
    }

    fn wrong_type(iri: &Iri, expected: &str, item: &Item) -> FederationError {
        FederationError::Decode {
            iri: iri.clone(),
            source: DecodeError::InvalidType(format!(
                "expected {expected}, found {}",
                item.kind().unwrap_or("a reference")
            )),
        }
    }

    pub async fn actor(&self, iri: &Iri) -> FederationResult<Actor> {
        match self.document(iri).await? {
            Item::Actor(actor) => Ok(*actor),
            other => Err(Self::wrong_type(iri, "an actor", &other)),
        }
    }

    /// Any document.
    pub async fn object(&self, iri: &Iri) -> FederationResult<Item> {
        self.document(iri).await
    }

    pub async fn activity(&self, iri: &Iri) -> FederationResult<Activity> {
        match self.document(iri).await? {
            Item::Activity(activity) => Ok(*activity),
            other => Err(Self::wrong_type(iri, "an activity", &other)),
        }
    }

    pub async fn collection(&self, iri: &Iri, filters: &Filters) -> FederationResult<Collection> {
        let iri = filters.apply(iri);
        match self.document(&iri).await? {
            Item::Collection(collection) => Ok(*collection),
            other => Err(Self::wrong_type(&iri, "a collection", &other)),
        }
    }

    async fn collection_of(
        &self,
        item: &Item,
        property: &str,
        filters: &Filters,
    ) -> FederationResult<Collection> {
        let iri = collection_iri(item, property).ok_or_else(|| {
            FederationError::Config(format!("document has no id to derive its {property} from"))
        })?;
        self.collection(&iri, filters).await
    }

    pub async fn inbox(&self, actor: &Item, filters: &Filters) -> FederationResult<Collection> {
        self.collection_of(actor, "inbox", filters).await
    }

    pub async fn outbox(&self, actor: &Item, filters: &Filters) -> FederationResult<Collection> {
        self.collection_of(actor, "outbox", filters).await
    }

    pub async fn followers(&self, actor: &Item, filters: &Filters) -> FederationResult<Collection> {
        self.collection_of(actor, "followers", filters).await
    }

    pub async fn following(&self, actor: &Item, filters: &Filters) -> FederationResult<Collection> {
        self.collection_of(actor, "following", filters).await
    }

    pub async fn liked(&self, actor: &Item, filters: &Filters) -> FederationResult<Collection> {
        self.collection_of(actor, "liked", filters).await
    }

    pub async fn likes(&self, object: &Item, filters: &Filters) -> FederationResult<Collection> {
        self.collection_of(object, "likes", filters).await
    }

    pub async fn shares(&self, object: &Item, filters: &Filters) -> FederationResult<Collection> {
        self.collection_of(object, "shares", filters).await
    }

    pub async fn replies(&self, object: &Item, filters: &Filters) -> FederationResult<Collection> {
        self.collection_of(object, "replies", filters).await
    }

    async fn to_actor_collection(&self, activity: &Item, property: &str) -> FederationResult<Submitted> {
        let actor = activity
            .as_activity()
            .and_then(|activity| activity.actor.as_ref())
            .ok_or_else(|| FederationError::Config("activity has no actor".to_string()))?;
        let target = collection_iri(actor, property).unwrap_or_default();
        target
            .request_url()
            .map_err(|source| FederationError::InvalidIri {
                iri: target.clone(),
                source,
            })?;
        self.submit(&target, activity).await
    }

    /// Post an activity to its actor's outbox (C2S).
    pub async fn to_outbox(&self, activity: &Item) -> FederationResult<Submitted> {
        self.to_actor_collection(activity, "outbox").await
    }

    /// Post an activity to its actor's inbox.
    pub async fn to_inbox(&self, activity: &Item) -> FederationResult<Submitted> {
        self.to_actor_collection(activity, "inbox").await
    }

    pub async fn get(&self, iri: &Iri) -> FederationResult<Response> {
        self.send(Method::GET, iri, None, None).await
    }

    pub async fn head(&self, iri: &Iri) -> FederationResult<Response> {
        self.send(Method::HEAD, iri, None, None).await
    }

    pub async fn post(
        &self,
        iri: &Iri,
        content_type: Option<&str>,
        body: impl Into<Bytes> + Send,
    ) -> FederationResult<Response> {
        self.send(Method::POST, iri, content_type, Some(body.into()))
            .await
    }

    pub async fn put(
        &self,
        iri: &Iri,
        content_type: Option<&str>,
        body: impl Into<Bytes> + Send,
    ) -> FederationResult<Response> {
        self.send(Method::PUT, iri, content_type, Some(body.into()))
            .await
    }

    pub async fn delete(
        &self,
        iri: &Iri,
        content_type: Option<&str>,
        body: Option<Bytes>,
    ) -> FederationResult<Response> {
        self.send(Method::DELETE, iri, content_type, body).await
    }
}

enum Authentication {
    Anonymous,
    Signature { actor: Actor, key: PrivateKey },
    Bearer(Token),
}

/// Assembles a [`FederationClient`] transport chain.
pub struct FederationClientBuilder {
    base: Option<SharedTransport>,
    http: HttpConfig,
    user_agent: String,
    cache: Option<CacheConfig>,
    dump_dir: Option<PathBuf>,
    proxy: Option<Iri>,
    authentication: Authentication,
}

impl Default for FederationClientBuilder {
    fn default() -> Self {
        Self {
            base: None,
            http: HttpConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache: None,
            dump_dir: None,
            proxy: None,
            authentication: Authentication::Anonymous,
        }
    }
}

impl FederationClientBuilder {
    /// Transport that talks to the network. Defaults to a client built from
    /// the HTTP configuration.
    #[must_use]
    pub fn base(mut self, base: SharedTransport) -> Self {
        self.base = Some(base);
        self
    }

    #[must_use]
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.user_agent.clone_from(&http.user_agent);
        self.http = http;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// Cache GET responses. Ignored when the configuration disables it.
    #[must_use]
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dump_dir = dir;
        self
    }

    /// Replay refused GETs through this proxy endpoint.
    #[must_use]
    pub fn proxy(mut self, proxy: Iri) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sign requests as `actor`.
    #[must_use]
    pub fn signer(mut self, actor: Actor, key: PrivateKey) -> Self {
        self.authentication = Authentication::Signature { actor, key };
        self
    }

    /// Authorize requests with a C2S session's token and proxy.
    #[must_use]
    pub fn session(mut self, session: &C2S) -> Self {
        self.authentication = Authentication::Bearer(session.token().clone());
        self.proxy = session.proxy().cloned();
        self
    }

    pub fn build(self) -> FederationResult<FederationClient> {
        let base: SharedTransport = match self.base {
            Some(base) => base,
            None => Arc::new(
                http_client(&self.http).map_err(|e| FederationError::Config(e.to_string()))?,
            ),
        };

        let mut transport = dump::wrap(base, self.dump_dir.as_deref());
        transport = proxy::wrap(transport, self.proxy.as_ref());
        transport = match self.authentication {
            Authentication::Anonymous => transport,
            Authentication::Signature { actor, key } => {
                Arc::new(HttpSignatureTransport::new(transport).with_actor(actor, key))
            }
            Authentication::Bearer(token) => Arc::new(BearerTransport::new(transport, &token)),
        };
        transport = Arc::new(UserAgentTransport::new(transport, &self.user_agent));
        if let Some(cache) = self.cache.filter(|cache| cache.enabled) {
            transport = Arc::new(CacheTransport::from_config(transport, &cache));
        }

        Ok(FederationClient::new(transport))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::testing::{MockTransport, Outcome};
    use apclient_vocab::{ActorType, Object};
    use reqwest::header::USER_AGENT;

    fn client(mock: &Arc<MockTransport>) -> FederationClient {
        FederationClient::new(mock.clone())
    }

    #[test]
    fn test_filters_apply() {
        let iri = Iri::from("https://example.com/~jd/outbox");
        assert_eq!(Filters::new().apply(&iri), iri);

        let filters = Filters::new().with("type", "Create").with("maxItems", "10");
        assert_eq!(
            filters.apply(&iri).as_str(),
            "https://example.com/~jd/outbox?type=Create&maxItems=10"
        );
        assert_eq!(
            filters
                .apply(&Iri::from("https://example.com/c?page=2"))
                .as_str(),
            "https://example.com/c?page=2&type=Create&maxItems=10"
        );
    }

    #[test]
    fn test_collection_iri_prefers_advertised() {
        let mut actor = Actor::new("https://example.com/~jd", ActorType::Person);
        actor.inbox = Some(Item::from(Iri::from("https://example.com/inbox/jd")));
        let actor = Item::from(actor);

        assert_eq!(
            collection_iri(&actor, "inbox").unwrap().as_str(),
            "https://example.com/inbox/jd"
        );
        assert_eq!(
            collection_iri(&actor, "outbox").unwrap().as_str(),
            "https://example.com/~jd/outbox"
        );

        let mut note = Object::new("Note");
        note.id = Iri::from("https://example.com/notes/1");
        note.extra.insert(
            "replies".to_string(),
            serde_json::json!({"id": "https://example.com/notes/1/replies", "type": "Collection"}),
        );
        let note = Item::from(note);
        assert_eq!(
            collection_iri(&note, "replies").unwrap().as_str(),
            "https://example.com/notes/1/replies"
        );
        assert_eq!(
            collection_iri(&note, "likes").unwrap().as_str(),
            "https://example.com/notes/1/likes"
        );
        assert!(collection_iri(&Item::from(Object::new("Note")), "likes").is_none());
    }

    #[tokio::test]
    async fn test_dereference_sends_accept_in_order() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::OK,
            vec![],
            r#"{"id":"https://example.com/1","type":"Note"}"#,
        )]);
        let item = client(&mock)
            .dereference(&Iri::from("https://example.com/1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.kind(), Some("Note"));

        let seen = mock.requests();
        let accept: Vec<&str> = seen[0]
            .headers
            .get_all(ACCEPT)
            .iter()
            .map(|value| value.to_str().unwrap())
            .collect();
        assert_eq!(accept, ACCEPT_DOCUMENTS);
    }

    #[tokio::test]
    async fn test_dereference_invalid_iri_is_local() {
        let mock = MockTransport::new(vec![]);
        for iri in ["", "not a url", "mailto:jd@example.com"] {
            let error = client(&mock).dereference(&Iri::from(iri)).await.unwrap_err();
            assert!(error.is_local(), "{iri}: {error}");
        }
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_dereference_status_error() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::NOT_FOUND,
            vec![],
            r#"{"errors":[{"status":404,"message":"not found"}]}"#,
        )]);
        let error = client(&mock)
            .dereference(&Iri::from("https://example.com/missing"))
            .await
            .unwrap_err();

        match error {
            FederationError::Status { status, errors, .. } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(errors.unwrap().messages().collect::<Vec<_>>(), ["not found"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_error_keeps_response_headers() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::TOO_MANY_REQUESTS,
            vec![("content-type", "text/plain"), ("retry-after", "120")],
            "slow down",
        )]);
        let error = client(&mock)
            .submit(
                &Iri::from("https://example.com/~jd/outbox"),
                &Item::from(Activity::new("Like")),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            FederationError::Status { status: StatusCode::TOO_MANY_REQUESTS, errors: None, .. }
        ));
        assert_eq!(error.content_type(), Some("text/plain"));
        assert_eq!(error.retry_after(), Some("120"));
        assert!(!error.is_local());
    }

    #[tokio::test]
    async fn test_dereference_gone() {
        let mock = MockTransport::new(vec![
            Outcome::Reply(
                StatusCode::GONE,
                vec![],
                r#"{"errors":[{"status":410,"message":"deleted"}]}"#,
            ),
            Outcome::Reply(StatusCode::GONE, vec![], ""),
            Outcome::Reply(
                StatusCode::GONE,
                vec![],
                r#"{"id":"https://example.com/3","type":"Tombstone"}"#,
            ),
            Outcome::Reply(StatusCode::GONE, vec![], "<html>gone</html>"),
        ]);
        let client = client(&mock);

        let error = client
            .dereference(&Iri::from("https://example.com/1"))
            .await
            .unwrap_err();
        assert!(matches!(error, FederationError::Gone { .. }));
        assert_eq!(error.status(), Some(StatusCode::GONE));

        let empty = client.dereference(&Iri::from("https://example.com/2")).await.unwrap();
        assert!(empty.is_none());

        let tombstone = client
            .dereference(&Iri::from("https://example.com/3"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tombstone.kind(), Some("Tombstone"));

        let error = client
            .dereference(&Iri::from("https://example.com/4"))
            .await
            .unwrap_err();
        assert!(matches!(error, FederationError::Unexpected { .. }));
    }

    #[tokio::test]
    async fn test_dereference_transport_error_is_wrapped() {
        let mock = MockTransport::new(vec![Outcome::Fail("connection reset")]);
        let error = client(&mock)
            .dereference(&Iri::from("https://example.com/1"))
            .await
            .unwrap_err();
        match error {
            FederationError::Transport { iri, .. } => assert_eq!(iri.as_str(), "https://example.com/1"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_posts_activity_json() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::CREATED,
            vec![("location", "https://example.com/activities/1")],
            "",
        )]);
        let mut activity = Activity::new("Create");
        activity.actor = Some(Item::from(Iri::from("https://example.com/~jd")));

        let submitted = client(&mock)
            .submit(&Iri::from("https://example.com/~jd/outbox"), &Item::from(activity))
            .await
            .unwrap();
        assert_eq!(
            submitted.location,
            Some(Iri::from("https://example.com/activities/1"))
        );
        assert!(submitted.item.is_none());

        let seen = mock.requests();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].headers[CONTENT_TYPE], CONTENT_TYPE_ACTIVITY_JSON);
        let body: Value = serde_json::from_slice(seen[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["@context"], "https://www.w3.org/ns/activitystreams");
        assert_eq!(body["type"], "Create");
    }

    #[tokio::test]
    async fn test_submit_refused() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::FORBIDDEN,
            vec![],
            r#"{"errors":{"message":"not allowed"}}"#,
        )]);
        let error = client(&mock)
            .submit(
                &Iri::from("https://example.com/~jd/outbox"),
                &Item::from(Activity::new("Like")),
            )
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "https://example.com/~jd/outbox responded with 403 Forbidden: not allowed"
        );
    }

    #[tokio::test]
    async fn test_to_outbox_resolves_actor_outbox() {
        let mock = MockTransport::new(vec![Outcome::Reply(StatusCode::CREATED, vec![], "")]);
        let mut activity = Activity::new("Follow");
        activity.actor = Some(Item::from(Iri::from("https://example.com/~jd")));

        client(&mock).to_outbox(&Item::from(activity)).await.unwrap();
        assert_eq!(
            mock.requests()[0].url.as_str(),
            "https://example.com/~jd/outbox"
        );
    }

    #[tokio::test]
    async fn test_to_inbox_without_actor_host_fails_locally() {
        let mock = MockTransport::new(vec![]);
        let mut activity = Activity::new("Follow");
        activity.actor = Some(Item::from(Iri::from("urn:example:jd")));

        let error = client(&mock).to_inbox(&Item::from(activity)).await.unwrap_err();
        assert!(error.is_local());
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_typed_loader_rejects_other_types() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::OK,
            vec![],
            r#"{"id":"https://example.com/1","type":"Note"}"#,
        )]);
        let error = client(&mock)
            .actor(&Iri::from("https://example.com/1"))
            .await
            .unwrap_err();
        assert!(matches!(error, FederationError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_followers_with_filters() {
        let mock = MockTransport::new(vec![Outcome::Reply(
            StatusCode::OK,
            vec![],
            r#"{"id":"https://example.com/~jd/followers","type":"OrderedCollection","totalItems":0}"#,
        )]);
        let collection = client(&mock)
            .followers(
                &Item::from(Iri::from("https://example.com/~jd")),
                &Filters::new().with("maxItems", "5"),
            )
            .await
            .unwrap();
        assert_eq!(collection.total_items, Some(0));
        assert_eq!(
            mock.requests()[0].url.as_str(),
            "https://example.com/~jd/followers?maxItems=5"
        );
    }

    #[tokio::test]
    async fn test_raw_verbs_set_content_type() {
        let mock = MockTransport::new(vec![]);
        let client = client(&mock);
        let iri = Iri::from("https://example.com/1");

        client.put(&iri, None, b"{}".to_vec()).await.unwrap();
        client.post(&iri, Some("text/plain"), "hi").await.unwrap();
        client.head(&iri).await.unwrap();

        let seen = mock.requests();
        assert_eq!(seen[0].headers[CONTENT_TYPE], CONTENT_TYPE_JSON_LD);
        assert_eq!(seen[1].headers[CONTENT_TYPE], "text/plain");
        assert_eq!(seen[2].method, Method::HEAD);
        assert!(seen[2].headers.contains_key(ACCEPT));
        assert!(!seen[2].headers.contains_key(CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_builder_composes_user_agent_and_cache() {
        let mock = MockTransport::new(vec![]);
        let client = FederationClient::builder()
            .base(mock.clone())
            .user_agent("apclient-test/1.0")
            .cache(CacheConfig::default())
            .build()
            .unwrap();

        let iri = Iri::from("https://example.com/1");
        client.get(&iri).await.unwrap();
        client.get(&iri).await.unwrap();

        let seen = mock.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].headers[USER_AGENT], "apclient-test/1.0");
    }
}

//! Authenticated ActivityPub delivery for apclient.
//!
//! This crate fetches and submits Activity Streams documents on behalf of an
//! actor:
//!
//! - **Transports**: composable [`Transport`] decorators over a base HTTP client
//! - **Signing**: HTTP Signatures with the actor's key, unsigned retry for reads
//! - **Credentials**: C2S OAuth2 (client credentials, authorization code + PKCE)
//! - **Proxy**: refused reads replayed through the actor's proxy endpoint
//! - **Cache / dump**: private response cache and on-disk exchange dumps
//! - **Client**: [`FederationClient`] with `dereference` and `submit`

pub mod cache;
pub mod client;
pub mod credentials;
pub mod debug;
pub mod error;
pub mod proxy;
pub mod signature;
pub mod transport;

pub use cache::{CacheStats, CacheTransport};
pub use client::{
    CONTENT_TYPE_ACTIVITY_JSON, CONTENT_TYPE_JSON_LD, FederationClient, FederationClientBuilder,
    Filters, Submitted,
};
pub use credentials::{
    AuthorizationPrompt, BearerTransport, C2S, ClientConfig, OAuth2Config, SystemBrowser, Token,
    authorize,
};
pub use debug::DumpTransport;
pub use error::{AuthorizationError, FederationError, FederationResult};
pub use proxy::ProxyTransport;
pub use signature::{HttpSignatureTransport, SignatureError};
pub use transport::{SharedTransport, Transport, TransportError, UserAgentTransport, http_client};

//! Federation client errors.

#![allow(missing_docs)]

use apclient_common::AppError;
use apclient_vocab::{DecodeError, Iri, IriError, RemoteErrors};
use reqwest::{
    StatusCode,
    header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER},
};
use thiserror::Error;

use crate::transport::TransportError;

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;

fn remote_detail(errors: Option<&RemoteErrors>) -> String {
    errors.map_or_else(String::new, |errors| format!(": {errors}"))
}

/// Error raised by the federation client.
#[derive(Debug, Error)]
pub enum FederationError {
    /// The target is not usable as a request URL. Nothing was sent.
    #[error("Invalid IRI {iri:?}: {source}")]
    InvalidIri {
        iri: Iri,
        #[source]
        source: IriError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] AppError),

    /// Nothing usable came back.
    #[error("Unable to reach {iri}: {source}")]
    Transport {
        iri: Iri,
        #[source]
        source: TransportError,
    },

    /// The peer answered with a status the operation does not accept.
    /// `headers` are the response headers, kept for diagnostics.
    #[error("{iri} responded with {status}{}", remote_detail(errors.as_ref()))]
    Status {
        iri: Iri,
        status: StatusCode,
        headers: HeaderMap,
        errors: Option<RemoteErrors>,
    },

    /// The document was deleted and the peer said so with an error payload.
    #[error("{iri} is gone: {errors}")]
    Gone { iri: Iri, errors: RemoteErrors },

    #[error("Unexpected response from {iri}")]
    Unexpected { iri: Iri },

    #[error("Unable to decode {iri}: {source}")]
    Decode {
        iri: Iri,
        #[source]
        source: DecodeError,
    },

    #[error("Unable to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

impl FederationError {
    /// Wrap a transport error with the IRI it concerns.
    pub fn transport(iri: &Iri, source: TransportError) -> Self {
        Self::Transport {
            iri: iri.clone(),
            source,
        }
    }

    /// Whether the error was raised before anything was sent.
    ///
    /// Signing failures count: a request that cannot be signed is only sent
    /// (unsigned) for GET and HEAD, which then do not fail with them.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidIri { .. }
                | Self::Config(_)
                | Self::Common(_)
                | Self::Encode(_)
                | Self::Transport {
                    source: TransportError::Signature(_) | TransportError::Unbuffered,
                    ..
                }
        )
    }

    /// HTTP status the peer answered with, if the error carries one.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Gone { .. } => Some(StatusCode::GONE),
            _ => None,
        }
    }

    /// Response headers of a [`FederationError::Status`].
    #[must_use]
    pub const fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::Status { headers, .. } => Some(headers),
            _ => None,
        }
    }

    /// `Content-Type` of the refused response.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers()?.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// `Retry-After` of the refused response, as sent.
    #[must_use]
    pub fn retry_after(&self) -> Option<&str> {
        self.headers()?.get(RETRY_AFTER)?.to_str().ok()
    }
}

/// Error raised while obtaining or refreshing a C2S bearer token.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("Authorization callback state does not match")]
    StateMismatch,

    #[error("token is missing")]
    MissingCode,

    #[error("{error}: {description}")]
    Provider { error: String, description: String },

    #[error("Token exchange failed ({status}): {reason}")]
    Exchange { status: StatusCode, reason: String },

    #[error("unable to authorize, reached timeout")]
    Timeout,

    #[error("Authorization was cancelled")]
    Cancelled,

    #[error("Actor {actor} does not advertise OAuth2 endpoints")]
    MissingEndpoints { actor: Iri },

    #[error("Invalid actor: {0}")]
    InvalidActor(String),

    #[error("Unable to obtain a token")]
    NoToken,

    #[error("No token to refresh from")]
    NoRefreshToken,

    #[error("Unable to listen for the authorization callback: {0}")]
    Listener(#[from] std::io::Error),

    #[error("Token request failed: {0}")]
    Transport(#[from] TransportError),
}

//! Error payloads returned by peers.
//!
//! Servers in the go-ap family answer failed requests with
//! `{"errors":[{"status":404,"message":"not found"}]}`; others send a single
//! error object. Both decode into [`RemoteErrors`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One error reported by a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: String,
}

/// Errors reported by a peer in a response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteErrors(pub Vec<RemoteError>);

impl RemoteErrors {
    /// Decode an error payload. Returns `None` when the body is not an error
    /// payload or carries no message.
    #[must_use]
    pub fn decode(body: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(body).ok()?;
        let payload = match value {
            Value::Object(mut map) => match map.remove("errors") {
                Some(errors) => errors,
                None => Value::Object(map),
            },
            other => other,
        };

        let errors: Vec<RemoteError> = match payload {
            Value::Array(entries) => entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect(),
            object @ Value::Object(_) => vec![serde_json::from_value(object).ok()?],
            _ => return None,
        };

        let errors: Vec<RemoteError> = errors
            .into_iter()
            .filter(|error| !error.message.is_empty())
            .collect();

        (!errors.is_empty()).then_some(Self(errors))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages in the order the peer reported them.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|error| error.message.as_str())
    }
}

impl fmt::Display for RemoteErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            f.write_str(&error.message)?;
        }
        Ok(())
    }
}

//! The [`Item`] union and its type registry.
//!
//! A document's `type` property selects the Rust type it decodes into. The
//! registry below is the single place that maps vocabulary type names to
//! families; a name missing from it is a decode error.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    iri::Iri,
    object::{Activity, Actor, Collection, Object},
};

/// JSON-LD context added to encoded documents.
pub const ACTIVITY_STREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// Error decoding a document.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error("invalid type property: {0}")]
    InvalidType(String),
    #[error("expected an object or an IRI, found {0}")]
    Shape(&'static str),
    #[error("invalid {kind} document: {source}")]
    Document {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Object,
    Actor,
    Activity,
    Collection,
}

const REGISTRY: &[(&str, Family)] = &[
    // Objects
    ("Object", Family::Object),
    ("Article", Family::Object),
    ("Audio", Family::Object),
    ("Document", Family::Object),
    ("Event", Family::Object),
    ("Image", Family::Object),
    ("Link", Family::Object),
    ("Mention", Family::Object),
    ("Note", Family::Object),
    ("Page", Family::Object),
    ("Place", Family::Object),
    ("Profile", Family::Object),
    ("Relationship", Family::Object),
    ("Tombstone", Family::Object),
    ("Video", Family::Object),
    // Actors
    ("Application", Family::Actor),
    ("Group", Family::Actor),
    ("Organization", Family::Actor),
    ("Person", Family::Actor),
    ("Service", Family::Actor),
    // Activities
    ("Activity", Family::Activity),
    ("IntransitiveActivity", Family::Activity),
    ("Accept", Family::Activity),
    ("Add", Family::Activity),
    ("Announce", Family::Activity),
    ("Arrive", Family::Activity),
    ("Block", Family::Activity),
    ("Create", Family::Activity),
    ("Delete", Family::Activity),
    ("Dislike", Family::Activity),
    ("Flag", Family::Activity),
    ("Follow", Family::Activity),
    ("Ignore", Family::Activity),
    ("Invite", Family::Activity),
    ("Join", Family::Activity),
    ("Leave", Family::Activity),
    ("Like", Family::Activity),
    ("Listen", Family::Activity),
    ("Move", Family::Activity),
    ("Offer", Family::Activity),
    ("Question", Family::Activity),
    ("Read", Family::Activity),
    ("Reject", Family::Activity),
    ("Remove", Family::Activity),
    ("TentativeAccept", Family::Activity),
    ("TentativeReject", Family::Activity),
    ("Travel", Family::Activity),
    ("Undo", Family::Activity),
    ("Update", Family::Activity),
    ("View", Family::Activity),
    // Collections
    ("Collection", Family::Collection),
    ("CollectionPage", Family::Collection),
    ("OrderedCollection", Family::Collection),
    ("OrderedCollectionPage", Family::Collection),
];

fn lookup(name: &str) -> Option<Family> {
    REGISTRY
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, family)| *family)
}

/// Whether `name` is a registered vocabulary type.
#[must_use]
pub fn is_known_type(name: &str) -> bool {
    lookup(name).is_some()
}

/// A reference or an embedded document.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Iri(Iri),
    Object(Box<Object>),
    Actor(Box<Actor>),
    Activity(Box<Activity>),
    Collection(Box<Collection>),
}

impl Item {
    /// Decode a JSON value into an item.
    ///
    /// A string is a reference. An object without a `type` decodes as a
    /// plain [`Object`]; when `type` is an array the first registered name
    /// wins.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let mut map = match value {
            Value::String(iri) => return Ok(Self::Iri(Iri::from(iri))),
            Value::Object(map) => map,
            Value::Null => return Err(DecodeError::Shape("null")),
            Value::Bool(_) => return Err(DecodeError::Shape("a boolean")),
            Value::Number(_) => return Err(DecodeError::Shape("a number")),
            Value::Array(_) => return Err(DecodeError::Shape("an array")),
        };

        let (name, family) = resolve_type(&map)?;
        match &name {
            Some(name) => {
                map.insert("type".to_string(), Value::String(name.clone()));
            }
            None => {
                map.remove("type");
            }
        }
        let kind = name.unwrap_or_else(|| "Object".to_string());
        let value = Value::Object(map);
        let document = |source| DecodeError::Document {
            kind: kind.clone(),
            source,
        };

        Ok(match family {
            Family::Object => Self::Object(Box::new(
                serde_json::from_value(value).map_err(document)?,
            )),
            Family::Actor => Self::Actor(Box::new(
                serde_json::from_value(value).map_err(document)?,
            )),
            Family::Activity => Self::Activity(Box::new(
                serde_json::from_value(value).map_err(document)?,
            )),
            Family::Collection => Self::Collection(Box::new(
                serde_json::from_value(value).map_err(document)?,
            )),
        })
    }

    /// Identifier of the item; `None` for anonymous documents.
    #[must_use]
    pub fn id(&self) -> Option<&Iri> {
        let id = match self {
            Self::Iri(iri) => iri,
            Self::Object(object) => &object.id,
            Self::Actor(actor) => &actor.id,
            Self::Activity(activity) => &activity.id,
            Self::Collection(collection) => &collection.id,
        };
        (!id.is_empty()).then_some(id)
    }

    /// Vocabulary type name; `None` for references.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Iri(_) => None,
            Self::Object(object) => Some(&object.kind),
            Self::Actor(actor) => Some(actor.kind.as_str()),
            Self::Activity(activity) => Some(&activity.kind),
            Self::Collection(collection) => Some(collection.kind.as_str()),
        }
    }

    #[must_use]
    pub const fn is_iri(&self) -> bool {
        matches!(self, Self::Iri(_))
    }

    #[must_use]
    pub fn as_actor(&self) -> Option<&Actor> {
        match self {
            Self::Actor(actor) => Some(actor.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_activity(&self) -> Option<&Activity> {
        match self {
            Self::Activity(activity) => Some(activity.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Collection(collection) => Some(collection.as_ref()),
            _ => None,
        }
    }
}

fn resolve_type(map: &Map<String, Value>) -> Result<(Option<String>, Family), DecodeError> {
    match map.get("type") {
        None | Some(Value::Null) => Ok((None, Family::Object)),
        Some(Value::String(name)) => lookup(name)
            .map(|family| (Some(name.clone()), family))
            .ok_or_else(|| DecodeError::UnknownType(name.clone())),
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            names
                .iter()
                .find_map(|name| lookup(name).map(|family| (Some((*name).to_string()), family)))
                .ok_or_else(|| DecodeError::UnknownType(names.join(",")))
        }
        Some(other) => Err(DecodeError::InvalidType(other.to_string())),
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Iri(iri) => iri.serialize(serializer),
            Self::Object(object) => object.serialize(serializer),
            Self::Actor(actor) => actor.serialize(serializer),
            Self::Activity(activity) => activity.serialize(serializer),
            Self::Collection(collection) => collection.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<Iri> for Item {
    fn from(iri: Iri) -> Self {
        Self::Iri(iri)
    }
}

impl From<Object> for Item {
    fn from(object: Object) -> Self {
        Self::Object(Box::new(object))
    }
}

impl From<Actor> for Item {
    fn from(actor: Actor) -> Self {
        Self::Actor(Box::new(actor))
    }
}

impl From<Activity> for Item {
    fn from(activity: Activity) -> Self {
        Self::Activity(Box::new(activity))
    }
}

impl From<Collection> for Item {
    fn from(collection: Collection) -> Self {
        Self::Collection(Box::new(collection))
    }
}

/// Decode a document body.
pub fn decode(body: &[u8]) -> Result<Item, DecodeError> {
    let value: Value = serde_json::from_slice(body)?;
    Item::from_value(value)
}

/// Encode an item, adding the Activity Streams `@context` to documents that
/// carry none.
pub fn encode(item: &Item) -> Result<Vec<u8>, serde_json::Error> {
    let mut value = serde_json::to_value(item)?;
    if let Value::Object(map) = &mut value {
        map.entry("@context")
            .or_insert_with(|| Value::String(ACTIVITY_STREAMS_CONTEXT.to_string()));
    }
    serde_json::to_vec(&value)
}

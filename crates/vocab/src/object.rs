//! Typed documents: objects, actors, activities and collections.
//!
//! Only the properties the delivery pipeline reads are typed; everything else
//! is preserved verbatim in `extra` so documents survive a decode/encode
//! cycle.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Item, iri::Iri};

/// Plain object (Note, Article, Tombstone, ...).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    #[serde(default, skip_serializing_if = "Iri::is_empty")]
    pub id: Iri,
    #[serde(rename = "type", default = "default_object_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributed_to: Option<Item>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_object_type() -> String {
    "Object".to_string()
}

impl Object {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }
}

/// Actor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ActorType {
    Application,
    Group,
    Organization,
    Person,
    Service,
}

impl ActorType {
    /// Whether the actor is operated by a program rather than a person.
    ///
    /// These actors may authenticate with the client-credentials grant.
    #[must_use]
    pub const fn is_automated(self) -> bool {
        matches!(self, Self::Application | Self::Service | Self::Group)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Application => "Application",
            Self::Group => "Group",
            Self::Organization => "Organization",
            Self::Person => "Person",
            Self::Service => "Service",
        }
    }
}

/// Public key advertised by an actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub id: Iri,
    #[serde(default, skip_serializing_if = "Iri::is_empty")]
    pub owner: Iri,
    pub public_key_pem: String,
}

/// Server endpoints advertised by an actor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_authorization_endpoint: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token_endpoint: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_inbox: Option<Iri>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Actor document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(default, skip_serializing_if = "Iri::is_empty")]
    pub id: Iri,
    #[serde(rename = "type")]
    pub kind: ActorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Actor {
    #[must_use]
    pub fn new(id: impl Into<Iri>, kind: ActorType) -> Self {
        Self {
            id: id.into(),
            kind,
            preferred_username: None,
            name: None,
            inbox: None,
            outbox: None,
            followers: None,
            following: None,
            liked: None,
            public_key: None,
            endpoints: None,
            extra: Map::new(),
        }
    }

    /// Advertised OAuth2 authorization endpoint.
    #[must_use]
    pub fn authorization_endpoint(&self) -> Option<&Iri> {
        self.endpoints
            .as_ref()?
            .oauth_authorization_endpoint
            .as_ref()
            .filter(|iri| !iri.is_empty())
    }

    /// Advertised OAuth2 token endpoint.
    #[must_use]
    pub fn token_endpoint(&self) -> Option<&Iri> {
        self.endpoints
            .as_ref()?
            .oauth_token_endpoint
            .as_ref()
            .filter(|iri| !iri.is_empty())
    }

    /// Advertised proxy endpoint.
    #[must_use]
    pub fn proxy_url(&self) -> Option<&Iri> {
        self.endpoints
            .as_ref()?
            .proxy_url
            .as_ref()
            .filter(|iri| !iri.is_empty())
    }
}

/// Activity document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default, skip_serializing_if = "Iri::is_empty")]
    pub id: Iri,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Item>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }
}

/// Collection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum CollectionType {
    Collection,
    CollectionPage,
    OrderedCollection,
    OrderedCollectionPage,
}

impl CollectionType {
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::OrderedCollection | Self::OrderedCollectionPage)
    }

    #[must_use]
    pub const fn is_page(self) -> bool {
        matches!(self, Self::CollectionPage | Self::OrderedCollectionPage)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collection => "Collection",
            Self::CollectionPage => "CollectionPage",
            Self::OrderedCollection => "OrderedCollection",
            Self::OrderedCollectionPage => "OrderedCollectionPage",
        }
    }
}

/// Collection or collection page.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(default, skip_serializing_if = "Iri::is_empty")]
    pub id: Iri,
    #[serde(rename = "type")]
    pub kind: CollectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of: Option<Item>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ordered_items: Vec<Item>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Collection {
    /// Members of this page, whichever property carries them.
    #[must_use]
    pub fn members(&self) -> &[Item] {
        if self.ordered_items.is_empty() {
            &self.items
        } else {
            &self.ordered_items
        }
    }
}

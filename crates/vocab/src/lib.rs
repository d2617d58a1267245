//! Activity Streams vocabulary for apclient.
//!
//! The delivery pipeline treats documents as a tagged union, [`Item`]:
//!
//! - **References**: bare [`Iri`] strings
//! - **Documents**: [`Object`], [`Actor`], [`Activity`] and [`Collection`],
//!   selected by the `type` property through a fixed registry
//! - **Peer errors**: [`RemoteErrors`] payloads found in failed responses
//!
//! # Example
//!
//! ```
//! use apclient_vocab::{ActorType, Item, decode};
//!
//! let item = decode(br#"{"id":"https://example.com/~jd","type":"Person"}"#).unwrap();
//! assert_eq!(item.as_actor().map(|actor| actor.kind), Some(ActorType::Person));
//! ```

pub mod iri;
pub mod item;
pub mod object;
pub mod remote_error;

pub use iri::{Iri, IriError};
pub use item::{ACTIVITY_STREAMS_CONTEXT, DecodeError, Item, decode, encode, is_known_type};
pub use object::{
    Activity, Actor, ActorType, Collection, CollectionType, Endpoints, Object, PublicKey,
};
pub use remote_error::{RemoteError, RemoteErrors};

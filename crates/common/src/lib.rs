//! Common utilities and shared types for apclient.
//!
//! This crate provides foundational components used across all apclient crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Cryptography**: RSA, ECDSA and Ed25519 key material for signatures
//! - **HTTP Signatures**: Signing string construction, signing and verification
//!
//! # Example
//!
//! ```no_run
//! use apclient_common::{AppResult, Config, parse_private_key};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     if let Some(path) = &config.signing.private_key_path {
//!         let pem = std::fs::read_to_string(path)?;
//!         let key = parse_private_key(&pem)?;
//!         println!("Signing with a {} key", key.algorithm());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod http_signature;

pub use config::Config;
pub use crypto::{
    KeyAlgorithm, Keypair, PrivateKey, PublicKey, generate_keypair, parse_private_key,
    parse_public_key,
};
pub use error::{AppError, AppResult};
pub use http_signature::{
    HEADERS_TO_SIGN, HttpSignature, SignatureAlgorithm, build_signature_string, calculate_digest,
    http_date, sign_request, verify_signature,
};

//! HTTP Signature utilities for `ActivityPub`.
//!
//! Implements HTTP Signatures as used by `ActivityPub` for request authentication.
//! See: <https://datatracker.ietf.org/doc/html/draft-cavage-http-signatures>
//!
//! The algorithm parameter on the wire is always `hs2019`; the verifier derives
//! the concrete algorithm from the key referenced by `keyId`.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rsa::pkcs1v15;
use sha2::{Digest, Sha256, Sha512};
use signature::{
    SignatureEncoding, Signer, Verifier,
    hazmat::{PrehashSigner, PrehashVerifier},
};
use std::collections::HashMap;

use crate::{
    AppError, AppResult,
    crypto::{KeyAlgorithm, PrivateKey, PublicKey},
};

/// Value of the `algorithm` parameter placed on outgoing signatures.
pub const SIGNATURE_ALGORITHM_LABEL: &str = "hs2019";

/// Pseudo-header naming the request method and path.
pub const REQUEST_TARGET: &str = "(request-target)";

/// Components covered by every outgoing signature.
#[cfg(not(feature = "replayable-signatures"))]
pub const HEADERS_TO_SIGN: &[&str] = &[REQUEST_TARGET, "host", "date"];

/// Components covered by every outgoing signature.
///
/// `date` is left out so captured requests can be replayed.
#[cfg(feature = "replayable-signatures")]
pub const HEADERS_TO_SIGN: &[&str] = &[REQUEST_TARGET, "host"];

/// Concrete signing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSha256,
    RsaSha512,
    EcdsaSha256,
    EcdsaSha512,
    Ed25519,
}

impl SignatureAlgorithm {
    /// Candidate algorithms for a key family, most preferred first.
    #[must_use]
    pub const fn candidates(family: KeyAlgorithm) -> &'static [Self] {
        match family {
            KeyAlgorithm::Rsa => &[Self::RsaSha256, Self::RsaSha512],
            KeyAlgorithm::Ecdsa => &[Self::EcdsaSha512, Self::EcdsaSha256],
            KeyAlgorithm::Ed25519 => &[Self::Ed25519],
        }
    }

    /// Legacy algorithm name, as used before `hs2019`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RsaSha256 => "rsa-sha256",
            Self::RsaSha512 => "rsa-sha512",
            Self::EcdsaSha256 => "ecdsa-sha256",
            Self::EcdsaSha512 => "ecdsa-sha512",
            Self::Ed25519 => "ed25519",
        }
    }

    /// Resolve a legacy algorithm name. `hs2019` has no fixed algorithm and
    /// yields `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rsa-sha256" => Some(Self::RsaSha256),
            "rsa-sha512" => Some(Self::RsaSha512),
            "ecdsa-sha256" => Some(Self::EcdsaSha256),
            "ecdsa-sha512" => Some(Self::EcdsaSha512),
            "ed25519" => Some(Self::Ed25519),
            _ => None,
        }
    }
}

/// Parsed HTTP Signature header.
#[derive(Debug, Clone)]
pub struct HttpSignature {
    /// Key ID (typically the actor's public key URL)
    pub key_id: String,
    /// Algorithm label (typically "hs2019")
    pub algorithm: String,
    /// Headers included in the signature
    pub headers: Vec<String>,
    /// The signature itself (base64 encoded)
    pub signature: String,
}

impl HttpSignature {
    /// Parse an HTTP Signature header value.
    ///
    /// Format: `keyId="...",algorithm="...",headers="...",signature="..."`
    pub fn parse(header: &str) -> AppResult<Self> {
        let mut key_id = None;
        let mut algorithm = None;
        let mut headers = None;
        let mut signature = None;

        // Parse key="value" pairs
        for part in header.split(',') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                let value = value.trim_matches('"');
                match key.trim() {
                    "keyId" => key_id = Some(value.to_string()),
                    "algorithm" => algorithm = Some(value.to_string()),
                    "headers" => headers = Some(value.to_string()),
                    "signature" => signature = Some(value.to_string()),
                    _ => {} // Ignore unknown fields
                }
            }
        }

        Ok(Self {
            key_id: key_id
                .ok_or_else(|| AppError::InvalidSignatureHeader("Missing keyId".to_string()))?,
            algorithm: algorithm.unwrap_or_else(|| SIGNATURE_ALGORITHM_LABEL.to_string()),
            headers: headers
                .unwrap_or_else(|| "date".to_string())
                .split(' ')
                .map(std::string::ToString::to_string)
                .collect(),
            signature: signature
                .ok_or_else(|| AppError::InvalidSignatureHeader("Missing signature".to_string()))?,
        })
    }
}

/// Build the signature string from request components.
///
/// `headers` must be keyed by lowercase header name.
pub fn build_signature_string(
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    signed_headers: &[String],
) -> AppResult<String> {
    let mut parts = Vec::with_capacity(signed_headers.len());

    for header_name in signed_headers {
        let value = if header_name == REQUEST_TARGET {
            format!("{} {}", method.to_lowercase(), path)
        } else {
            headers
                .get(&header_name.to_lowercase())
                .cloned()
                .ok_or_else(|| AppError::MissingHeader(header_name.clone()))?
        };

        parts.push(format!("{header_name}: {value}"));
    }

    Ok(parts.join("\n"))
}

/// Sign raw bytes with the given key and algorithm.
///
/// ECDSA signatures are DER encoded.
pub fn sign_bytes(
    private_key: &PrivateKey,
    algorithm: SignatureAlgorithm,
    data: &[u8],
) -> AppResult<Vec<u8>> {
    let mismatch = || {
        AppError::Signing(format!(
            "{} cannot sign with a {} key",
            algorithm.name(),
            private_key.algorithm()
        ))
    };

    match (private_key, algorithm) {
        (PrivateKey::Rsa(key), SignatureAlgorithm::RsaSha256) => {
            let signing_key = pkcs1v15::SigningKey::<Sha256>::new(key.clone());
            let signature: pkcs1v15::Signature = signing_key
                .try_sign(data)
                .map_err(|e| AppError::Signing(e.to_string()))?;
            Ok(signature.to_vec())
        }
        (PrivateKey::Rsa(key), SignatureAlgorithm::RsaSha512) => {
            let signing_key = pkcs1v15::SigningKey::<Sha512>::new(key.clone());
            let signature: pkcs1v15::Signature = signing_key
                .try_sign(data)
                .map_err(|e| AppError::Signing(e.to_string()))?;
            Ok(signature.to_vec())
        }
        (PrivateKey::Ecdsa(key), SignatureAlgorithm::EcdsaSha256) => {
            let signature: p256::ecdsa::Signature = key
                .try_sign(data)
                .map_err(|e| AppError::Signing(e.to_string()))?;
            Ok(signature.to_der().as_bytes().to_vec())
        }
        (PrivateKey::Ecdsa(key), SignatureAlgorithm::EcdsaSha512) => {
            let prehash = Sha512::digest(data);
            let signature: p256::ecdsa::Signature = key
                .sign_prehash(&prehash)
                .map_err(|e| AppError::Signing(e.to_string()))?;
            Ok(signature.to_der().as_bytes().to_vec())
        }
        (PrivateKey::Ed25519(key), SignatureAlgorithm::Ed25519) => {
            let signature: ed25519_dalek::Signature = key
                .try_sign(data)
                .map_err(|e| AppError::Signing(e.to_string()))?;
            Ok(signature.to_bytes().to_vec())
        }
        _ => Err(mismatch()),
    }
}

/// Verify raw bytes against a signature produced by [`sign_bytes`].
#[must_use]
pub fn verify_bytes(
    public_key: &PublicKey,
    algorithm: SignatureAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> bool {
    match (public_key, algorithm) {
        (PublicKey::Rsa(key), SignatureAlgorithm::RsaSha256) => {
            let verifying_key = pkcs1v15::VerifyingKey::<Sha256>::new(key.clone());
            pkcs1v15::Signature::try_from(signature)
                .is_ok_and(|sig| verifying_key.verify(data, &sig).is_ok())
        }
        (PublicKey::Rsa(key), SignatureAlgorithm::RsaSha512) => {
            let verifying_key = pkcs1v15::VerifyingKey::<Sha512>::new(key.clone());
            pkcs1v15::Signature::try_from(signature)
                .is_ok_and(|sig| verifying_key.verify(data, &sig).is_ok())
        }
        (PublicKey::Ecdsa(key), SignatureAlgorithm::EcdsaSha256) => {
            p256::ecdsa::Signature::from_der(signature)
                .is_ok_and(|sig| key.verify(data, &sig).is_ok())
        }
        (PublicKey::Ecdsa(key), SignatureAlgorithm::EcdsaSha512) => {
            let prehash = Sha512::digest(data);
            p256::ecdsa::Signature::from_der(signature)
                .is_ok_and(|sig| key.verify_prehash(&prehash, &sig).is_ok())
        }
        (PublicKey::Ed25519(key), SignatureAlgorithm::Ed25519) => {
            ed25519_dalek::Signature::from_slice(signature)
                .is_ok_and(|sig| key.verify(data, &sig).is_ok())
        }
        _ => false,
    }
}

/// Verify an HTTP Signature.
///
/// For `hs2019` every candidate algorithm of the key's family is tried.
pub fn verify_signature(
    signature: &HttpSignature,
    public_key: &PublicKey,
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
) -> AppResult<bool> {
    // Build the signature string
    let sig_string = build_signature_string(method, path, headers, &signature.headers)?;

    // Decode the signature
    let sig_bytes = BASE64.decode(&signature.signature).map_err(|e| {
        AppError::InvalidSignatureHeader(format!("Invalid signature encoding: {e}"))
    })?;

    let candidates: Vec<SignatureAlgorithm> = match SignatureAlgorithm::from_name(&signature.algorithm)
    {
        Some(algorithm) => vec![algorithm],
        None => SignatureAlgorithm::candidates(public_key.algorithm()).to_vec(),
    };

    Ok(candidates
        .into_iter()
        .any(|algorithm| verify_bytes(public_key, algorithm, sig_string.as_bytes(), &sig_bytes)))
}

/// Sign an HTTP request.
///
/// # Arguments
/// * `private_key` - The private key
/// * `algorithm` - Concrete algorithm to sign with
/// * `key_id` - The key ID (public key URL)
/// * `method` - HTTP method
/// * `path` - Request path
/// * `headers` - Request headers, keyed by lowercase name
/// * `signed_header_names` - Components to cover, in order
pub fn sign_request(
    private_key: &PrivateKey,
    algorithm: SignatureAlgorithm,
    key_id: &str,
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    signed_header_names: &[&str],
) -> AppResult<String> {
    // Build signature string
    let header_names: Vec<String> = signed_header_names
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    let sig_string = build_signature_string(method, path, headers, &header_names)?;

    // Sign
    let signature = sign_bytes(private_key, algorithm, sig_string.as_bytes())?;
    let sig_base64 = BASE64.encode(signature);

    // Build header value
    Ok(format!(
        r#"keyId="{}",algorithm="{}",headers="{}",signature="{}""#,
        key_id,
        SIGNATURE_ALGORITHM_LABEL,
        signed_header_names.join(" "),
        sig_base64
    ))
}

/// Calculate SHA-256 digest of a body.
#[must_use]
pub fn calculate_digest(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64.encode(Sha256::digest(body)))
}

/// Format a timestamp as an HTTP date.
#[must_use]
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

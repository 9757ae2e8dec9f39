// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The key ring: one private signing key plus every trusted public key.
//!
//! ## Invariants
//!
//! - The public key map always holds the service's own verifying key under
//!   its fixed key identifier. `merge` can neither remove nor replace it.
//! - Entries are immutable and shared as `Arc<KeyEntry>`; a merge swaps whole
//!   entries under the write lock, so a reader sees either the old or the new
//!   entry, never a mix.
//! - Nothing is ever removed. Identifiers a provider stops listing stay
//!   trusted until overwritten (grace period for tokens minted mid-rotation).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::claims::TokenClaims;
use super::error::AuthError;

/// Number of SHA-256 bytes kept in a key fingerprint (40 hex characters).
const FINGERPRINT_BYTES: usize = 20;

/// A trusted public key and the algorithm it verifies.
#[derive(Clone)]
pub struct KeyEntry {
    pub id: String,
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("id", &self.id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl KeyEntry {
    /// Parse an RSA public key in PEM form (`PUBLIC KEY` or `RSA PUBLIC KEY`).
    pub fn from_rsa_pem(id: impl Into<String>, pem: &str) -> Result<Self, AuthError> {
        let id = id.into();
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::Internal(format!("Invalid RSA public key {id}: {e}")))?;
        Ok(Self {
            id,
            key,
            algorithm: Algorithm::RS256,
        })
    }

    /// Convert a JWK to a key entry. The JWK must carry a `kid`.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, AuthError> {
        let id = jwk
            .common
            .key_id
            .clone()
            .ok_or_else(|| AuthError::Internal("JWK without kid".to_string()))?;

        match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => {
                let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                    .map_err(|e| AuthError::Internal(format!("Failed to create RSA key: {e}")))?;

                let algorithm = match jwk.common.key_algorithm {
                    Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                    Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                    _ => Algorithm::RS256,
                };
                Ok(Self { id, key, algorithm })
            }
            AlgorithmParameters::EllipticCurve(ec) => {
                let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                    .map_err(|e| AuthError::Internal(format!("Failed to create EC key: {e}")))?;

                let algorithm = match jwk.common.key_algorithm {
                    Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                    _ => Algorithm::ES256,
                };
                Ok(Self { id, key, algorithm })
            }
            _ => Err(AuthError::Internal(format!(
                "Unsupported key type in JWKS for {id}"
            ))),
        }
    }
}

/// Fingerprint of a SubjectPublicKeyInfo DER blob, used as a key identifier.
pub fn key_fingerprint(spki_der: &[u8]) -> String {
    Sha256::digest(spki_der)[..FINGERPRINT_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// The service's own RSA key pair.
///
/// The public half is derived from the private key and its fingerprint is
/// the fixed key identifier stamped on every issued token.
pub struct SigningKey {
    key_id: String,
    encoding: EncodingKey,
    verifying: KeyEntry,
}

impl SigningKey {
    /// Load from PEM text (PKCS#8 `PRIVATE KEY` or PKCS#1 `RSA PRIVATE KEY`).
    pub fn from_private_pem(private_pem: &str) -> Result<Self, AuthError> {
        let block = pem::parse(private_pem)
            .map_err(|e| AuthError::Internal(format!("Invalid signing key PEM: {e}")))?;
        let private = match block.tag() {
            "PRIVATE KEY" => RsaPrivateKey::from_pkcs8_der(block.contents())
                .map_err(|e| AuthError::Internal(format!("Invalid signing key: {e}")))?,
            "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_der(block.contents())
                .map_err(|e| AuthError::Internal(format!("Invalid signing key: {e}")))?,
            other => {
                return Err(AuthError::Internal(format!(
                    "Unsupported signing key PEM block: {other}"
                )))
            }
        };
        let public = RsaPublicKey::from(&private);

        let der = public
            .to_public_key_der()
            .map_err(|e| AuthError::Internal(format!("Failed to encode public key: {e}")))?;
        let key_id = key_fingerprint(der.as_bytes());

        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::Internal(format!("Failed to encode public key: {e}")))?;
        let verifying = KeyEntry::from_rsa_pem(key_id.clone(), &public_pem)?;

        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AuthError::Internal(format!("Invalid signing key: {e}")))?;

        Ok(Self {
            key_id,
            encoding,
            verifying,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// What a merge changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub replaced: usize,
    /// Entries that tried to overwrite the self key and were ignored
    pub rejected: usize,
}

/// Process-wide key ring, shared behind an `Arc` by every request handler.
pub struct KeyRing {
    signing: SigningKey,
    public_keys: RwLock<HashMap<String, Arc<KeyEntry>>>,
}

impl KeyRing {
    /// Create a ring holding only the self key.
    pub fn new(signing: SigningKey) -> Self {
        let mut map = HashMap::new();
        map.insert(
            signing.key_id.clone(),
            Arc::new(signing.verifying.clone()),
        );
        Self {
            signing,
            public_keys: RwLock::new(map),
        }
    }

    /// The fixed identifier of the service's own key.
    pub fn self_key_id(&self) -> &str {
        &self.signing.key_id
    }

    /// Look up the public key for a key identifier.
    pub async fn verifying_key(&self, key_id: &str) -> Result<Arc<KeyEntry>, AuthError> {
        let keys = self.public_keys.read().await;
        keys.get(key_id)
            .cloned()
            .ok_or_else(|| AuthError::UnknownKey(key_id.to_string()))
    }

    /// Sign claims with the private key, stamping the self key identifier.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.signing.key_id.clone());
        jsonwebtoken::encode(&header, claims, &self.signing.encoding)
            .map_err(|e| AuthError::Internal(format!("Token signing failed: {e}")))
    }

    /// Add or replace entries. Never removes anything and never touches the
    /// self key entry.
    pub async fn merge(&self, entries: impl IntoIterator<Item = KeyEntry>) -> MergeOutcome {
        let entries: Vec<Arc<KeyEntry>> = entries.into_iter().map(Arc::new).collect();
        let mut outcome = MergeOutcome::default();

        let mut keys = self.public_keys.write().await;
        for entry in entries {
            if entry.id == self.signing.key_id {
                outcome.rejected += 1;
                continue;
            }
            match keys.insert(entry.id.clone(), entry) {
                Some(_) => outcome.replaced += 1,
                None => outcome.added += 1,
            }
        }
        outcome
    }

    /// Trusted key identifiers, sorted.
    pub async fn key_ids(&self) -> Vec<String> {
        let keys = self.public_keys.read().await;
        let mut ids: Vec<String> = keys.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.public_keys.read().await.len()
    }
}

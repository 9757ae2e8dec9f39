// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity-provider key fetching.
//!
//! The endpoint returns either a flat `{ "<kid>": "<PEM public key>" }`
//! mapping or a standard JWKS document. Both parse into [`KeyEntry`] values.
//! Individual keys that fail to parse are logged and skipped; the caller
//! decides whether what is left is enough.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use tracing::warn;

use super::error::AuthError;
use super::keyring::KeyEntry;

/// HTTP timeout for one key fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of external public keys.
pub trait KeyProvider: Send + Sync + 'static {
    /// Fetch the provider's current key set.
    fn fetch(&self) -> impl Future<Output = Result<Vec<KeyEntry>, AuthError>> + Send;

    /// Where the keys come from, for logs.
    fn describe(&self) -> String;
}

impl<P: KeyProvider> KeyProvider for Arc<P> {
    fn fetch(&self) -> impl Future<Output = Result<Vec<KeyEntry>, AuthError>> + Send {
        (**self).fetch()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Wire formats accepted from the key endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum KeyDocument {
    Pem(HashMap<String, String>),
    Jwks(JwkSet),
}

/// Parse a key endpoint response body.
pub fn parse_key_document(body: &[u8]) -> Result<Vec<KeyEntry>, AuthError> {
    let document: KeyDocument = serde_json::from_slice(body)
        .map_err(|e| AuthError::UpstreamUnavailable(format!("Unreadable key document: {e}")))?;

    let parsed: Vec<Result<KeyEntry, AuthError>> = match document {
        KeyDocument::Pem(keys) => keys
            .iter()
            .map(|(kid, pem)| KeyEntry::from_rsa_pem(kid.clone(), pem))
            .collect(),
        KeyDocument::Jwks(set) => set.keys.iter().map(KeyEntry::from_jwk).collect(),
    };

    let mut entries = Vec::with_capacity(parsed.len());
    for result in parsed {
        match result {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(error = %e, "Skipping unusable provider key"),
        }
    }
    Ok(entries)
}

/// Key provider backed by an HTTPS endpoint.
#[derive(Clone)]
pub struct HttpKeyProvider {
    url: String,
    client: reqwest::Client,
}

impl HttpKeyProvider {
    /// Create a provider for the given endpoint URL.
    pub fn new(url: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl KeyProvider for HttpKeyProvider {
    async fn fetch(&self) -> Result<Vec<KeyEntry>, AuthError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::UpstreamUnavailable(format!(
                "HTTP {} from key endpoint",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(e.to_string()))?;

        parse_key_document(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use axum::{routing::get, Json, Router};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tempfile::TempDir;

use crate::auth::claims::{TokenClaims, TokenKind};
use crate::auth::keyring::{KeyEntry, KeyRing, SigningKey};
use crate::auth::provider::KeyProvider;
use crate::auth::{AuthError, TokenPolicy, TokenVerifier};
use crate::state::AppState;
use crate::storage::Storage;

pub const SIGNING_KEY_PEM: &str = include_str!("../testdata/signing_key.pem");
pub const SIGNING_PUBLIC_PEM: &str = include_str!("../testdata/signing_key.pub.pem");
pub const PROVIDER_K1_PEM: &str = include_str!("../testdata/provider_k1.pem");
pub const PROVIDER_K1_PUBLIC_PEM: &str = include_str!("../testdata/provider_k1.pub.pem");
pub const PROVIDER_K2_PEM: &str = include_str!("../testdata/provider_k2.pem");
pub const PROVIDER_K2_PUBLIC_PEM: &str = include_str!("../testdata/provider_k2.pub.pem");

/// Base64url modulus of `provider_k2`, for JWKS documents.
pub const PROVIDER_K2_JWK_N: &str = "w6h_tBMSlV1dy6sRdPjEXMijldDVWNOT2vuoJE3KptFAJa6MHkZ25kxKhYPOLUM5z4ND4P-M6GXSzJwSIBVd1FePpG8xd740duweiAuAnuibgMxAuXZ0YgVqPY8WvQr9TBnWnthSaR3xwXTqJ0NbjFcMxSxBGV0Jy1NR_YSWMafshWRsjFXH7TIaaz1rbH44764srg_M0XdzMW2MjL05Y8j9OGIbvWIJk2_wLlC0p1DJifIe3LcWnpAKZBx3ijCUMsitLxsAlJFQN-0ZcccRLIF-1p7fswNxOd02d_n_1Ey79fzI0GndAlf0ue5X0rGcDw1d5R44-K6r7WTkoGg2Vw";

pub fn signing_key() -> SigningKey {
    SigningKey::from_private_pem(SIGNING_KEY_PEM).expect("fixture signing key")
}

pub fn keyring() -> Arc<KeyRing> {
    Arc::new(KeyRing::new(signing_key()))
}

pub fn provider_entry(kid: &str, public_pem: &str) -> KeyEntry {
    KeyEntry::from_rsa_pem(kid, public_pem).expect("fixture public key")
}

/// Access claims for `sub` expiring `ttl_secs` from now.
pub fn claims(sub: u64, ttl_secs: i64) -> TokenClaims {
    let now = Utc::now().timestamp();
    TokenClaims {
        sub: sub.to_string(),
        iat: now,
        exp: now + ttl_secs,
        kind: TokenKind::Access,
    }
}

/// Sign claims with an arbitrary private key under an arbitrary kid, the way
/// an external issuer would.
pub fn sign_external(private_pem: &str, kid: &str, claims: &TokenClaims) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("fixture private key");
    jsonwebtoken::encode(&header, claims, &key).expect("sign fixture token")
}

pub fn temp_storage() -> (Storage, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let storage = Storage::open(&dir.path().join("photoshare.redb")).expect("open storage");
    (storage, dir)
}

/// Application state over a fresh database and the fixture key ring.
pub fn app_state() -> (AppState, TempDir) {
    let (storage, dir) = temp_storage();
    let verifier = TokenVerifier::new(keyring(), TokenPolicy::default());
    (AppState::new(verifier, storage), dir)
}

/// Serve `body` as JSON on a local port and return the URL.
pub async fn serve_key_document(body: serde_json::Value) -> String {
    let app = Router::new().route("/certs", get(move || async move { Json(body) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local key endpoint");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/certs")
}

/// In-process key provider whose answer can be switched between a key set
/// and an outage.
#[derive(Default)]
pub struct FakeProvider {
    keys: Mutex<Option<Vec<(String, String)>>>,
    calls: Mutex<usize>,
}

impl FakeProvider {
    pub fn serving(keys: &[(&str, &str)]) -> Arc<Self> {
        let provider = Arc::new(Self::default());
        provider.set_keys(keys);
        provider
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_keys(&self, keys: &[(&str, &str)]) {
        let owned = keys
            .iter()
            .map(|(kid, pem)| (kid.to_string(), pem.to_string()))
            .collect();
        *self.keys.lock().unwrap() = Some(owned);
    }

    pub fn go_down(&self) {
        *self.keys.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl KeyProvider for FakeProvider {
    async fn fetch(&self) -> Result<Vec<KeyEntry>, AuthError> {
        *self.calls.lock().unwrap() += 1;
        let keys = self.keys.lock().unwrap().clone();
        match keys {
            Some(keys) => keys
                .iter()
                .map(|(kid, pem)| KeyEntry::from_rsa_pem(kid.clone(), pem))
                .collect(),
            None => Err(AuthError::UpstreamUnavailable(
                "connection refused".to_string(),
            )),
        }
    }

    fn describe(&self) -> String {
        "fake-provider".to_string()
    }
}

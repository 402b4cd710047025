#![allow(dead_code)]

use drinks_api::{AppConfig, AppState, MemoryRepository, StaticKeyStore, repository::RepositoryState};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::{sync::Arc, time::SystemTime};

// --- Signing Material ---

pub const TEST_KID: &str = "test-key";
pub const TEST_SECRET: &[u8] = b"drinks-api-integration-test-hmac-signing-secret!";

/// JWKS document publishing `TEST_SECRET` as an HS256 octet key under `TEST_KID`.
pub const TEST_JWKS: &str = r#"{
    "keys": [
        {
            "kty": "oct",
            "kid": "test-key",
            "alg": "HS256",
            "k": "ZHJpbmtzLWFwaS1pbnRlZ3JhdGlvbi10ZXN0LWhtYWMtc2lnbmluZy1zZWNyZXQh"
        }
    ]
}"#;

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Config matching the test tenant, with HS256 allowed.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.algorithms = vec![Algorithm::HS256];
    config
}

pub fn test_keys() -> StaticKeyStore {
    StaticKeyStore::from_json(TEST_JWKS).unwrap()
}

pub fn test_state_with(repo: RepositoryState) -> AppState {
    AppState {
        repo,
        keys: Arc::new(test_keys()),
        config: test_config(),
    }
}

pub fn test_state() -> AppState {
    test_state_with(Arc::new(MemoryRepository::new()))
}

/// Claims a valid token for the test tenant would carry.
pub fn valid_claims(permissions: &[&str]) -> Value {
    let config = test_config();
    let now = now();
    json!({
        "sub": "auth0|barista",
        "iss": config.auth.issuer(),
        "aud": config.auth.audience,
        "iat": now,
        "exp": now + 3600,
        "permissions": permissions,
    })
}

/// Signs `claims` with the test key, putting `kid` in the header when given.
pub fn sign(claims: &Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_secret(TEST_SECRET)).unwrap()
}

pub fn token_with(permissions: &[&str]) -> String {
    sign(&valid_claims(permissions), Some(TEST_KID))
}

/// Token for a manager holding every permission.
pub fn manager_token() -> String {
    token_with(&[
        "get:drinks-detail",
        "post:drinks",
        "patch:drinks",
        "delete:drinks",
    ])
}

mod support;

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri, header, request::Parts},
    response::IntoResponse,
    routing::get,
};
use drinks_api::{
    auth::{
        AuthError, Authorized, Claims, DeleteDrinks, GetDrinksDetail, PostDrinks, bearer_token,
        check_permission, verify_permission, verify_token,
    },
    config::AppConfig,
    keys::{KeyStore, KeyStoreError, RemoteKeyStore},
};
use serde_json::Value;
use std::{
    sync::{
        Arc, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use support::{
    TEST_JWKS, TEST_KID, now, sign, test_config, test_keys, test_state, token_with, valid_claims,
};
use tokio::{net::TcpListener, task::JoinSet};

// --- Helper Functions ---

fn bearer_headers(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

async fn verify(token: &str, permission: &str) -> Result<Claims, AuthError> {
    let headers = bearer_headers(&format!("Bearer {}", token));
    verify_permission(&headers, &test_keys(), &test_config().auth, permission).await
}

fn claims_with(permissions: Option<Vec<&str>>) -> Claims {
    Claims {
        sub: Some("auth0|tester".to_string()),
        exp: now() + 60,
        iat: None,
        permissions: permissions.map(|p| p.into_iter().map(str::to_string).collect()),
    }
}

// --- Header Extraction ---

#[test]
fn test_bearer_token_extracted() {
    let headers = bearer_headers("Bearer abc.def.ghi");
    assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");

    // The scheme is case-insensitive.
    let headers = bearer_headers("bearer abc.def.ghi");
    assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
}

#[test]
fn test_bearer_token_header_failures() {
    let missing = bearer_token(&HeaderMap::new()).unwrap_err();
    assert_eq!(missing, AuthError::header_missing());
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let cases = [
        ("Basic dXNlcjpwYXNz", AuthError::not_bearer()),
        ("Bearer", AuthError::token_not_found()),
        ("Bearer abc def", AuthError::not_bearer_token()),
        ("", AuthError::not_bearer()),
    ];
    for (value, expected) in cases {
        let err = bearer_token(&bearer_headers(value)).unwrap_err();
        assert_eq!(err, expected, "header value {:?}", value);
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}

// --- Permission Check ---

#[test]
fn test_check_permission_granted() {
    let claims = claims_with(Some(vec!["get:drinks-detail", "post:drinks"]));
    assert!(check_permission(&claims, "post:drinks").is_ok());
}

#[test]
fn test_check_permission_absent_is_forbidden() {
    let claims = claims_with(Some(vec!["get:drinks-detail"]));
    let err = check_permission(&claims, "delete:drinks").unwrap_err();
    assert_eq!(err, AuthError::permission_not_found());
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    // An empty permissions list is a denial, not a malformed token.
    let claims = claims_with(Some(vec![]));
    assert_eq!(
        check_permission(&claims, "post:drinks").unwrap_err().status,
        StatusCode::FORBIDDEN
    );
}

#[test]
fn test_check_permission_missing_claim_is_bad_request() {
    let err = check_permission(&claims_with(None), "post:drinks").unwrap_err();
    assert_eq!(err, AuthError::permissions_missing());
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

// --- Token Verification ---

#[tokio::test]
async fn test_verify_permission_success_returns_claims() {
    let token = token_with(&["get:drinks-detail"]);
    let claims = verify(&token, "get:drinks-detail").await.unwrap();

    assert_eq!(claims.sub.as_deref(), Some("auth0|barista"));
    assert_eq!(claims.permissions, Some(vec!["get:drinks-detail".to_string()]));
}

#[tokio::test]
async fn test_verify_permission_excluded_permission() {
    let token = token_with(&["get:drinks-detail"]);
    let err = verify(&token, "post:drinks").await.unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_verify_token_without_permissions_claim() {
    let mut claims = valid_claims(&[]);
    claims.as_object_mut().unwrap().remove("permissions");
    let token = sign(&claims, Some(TEST_KID));

    let err = verify(&token, "post:drinks").await.unwrap_err();
    assert_eq!(err, AuthError::permissions_missing());
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_token_expired() {
    let mut claims = valid_claims(&["post:drinks"]);
    claims["exp"] = Value::from(now() - 3600);
    let token = sign(&claims, Some(TEST_KID));

    let err = verify(&token, "post:drinks").await.unwrap_err();
    assert_eq!(err, AuthError::token_expired());
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_token_wrong_audience_and_issuer() {
    let mut claims = valid_claims(&["post:drinks"]);
    claims["aud"] = Value::from("someone-else");
    let err = verify(&sign(&claims, Some(TEST_KID)), "post:drinks").await.unwrap_err();
    assert_eq!(err, AuthError::invalid_claims());

    let mut claims = valid_claims(&["post:drinks"]);
    claims["iss"] = Value::from("https://evil.example.com/");
    let err = verify(&sign(&claims, Some(TEST_KID)), "post:drinks").await.unwrap_err();
    assert_eq!(err, AuthError::invalid_claims());
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_token_without_kid() {
    let token = sign(&valid_claims(&["post:drinks"]), None);
    let err = verify(&token, "post:drinks").await.unwrap_err();
    assert_eq!(err, AuthError::malformed_header());
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_token_unknown_kid() {
    let token = sign(&valid_claims(&["post:drinks"]), Some("rotated-away"));
    let err = verify(&token, "post:drinks").await.unwrap_err();
    assert_eq!(err, AuthError::key_not_found());
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_token_bad_signature() {
    let token = token_with(&["post:drinks"]);
    // Swap the signature for the signature of a different token.
    let other = token_with(&["delete:drinks"]);
    let forged = format!(
        "{}.{}",
        token.rsplit_once('.').unwrap().0,
        other.rsplit_once('.').unwrap().1
    );

    let err = verify(&forged, "post:drinks").await.unwrap_err();
    assert_eq!(err, AuthError::unparseable_token());
}

#[tokio::test]
async fn test_verify_token_garbage() {
    let err = verify("not-a-jwt", "post:drinks").await.unwrap_err();
    assert_eq!(err, AuthError::unparseable_token());
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_token_algorithm_not_allowed() {
    // Default configuration only allows RS256.
    let config = AppConfig::default();
    let token = token_with(&["post:drinks"]);

    let err = verify_token(&token, &test_keys(), &config.auth).await.unwrap_err();
    assert_eq!(err, AuthError::unparseable_token());
}

// --- Extractor ---

#[tokio::test]
async fn test_authorized_extractor_success() {
    let state = test_state();
    let mut parts = get_request_parts(Method::POST, "/drinks".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token_with(&["post:drinks"]))).unwrap(),
    );

    let authorized = Authorized::<PostDrinks>::from_request_parts(&mut parts, &state).await;

    assert!(authorized.is_ok());
    assert_eq!(
        authorized.unwrap().claims.permissions,
        Some(vec!["post:drinks".to_string()])
    );
}

#[tokio::test]
async fn test_authorized_extractor_missing_header() {
    let state = test_state();
    let mut parts = get_request_parts(Method::GET, "/drinks-detail".parse().unwrap());

    let err = Authorized::<GetDrinksDetail>::from_request_parts(&mut parts, &state)
        .await
        .unwrap_err();

    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_authorized_extractor_wrong_permission() {
    let state = test_state();
    let mut parts = get_request_parts(Method::DELETE, "/drinks/1".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token_with(&["get:drinks-detail"]))).unwrap(),
    );

    let err = Authorized::<DeleteDrinks>::from_request_parts(&mut parts, &state)
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::permission_not_found());
}

// --- Response Shape ---

#[tokio::test]
async fn test_auth_error_response_body() {
    let response = AuthError::permission_not_found().into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(
        body,
        serde_json::json!({"code": "unauthorized", "description": "Permission not found."})
    );
}

// --- Remote Key Store ---

/// Local stand-in for the identity provider's JWKS endpoint. Counts every request.
#[derive(Clone)]
struct JwksServer {
    hits: Arc<AtomicUsize>,
    reply: Arc<RwLock<(StatusCode, Value)>>,
    delay: Duration,
}

impl JwksServer {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn reply_with(&self, status: StatusCode, document: Value) {
        *self.reply.write().unwrap() = (status, document);
    }
}

async fn serve_jwks(State(server): State<JwksServer>) -> (StatusCode, Json<Value>) {
    server.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(server.delay).await;
    let (status, document) = server.reply.read().unwrap().clone();
    (status, Json(document))
}

/// Serves `document` and returns the JWKS URL to point a `RemoteKeyStore` at.
async fn spawn_jwks(status: StatusCode, document: Value, delay: Duration) -> (String, JwksServer) {
    let server = JwksServer {
        hits: Arc::new(AtomicUsize::new(0)),
        reply: Arc::new(RwLock::new((status, document))),
        delay,
    };
    let router = Router::new()
        .route("/.well-known/jwks.json", get(serve_jwks))
        .with_state(server.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let url = format!(
        "http://{}/.well-known/jwks.json",
        listener.local_addr().unwrap()
    );
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (url, server)
}

fn test_jwks() -> Value {
    serde_json::from_str(TEST_JWKS).unwrap()
}

/// The test key published under a new key id, as after a rotation.
fn rotated_jwks(kid: &str) -> Value {
    let mut document = test_jwks();
    document["keys"][0]["kid"] = Value::from(kid);
    document
}

#[tokio::test]
async fn test_remote_key_store_caches_key_set() {
    let (url, server) = spawn_jwks(StatusCode::OK, test_jwks(), Duration::ZERO).await;
    let keys = RemoteKeyStore::new(url);

    let claims = verify_token(
        &token_with(&["post:drinks"]),
        &keys,
        &test_config().auth,
    )
    .await
    .unwrap();
    assert_eq!(claims.permissions, Some(vec!["post:drinks".to_string()]));

    assert!(keys.find_key(TEST_KID).await.unwrap().is_some());
    assert!(keys.find_key(TEST_KID).await.unwrap().is_some());
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_remote_key_store_refetches_on_rotation() {
    let (url, server) = spawn_jwks(StatusCode::OK, test_jwks(), Duration::ZERO).await;
    let keys = RemoteKeyStore::new(url).with_cooldown(Duration::ZERO);

    assert!(keys.find_key(TEST_KID).await.unwrap().is_some());

    server.reply_with(StatusCode::OK, rotated_jwks("rotated-key"));
    let rotated = keys.find_key("rotated-key").await.unwrap();

    assert_eq!(rotated.and_then(|jwk| jwk.common.key_id), Some("rotated-key".to_string()));
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_remote_key_store_unknown_kid_respects_cooldown() {
    let (url, server) = spawn_jwks(StatusCode::OK, test_jwks(), Duration::ZERO).await;
    let keys = RemoteKeyStore::new(url);

    assert!(keys.find_key(TEST_KID).await.unwrap().is_some());
    for _ in 0..5 {
        assert!(keys.find_key("unknown-key").await.unwrap().is_none());
    }

    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_remote_key_store_outage_fetches_once_per_cooldown() {
    let (url, server) = spawn_jwks(
        StatusCode::SERVICE_UNAVAILABLE,
        serde_json::json!({"error": "down"}),
        Duration::ZERO,
    )
    .await;
    let keys = RemoteKeyStore::new(url);

    assert!(matches!(
        keys.find_key(TEST_KID).await,
        Err(KeyStoreError::Fetch(_))
    ));
    for _ in 0..9 {
        assert!(matches!(
            keys.find_key(TEST_KID).await,
            Err(KeyStoreError::CoolingDown(_))
        ));
    }
    assert_eq!(server.hits(), 1);

    // The verifier reports an unreachable key set as a missing key.
    let err = verify_token(&token_with(&[]), &keys, &test_config().auth)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::key_not_found());
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_remote_key_store_single_fetch_for_concurrent_cold_lookups() {
    let (url, server) = spawn_jwks(
        StatusCode::OK,
        serde_json::json!({"keys": []}),
        Duration::from_millis(50),
    )
    .await;
    let keys = Arc::new(RemoteKeyStore::new(url));

    let mut lookups = JoinSet::new();
    for _ in 0..20 {
        let keys = keys.clone();
        lookups.spawn(async move { keys.find_key(TEST_KID).await });
    }
    while let Some(result) = lookups.join_next().await {
        assert!(result.unwrap().unwrap().is_none());
    }

    assert_eq!(server.hits(), 1);
}

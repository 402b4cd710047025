use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    config::{AppConfig, AuthConfig},
    keys::{KeyStore, KeyStoreState},
};

/// AuthError
///
/// Every authentication or authorization failure raised by the verifier. The code,
/// description and status are sent to the client as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {description}")]
pub struct AuthError {
    pub code: &'static str,
    pub description: &'static str,
    pub status: StatusCode,
}

impl AuthError {
    const fn new(code: &'static str, description: &'static str, status: StatusCode) -> Self {
        Self {
            code,
            description,
            status,
        }
    }

    pub const fn header_missing() -> Self {
        Self::new(
            "authorization_header_missing",
            "Authorization header is expected.",
            StatusCode::UNAUTHORIZED,
        )
    }

    pub const fn not_bearer() -> Self {
        Self::new(
            "invalid_header",
            "Authorization header must start with \"Bearer\".",
            StatusCode::UNAUTHORIZED,
        )
    }

    pub const fn token_not_found() -> Self {
        Self::new("invalid_header", "Token not found.", StatusCode::UNAUTHORIZED)
    }

    pub const fn not_bearer_token() -> Self {
        Self::new(
            "invalid_header",
            "Authorization header must be bearer token.",
            StatusCode::UNAUTHORIZED,
        )
    }

    /// The token header carries no key id.
    pub const fn malformed_header() -> Self {
        Self::new("invalid_header", "Authorization malformed.", StatusCode::UNAUTHORIZED)
    }

    pub const fn unparseable_token() -> Self {
        Self::new(
            "invalid_header",
            "Unable to parse authentication token.",
            StatusCode::BAD_REQUEST,
        )
    }

    pub const fn key_not_found() -> Self {
        Self::new(
            "invalid_header",
            "Unable to find the appropriate key.",
            StatusCode::BAD_REQUEST,
        )
    }

    pub const fn token_expired() -> Self {
        Self::new("token_expired", "Token expired.", StatusCode::UNAUTHORIZED)
    }

    pub const fn invalid_claims() -> Self {
        Self::new(
            "invalid_claims",
            "Incorrect claims. Please, check the audience and issuer.",
            StatusCode::UNAUTHORIZED,
        )
    }

    /// The token is well-formed but has no `permissions` claim at all.
    pub const fn permissions_missing() -> Self {
        Self::new(
            "invalid_claims",
            "Permissions not included in JWT.",
            StatusCode::BAD_REQUEST,
        )
    }

    pub const fn permission_not_found() -> Self {
        Self::new("unauthorized", "Permission not found.", StatusCode::FORBIDDEN)
    }
}

/// AuthErrorBody
///
/// Wire form of an [`AuthError`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthErrorBody {
    pub code: String,
    pub description: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(code = self.code, status = %self.status, "request rejected by verifier");
        let body = AuthErrorBody {
            code: self.code.to_string(),
            description: self.description.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Claims
///
/// The payload of a verified access token. `aud`, `iss` and `exp` are checked by the
/// decoder itself; only the fields the service reads are kept here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the identity-provider id of the caller.
    #[serde(default)]
    pub sub: Option<String>,
    pub exp: u64,
    #[serde(default)]
    pub iat: Option<u64>,
    /// Role-derived permission strings, e.g. `post:drinks`.
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

/// Permission
///
/// Marker trait naming a permission string a route requires.
pub trait Permission: Send + Sync + 'static {
    const NAME: &'static str;
}

macro_rules! permissions {
    ($($(#[$meta:meta])* $marker:ident => $name:literal),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy)]
            pub struct $marker;

            impl Permission for $marker {
                const NAME: &'static str = $name;
            }
        )*
    };
}

permissions! {
    /// Read the full recipe of every drink.
    GetDrinksDetail => "get:drinks-detail",
    PostDrinks => "post:drinks",
    PatchDrinks => "patch:drinks",
    DeleteDrinks => "delete:drinks",
}

/// bearer_token
///
/// Pulls the raw token out of an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::header_missing())?
        .to_str()
        .map_err(|_| AuthError::not_bearer())?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), _, _) if !scheme.eq_ignore_ascii_case("bearer") => {
            Err(AuthError::not_bearer())
        }
        (None, _, _) => Err(AuthError::not_bearer()),
        (Some(_), None, _) => Err(AuthError::token_not_found()),
        (Some(_), Some(_), Some(_)) => Err(AuthError::not_bearer_token()),
        (Some(_), Some(token), None) => Ok(token),
    }
}

/// verify_token
///
/// Validates signature, expiry, audience and issuer of `token` and returns its claims.
/// The signing key is selected by the `kid` in the token header.
pub async fn verify_token(
    token: &str,
    keys: &dyn KeyStore,
    auth: &AuthConfig,
) -> Result<Claims, AuthError> {
    let token_header = decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "unreadable token header");
        AuthError::unparseable_token()
    })?;

    let kid = token_header
        .kid
        .as_deref()
        .ok_or(AuthError::malformed_header())?;

    if !auth.algorithms.contains(&token_header.alg) {
        tracing::debug!(alg = ?token_header.alg, "token signed with a disallowed algorithm");
        return Err(AuthError::unparseable_token());
    }

    let jwk = match keys.find_key(kid).await {
        Ok(Some(jwk)) => jwk,
        Ok(None) => return Err(AuthError::key_not_found()),
        Err(e) => {
            tracing::error!(error = %e, "signing key set unavailable");
            return Err(AuthError::key_not_found());
        }
    };

    let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
        tracing::warn!(error = %e, kid, "published signing key is unusable");
        AuthError::key_not_found()
    })?;

    let mut validation = Validation::new(token_header.alg);
    validation.set_audience(&[auth.audience.as_str()]);
    validation.set_issuer(&[auth.issuer()]);

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => Err(AuthError::token_expired()),
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Err(AuthError::invalid_claims()),
            _ => {
                tracing::debug!(error = %e, "token rejected");
                Err(AuthError::unparseable_token())
            }
        },
    }
}

/// check_permission
///
/// A missing `permissions` claim is a malformed token (400); a claim that simply lacks
/// `permission` is a denial (403).
pub fn check_permission(claims: &Claims, permission: &str) -> Result<(), AuthError> {
    let granted = claims
        .permissions
        .as_ref()
        .ok_or(AuthError::permissions_missing())?;

    if granted.iter().any(|p| p == permission) {
        Ok(())
    } else {
        Err(AuthError::permission_not_found())
    }
}

/// verify_permission
///
/// The full verifier pipeline: header extraction, token verification, permission check.
pub async fn verify_permission(
    headers: &HeaderMap,
    keys: &dyn KeyStore,
    auth: &AuthConfig,
    permission: &str,
) -> Result<Claims, AuthError> {
    let token = bearer_token(headers)?;
    let claims = verify_token(token, keys, auth).await?;
    check_permission(&claims, permission)?;
    Ok(claims)
}

/// Authorized Extractor Result
///
/// Proof that the request carried a valid token holding permission `P`. Taking an
/// `Authorized<P>` argument is how a handler declares the permission it requires.
#[derive(Debug, Clone)]
pub struct Authorized<P> {
    pub claims: Claims,
    permission: PhantomData<fn() -> P>,
}

impl<P: Permission> Authorized<P> {
    pub fn new(claims: Claims) -> Self {
        Self {
            claims,
            permission: PhantomData,
        }
    }
}

/// Authorized Extractor Implementation
///
/// Resolves the key store and identity settings from the application state and runs
/// [`verify_permission`] for `P::NAME`. Rejects with the verifier's [`AuthError`].
impl<S, P> FromRequestParts<S> for Authorized<P>
where
    S: Send + Sync,
    P: Permission,
    KeyStoreState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = KeyStoreState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let claims = verify_permission(&parts.headers, keys.as_ref(), &config.auth, P::NAME).await?;
        tracing::debug!(sub = ?claims.sub, permission = P::NAME, "permission granted");

        Ok(Self::new(claims))
    }
}

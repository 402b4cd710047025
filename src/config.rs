use std::{env, str::FromStr};

use jsonwebtoken::Algorithm;
use thiserror::Error;

/// ConfigError
///
/// Raised by [`AppConfig::load`] when the environment does not describe a runnable service.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("unsupported signing algorithm list `{0}`")]
    Algorithm(String),
}

/// AuthConfig
///
/// Identity-provider settings used by the permission verifier. Tokens must be issued by
/// `https://<domain>/` for `audience`, and signed with one of `algorithms`.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    // Tenant domain of the identity provider (e.g. `my-shop.us.auth0.com`).
    pub domain: String,
    // Expected `aud` claim.
    pub audience: String,
    // Allow-list of token signing algorithms.
    pub algorithms: Vec<Algorithm>,
}

impl AuthConfig {
    /// Expected `iss` claim. The trailing slash is part of the issuer string.
    pub fn issuer(&self) -> String {
        format!("https://{}/", self.domain)
    }

    /// Location of the provider's published signing keys.
    pub fn jwks_url(&self) -> String {
        format!("https://{}/.well-known/jwks.json", self.domain)
    }
}

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// immutable afterwards; handlers pull it out of the shared state via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Selects the log format and which settings are mandatory.
    pub env: Env,
    // Database connection string (Postgres), or `memory` for the in-process store.
    pub db_url: String,
    pub auth: AuthConfig,
    // Drop every drink and insert the seed drink at startup.
    pub reset_db: bool,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
}

/// Env
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

pub const MEMORY_DB_URL: &str = "memory";
const LOCAL_AUTH0_DOMAIN: &str = "dev-tenant.us.auth0.com";
const LOCAL_API_AUDIENCE: &str = "drinks";
const DEFAULT_ALGORITHMS: &str = "RS256";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

impl Default for AppConfig {
    /// default
    ///
    /// Safe configuration for test scaffolding: in-memory store, local identity tenant,
    /// RS256 only.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: MEMORY_DB_URL.to_string(),
            auth: AuthConfig {
                domain: LOCAL_AUTH0_DOMAIN.to_string(),
                audience: LOCAL_API_AUDIENCE.to_string(),
                algorithms: vec![Algorithm::RS256],
            },
            reset_db: false,
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables. `DATABASE_URL` is always
    /// required. In production the identity settings (`AUTH0_DOMAIN`, `API_AUDIENCE`)
    /// must be set explicitly; locally they fall back to a development tenant.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let (domain, audience) = match env {
            Env::Production => (
                env::var("AUTH0_DOMAIN").map_err(|_| ConfigError::Missing("AUTH0_DOMAIN"))?,
                env::var("API_AUDIENCE").map_err(|_| ConfigError::Missing("API_AUDIENCE"))?,
            ),
            Env::Local => (
                env::var("AUTH0_DOMAIN").unwrap_or_else(|_| LOCAL_AUTH0_DOMAIN.to_string()),
                env::var("API_AUDIENCE").unwrap_or_else(|_| LOCAL_API_AUDIENCE.to_string()),
            ),
        };

        let algorithms = parse_algorithms(
            &env::var("ALGORITHMS").unwrap_or_else(|_| DEFAULT_ALGORITHMS.to_string()),
        )?;

        let reset_db = env::var("DB_RESET")
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            env,
            db_url,
            auth: AuthConfig {
                domain,
                audience,
                algorithms,
            },
            reset_db,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

/// parse_algorithms
///
/// Parses a comma-separated allow-list such as `RS256,RS384`. An empty list or any
/// unknown name is rejected.
pub fn parse_algorithms(raw: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let algorithms = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Algorithm::from_str)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ConfigError::Algorithm(raw.to_string()))?;

    if algorithms.is_empty() {
        return Err(ConfigError::Algorithm(raw.to_string()));
    }
    Ok(algorithms)
}

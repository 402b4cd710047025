use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod keys;
pub mod models;
pub mod repository;

// Routing split by access level (public, permission-gated).
pub mod routes;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use keys::{KeyStoreState, RemoteKeyStore, StaticKeyStore};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for the drinks API, served at `/api-docs/openapi.json` and browsable
/// through the Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_drinks, handlers::get_drinks_detail, handlers::create_drink,
        handlers::update_drink, handlers::delete_drink
    ),
    components(
        schemas(
            models::Ingredient, models::IngredientSummary, models::Drink, models::DrinkSummary,
            models::RecipeInput, models::CreateDrinkRequest, models::UpdateDrinkRequest,
            models::DrinkListResponse, models::DrinkDetailListResponse,
            models::DrinkCreatedResponse, models::DeleteDrinkResponse,
            error::ErrorResponse, auth::AuthErrorBody,
        )
    ),
    tags(
        (name = "drinks", description = "Coffee shop drinks menu API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request needs, built once at startup and shared by all requests.
#[derive(Clone)]
pub struct AppState {
    /// Drinks persistence (Postgres or in-memory).
    pub repo: RepositoryState,
    /// Trusted token signing keys.
    pub keys: KeyStoreState,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for KeyStoreState {
    fn from_ref(app_state: &AppState) -> KeyStoreState {
        app_state.keys.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routes, the JSON fallbacks for unknown paths and unsupported methods,
/// and the observability and CORS layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration: the menu is consumed by a browser app on another origin.
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        // Unknown paths and wrong methods answer with the JSON error envelope.
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, correlated by its `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints that need no token. The menu listing only ever exposes the short
/// projection, so ingredient names stay hidden from anonymous clients.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /drinks
        // The public menu: title, colors and parts of every drink.
        .route("/drinks", get(handlers::get_drinks))
        // GET /items
        // Alias of /drinks.
        .route("/items", get(handlers::get_drinks))
}

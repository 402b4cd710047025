use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Authenticated Router Module
///
/// Every handler here takes an `Authorized<P>` argument, so a request only reaches the
/// handler body once the verifier has accepted its token and found the permission:
///
/// - `get:drinks-detail` for the detailed listing
/// - `post:drinks`, `patch:drinks`, `delete:drinks` for the menu manager
///
/// The `/items...` paths are aliases of the `/drinks...` paths.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /drinks-detail
        // Full menu, including ingredient names.
        .route("/drinks-detail", get(handlers::get_drinks_detail))
        .route("/items-detail", get(handlers::get_drinks_detail))
        // POST /drinks
        // Adds a drink. Shares its path with the public listing; the router merges them.
        .route("/drinks", post(handlers::create_drink))
        .route("/items", post(handlers::create_drink))
        // PATCH/DELETE /drinks/{id}
        .route(
            "/drinks/{id}",
            patch(handlers::update_drink).delete(handlers::delete_drink),
        )
        .route(
            "/items/{id}",
            patch(handlers::update_drink).delete(handlers::delete_drink),
        )
}

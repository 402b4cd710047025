use crate::{
    AppState,
    auth::{Authorized, DeleteDrinks, GetDrinksDetail, PatchDrinks, PostDrinks},
    error::{ApiError, ApiResult},
    models::{
        CreateDrinkRequest, DeleteDrinkResponse, Drink, DrinkCreatedResponse,
        DrinkDetailListResponse, DrinkListResponse, UpdateDrinkRequest,
    },
    repository::StoreError,
};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{HeaderMap, header, request::Parts},
};
use serde::de::DeserializeOwned;

// --- Extractors ---

/// JsonBody
///
/// JSON request body. A body that is absent (no JSON content type, zero bytes, or JSON
/// `null`) is rejected as "resource not found"; see `From<JsonRejection> for ApiError`
/// for the other cases.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

fn has_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"))
}

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !has_json_content_type(req.headers()) {
            return Err(ApiError::NotFound);
        }
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            tracing::debug!(error = %e, "unreadable request body");
            ApiError::BadRequest
        })?;
        if bytes.is_empty() {
            return Err(ApiError::NotFound);
        }

        let Json(value) = Json::<serde_json::Value>::from_bytes(&bytes)?;
        if value.is_null() {
            return Err(ApiError::NotFound);
        }
        serde_json::from_value(value).map(JsonBody).map_err(|e| {
            tracing::debug!(error = %e, "request body has the wrong shape");
            ApiError::Unprocessable
        })
    }
}

/// DrinkId
///
/// The `{id}` path segment. Anything that is not an integer answers 404, as if no
/// route matched.
#[derive(Debug, Clone, Copy)]
pub struct DrinkId(pub i32);

impl<S> FromRequestParts<S> for DrinkId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i32>::from_request_parts(parts, state).await?;
        Ok(DrinkId(id))
    }
}

/// Store failures on the write paths are reported as 404, matching the behaviour
/// existing clients were built against.
fn write_failure(e: StoreError) -> ApiError {
    tracing::warn!(error = %e, "drink write failed");
    ApiError::NotFound
}

fn validate_title(title: &str) -> ApiResult<()> {
    if title.trim().is_empty() {
        return Err(ApiError::Unprocessable);
    }
    Ok(())
}

// --- Handlers ---

/// get_drinks
///
/// [Public Route] Lists every drink in the **short** projection. Ingredient names are
/// never part of this payload.
#[utoipa::path(
    get,
    path = "/drinks",
    responses(
        (status = 200, description = "Menu", body = DrinkListResponse),
        (status = 500, description = "Store failure", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_drinks(State(state): State<AppState>) -> ApiResult<Json<DrinkListResponse>> {
    let drinks = state.repo.list_drinks().await?;
    Ok(Json(DrinkListResponse {
        success: true,
        drinks: drinks.iter().map(Drink::short).collect(),
    }))
}

/// get_drinks_detail
///
/// [Authenticated Route] Lists every drink in the **long** projection.
/// Requires `get:drinks-detail`.
#[utoipa::path(
    get,
    path = "/drinks-detail",
    responses(
        (status = 200, description = "Menu with recipes", body = DrinkDetailListResponse),
        (status = 401, description = "Missing or invalid token", body = crate::auth::AuthErrorBody),
        (status = 403, description = "Permission not granted", body = crate::auth::AuthErrorBody)
    )
)]
pub async fn get_drinks_detail(
    _auth: Authorized<GetDrinksDetail>,
    State(state): State<AppState>,
) -> ApiResult<Json<DrinkDetailListResponse>> {
    let drinks = state.repo.list_drinks().await?;
    Ok(Json(DrinkDetailListResponse {
        success: true,
        drinks,
    }))
}

/// create_drink
///
/// [Authenticated Route] Adds a drink to the menu. Requires `post:drinks`.
/// A recipe sent as a single ingredient object is stored as a one-element list.
#[utoipa::path(
    post,
    path = "/drinks",
    request_body = CreateDrinkRequest,
    responses(
        (status = 200, description = "Created", body = DrinkCreatedResponse),
        (status = 404, description = "Missing body or store rejected the drink", body = crate::error::ErrorResponse),
        (status = 422, description = "Malformed drink", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_drink(
    _auth: Authorized<PostDrinks>,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateDrinkRequest>,
) -> ApiResult<Json<DrinkCreatedResponse>> {
    validate_title(&payload.title)?;
    let recipe = payload.recipe.into_ingredients();

    let drink = state
        .repo
        .insert_drink(&payload.title, &recipe)
        .await
        .map_err(write_failure)?;

    tracing::info!(drink_id = drink.id, title = %drink.title, "drink created");
    Ok(Json(DrinkCreatedResponse {
        success: true,
        drinks: drink,
    }))
}

/// update_drink
///
/// [Authenticated Route] Changes the title and/or recipe of a drink. Requires
/// `patch:drinks`. Fields absent from the body are left untouched. The updated drink is
/// returned wrapped in a one-element list.
#[utoipa::path(
    patch,
    path = "/drinks/{id}",
    params(("id" = i32, Path, description = "Drink ID")),
    request_body = UpdateDrinkRequest,
    responses(
        (status = 200, description = "Updated", body = DrinkDetailListResponse),
        (status = 404, description = "Unknown drink, missing body or store failure", body = crate::error::ErrorResponse),
        (status = 422, description = "Malformed drink", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_drink(
    _auth: Authorized<PatchDrinks>,
    State(state): State<AppState>,
    DrinkId(id): DrinkId,
    JsonBody(payload): JsonBody<UpdateDrinkRequest>,
) -> ApiResult<Json<DrinkDetailListResponse>> {
    let mut drink = state
        .repo
        .find_drink(id)
        .await
        .map_err(write_failure)?
        .ok_or(ApiError::NotFound)?;

    if let Some(title) = payload.title {
        validate_title(&title)?;
        drink.title = title;
    }
    if let Some(recipe) = payload.recipe {
        drink.recipe = recipe.into_ingredients();
    }

    state.repo.update_drink(&drink).await.map_err(write_failure)?;

    tracing::info!(drink_id = drink.id, "drink updated");
    Ok(Json(DrinkDetailListResponse {
        success: true,
        drinks: vec![drink],
    }))
}

/// delete_drink
///
/// [Authenticated Route] Permanently removes a drink. Requires `delete:drinks`.
#[utoipa::path(
    delete,
    path = "/drinks/{id}",
    params(("id" = i32, Path, description = "Drink ID")),
    responses(
        (status = 200, description = "Deleted", body = DeleteDrinkResponse),
        (status = 404, description = "Not Found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_drink(
    _auth: Authorized<DeleteDrinks>,
    State(state): State<AppState>,
    DrinkId(id): DrinkId,
) -> ApiResult<Json<DeleteDrinkResponse>> {
    let drink = state.repo.find_drink(id).await?.ok_or(ApiError::NotFound)?;
    state.repo.delete_drink(&drink).await?;

    tracing::info!(drink_id = id, "drink deleted");
    Ok(Json(DeleteDrinkResponse {
        success: true,
        delete: id,
    }))
}

/// Fallback for paths no route matches.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Fallback for known paths hit with an unsupported method.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

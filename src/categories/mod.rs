use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use crate::error::ApiError;
use crate::models::{Category, CreateCategoryRequest};
use crate::AppState;

pub fn routes() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", axum::routing::get(list_categories).post(create_category))
        .route("/:slug", axum::routing::get(get_category).delete(delete_category))
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.store.categories.list().await?))
}

/// GET /api/categories/:slug
async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Category>, ApiError> {
    state
        .store
        .categories
        .get(&slug)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found("category_not_found", format!("Category {} not found", slug))
        })
}

/// POST /api/categories
async fn create_category(
    State(state): State<AppState>,
    body: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let Json(body) = body?;
    let fields = body.validate().map_err(ApiError::validation)?;
    let category = state.store.categories.create(fields).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// DELETE /api/categories/:slug
/// Also removes the category from every article that lists it
async fn delete_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.store.delete_category(&slug).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::not_found(
            "category_not_found",
            format!("Category {} not found", slug),
        )),
    }
}

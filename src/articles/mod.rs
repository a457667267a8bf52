use axum::{
    extract::{rejection::QueryRejection, FromRequest, Multipart, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::error::ApiError;
use crate::images;
use crate::models::{Article, ArticleFilter, ArticleListResponse, CreateArticleRequest};
use crate::AppState;

pub fn routes() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", axum::routing::get(list_articles).post(create_article))
        .route("/:slug", axum::routing::get(get_article).delete(delete_article))
}

/// GET /api/articles
/// List articles, newest first, optionally filtered by category or text
async fn list_articles(
    State(state): State<AppState>,
    filter: Result<Query<ArticleFilter>, QueryRejection>,
) -> Result<Json<ArticleListResponse>, ApiError> {
    let Query(filter) = filter?;
    let (articles, total) = state.store.articles.list(&filter).await?;
    Ok(Json(ArticleListResponse { articles, total }))
}

/// GET /api/articles/:slug
async fn get_article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Article>, ApiError> {
    match state.store.articles.get(&slug).await? {
        Some(article) => Ok(Json(article)),
        None => Err(ApiError::not_found(
            "article_not_found",
            format!("Article {} not found", slug),
        )),
    }
}

/// POST /api/articles
/// Accepts a JSON body, or a multipart form carrying the image file
async fn create_article(State(state): State<AppState>, request: Request) -> Response {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let body = if is_multipart {
        match Multipart::from_request(request, &state).await {
            Ok(multipart) => read_form(&state, multipart).await,
            Err(rejection) => return ApiError::from(rejection).into_response(),
        }
    } else {
        match Json::<CreateArticleRequest>::from_request(request, &state).await {
            Ok(Json(body)) => Ok(body),
            Err(rejection) => return ApiError::from(rejection).into_response(),
        }
    };

    match create_from(&state, body).await {
        Ok(article) => (StatusCode::CREATED, Json(article)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_from(
    state: &AppState,
    body: Result<CreateArticleRequest, ApiError>,
) -> Result<Article, ApiError> {
    let body = body?;
    let uploaded_image = body.image.clone().filter(|_| body.image_uploaded);

    let mut validated = body.validate().map_err(ApiError::validation);
    // A referenced image must already be in the upload dir
    if let Ok(new) = &validated {
        if let Some(url) = new.image.as_deref().filter(|_| uploaded_image.is_none()) {
            if !image_exists(state, url).await {
                let message = format!("image {} is not a stored upload", url);
                validated = Err(ApiError::validation(message));
            }
        }
    }

    let new = match validated {
        Ok(new) => new,
        Err(e) => {
            // Don't leave an orphaned upload behind a rejected form
            if let Some(url) = uploaded_image {
                images::remove_image(&state.config, &url).await;
            }
            return Err(e);
        }
    };

    Ok(state.store.articles.create(new).await?)
}

/// Whether `url` names a file in the upload dir
async fn image_exists(state: &AppState, url: &str) -> bool {
    match state.config.upload_path(url) {
        Some(path) => tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false),
        None => false,
    }
}

/// Collect form fields into a create request. Repeated `categories` fields
/// are gathered into a list; an `image` file is compressed and stored.
/// A form that fails midway leaves no stored image behind.
async fn read_form(
    state: &AppState,
    multipart: Multipart,
) -> Result<CreateArticleRequest, ApiError> {
    let mut body = CreateArticleRequest::default();
    if let Err(e) = read_fields(state, multipart, &mut body).await {
        if let Some(url) = body.image.take().filter(|_| body.image_uploaded) {
            images::remove_image(&state.config, &url).await;
        }
        return Err(e);
    }
    Ok(body)
}

async fn read_fields(
    state: &AppState,
    mut multipart: Multipart,
    body: &mut CreateArticleRequest,
) -> Result<(), ApiError> {
    let mut categories: Vec<Value> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "image" && field.file_name().is_some() {
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await?;
            if data.is_empty() {
                continue;
            }
            if let Some(previous) = body.image.take().filter(|_| body.image_uploaded) {
                images::remove_image(&state.config, &previous).await;
            }
            let stored =
                images::store_image(&state.config, data.to_vec(), content_type.as_deref()).await?;
            body.image = Some(stored.url);
            body.image_uploaded = true;
            continue;
        }

        let text = field.text().await?;
        match name.as_str() {
            "title" => body.title = text,
            "content" => body.content = text,
            "author" => body.author = Some(text),
            "categories" | "categories[]" => categories.push(Value::String(text)),
            "image" if !body.image_uploaded => body.image = Some(text),
            _ => {}
        }
    }

    body.categories = match categories.len() {
        0 => Value::Null,
        1 => categories.remove(0),
        _ => Value::Array(categories),
    };
    Ok(())
}

/// DELETE /api/articles/:slug
/// Delete an article and the image it owns
async fn delete_article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.store.articles.delete(&slug).await? {
        Some(deleted) => {
            if let Some(url) = deleted.orphaned_image.as_deref() {
                images::remove_image(&state.config, url).await;
            }
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::not_found(
            "article_not_found",
            format!("Article {} not found", slug),
        )),
    }
}

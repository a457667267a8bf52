use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::AppState;

/// Bearer token check for admin operations.
///
/// Reads pass through; writes and the backup download need the configured
/// `PAPERBOARD_ADMIN_TOKEN`. Without a configured token the server is open.
pub async fn admin_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected_token) = state.config.admin_token.as_deref() else {
        return next.run(request).await;
    };

    if !requires_admin(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(header) => {
            // Check Bearer format
            let parts: Vec<&str> = header.splitn(2, ' ').collect();
            if parts.len() != 2 || parts[0] != "Bearer" {
                return ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "invalid_auth_format",
                    "Authorization header must be 'Bearer <token>'",
                )
                .into_response();
            }

            if parts[1] != expected_token {
                return ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "invalid_token",
                    "Invalid or expired token",
                )
                .into_response();
            }

            next.run(request).await
        }
        None => ApiError::new(
            StatusCode::UNAUTHORIZED,
            "missing_auth",
            "Authorization header required",
        )
        .into_response(),
    }
}

fn requires_admin(method: &Method, path: &str) -> bool {
    match *method {
        Method::GET | Method::HEAD => path == "/api/backup",
        Method::OPTIONS => false,
        _ => true,
    }
}

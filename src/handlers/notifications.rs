//! HTTP handlers for notification endpoint management.
//!
//! Managers register URLs that receive signed `payment.reminder` events.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::common::ApiResponse;
use crate::models::notification::{NotificationEndpointRequest, NotificationEndpointResponse};
use crate::services::notification_service;

/// Register a notification endpoint.
///
/// # Request Body
///
/// ```json
/// {
///   "url": "https://example.com/rent-reminders"
/// }
/// ```
///
/// # Response
///
/// Returns 201 Created. The `secret` used to sign deliveries is only
/// returned here.
pub async fn create_endpoint(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<NotificationEndpointRequest>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint = notification_service::create_endpoint(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(endpoint))))
}

/// List active endpoints. Secrets are never included.
pub async fn list_endpoints(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<NotificationEndpointResponse>>>, AppError> {
    let endpoints = notification_service::list_endpoints(&pool, auth.user_id).await?;

    Ok(Json(ApiResponse::ok(endpoints)))
}

pub async fn delete_endpoint(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    notification_service::delete_endpoint(&pool, auth.user_id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

//! Late fee endpoints.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::common::ApiResponse;
use crate::models::late_fee::{
    ApplyLateFeeRequest, CreateLateFeeConfigurationRequest, LateFee, LateFeeAssessment,
    LateFeeConfiguration, LateFeeRunRequest, WaiveLateFeeRequest,
};
use crate::models::payment::PropertyQuery;
use crate::services::{late_fee_service, rent_tracking_service};

pub async fn list_configurations(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PropertyQuery>,
) -> Result<Json<ApiResponse<Vec<LateFeeConfiguration>>>, AppError> {
    let configurations =
        late_fee_service::list_configurations(&pool, auth.user_id, query.property_id).await?;

    Ok(Json(ApiResponse::ok(configurations)))
}

/// Create the property's active late-fee rule, replacing the previous one.
///
/// # Request Body
///
/// ```json
/// {
///   "property_id": "550e8400-...",
///   "fee_type": "percentage",
///   "fee_amount": "5",
///   "grace_period_days": 5,
///   "maximum_fee_cents": 10000
/// }
/// ```
pub async fn create_configuration(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateLateFeeConfigurationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let configuration = late_fee_service::create_configuration(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(configuration))))
}

/// Dry run: the fees the active rule would charge, without charging them.
pub async fn calculate(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<LateFeeRunRequest>,
) -> Result<Json<ApiResponse<Vec<LateFeeAssessment>>>, AppError> {
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let assessments =
        rent_tracking_service::calculate_late_fees(&pool, auth.user_id, query.property_id, as_of)
            .await?;

    Ok(Json(ApiResponse::ok(assessments)))
}

/// Charge a late fee on one payment by hand.
pub async fn apply(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<ApplyLateFeeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let fee = late_fee_service::apply_late_fee(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(fee))))
}

/// Charge every fee the active rule calls for.
pub async fn apply_batch(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<LateFeeRunRequest>,
) -> Result<Json<ApiResponse<Vec<LateFee>>>, AppError> {
    let as_of = request.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let fees =
        rent_tracking_service::apply_late_fees(&pool, auth.user_id, request.property_id, as_of)
            .await?;

    let message = format!("{} late fees applied", fees.len());
    Ok(Json(ApiResponse::ok(fees).with_message(message)))
}

pub async fn waive(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<WaiveLateFeeRequest>,
) -> Result<Json<ApiResponse<LateFee>>, AppError> {
    let fee = late_fee_service::waive_late_fee(&pool, auth.user_id, id, &request.reason).await?;

    Ok(Json(ApiResponse::ok(fee).with_message("Late fee waived")))
}

pub async fn mark_paid(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LateFee>>, AppError> {
    let fee = late_fee_service::mark_late_fee_paid(&pool, auth.user_id, id).await?;

    Ok(Json(ApiResponse::ok(fee)))
}

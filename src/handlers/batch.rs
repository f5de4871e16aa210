//! Scheduled batch endpoint, meant to be hit by an external scheduler.

use axum::{Extension, Json, extract::State};

use crate::db::DbPool;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::common::ApiResponse;
use crate::models::report::{BatchRunRequest, BatchRunResult};
use crate::services::accounting_module;

/// Generate recurring payments, apply late fees and post interest for
/// every property of the caller.
///
/// # Request Body (optional)
///
/// ```json
/// { "as_of": "2025-05-01" }
/// ```
pub async fn run_batch(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    request: Option<Json<BatchRunRequest>>,
) -> Result<Json<ApiResponse<BatchRunResult>>, AppError> {
    let as_of = request.and_then(|Json(r)| r.as_of);
    let result = accounting_module::run_scheduled_batch(&pool, auth.user_id, as_of).await?;

    Ok(Json(ApiResponse::ok(result)))
}

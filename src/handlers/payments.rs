//! Rent tracking endpoints.
//!
//! - GET /api/accounting/payments/due - Payments due for a property
//! - POST /api/accounting/payments/record - Record a (partial) payment
//! - POST /api/accounting/payments/{id}/waive - Waive an unpaid payment
//! - GET|POST /api/accounting/recurring-payments - Recurring schedules
//! - DELETE /api/accounting/recurring-payments/{id} - Stop a schedule
//! - POST /api/accounting/payments/reminders - Notify tenants of upcoming rent

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::common::ApiResponse;
use crate::models::payment::{
    CreateRecurringPaymentRequest, DuePayment, DuePaymentsQuery, Payment, PaymentRemindersRequest,
    PaymentRemindersResponse, PropertyQuery, RecordPaymentRequest, RecurringPayment,
    WaivePaymentRequest,
};
use crate::services::rent_tracking_service;
use crate::state::AppState;

/// List payments due for a property.
///
/// # Query
///
/// `?property_id=...&start_date=2025-04-01&end_date=2025-04-30&status=pending&limit=50&offset=0`
pub async fn due_payments(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DuePaymentsQuery>,
) -> Result<Json<ApiResponse<Vec<DuePayment>>>, AppError> {
    let (payments, page) = rent_tracking_service::get_due_payments(&pool, auth.user_id, &query).await?;

    Ok(Json(ApiResponse::paginated(payments, page)))
}

/// Record money received against a payment.
///
/// # Request Body
///
/// ```json
/// {
///   "payment_id": "550e8400-...",
///   "amount_cents": 60000,
///   "payment_date": "2025-04-03",
///   "payment_method": "check",
///   "reference_number": "1042",
///   "idempotency_key": "check-1042"
/// }
/// ```
pub async fn record_payment(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<Json<ApiResponse<Payment>>, AppError> {
    let payment = rent_tracking_service::record_payment(&pool, auth.user_id, request).await?;

    Ok(Json(ApiResponse::ok(payment).with_message("Payment recorded")))
}

pub async fn waive_payment(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<WaivePaymentRequest>,
) -> Result<Json<ApiResponse<Payment>>, AppError> {
    let payment = rent_tracking_service::waive_payment(&pool, auth.user_id, id, &request.reason).await?;

    Ok(Json(ApiResponse::ok(payment).with_message("Payment waived")))
}

pub async fn list_recurring_payments(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PropertyQuery>,
) -> Result<Json<ApiResponse<Vec<RecurringPayment>>>, AppError> {
    let schedules =
        rent_tracking_service::list_recurring_payments(&pool, auth.user_id, query.property_id)
            .await?;

    Ok(Json(ApiResponse::ok(schedules)))
}

/// Create a recurring schedule. Returns 201 Created.
pub async fn create_recurring_payment(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateRecurringPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let schedule =
        rent_tracking_service::create_recurring_payment(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(schedule))))
}

/// Deactivate a schedule. Already generated payments are kept.
pub async fn deactivate_recurring_payment(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    rent_tracking_service::deactivate_recurring_payment(&pool, auth.user_id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_reminders(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<PaymentRemindersRequest>,
) -> Result<Json<ApiResponse<PaymentRemindersResponse>>, AppError> {
    let reminders_sent = rent_tracking_service::send_payment_reminders(
        &state.pool,
        &state.http,
        auth.user_id,
        request.property_id,
        request.days_in_advance,
    )
    .await?;

    Ok(Json(ApiResponse::ok(PaymentRemindersResponse { reminders_sent })))
}

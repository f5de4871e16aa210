//! Trust account endpoints: accounts, ledger entries, transfers, interest,
//! reconciliation, statements and reversals.

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
use crate::models::common::{ApiResponse, PageParams};
use crate::models::payment::PropertyQuery;
use crate::models::trust_account::{
    CreateTrustAccountRequest, DateRangeQuery, InterestRunRequest, InterestRunResult,
    LedgerEntryRequest, ReconcileRequest, ReconciliationReport, ReverseTransactionRequest,
    TransferRequest, TransferResult, TrustAccount, TrustAccountAuditReport, TrustAccountStatement,
    TrustAccountTransaction,
};
use crate::services::trust_account_service;

/// Open a trust account with a zero balance.
///
/// # Request Body
///
/// ```json
/// {
///   "property_id": "550e8400-...",
///   "account_name": "Security deposits",
///   "account_type": "security_deposit",
///   "is_interest_bearing": true,
///   "interest_rate": "1.5",
///   "bank_name": "First Bank",
///   "account_number_last4": "4411"
/// }
/// ```
pub async fn create_trust_account(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateTrustAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = trust_account_service::create_trust_account(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(account))))
}

pub async fn list_trust_accounts(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PropertyQuery>,
) -> Result<Json<ApiResponse<Vec<TrustAccount>>>, AppError> {
    let accounts =
        trust_account_service::list_trust_accounts(&pool, auth.user_id, query.property_id).await?;

    Ok(Json(ApiResponse::ok(accounts)))
}

pub async fn get_trust_account(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TrustAccount>>, AppError> {
    let account = trust_account_service::get_trust_account(&pool, auth.user_id, id).await?;

    Ok(Json(ApiResponse::ok(account)))
}

/// Credit a trust account.
///
/// # Request Body
///
/// ```json
/// {
///   "amount_cents": 150000,
///   "description": "Security deposit, unit 1A",
///   "idempotency_key": "deposit-1a-2025"
/// }
/// ```
pub async fn deposit(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<LedgerEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = trust_account_service::record_deposit(&pool, auth.user_id, id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(entry))))
}

/// Debit a trust account. Returns 422 when the balance would go negative.
pub async fn withdrawal(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<LedgerEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = trust_account_service::record_withdrawal(&pool, auth.user_id, id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(entry))))
}

pub async fn fee(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<LedgerEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = trust_account_service::record_fee(&pool, auth.user_id, id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(entry))))
}

pub async fn list_transactions(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<TrustAccountTransaction>>>, AppError> {
    let (transactions, meta) =
        trust_account_service::list_transactions(&pool, auth.user_id, id, page).await?;

    Ok(Json(ApiResponse::paginated(transactions, meta)))
}

/// Move money between two trust accounts atomically.
///
/// Either both legs are posted or neither is.
pub async fn transfer(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<TransferRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result: TransferResult =
        trust_account_service::transfer_funds(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(result))))
}

/// Post accrued interest on every interest-bearing account. The body is
/// optional; `as_of` defaults to today.
pub async fn apply_interest(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    request: Option<Json<InterestRunRequest>>,
) -> Result<Json<ApiResponse<InterestRunResult>>, AppError> {
    let as_of = request
        .and_then(|Json(r)| r.as_of)
        .unwrap_or_else(|| Utc::now().date_naive());
    let result =
        trust_account_service::calculate_and_apply_interest(&pool, auth.user_id, as_of).await?;

    Ok(Json(ApiResponse::ok(result)))
}

pub async fn reconcile(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReconcileRequest>,
) -> Result<Json<ApiResponse<ReconciliationReport>>, AppError> {
    let report =
        trust_account_service::reconcile_trust_account(&pool, auth.user_id, id, request).await?;

    Ok(Json(ApiResponse::ok(report)))
}

pub async fn statement(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<ApiResponse<TrustAccountStatement>>, AppError> {
    let statement =
        trust_account_service::generate_statement(&pool, auth.user_id, id, &range).await?;

    Ok(Json(ApiResponse::ok(statement)))
}

pub async fn audit(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<ApiResponse<TrustAccountAuditReport>>, AppError> {
    let report =
        trust_account_service::generate_audit_report(&pool, auth.user_id, id, &range).await?;

    Ok(Json(ApiResponse::ok(report)))
}

/// Post the offsetting entry of a transaction.
pub async fn reverse(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReverseTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reversal =
        trust_account_service::reverse_transaction(&pool, auth.user_id, id, &request.reason)
            .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(reversal))))
}

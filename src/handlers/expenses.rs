//! Expense endpoints: expenses, categories, vendors and receipt scanning.

use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::common::ApiResponse;
use crate::models::expense::{
    CategoryListing, CategoryQuery, CreateCategoryRequest, CreateExpenseRequest,
    CreateVendorRequest, Expense, ExpenseDraft, ExpenseQuery, UpdateExpenseStatusRequest, Vendor,
};
use crate::services::expense_service;
use crate::state::AppState;

/// Multipart field holding the receipt file.
const RECEIPT_FIELD: &str = "file";

/// Record an expense in `pending` status.
///
/// # Request Body
///
/// ```json
/// {
///   "property_id": "550e8400-...",
///   "category_id": "660e8400-...",
///   "vendor_id": "770e8400-...",
///   "amount_cents": 18950,
///   "tax_amount_cents": 1250,
///   "transaction_date": "2025-04-12",
///   "description": "Replacement faucet, unit 2B"
/// }
/// ```
pub async fn create_expense(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateExpenseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let expense = expense_service::record_expense(&pool, auth.user_id, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(expense))))
}

pub async fn list_expenses(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ExpenseQuery>,
) -> Result<Json<ApiResponse<Vec<Expense>>>, AppError> {
    let (expenses, page) = expense_service::list_expenses(&pool, auth.user_id, &query).await?;

    Ok(Json(ApiResponse::paginated(expenses, page)))
}

/// Move an expense to `paid`, `cancelled` or `disputed`.
///
/// Returns 409 when the current status does not allow the change.
pub async fn update_status(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateExpenseStatusRequest>,
) -> Result<Json<ApiResponse<Expense>>, AppError> {
    let expense =
        expense_service::update_expense_status(&pool, auth.user_id, id, request.status).await?;

    Ok(Json(ApiResponse::ok(expense)))
}

/// `?include_inactive=true&include_hierarchy=true`
pub async fn list_categories(
    State(pool): State<DbPool>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<ApiResponse<CategoryListing>>, AppError> {
    let categories = expense_service::get_expense_categories(&pool, &query).await?;

    Ok(Json(ApiResponse::ok(categories)))
}

pub async fn create_category(
    State(pool): State<DbPool>,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let category = expense_service::create_expense_category(&pool, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(category))))
}

pub async fn list_vendors(
    State(pool): State<DbPool>,
) -> Result<Json<ApiResponse<Vec<Vendor>>>, AppError> {
    let vendors = expense_service::list_vendors(&pool).await?;

    Ok(Json(ApiResponse::ok(vendors)))
}

pub async fn create_vendor(
    State(pool): State<DbPool>,
    Json(request): Json<CreateVendorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let vendor = expense_service::create_vendor(&pool, request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(vendor))))
}

/// Upload a receipt (multipart field `file`) and get a pre-filled expense.
///
/// The draft is not saved; the client submits it to `POST /expenses` once
/// the property and category are chosen.
pub async fn scan_receipt(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<ExpenseDraft>>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() != Some(RECEIPT_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("receipt").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let content = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;

        let draft = expense_service::scan_receipt(
            &state.pool,
            &state.scanner,
            &file_name,
            &content_type,
            &content,
        )
        .await?;

        return Ok(Json(ApiResponse::ok(draft)));
    }

    Err(AppError::Validation(format!(
        "Multipart field '{RECEIPT_FIELD}' is required"
    )))
}

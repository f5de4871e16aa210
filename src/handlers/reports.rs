//! Report and dashboard endpoints.
//!
//! Rent roll and expense reports honour `?format=json|csv`; CSV responses
//! carry the report rows only, as an attachment.

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::db::DbPool;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::common::ApiResponse;
use crate::models::report::{
    DashboardQuery, DashboardSummary, ExpenseReportQuery, FinancialReport, FinancialReportQuery,
    RentRollQuery, ReportFormat, to_csv,
};
use crate::services::{accounting_module, expense_service, rent_tracking_service};

fn csv_response(file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}

pub async fn rent_roll(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<RentRollQuery>,
) -> Result<Response, AppError> {
    let format = query.format.ensure_supported()?;
    let report = rent_tracking_service::generate_rent_roll_report(&pool, auth.user_id, &query).await?;

    Ok(match format {
        ReportFormat::Csv => csv_response(
            &format!("rent-roll-{}-{}.csv", report.start_date, report.end_date),
            to_csv(&report.rows)?,
        ),
        _ => Json(ApiResponse::ok(report)).into_response(),
    })
}

/// `?property_id=...&start_date=...&end_date=...&group_by=category|vendor|unit|month&report_type=summary|detailed&format=json|csv`
pub async fn expense_report(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ExpenseReportQuery>,
) -> Result<Response, AppError> {
    let format = query.format.ensure_supported()?;
    let report = expense_service::generate_expense_report(&pool, auth.user_id, &query).await?;

    Ok(match format {
        ReportFormat::Csv => csv_response(
            &format!("expenses-{}-{}.csv", report.start_date, report.end_date),
            to_csv(&report.groups)?,
        ),
        _ => Json(ApiResponse::ok(report)).into_response(),
    })
}

pub async fn financial_report(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<FinancialReportQuery>,
) -> Result<Json<ApiResponse<FinancialReport>>, AppError> {
    let report = accounting_module::generate_financial_report(&pool, auth.user_id, &query).await?;

    Ok(Json(ApiResponse::ok(report)))
}

pub async fn dashboard(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<ApiResponse<DashboardSummary>>, AppError> {
    let summary =
        accounting_module::dashboard(&pool, auth.user_id, query.property_id, query.as_of).await?;

    Ok(Json(ApiResponse::ok(summary)))
}

//! Report models: rent roll, expense report, consolidated financial report,
//! dashboard and batch run results, plus CSV rendering.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::expense::Expense;
use crate::models::trust_account::{InterestRunResult, TrustAccountType};

/// Output format of a report. Only serialization differs between formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
    Pdf,
}

impl ReportFormat {
    /// Rejects formats the service cannot render.
    pub fn ensure_supported(self) -> Result<Self, AppError> {
        match self {
            ReportFormat::Pdf => Err(AppError::Validation(
                "PDF reports are not supported; use json or csv".to_string(),
            )),
            supported => Ok(supported),
        }
    }
}

/// Render rows as CSV with a header line taken from the field names.
pub fn to_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Csv(csv::Error::from(e.into_error())))
}

#[derive(Debug, Deserialize)]
pub struct RentRollQuery {
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub format: ReportFormat,
}

/// One unit's line in the rent roll.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct RentRollRow {
    pub unit_id: Uuid,
    pub unit_number: String,
    pub tenant_name: Option<String>,
    pub is_occupied: bool,
    pub payment_count: i64,
    pub amount_due_cents: i64,
    pub amount_paid_cents: i64,
    pub pending_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentRollSummary {
    pub total_units: usize,
    pub occupied_units: usize,
    pub total_amount_cents: i64,
    pub total_paid_cents: i64,
    pub total_pending_cents: i64,

    /// Occupied units as a percentage of all units, two decimal places.
    pub occupancy_rate: Decimal,
}

impl RentRollSummary {
    pub fn from_rows(rows: &[RentRollRow]) -> Self {
        let total_units = rows.len();
        let occupied_units = rows.iter().filter(|r| r.is_occupied).count();
        let occupancy_rate = if total_units == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(occupied_units as u64) * Decimal::ONE_HUNDRED
                / Decimal::from(total_units as u64))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };

        Self {
            total_units,
            occupied_units,
            total_amount_cents: rows.iter().map(|r| r.amount_due_cents).sum(),
            total_paid_cents: rows.iter().map(|r| r.amount_paid_cents).sum(),
            total_pending_cents: rows.iter().map(|r| r.pending_cents).sum(),
            occupancy_rate,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RentRollReport {
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rows: Vec<RentRollRow>,
    pub summary: RentRollSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseGroupBy {
    #[default]
    Category,
    Vendor,
    Unit,
    Month,
}

impl ExpenseGroupBy {
    /// SQL expressions producing the group key and label.
    pub fn key_and_label(self) -> (&'static str, &'static str) {
        match self {
            ExpenseGroupBy::Category => ("c.id::text", "c.name"),
            ExpenseGroupBy::Vendor => (
                "COALESCE(v.id::text, 'none')",
                "COALESCE(v.name, 'No vendor')",
            ),
            ExpenseGroupBy::Unit => (
                "COALESCE(u.id::text, 'none')",
                "COALESCE(u.unit_number, 'Property-wide')",
            ),
            ExpenseGroupBy::Month => (
                "to_char(e.transaction_date, 'YYYY-MM')",
                "to_char(e.transaction_date, 'YYYY-MM')",
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    #[default]
    Summary,
    Detailed,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseReportQuery {
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub group_by: ExpenseGroupBy,
    #[serde(default)]
    pub report_type: ReportType,
    #[serde(default)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct ExpenseReportRow {
    pub group_key: String,
    pub group_label: String,
    pub expense_count: i64,
    pub total_cents: i64,
    pub tax_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct ExpenseReport {
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub groups: Vec<ExpenseReportRow>,
    pub total_cents: i64,

    /// Individual expenses; only filled for detailed reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_items: Option<Vec<Expense>>,
}

/// Query for `GET /reports/financial`.
#[derive(Debug, Deserialize)]
pub struct FinancialReportQuery {
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IncomeSummary {
    pub rent_collected_cents: i64,
    pub late_fees_collected_cents: i64,
    pub total_income_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct CategoryExpenseTotal {
    pub category_id: Uuid,
    pub category_name: String,
    pub paid_cents: i64,
    pub pending_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct ExpenseSummary {
    pub by_category: Vec<CategoryExpenseTotal>,
    pub total_paid_cents: i64,
    pub total_pending_cents: i64,
}

impl ExpenseSummary {
    pub fn from_categories(by_category: Vec<CategoryExpenseTotal>) -> Self {
        Self {
            total_paid_cents: by_category.iter().map(|c| c.paid_cents).sum(),
            total_pending_cents: by_category.iter().map(|c| c.pending_cents).sum(),
            by_category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct TrustBalance {
    pub trust_account_id: Uuid,
    pub account_name: String,
    pub account_type: TrustAccountType,
    pub balance_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct FinancialReport {
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub income: IncomeSummary,
    pub expenses: ExpenseSummary,

    /// Income minus paid expenses.
    pub net_operating_income_cents: i64,

    pub trust_balances: Vec<TrustBalance>,
    pub trust_balance_total_cents: i64,
}

impl FinancialReport {
    pub fn assemble(
        query: &FinancialReportQuery,
        rent_collected_cents: i64,
        late_fees_collected_cents: i64,
        by_category: Vec<CategoryExpenseTotal>,
        trust_balances: Vec<TrustBalance>,
    ) -> Self {
        let income = IncomeSummary {
            rent_collected_cents,
            late_fees_collected_cents,
            total_income_cents: rent_collected_cents + late_fees_collected_cents,
        };
        let expenses = ExpenseSummary::from_categories(by_category);
        let trust_balance_total_cents = trust_balances.iter().map(|t| t.balance_cents).sum();

        Self {
            property_id: query.property_id,
            start_date: query.start_date,
            end_date: query.end_date,
            net_operating_income_cents: income.total_income_cents - expenses.total_paid_cents,
            income,
            expenses,
            trust_balances,
            trust_balance_total_cents,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub property_id: Uuid,
    pub as_of: Option<NaiveDate>,
}

/// Headline figures for one property as of a date.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct DashboardSummary {
    pub outstanding_rent_cents: i64,
    pub overdue_payment_count: i64,
    pub pending_late_fees_cents: i64,
    pub pending_late_fee_count: i64,
    pub trust_balance_total_cents: i64,
    pub month_to_date_expenses_cents: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchRunRequest {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct BatchRunResult {
    pub as_of: NaiveDate,
    pub payments_generated: u64,
    pub properties_processed: usize,
    pub late_fees_applied: usize,
    pub failed_property_ids: Vec<Uuid>,
    pub interest: InterestRunResult,
}

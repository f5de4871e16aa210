//! Cross-cutting accounting operations: recurring billing, the scheduled
//! batch, the financial report and the dashboard.

use chrono::{Datelike, NaiveDate, Utc};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::payment::RecurringPayment;
use crate::models::report::{
    BatchRunResult, CategoryExpenseTotal, DashboardSummary, FinancialReport, FinancialReportQuery,
    TrustBalance,
};
use crate::services::{late_fee_service, property_service, trust_account_service};

/// Generate the missing payment rows of every active recurring payment on
/// the manager's properties, up to `as_of`.
///
/// Safe to run repeatedly: existing (schedule, due date) pairs are skipped.
/// Returns the number of payments created.
pub async fn process_recurring_transactions(
    pool: &DbPool,
    user_id: Uuid,
    as_of: NaiveDate,
) -> Result<u64, AppError> {
    let schedules = sqlx::query_as::<_, RecurringPayment>(
        r#"
        SELECT rp.*
        FROM recurring_payments rp
        JOIN leases l ON l.id = rp.lease_id
        JOIN units u ON u.id = l.unit_id
        JOIN properties pr ON pr.id = u.property_id
        WHERE pr.owner_id = $1
          AND rp.is_active
          AND rp.start_date <= $2
        "#,
    )
    .bind(user_id)
    .bind(as_of)
    .fetch_all(pool)
    .await?;

    let mut generated = 0;
    for schedule in &schedules {
        let due_dates = schedule.due_dates_through(as_of);
        if due_dates.is_empty() {
            continue;
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (recurring_payment_id, amount_cents, due_date)
            SELECT $1, $2, due_date
            FROM UNNEST($3::date[]) AS due_date
            ON CONFLICT (recurring_payment_id, due_date) DO NOTHING
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.amount_cents)
        .bind(&due_dates)
        .execute(pool)
        .await?
        .rows_affected();

        generated += inserted;
    }

    tracing::info!(%user_id, %as_of, schedules = schedules.len(), generated, "Recurring payments processed");

    Ok(generated)
}

/// Recurring billing, then late fees for every property with an active
/// rule, then trust interest.
///
/// A property whose late-fee run fails is reported and skipped; the rest
/// of the batch continues.
pub async fn run_scheduled_batch(
    pool: &DbPool,
    user_id: Uuid,
    as_of: Option<NaiveDate>,
) -> Result<BatchRunResult, AppError> {
    let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());

    let payments_generated = process_recurring_transactions(pool, user_id, as_of).await?;

    let property_ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT pr.id
        FROM properties pr
        JOIN late_fee_configurations c ON c.property_id = pr.id AND c.is_active
        WHERE pr.owner_id = $1
        ORDER BY pr.id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut late_fees_applied = 0;
    let mut failed_property_ids = Vec::new();
    for property_id in &property_ids {
        match late_fee_service::apply_property_late_fees(pool, *property_id, as_of, user_id).await
        {
            Ok(fees) => late_fees_applied += fees.len(),
            Err(e) => {
                tracing::error!(%property_id, error = %e, "Late fee run failed");
                failed_property_ids.push(*property_id);
            }
        }
    }

    let interest = trust_account_service::calculate_and_apply_interest(pool, user_id, as_of).await?;

    tracing::info!(
        %user_id,
        %as_of,
        payments_generated,
        late_fees_applied,
        failed = failed_property_ids.len(),
        interest_postings = interest.postings.len(),
        "Scheduled batch finished"
    );

    Ok(BatchRunResult {
        as_of,
        payments_generated,
        properties_processed: property_ids.len(),
        late_fees_applied,
        failed_property_ids,
        interest,
    })
}

pub async fn generate_financial_report(
    pool: &DbPool,
    user_id: Uuid,
    query: &FinancialReportQuery,
) -> Result<FinancialReport, AppError> {
    if query.end_date < query.start_date {
        return Err(AppError::Validation(
            "end_date must not precede start_date".to_string(),
        ));
    }
    property_service::require_property(pool, user_id, query.property_id).await?;

    let rent_collected: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(pt.amount_cents), 0)::BIGINT
        FROM payment_transactions pt
        JOIN payments p ON p.id = pt.payment_id
        JOIN recurring_payments rp ON rp.id = p.recurring_payment_id
        JOIN leases l ON l.id = rp.lease_id
        JOIN units u ON u.id = l.unit_id
        WHERE u.property_id = $1
          AND pt.payment_date BETWEEN $2 AND $3
        "#,
    )
    .bind(query.property_id)
    .bind(query.start_date)
    .bind(query.end_date)
    .fetch_one(pool)
    .await?;

    let late_fees_collected: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(lf.amount_cents), 0)::BIGINT
        FROM late_fees lf
        JOIN payments p ON p.id = lf.payment_id
        JOIN recurring_payments rp ON rp.id = p.recurring_payment_id
        JOIN leases l ON l.id = rp.lease_id
        JOIN units u ON u.id = l.unit_id
        WHERE u.property_id = $1
          AND lf.status = 'paid'
          AND lf.paid_at::date BETWEEN $2 AND $3
        "#,
    )
    .bind(query.property_id)
    .bind(query.start_date)
    .bind(query.end_date)
    .fetch_one(pool)
    .await?;

    let by_category = sqlx::query_as::<_, CategoryExpenseTotal>(
        r#"
        SELECT
            c.id AS category_id,
            c.name AS category_name,
            COALESCE(SUM(e.amount_cents) FILTER (WHERE e.status = 'paid'), 0)::BIGINT AS paid_cents,
            COALESCE(SUM(e.amount_cents) FILTER (WHERE e.status IN ('pending', 'disputed')), 0)::BIGINT AS pending_cents
        FROM expenses e
        JOIN expense_categories c ON c.id = e.category_id
        WHERE e.property_id = $1
          AND e.transaction_date BETWEEN $2 AND $3
          AND e.status <> 'cancelled'
        GROUP BY c.id, c.name
        ORDER BY c.name
        "#,
    )
    .bind(query.property_id)
    .bind(query.start_date)
    .bind(query.end_date)
    .fetch_all(pool)
    .await?;

    let trust_balances = sqlx::query_as::<_, TrustBalance>(
        r#"
        SELECT id AS trust_account_id, account_name, account_type, balance_cents
        FROM trust_accounts
        WHERE property_id = $1 AND is_active
        ORDER BY account_name
        "#,
    )
    .bind(query.property_id)
    .fetch_all(pool)
    .await?;

    Ok(FinancialReport::assemble(
        query,
        rent_collected,
        late_fees_collected,
        by_category,
        trust_balances,
    ))
}

/// Headline figures for one property as of a date.
pub async fn dashboard(
    pool: &DbPool,
    user_id: Uuid,
    property_id: Uuid,
    as_of: Option<NaiveDate>,
) -> Result<DashboardSummary, AppError> {
    let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
    property_service::require_property(pool, user_id, property_id).await?;

    let month_start = as_of.with_day(1).unwrap_or(as_of);

    let summary = sqlx::query_as::<_, DashboardSummary>(
        r#"
        WITH property_payments AS (
            SELECT p.id, p.amount_cents, p.amount_paid_cents, p.due_date, p.status
            FROM payments p
            JOIN recurring_payments rp ON rp.id = p.recurring_payment_id
            JOIN leases l ON l.id = rp.lease_id
            JOIN units u ON u.id = l.unit_id
            WHERE u.property_id = $1
        )
        SELECT
            (SELECT COALESCE(SUM(amount_cents - amount_paid_cents), 0)::BIGINT
               FROM property_payments
              WHERE status IN ('pending', 'partial') AND due_date <= $2) AS outstanding_rent_cents,
            (SELECT COUNT(*)
               FROM property_payments
              WHERE status IN ('pending', 'partial') AND due_date < $2) AS overdue_payment_count,
            (SELECT COALESCE(SUM(lf.amount_cents), 0)::BIGINT
               FROM late_fees lf JOIN property_payments pp ON pp.id = lf.payment_id
              WHERE lf.status = 'pending') AS pending_late_fees_cents,
            (SELECT COUNT(*)
               FROM late_fees lf JOIN property_payments pp ON pp.id = lf.payment_id
              WHERE lf.status = 'pending') AS pending_late_fee_count,
            (SELECT COALESCE(SUM(balance_cents), 0)::BIGINT
               FROM trust_accounts
              WHERE property_id = $1 AND is_active) AS trust_balance_total_cents,
            (SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
               FROM expenses
              WHERE property_id = $1
                AND status <> 'cancelled'
                AND transaction_date BETWEEN $3 AND $2) AS month_to_date_expenses_cents
        "#,
    )
    .bind(property_id)
    .bind(as_of)
    .bind(month_start)
    .fetch_one(pool)
    .await?;

    Ok(summary)
}

//! Rent tracking: recurring schedules, due and overdue payments, recording
//! what tenants pay, rent roll and payment reminders.
//!
//! # Atomicity Guarantees
//!
//! Recording or waiving a payment locks the payment row (`FOR UPDATE`) for
//! the whole read-modify-write, so concurrent receipts against the same
//! payment are applied one after the other and never lose an update.

use chrono::{Duration, NaiveDate, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::models::common::PageMeta;
use crate::models::late_fee::{LateFee, LateFeeAssessment};
use crate::models::payment::{
    CreateRecurringPaymentRequest, DuePayment, DuePaymentsQuery, OwnedPayment, Payment,
    PaymentTransaction, RecordPaymentRequest, RecurringPayment,
};
use crate::models::report::{RentRollQuery, RentRollReport, RentRollRow, RentRollSummary};
use crate::services::{late_fee_service, notification_service, property_service};

/// Without an explicit status filter, payments due more than this many days
/// after the window end are not listed.
pub const DUE_HORIZON_DAYS: i64 = 30;

/// Longest reminder window accepted.
pub const MAX_REMINDER_DAYS: i64 = 60;

/// Joins from a payment up to the property that owns it.
pub(crate) const PAYMENT_SCOPE: &str = r#"
    payments p
    JOIN recurring_payments rp ON rp.id = p.recurring_payment_id
    JOIN leases l ON l.id = rp.lease_id
    JOIN units u ON u.id = l.unit_id
    JOIN properties pr ON pr.id = u.property_id
"#;

const DUE_PAYMENT_COLUMNS: &str = r#"
    p.id,
    p.recurring_payment_id,
    l.id AS lease_id,
    u.id AS unit_id,
    u.unit_number,
    t.first_name || ' ' || t.last_name AS tenant_name,
    t.email AS tenant_email,
    p.amount_cents,
    p.amount_paid_cents,
    p.due_date,
    p.payment_date,
    p.status
"#;

/// Lock a payment owned by `user_id` for the rest of the transaction.
pub(crate) async fn lock_owned_payment(
    conn: &mut PgConnection,
    user_id: Uuid,
    payment_id: Uuid,
) -> Result<OwnedPayment, AppError> {
    let sql = format!(
        "SELECT p.*, u.property_id FROM {PAYMENT_SCOPE} \
         WHERE p.id = $1 AND pr.owner_id = $2 FOR UPDATE OF p"
    );

    sqlx::query_as::<_, OwnedPayment>(&sql)
        .bind(payment_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::NotFound("Payment"))
}

/// List payments of a property with lease, unit and tenant details.
///
/// # Filters
///
/// - `start_date` / `end_date`: due-date window (inclusive)
/// - `status`: exact status; without it waived payments and payments due
///   more than [`DUE_HORIZON_DAYS`] after `end_date` (or today) are hidden
pub async fn get_due_payments(
    pool: &DbPool,
    user_id: Uuid,
    query: &DuePaymentsQuery,
) -> Result<(Vec<DuePayment>, PageMeta), AppError> {
    property_service::require_property(pool, user_id, query.property_id).await?;

    let page = query.page();
    let horizon = query.end_date.unwrap_or_else(|| Utc::now().date_naive())
        + Duration::days(DUE_HORIZON_DAYS);

    let filter = r#"
        u.property_id = $1
        AND ($2::date IS NULL OR p.due_date >= $2)
        AND ($3::date IS NULL OR p.due_date <= $3)
        AND (
            ($4::payment_status IS NULL AND p.status <> 'waived' AND p.due_date <= $5)
            OR p.status = $4
        )
    "#;
    let scope = format!("{PAYMENT_SCOPE} JOIN tenants t ON t.id = l.tenant_id");

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {scope} WHERE {filter}"))
        .bind(query.property_id)
        .bind(query.start_date)
        .bind(query.end_date)
        .bind(query.status)
        .bind(horizon)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT {DUE_PAYMENT_COLUMNS} FROM {scope} WHERE {filter} \
         ORDER BY p.due_date, u.unit_number LIMIT $6 OFFSET $7"
    );
    let payments = sqlx::query_as::<_, DuePayment>(&sql)
        .bind(query.property_id)
        .bind(query.start_date)
        .bind(query.end_date)
        .bind(query.status)
        .bind(horizon)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok((payments, page.meta(total)))
}

/// Record an amount received against a payment.
///
/// # Process
///
/// 1. Return the payment untouched if the idempotency key was already used
/// 2. Lock the payment row
/// 3. Add the amount to the running total and derive the new status
/// 4. Store the receipt in `payment_transactions`
/// 5. Commit (or rollback on error)
///
/// # Errors
///
/// - `NotFound`: unknown payment or another manager's payment
/// - `Validation`: amount is zero or negative
/// - `BusinessRule`: payment is already paid or waived
pub async fn record_payment(
    pool: &DbPool,
    user_id: Uuid,
    request: RecordPaymentRequest,
) -> Result<Payment, AppError> {
    if request.amount_cents <= 0 {
        return Err(AppError::Validation(
            "Payment amount must be positive".to_string(),
        ));
    }
    if request.payment_method.trim().is_empty() {
        return Err(AppError::Validation(
            "Payment method is required".to_string(),
        ));
    }

    if let Some(ref key) = request.idempotency_key {
        if let Some(existing) =
            find_by_idempotency_key(pool, user_id, request.payment_id, key).await?
        {
            return Ok(existing);
        }
    }

    let request = &request;
    let payment =
        db::retry_on_conflict(move || record_payment_once(pool, user_id, request)).await?;

    tracing::info!(
        payment_id = %payment.id,
        amount_cents = request.amount_cents,
        status = payment.status.as_str(),
        "Payment recorded"
    );

    Ok(payment)
}

/// Keys are scoped to the payment they were sent with.
async fn find_by_idempotency_key(
    pool: &DbPool,
    user_id: Uuid,
    payment_id: Uuid,
    key: &str,
) -> Result<Option<Payment>, AppError> {
    let sql = format!(
        "SELECT p.* FROM {PAYMENT_SCOPE} \
         JOIN payment_transactions pt ON pt.payment_id = p.id \
         WHERE pt.idempotency_key = $1 AND pr.owner_id = $2 AND p.id = $3"
    );

    Ok(sqlx::query_as::<_, Payment>(&sql)
        .bind(key)
        .bind(user_id)
        .bind(payment_id)
        .fetch_optional(pool)
        .await?)
}

async fn record_payment_once(
    pool: &DbPool,
    user_id: Uuid,
    request: &RecordPaymentRequest,
) -> Result<Payment, AppError> {
    let mut tx = pool.begin().await?;

    let owned = lock_owned_payment(&mut tx, user_id, request.payment_id).await?;

    // A concurrent retry with the same key may have committed while we waited for the lock
    if let Some(key) = request.idempotency_key.as_deref() {
        let seen: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM payment_transactions WHERE payment_id = $1 AND idempotency_key = $2)",
        )
        .bind(request.payment_id)
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;

        if seen {
            tx.commit().await?;
            return Ok(owned.payment);
        }
    }

    let (amount_paid_cents, status) = owned.payment.settle(request.amount_cents)?;

    let receipt = sqlx::query_as::<_, PaymentTransaction>(
        r#"
        INSERT INTO payment_transactions (
            payment_id,
            amount_cents,
            payment_date,
            payment_method,
            reference_number,
            notes,
            idempotency_key,
            recorded_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(request.payment_id)
    .bind(request.amount_cents)
    .bind(request.payment_date)
    .bind(&request.payment_method)
    .bind(&request.reference_number)
    .bind(&request.notes)
    .bind(&request.idempotency_key)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments
        SET amount_paid_cents = $1,
            status = $2,
            payment_date = $3,
            payment_method = $4,
            reference_number = COALESCE($5, reference_number),
            notes = COALESCE($6, notes),
            updated_at = NOW()
        WHERE id = $7
        RETURNING *
        "#,
    )
    .bind(amount_paid_cents)
    .bind(status)
    .bind(request.payment_date)
    .bind(&request.payment_method)
    .bind(&request.reference_number)
    .bind(&request.notes)
    .bind(request.payment_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(payment_transaction_id = %receipt.id, payment_id = %receipt.payment_id, "Payment receipt stored");

    Ok(payment)
}

/// Forgive the remainder of a pending or partial payment.
pub async fn waive_payment(
    pool: &DbPool,
    user_id: Uuid,
    payment_id: Uuid,
    reason: &str,
) -> Result<Payment, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::Validation("A reason is required".to_string()));
    }

    let mut tx = pool.begin().await?;

    let owned = lock_owned_payment(&mut tx, user_id, payment_id).await?;
    if owned.payment.status.is_terminal() {
        return Err(AppError::BusinessRule(format!(
            "Payment is already {}",
            owned.payment.status.as_str()
        )));
    }

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments
        SET status = 'waived',
            waived_reason = $1,
            updated_at = NOW()
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(reason.trim())
    .bind(payment_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(payment_id = %payment_id, "Payment waived");

    Ok(payment)
}

pub async fn create_recurring_payment(
    pool: &DbPool,
    user_id: Uuid,
    request: CreateRecurringPaymentRequest,
) -> Result<RecurringPayment, AppError> {
    request.validate()?;

    let lease_id: Uuid = sqlx::query_scalar(
        r#"
        SELECT l.id
        FROM leases l
        JOIN units u ON u.id = l.unit_id
        JOIN properties pr ON pr.id = u.property_id
        WHERE l.id = $1 AND pr.owner_id = $2
        "#,
    )
    .bind(request.lease_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Lease"))?;

    let schedule = sqlx::query_as::<_, RecurringPayment>(
        r#"
        INSERT INTO recurring_payments (
            lease_id,
            amount_cents,
            frequency,
            due_day,
            start_date,
            end_date,
            description
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(lease_id)
    .bind(request.amount_cents)
    .bind(request.frequency)
    .bind(request.due_day)
    .bind(request.start_date)
    .bind(request.end_date)
    .bind(&request.description)
    .fetch_one(pool)
    .await?;

    tracing::info!(recurring_payment_id = %schedule.id, lease_id = %lease_id, "Recurring payment created");

    Ok(schedule)
}

pub async fn list_recurring_payments(
    pool: &DbPool,
    user_id: Uuid,
    property_id: Uuid,
) -> Result<Vec<RecurringPayment>, AppError> {
    property_service::require_property(pool, user_id, property_id).await?;

    let schedules = sqlx::query_as::<_, RecurringPayment>(
        r#"
        SELECT rp.*
        FROM recurring_payments rp
        JOIN leases l ON l.id = rp.lease_id
        JOIN units u ON u.id = l.unit_id
        WHERE u.property_id = $1
        ORDER BY rp.is_active DESC, rp.created_at
        "#,
    )
    .bind(property_id)
    .fetch_all(pool)
    .await?;

    Ok(schedules)
}

/// Retire a schedule. Payments already generated are kept.
pub async fn deactivate_recurring_payment(
    pool: &DbPool,
    user_id: Uuid,
    recurring_payment_id: Uuid,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE recurring_payments rp
        SET is_active = false
        FROM leases l, units u, properties pr
        WHERE rp.id = $1
          AND l.id = rp.lease_id
          AND u.id = l.unit_id
          AND pr.id = u.property_id
          AND pr.owner_id = $2
        "#,
    )
    .bind(recurring_payment_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Recurring payment"));
    }

    Ok(())
}

/// Dry run: fees the property's active rule would charge as of `as_of`.
pub async fn calculate_late_fees(
    pool: &DbPool,
    user_id: Uuid,
    property_id: Uuid,
    as_of: NaiveDate,
) -> Result<Vec<LateFeeAssessment>, AppError> {
    property_service::require_property(pool, user_id, property_id).await?;

    late_fee_service::assess_property(pool, property_id, as_of).await
}

/// Charge the fees [`calculate_late_fees`] reports.
pub async fn apply_late_fees(
    pool: &DbPool,
    user_id: Uuid,
    property_id: Uuid,
    as_of: NaiveDate,
) -> Result<Vec<LateFee>, AppError> {
    property_service::require_property(pool, user_id, property_id).await?;

    late_fee_service::apply_property_late_fees(pool, property_id, as_of, user_id).await
}

/// Per-unit billing for a date window, with totals and occupancy.
pub async fn generate_rent_roll_report(
    pool: &DbPool,
    user_id: Uuid,
    query: &RentRollQuery,
) -> Result<RentRollReport, AppError> {
    if query.end_date < query.start_date {
        return Err(AppError::Validation(
            "end_date must not precede start_date".to_string(),
        ));
    }
    property_service::require_property(pool, user_id, query.property_id).await?;

    let rows = sqlx::query_as::<_, RentRollRow>(
        r#"
        SELECT
            u.id AS unit_id,
            u.unit_number,
            (
                SELECT t.first_name || ' ' || t.last_name
                FROM leases cl
                JOIN tenants t ON t.id = cl.tenant_id
                WHERE cl.unit_id = u.id AND cl.is_active
                ORDER BY cl.start_date DESC
                LIMIT 1
            ) AS tenant_name,
            u.is_occupied,
            COUNT(p.id) AS payment_count,
            COALESCE(SUM(p.amount_cents), 0)::BIGINT AS amount_due_cents,
            COALESCE(SUM(p.amount_paid_cents), 0)::BIGINT AS amount_paid_cents,
            COALESCE(SUM(
                CASE WHEN p.status IN ('pending', 'partial')
                     THEN GREATEST(p.amount_cents - p.amount_paid_cents, 0)
                     ELSE 0
                END
            ), 0)::BIGINT AS pending_cents
        FROM units u
        LEFT JOIN leases l ON l.unit_id = u.id
        LEFT JOIN recurring_payments rp ON rp.lease_id = l.id
        LEFT JOIN payments p
            ON p.recurring_payment_id = rp.id
           AND p.due_date BETWEEN $2 AND $3
           AND p.status <> 'waived'
        WHERE u.property_id = $1
        GROUP BY u.id, u.unit_number, u.is_occupied
        ORDER BY u.unit_number
        "#,
    )
    .bind(query.property_id)
    .bind(query.start_date)
    .bind(query.end_date)
    .fetch_all(pool)
    .await?;

    let summary = RentRollSummary::from_rows(&rows);

    Ok(RentRollReport {
        property_id: query.property_id,
        start_date: query.start_date,
        end_date: query.end_date,
        rows,
        summary,
    })
}

/// Notify registered endpoints about unpaid payments falling due in the
/// next `days_in_advance` days. Returns the number of payments for which
/// at least one reminder was delivered.
pub async fn send_payment_reminders(
    pool: &DbPool,
    http: &reqwest::Client,
    user_id: Uuid,
    property_id: Uuid,
    days_in_advance: i64,
) -> Result<usize, AppError> {
    if !(0..=MAX_REMINDER_DAYS).contains(&days_in_advance) {
        return Err(AppError::Validation(format!(
            "days_in_advance must be between 0 and {MAX_REMINDER_DAYS}"
        )));
    }
    property_service::require_property(pool, user_id, property_id).await?;

    let today = Utc::now().date_naive();
    let sql = format!(
        "SELECT {DUE_PAYMENT_COLUMNS} FROM {PAYMENT_SCOPE} JOIN tenants t ON t.id = l.tenant_id \
         WHERE u.property_id = $1 AND p.status IN ('pending', 'partial') \
         AND p.due_date BETWEEN $2 AND $3 ORDER BY p.due_date"
    );
    let upcoming = sqlx::query_as::<_, DuePayment>(&sql)
        .bind(property_id)
        .bind(today)
        .bind(today + Duration::days(days_in_advance))
        .fetch_all(pool)
        .await?;

    let sent = notification_service::send_payment_reminders(pool, http, user_id, &upcoming).await?;

    tracing::info!(
        property_id = %property_id,
        due = upcoming.len(),
        sent,
        "Payment reminders processed"
    );

    Ok(sent)
}

//! Late fee service: per-property fee rules, evaluating overdue payments
//! against them, and the late fee lifecycle (apply, waive, mark paid).

use chrono::{NaiveDate, Utc};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::late_fee::{
    ApplyLateFeeRequest, CreateLateFeeConfigurationRequest, FeeBasis, LateFee,
    LateFeeAssessment, LateFeeConfiguration, LateFeeStatus, OverdueCandidate, cap_fee,
    percentage_fee,
};
use crate::services::{property_service, rent_tracking_service};

/// Create the active fee rule of a property, retiring the previous one.
pub async fn create_configuration(
    pool: &DbPool,
    user_id: Uuid,
    request: CreateLateFeeConfigurationRequest,
) -> Result<LateFeeConfiguration, AppError> {
    request.validate()?;
    property_service::require_property(pool, user_id, request.property_id).await?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE late_fee_configurations SET is_active = false WHERE property_id = $1 AND is_active",
    )
    .bind(request.property_id)
    .execute(&mut *tx)
    .await?;

    let configuration = sqlx::query_as::<_, LateFeeConfiguration>(
        r#"
        INSERT INTO late_fee_configurations (
            property_id,
            fee_type,
            fee_amount,
            grace_period_days,
            maximum_fee_cents,
            is_compounding
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(request.property_id)
    .bind(request.fee_type)
    .bind(request.fee_amount)
    .bind(request.grace_period_days)
    .bind(request.maximum_fee_cents)
    .bind(request.is_compounding)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        property_id = %request.property_id,
        configuration_id = %configuration.id,
        "Late fee configuration activated"
    );

    Ok(configuration)
}

/// All configurations of a property, active first.
pub async fn list_configurations(
    pool: &DbPool,
    user_id: Uuid,
    property_id: Uuid,
) -> Result<Vec<LateFeeConfiguration>, AppError> {
    property_service::require_property(pool, user_id, property_id).await?;

    let configurations = sqlx::query_as::<_, LateFeeConfiguration>(
        "SELECT * FROM late_fee_configurations WHERE property_id = $1 ORDER BY is_active DESC, created_at DESC",
    )
    .bind(property_id)
    .fetch_all(pool)
    .await?;

    Ok(configurations)
}

async fn active_configuration<'e, E>(
    executor: E,
    property_id: Uuid,
) -> Result<Option<LateFeeConfiguration>, AppError>
where
    E: PgExecutor<'e>,
{
    Ok(sqlx::query_as::<_, LateFeeConfiguration>(
        "SELECT * FROM late_fee_configurations WHERE property_id = $1 AND is_active",
    )
    .bind(property_id)
    .fetch_optional(executor)
    .await?)
}

/// Unpaid payments of a property due before `as_of`, with the late fees
/// they already carry.
async fn overdue_candidates<'e, E>(
    executor: E,
    property_id: Uuid,
    as_of: NaiveDate,
) -> Result<Vec<OverdueCandidate>, AppError>
where
    E: PgExecutor<'e>,
{
    Ok(sqlx::query_as::<_, OverdueCandidate>(
        r#"
        SELECT
            p.id AS payment_id,
            p.amount_cents,
            p.amount_paid_cents,
            p.due_date,
            p.status,
            COUNT(lf.id) FILTER (WHERE lf.status <> 'waived') AS active_fee_count,
            MAX(lf.applied_date) FILTER (WHERE lf.status <> 'waived') AS last_fee_date
        FROM payments p
        JOIN recurring_payments rp ON rp.id = p.recurring_payment_id
        JOIN leases l ON l.id = rp.lease_id
        JOIN units u ON u.id = l.unit_id
        LEFT JOIN late_fees lf ON lf.payment_id = p.id
        WHERE u.property_id = $1
          AND p.status IN ('pending', 'partial')
          AND p.due_date < $2
        GROUP BY p.id
        ORDER BY p.due_date, p.id
        "#,
    )
    .bind(property_id)
    .bind(as_of)
    .fetch_all(executor)
    .await?)
}

fn assess_candidates(
    configuration: &LateFeeConfiguration,
    candidates: &[OverdueCandidate],
    as_of: NaiveDate,
) -> Result<Vec<LateFeeAssessment>, AppError> {
    let mut assessments = Vec::new();
    for candidate in candidates {
        if let Some(fee_cents) = configuration.assess(candidate, as_of)? {
            assessments.push(LateFeeAssessment {
                payment_id: candidate.payment_id,
                due_date: candidate.due_date,
                days_overdue: (as_of - candidate.due_date).num_days(),
                payment_amount_cents: candidate.amount_cents,
                outstanding_cents: (candidate.amount_cents - candidate.amount_paid_cents).max(0),
                fee_cents,
            });
        }
    }
    Ok(assessments)
}

/// Fees the active rule of a property would charge as of `as_of`.
///
/// A property without an active configuration charges nothing.
pub async fn assess_property(
    pool: &DbPool,
    property_id: Uuid,
    as_of: NaiveDate,
) -> Result<Vec<LateFeeAssessment>, AppError> {
    let Some(configuration) = active_configuration(pool, property_id).await? else {
        return Ok(Vec::new());
    };

    let candidates = overdue_candidates(pool, property_id, as_of).await?;
    assess_candidates(&configuration, &candidates, as_of)
}

/// Evaluate and charge late fees for one property in a single transaction.
///
/// The active configuration row is locked first, so two runs for the same
/// property cannot both charge the same payment.
pub async fn apply_property_late_fees(
    pool: &DbPool,
    property_id: Uuid,
    as_of: NaiveDate,
    user_id: Uuid,
) -> Result<Vec<LateFee>, AppError> {
    let mut tx = pool.begin().await?;

    let Some(configuration) = sqlx::query_as::<_, LateFeeConfiguration>(
        "SELECT * FROM late_fee_configurations WHERE property_id = $1 AND is_active FOR UPDATE",
    )
    .bind(property_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Ok(Vec::new());
    };

    let candidates = overdue_candidates(&mut *tx, property_id, as_of).await?;
    let assessments = assess_candidates(&configuration, &candidates, as_of)?;

    let mut fees = Vec::with_capacity(assessments.len());
    for assessment in &assessments {
        let fee = insert_late_fee(
            &mut tx,
            assessment.payment_id,
            assessment.fee_cents,
            as_of,
            Some(format!("Late fee for payment due {}", assessment.due_date)),
            user_id,
        )
        .await?;
        fees.push(fee);
    }

    tx.commit().await?;

    tracing::info!(
        property_id = %property_id,
        as_of = %as_of,
        applied = fees.len(),
        "Late fees applied"
    );

    Ok(fees)
}

async fn insert_late_fee(
    conn: &mut PgConnection,
    payment_id: Uuid,
    amount_cents: i64,
    applied_date: NaiveDate,
    notes: Option<String>,
    user_id: Uuid,
) -> Result<LateFee, AppError> {
    Ok(sqlx::query_as::<_, LateFee>(
        r#"
        INSERT INTO late_fees (payment_id, amount_cents, applied_date, notes, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(payment_id)
    .bind(amount_cents)
    .bind(applied_date)
    .bind(notes)
    .bind(user_id)
    .fetch_one(conn)
    .await?)
}

/// Charge a late fee by hand.
///
/// Percentage fees are computed from the payment amount and capped at the
/// property's active `maximum_fee_cents`.
///
/// # Errors
///
/// - `Validation`: both or neither of amount/percentage given
/// - `NotFound`: unknown payment
/// - `BusinessRule`: payment is already paid or waived
pub async fn apply_late_fee(
    pool: &DbPool,
    user_id: Uuid,
    request: ApplyLateFeeRequest,
) -> Result<LateFee, AppError> {
    let basis = request.basis()?;

    let mut tx = pool.begin().await?;

    let owned = rent_tracking_service::lock_owned_payment(&mut tx, user_id, request.payment_id)
        .await?;
    if owned.payment.status.is_terminal() {
        return Err(AppError::BusinessRule(format!(
            "Cannot charge a late fee on a {} payment",
            owned.payment.status.as_str()
        )));
    }

    let amount_cents = match basis {
        FeeBasis::Amount(amount) => amount,
        FeeBasis::Percentage(percentage) => {
            let fee = percentage_fee(owned.payment.amount_cents, percentage).ok_or_else(|| {
                AppError::Validation("Late fee amount is out of range".to_string())
            })?;
            let maximum = active_configuration(&mut *tx, owned.property_id)
                .await?
                .and_then(|c| c.maximum_fee_cents);
            cap_fee(fee, maximum)
        }
    };
    if amount_cents <= 0 {
        return Err(AppError::Validation(
            "Computed late fee is zero".to_string(),
        ));
    }

    let fee = insert_late_fee(
        &mut tx,
        request.payment_id,
        amount_cents,
        Utc::now().date_naive(),
        request.notes,
        user_id,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(late_fee_id = %fee.id, payment_id = %fee.payment_id, amount_cents, "Late fee applied");

    Ok(fee)
}

async fn lock_owned_late_fee(
    conn: &mut PgConnection,
    user_id: Uuid,
    late_fee_id: Uuid,
) -> Result<LateFee, AppError> {
    let sql = format!(
        "SELECT lf.* FROM {} JOIN late_fees lf ON lf.payment_id = p.id \
         WHERE lf.id = $1 AND pr.owner_id = $2 FOR UPDATE OF lf",
        rent_tracking_service::PAYMENT_SCOPE
    );

    sqlx::query_as::<_, LateFee>(&sql)
        .bind(late_fee_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::NotFound("Late fee"))
}

fn ensure_pending(fee: &LateFee) -> Result<(), AppError> {
    match fee.status {
        LateFeeStatus::Pending => Ok(()),
        LateFeeStatus::Waived => Err(AppError::BusinessRule(
            "Late fee is already waived".to_string(),
        )),
        LateFeeStatus::Paid => Err(AppError::BusinessRule(
            "Late fee is already paid".to_string(),
        )),
    }
}

/// Forgive a pending late fee. Waiving twice is rejected.
pub async fn waive_late_fee(
    pool: &DbPool,
    user_id: Uuid,
    late_fee_id: Uuid,
    reason: &str,
) -> Result<LateFee, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::Validation("A reason is required".to_string()));
    }

    let mut tx = pool.begin().await?;

    let fee = lock_owned_late_fee(&mut tx, user_id, late_fee_id).await?;
    ensure_pending(&fee)?;

    let fee = sqlx::query_as::<_, LateFee>(
        r#"
        UPDATE late_fees
        SET status = 'waived',
            waived_reason = $1,
            waived_at = NOW(),
            waived_by = $2
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(reason)
    .bind(user_id)
    .bind(late_fee_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(late_fee_id = %late_fee_id, "Late fee waived");

    Ok(fee)
}

/// Record that a pending late fee was collected.
pub async fn mark_late_fee_paid(
    pool: &DbPool,
    user_id: Uuid,
    late_fee_id: Uuid,
) -> Result<LateFee, AppError> {
    let mut tx = pool.begin().await?;

    let fee = lock_owned_late_fee(&mut tx, user_id, late_fee_id).await?;
    ensure_pending(&fee)?;

    let fee = sqlx::query_as::<_, LateFee>(
        "UPDATE late_fees SET status = 'paid', paid_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(late_fee_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(late_fee_id = %late_fee_id, "Late fee paid");

    Ok(fee)
}

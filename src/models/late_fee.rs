//! Late fee models and rule evaluation.
//!
//! A property carries at most one active [`LateFeeConfiguration`]. A payment
//! becomes fee-eligible once the as-of date is strictly later than its due
//! date plus the grace period; the fee is either a fixed amount or a
//! percentage of the payment amount, capped at the configured maximum.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::payment::PaymentStatus;

/// Exclusive upper bound of `fee_amount`, which is stored as `NUMERIC(12, 4)`.
const FEE_AMOUNT_LIMIT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "late_fee_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LateFeeType {
    Percentage,
    Fixed,
}

/// Late fee lifecycle: `pending → paid` or `pending → waived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "late_fee_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LateFeeStatus {
    Pending,
    Paid,
    Waived,
}

/// Per-property late fee rule.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LateFeeConfiguration {
    pub id: Uuid,
    pub property_id: Uuid,
    pub fee_type: LateFeeType,

    /// Percent of the payment amount for `percentage`, dollars for `fixed`.
    pub fee_amount: Decimal,

    pub grace_period_days: i32,
    pub maximum_fee_cents: Option<i64>,

    /// Compounding rules add a new fee on every evaluation pass; otherwise a
    /// payment carries at most one active fee.
    pub is_compounding: bool,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Convert a dollar amount to cents, rounding half away from zero.
pub fn dollars_to_cents(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// `percentage` percent of `amount_cents`, rounded to the cent.
pub fn percentage_fee(amount_cents: i64, percentage: Decimal) -> Option<i64> {
    Decimal::from(amount_cents)
        .checked_mul(percentage)?
        .checked_div(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// First date on which a payment due on `due_date` may be charged a fee.
pub fn first_eligible_date(due_date: NaiveDate, grace_period_days: i32) -> NaiveDate {
    due_date + Duration::days(i64::from(grace_period_days) + 1)
}

/// True once `as_of` is strictly after `due_date + grace_period_days`.
pub fn is_fee_eligible(due_date: NaiveDate, grace_period_days: i32, as_of: NaiveDate) -> bool {
    as_of >= first_eligible_date(due_date, grace_period_days)
}

/// Apply an optional maximum to a computed fee.
pub fn cap_fee(fee_cents: i64, maximum_fee_cents: Option<i64>) -> i64 {
    match maximum_fee_cents {
        Some(max) => fee_cents.min(max),
        None => fee_cents,
    }
}

impl LateFeeConfiguration {
    /// Fee owed on a payment of `payment_amount_cents`, after the cap.
    pub fn fee_for(&self, payment_amount_cents: i64) -> Result<i64, AppError> {
        let fee = match self.fee_type {
            LateFeeType::Percentage => percentage_fee(payment_amount_cents, self.fee_amount),
            LateFeeType::Fixed => dollars_to_cents(self.fee_amount),
        }
        .ok_or_else(|| AppError::Validation("Late fee amount is out of range".to_string()))?;

        Ok(cap_fee(fee, self.maximum_fee_cents))
    }

    /// Evaluate one overdue payment as of `as_of`.
    ///
    /// Returns the fee to charge, or `None` when the payment is settled,
    /// still inside its grace period, already carries its fee, or (for
    /// compounding rules) was already charged on `as_of`.
    pub fn assess(&self, candidate: &OverdueCandidate, as_of: NaiveDate) -> Result<Option<i64>, AppError> {
        if candidate.status.is_terminal() {
            return Ok(None);
        }
        if !is_fee_eligible(candidate.due_date, self.grace_period_days, as_of) {
            return Ok(None);
        }

        let already_charged = if self.is_compounding {
            candidate.last_fee_date == Some(as_of)
        } else {
            candidate.active_fee_count > 0
        };
        if already_charged {
            return Ok(None);
        }

        let fee = self.fee_for(candidate.amount_cents)?;
        Ok((fee > 0).then_some(fee))
    }
}

/// An unpaid payment of a property together with the late fees already
/// charged against it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OverdueCandidate {
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub amount_paid_cents: i64,
    pub due_date: NaiveDate,
    pub status: PaymentStatus,

    /// Non-waived fees on this payment.
    pub active_fee_count: i64,

    /// Most recent `applied_date` among non-waived fees.
    pub last_fee_date: Option<NaiveDate>,
}

/// Result of evaluating one payment during a late fee run.
#[derive(Debug, Clone, Serialize)]
pub struct LateFeeAssessment {
    pub payment_id: Uuid,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub payment_amount_cents: i64,
    pub outstanding_cents: i64,
    pub fee_cents: i64,
}

/// A late fee charged against a payment.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LateFee {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub status: LateFeeStatus,
    pub applied_date: NaiveDate,
    pub notes: Option<String>,
    pub waived_reason: Option<String>,
    pub waived_at: Option<DateTime<Utc>>,
    pub waived_by: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a late fee configuration.
///
/// # JSON Example
///
/// ```json
/// {
///   "property_id": "550e8400-e29b-41d4-a716-446655440000",
///   "fee_type": "percentage",
///   "fee_amount": "5",
///   "grace_period_days": 3,
///   "maximum_fee_cents": 10000,
///   "is_compounding": false
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateLateFeeConfigurationRequest {
    pub property_id: Uuid,
    pub fee_type: LateFeeType,
    pub fee_amount: Decimal,
    #[serde(default)]
    pub grace_period_days: i32,
    pub maximum_fee_cents: Option<i64>,
    #[serde(default)]
    pub is_compounding: bool,
}

impl CreateLateFeeConfigurationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.fee_amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Fee amount must be positive".to_string(),
            ));
        }
        if self.fee_amount >= FEE_AMOUNT_LIMIT {
            return Err(AppError::Validation(
                "Fee amount is too large".to_string(),
            ));
        }
        if self.fee_type == LateFeeType::Percentage && self.fee_amount > Decimal::ONE_HUNDRED {
            return Err(AppError::Validation(
                "Percentage fee cannot exceed 100".to_string(),
            ));
        }
        if self.grace_period_days < 0 {
            return Err(AppError::Validation(
                "Grace period cannot be negative".to_string(),
            ));
        }
        if matches!(self.maximum_fee_cents, Some(max) if max <= 0) {
            return Err(AppError::Validation(
                "Maximum fee must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a manually applied late fee is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeBasis {
    Amount(i64),
    Percentage(Decimal),
}

/// Request body for `POST /late-fees/apply`.
///
/// Exactly one of `amount_cents` and `percentage` must be given.
#[derive(Debug, Deserialize)]
pub struct ApplyLateFeeRequest {
    pub payment_id: Uuid,
    pub amount_cents: Option<i64>,
    pub percentage: Option<Decimal>,
    pub notes: Option<String>,
}

impl ApplyLateFeeRequest {
    pub fn basis(&self) -> Result<FeeBasis, AppError> {
        match (self.amount_cents, self.percentage) {
            (Some(amount), None) if amount > 0 => Ok(FeeBasis::Amount(amount)),
            (Some(_), None) => Err(AppError::Validation(
                "Fee amount must be positive".to_string(),
            )),
            (None, Some(pct)) if pct > Decimal::ZERO && pct <= Decimal::ONE_HUNDRED => {
                Ok(FeeBasis::Percentage(pct))
            }
            (None, Some(_)) => Err(AppError::Validation(
                "Percentage must be greater than 0 and at most 100".to_string(),
            )),
            _ => Err(AppError::Validation(
                "Provide exactly one of amount_cents or percentage".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WaiveLateFeeRequest {
    pub reason: String,
}

/// Query for `GET /late-fees/calculate` and body for `POST /late-fees/apply-batch`.
#[derive(Debug, Deserialize)]
pub struct LateFeeRunRequest {
    pub property_id: Uuid,
    pub as_of: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config(fee_type: LateFeeType, fee_amount: Decimal, grace: i32, max: Option<i64>) -> LateFeeConfiguration {
        LateFeeConfiguration {
            id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            fee_type,
            fee_amount,
            grace_period_days: grace,
            maximum_fee_cents: max,
            is_compounding: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn candidate(amount_cents: i64, due_date: NaiveDate) -> OverdueCandidate {
        OverdueCandidate {
            payment_id: Uuid::new_v4(),
            amount_cents,
            amount_paid_cents: 0,
            due_date,
            status: PaymentStatus::Pending,
            active_fee_count: 0,
            last_fee_date: None,
        }
    }

    #[test]
    fn grace_period_boundary_is_exclusive() {
        let due = date(2025, 4, 1);

        assert!(!is_fee_eligible(due, 5, date(2025, 4, 5)));
        assert!(!is_fee_eligible(due, 5, date(2025, 4, 6)));
        assert!(is_fee_eligible(due, 5, date(2025, 4, 7)));
    }

    #[test]
    fn zero_grace_period_is_eligible_the_day_after_due() {
        let due = date(2025, 4, 1);

        assert!(!is_fee_eligible(due, 0, due));
        assert!(is_fee_eligible(due, 0, date(2025, 4, 2)));
    }

    #[test]
    fn percentage_fee_is_capped_at_maximum() {
        let rule = config(LateFeeType::Percentage, dec!(5), 3, Some(10_000));
        let payment = candidate(100_000, date(2025, 4, 1));

        assert_eq!(rule.assess(&payment, date(2025, 4, 5)).unwrap(), Some(5_000));

        let large = candidate(400_000, date(2025, 4, 1));
        assert_eq!(rule.assess(&large, date(2025, 4, 5)).unwrap(), Some(10_000));
    }

    #[test]
    fn fixed_fee_converts_dollars_to_cents() {
        let rule = config(LateFeeType::Fixed, dec!(75.50), 0, None);

        assert_eq!(rule.fee_for(100_000).unwrap(), 7_550);
    }

    #[test]
    fn percentage_fee_rounds_half_away_from_zero() {
        assert_eq!(percentage_fee(12_345, dec!(10)), Some(1_235));
        assert_eq!(percentage_fee(99_999, dec!(2.5)), Some(2_500));
    }

    #[test]
    fn non_compounding_rule_charges_once() {
        let rule = config(LateFeeType::Fixed, dec!(50), 0, None);
        let mut payment = candidate(100_000, date(2025, 4, 1));
        payment.active_fee_count = 1;
        payment.last_fee_date = Some(date(2025, 4, 2));

        assert_eq!(rule.assess(&payment, date(2025, 4, 10)).unwrap(), None);
    }

    #[test]
    fn compounding_rule_charges_once_per_pass_date() {
        let mut rule = config(LateFeeType::Fixed, dec!(50), 0, None);
        rule.is_compounding = true;
        let mut payment = candidate(100_000, date(2025, 4, 1));
        payment.active_fee_count = 1;
        payment.last_fee_date = Some(date(2025, 4, 2));

        assert_eq!(rule.assess(&payment, date(2025, 4, 2)).unwrap(), None);
        assert_eq!(rule.assess(&payment, date(2025, 4, 3)).unwrap(), Some(5_000));
    }

    #[test]
    fn settled_payments_are_never_charged() {
        let rule = config(LateFeeType::Fixed, dec!(50), 0, None);
        let mut payment = candidate(100_000, date(2025, 4, 1));
        payment.status = PaymentStatus::Paid;

        assert_eq!(rule.assess(&payment, date(2025, 5, 1)).unwrap(), None);
    }

    #[test]
    fn configuration_validation() {
        let mut request = CreateLateFeeConfigurationRequest {
            property_id: Uuid::new_v4(),
            fee_type: LateFeeType::Percentage,
            fee_amount: dec!(5),
            grace_period_days: 3,
            maximum_fee_cents: Some(10_000),
            is_compounding: false,
        };
        assert!(request.validate().is_ok());

        request.fee_amount = Decimal::ZERO;
        assert!(request.validate().is_err());

        request.fee_amount = dec!(5);
        request.maximum_fee_cents = Some(0);
        assert!(request.validate().is_err());

        request.maximum_fee_cents = None;
        request.grace_period_days = -1;
        assert!(request.validate().is_err());
    }

    #[test]
    fn fixed_fee_beyond_storage_precision_is_rejected() {
        let mut request = CreateLateFeeConfigurationRequest {
            property_id: Uuid::new_v4(),
            fee_type: LateFeeType::Fixed,
            fee_amount: dec!(99999999.9999),
            grace_period_days: 0,
            maximum_fee_cents: None,
            is_compounding: false,
        };
        assert!(request.validate().is_ok());

        request.fee_amount = dec!(100000000);
        assert!(matches!(request.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn out_of_range_amounts_do_not_overflow() {
        assert_eq!(dollars_to_cents(Decimal::MAX), None);
        assert_eq!(percentage_fee(i64::MAX, Decimal::MAX), None);
        assert_eq!(dollars_to_cents(dec!(12.345)), Some(1_235));
    }

    #[test]
    fn apply_request_requires_exactly_one_basis() {
        let mut request = ApplyLateFeeRequest {
            payment_id: Uuid::new_v4(),
            amount_cents: Some(2_500),
            percentage: None,
            notes: None,
        };
        assert_eq!(request.basis().unwrap(), FeeBasis::Amount(2_500));

        request.percentage = Some(dec!(5));
        assert!(request.basis().is_err());

        request.amount_cents = None;
        assert_eq!(request.basis().unwrap(), FeeBasis::Percentage(dec!(5)));

        request.percentage = None;
        assert!(request.basis().is_err());
    }
}

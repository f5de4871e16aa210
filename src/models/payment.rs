//! Rent tracking models: recurring schedules, per-period payments and the
//! amounts received against them.
//!
//! This module also holds the pure rules the rent tracking service relies on:
//! - Billing-date generation for a recurring schedule
//! - Payment settlement (pending → partial → paid)

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::common::PageParams;

/// How often a recurring obligation falls due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentFrequency {
    Weekly,
    Monthly,
    Quarterly,
    Annually,
}

impl PaymentFrequency {
    /// Months between due dates, or `None` for weekly schedules.
    fn month_step(self) -> Option<i32> {
        match self {
            PaymentFrequency::Weekly => None,
            PaymentFrequency::Monthly => Some(1),
            PaymentFrequency::Quarterly => Some(3),
            PaymentFrequency::Annually => Some(12),
        }
    }

    /// All due dates of a schedule that fall in `[start, until]`.
    ///
    /// Weekly schedules fall due every seven days from `start`. Month-based
    /// schedules fall due on `due_day` (clamped to the month length); when
    /// `due_day` has already passed in the start month the first due date is
    /// in the following month.
    pub fn billing_dates(self, due_day: u32, start: NaiveDate, until: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = Vec::new();

        let Some(step) = self.month_step() else {
            let mut date = start;
            while date <= until {
                dates.push(date);
                date += Duration::days(7);
            }
            return dates;
        };

        let mut month_index = start.year() * 12 + start.month0() as i32;
        match due_date_in_month(month_index, due_day) {
            Some(first) if first < start => month_index += 1,
            Some(_) => {}
            None => return dates,
        }

        while let Some(date) = due_date_in_month(month_index, due_day) {
            if date > until {
                break;
            }
            dates.push(date);
            month_index += step;
        }

        dates
    }
}

/// The `due_day` of the month addressed by `month_index` (`year * 12 + month0`),
/// clamped to the last day of that month.
fn due_date_in_month(month_index: i32, due_day: u32) -> Option<NaiveDate> {
    let year = month_index.div_euclid(12);
    let month = month_index.rem_euclid(12) as u32 + 1;
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last_day = first_of_next.pred_opt()?.day();

    NaiveDate::from_ymd_opt(year, month, due_day.clamp(1, last_day))
}

/// Payment lifecycle.
///
/// `pending → partial → paid`, `pending → paid`, and `pending | partial → waived`.
/// `paid` and `waived` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Waived,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Waived)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Waived => "waived",
        }
    }
}

/// A recurring obligation (rent, parking, pet fee) attached to a lease.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct RecurringPayment {
    pub id: Uuid,
    pub lease_id: Uuid,
    pub amount_cents: i64,
    pub frequency: PaymentFrequency,
    pub due_day: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl RecurringPayment {
    /// Due dates of this schedule up to `as_of`, bounded by `end_date`.
    pub fn due_dates_through(&self, as_of: NaiveDate) -> Vec<NaiveDate> {
        let until = match self.end_date {
            Some(end) if end < as_of => end,
            _ => as_of,
        };
        let due_day = u32::try_from(self.due_day).unwrap_or(1);
        self.frequency.billing_dates(due_day, self.start_date, until)
    }
}

/// One billing period's instance of a recurring payment.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub recurring_payment_id: Uuid,
    pub amount_cents: i64,

    /// Running total received so far; may exceed `amount_cents` on overpayment.
    pub amount_paid_cents: i64,

    pub due_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub waived_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// New running total and status after receiving `amount_cents`.
    ///
    /// Anything short of the full amount leaves the payment `partial`;
    /// reaching or exceeding it settles the payment as `paid`.
    pub fn settle(&self, amount_cents: i64) -> Result<(i64, PaymentStatus), AppError> {
        if amount_cents <= 0 {
            return Err(AppError::Validation(
                "Payment amount must be positive".to_string(),
            ));
        }
        if self.status.is_terminal() {
            return Err(AppError::BusinessRule(format!(
                "Payment is already {}",
                self.status.as_str()
            )));
        }

        let paid = self
            .amount_paid_cents
            .checked_add(amount_cents)
            .ok_or_else(|| AppError::Validation("Payment amount is too large".to_string()))?;
        let status = if paid >= self.amount_cents {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        };

        Ok((paid, status))
    }
}

/// An amount received against a payment.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub idempotency_key: Option<String>,
    pub recorded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A payment together with the property it bills for.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OwnedPayment {
    #[sqlx(flatten)]
    pub payment: Payment,
    pub property_id: Uuid,
}

/// A payment joined with its lease, unit and tenant, as listed on the
/// due-payments screen.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DuePayment {
    pub id: Uuid,
    pub recurring_payment_id: Uuid,
    pub lease_id: Uuid,
    pub unit_id: Uuid,
    pub unit_number: String,
    pub tenant_name: String,
    pub tenant_email: Option<String>,
    pub amount_cents: i64,
    pub amount_paid_cents: i64,
    pub due_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub status: PaymentStatus,
}

/// Query parameters for `GET /payments/due`.
///
/// Without `status`, waived payments and payments due more than 30 days
/// after the window end are left out.
#[derive(Debug, Deserialize)]
pub struct DuePaymentsQuery {
    pub property_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<PaymentStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl DuePaymentsQuery {
    pub fn page(&self) -> PageParams {
        PageParams {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Request body for recording a payment.
///
/// # JSON Example
///
/// ```json
/// {
///   "payment_id": "550e8400-e29b-41d4-a716-446655440000",
///   "amount_cents": 120000,
///   "payment_date": "2025-04-03",
///   "payment_method": "ach",
///   "reference_number": "ACH-4411",
///   "idempotency_key": "rent-2025-04-unit-12"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RecordPaymentRequest {
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub notes: Option<String>,

    /// Optional key making client retries safe: a repeated key returns the
    /// payment without applying the amount a second time.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WaivePaymentRequest {
    pub reason: String,
}

/// Request body for creating a recurring payment schedule.
#[derive(Debug, Deserialize)]
pub struct CreateRecurringPaymentRequest {
    pub lease_id: Uuid,
    pub amount_cents: i64,
    pub frequency: PaymentFrequency,
    pub due_day: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl CreateRecurringPaymentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.amount_cents <= 0 {
            return Err(AppError::Validation("Amount must be positive".to_string()));
        }
        if !(1..=31).contains(&self.due_day) {
            return Err(AppError::Validation(
                "Due day must be between 1 and 31".to_string(),
            ));
        }
        if matches!(self.end_date, Some(end) if end < self.start_date) {
            return Err(AppError::Validation(
                "End date must not precede start date".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct PropertyQuery {
    pub property_id: Uuid,
}

/// Request body for `POST /payments/reminders`.
#[derive(Debug, Deserialize)]
pub struct PaymentRemindersRequest {
    pub property_id: Uuid,
    #[serde(default = "default_reminder_days")]
    pub days_in_advance: i64,
}

fn default_reminder_days() -> i64 {
    3
}

#[derive(Debug, Serialize)]
pub struct PaymentRemindersResponse {
    pub reminders_sent: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payment(amount_cents: i64, paid: i64, status: PaymentStatus) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            recurring_payment_id: Uuid::new_v4(),
            amount_cents,
            amount_paid_cents: paid,
            due_date: date(2025, 4, 1),
            payment_date: None,
            status,
            payment_method: None,
            reference_number: None,
            notes: None,
            waived_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn monthly_dates_clamp_to_month_end() {
        let dates =
            PaymentFrequency::Monthly.billing_dates(31, date(2025, 1, 1), date(2025, 4, 30));

        assert_eq!(
            dates,
            vec![
                date(2025, 1, 31),
                date(2025, 2, 28),
                date(2025, 3, 31),
                date(2025, 4, 30)
            ]
        );
    }

    #[test]
    fn first_due_date_moves_to_next_month_when_due_day_has_passed() {
        let dates =
            PaymentFrequency::Monthly.billing_dates(1, date(2025, 1, 15), date(2025, 3, 1));

        assert_eq!(dates, vec![date(2025, 2, 1), date(2025, 3, 1)]);
    }

    #[test]
    fn quarterly_and_annual_steps() {
        let quarterly =
            PaymentFrequency::Quarterly.billing_dates(1, date(2025, 1, 1), date(2025, 12, 31));
        assert_eq!(
            quarterly,
            vec![
                date(2025, 1, 1),
                date(2025, 4, 1),
                date(2025, 7, 1),
                date(2025, 10, 1)
            ]
        );

        let annual =
            PaymentFrequency::Annually.billing_dates(15, date(2024, 6, 1), date(2026, 6, 14));
        assert_eq!(annual, vec![date(2024, 6, 15), date(2025, 6, 15)]);
    }

    #[test]
    fn weekly_dates_step_seven_days_from_start() {
        let dates =
            PaymentFrequency::Weekly.billing_dates(1, date(2025, 3, 3), date(2025, 3, 20));

        assert_eq!(
            dates,
            vec![date(2025, 3, 3), date(2025, 3, 10), date(2025, 3, 17)]
        );
    }

    #[test]
    fn no_dates_when_window_ends_before_start() {
        assert!(
            PaymentFrequency::Monthly
                .billing_dates(1, date(2025, 5, 1), date(2025, 4, 1))
                .is_empty()
        );
    }

    #[test]
    fn schedule_stops_at_end_date() {
        let schedule = RecurringPayment {
            id: Uuid::new_v4(),
            lease_id: Uuid::new_v4(),
            amount_cents: 100_000,
            frequency: PaymentFrequency::Monthly,
            due_day: 1,
            start_date: date(2025, 1, 1),
            end_date: Some(date(2025, 2, 15)),
            description: None,
            is_active: true,
            created_at: Utc::now(),
        };

        assert_eq!(
            schedule.due_dates_through(date(2025, 6, 1)),
            vec![date(2025, 1, 1), date(2025, 2, 1)]
        );
    }

    #[test]
    fn short_payment_is_partial_and_full_payment_is_paid() {
        let pending = payment(100_000, 0, PaymentStatus::Pending);
        assert_eq!(
            pending.settle(40_000).unwrap(),
            (40_000, PaymentStatus::Partial)
        );

        let partial = payment(100_000, 40_000, PaymentStatus::Partial);
        assert_eq!(
            partial.settle(60_000).unwrap(),
            (100_000, PaymentStatus::Paid)
        );
    }

    #[test]
    fn overpayment_settles_as_paid() {
        let pending = payment(100_000, 0, PaymentStatus::Pending);

        assert_eq!(
            pending.settle(120_000).unwrap(),
            (120_000, PaymentStatus::Paid)
        );
    }

    #[test]
    fn rejects_non_positive_amounts_and_terminal_payments() {
        let pending = payment(100_000, 0, PaymentStatus::Pending);
        assert!(matches!(pending.settle(0), Err(AppError::Validation(_))));

        let paid = payment(100_000, 100_000, PaymentStatus::Paid);
        assert!(matches!(paid.settle(10), Err(AppError::BusinessRule(_))));

        let waived = payment(100_000, 0, PaymentStatus::Waived);
        assert!(matches!(waived.settle(10), Err(AppError::BusinessRule(_))));
    }

    #[test]
    fn recurring_request_validation() {
        let mut request = CreateRecurringPaymentRequest {
            lease_id: Uuid::new_v4(),
            amount_cents: 150_000,
            frequency: PaymentFrequency::Monthly,
            due_day: 1,
            start_date: date(2025, 1, 1),
            end_date: None,
            description: None,
        };
        assert!(request.validate().is_ok());

        request.due_day = 32;
        assert!(request.validate().is_err());

        request.due_day = 1;
        request.end_date = Some(date(2024, 12, 31));
        assert!(request.validate().is_err());
    }
}

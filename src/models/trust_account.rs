//! Trust account models and ledger rules.
//!
//! A trust account's balance is never edited directly: every change is a
//! [`TrustAccountTransaction`] whose type decides its sign, and the stored
//! balance must always equal the signed sum of the account's transactions.
//!
//! # Balance Storage
//!
//! Balances and amounts are stored as `i64` cents. Transaction amounts are
//! always positive; deposits and interest add, withdrawals and fees subtract.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Days in the interest accrual year.
pub const DAYS_PER_YEAR: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "trust_account_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrustAccountType {
    SecurityDeposit,
    Escrow,
    Reserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "trust_transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TrustTransactionType {
    Deposit,
    Withdrawal,
    Interest,
    Fee,
}

impl TrustTransactionType {
    /// True for entries that increase the balance.
    pub fn is_credit(self) -> bool {
        matches!(
            self,
            TrustTransactionType::Deposit | TrustTransactionType::Interest
        )
    }

    /// Balance effect of an entry of `amount_cents`.
    pub fn signed(self, amount_cents: i64) -> i64 {
        if self.is_credit() {
            amount_cents
        } else {
            -amount_cents
        }
    }

    /// Entry type that undoes an entry of this type.
    pub fn reversal(self) -> TrustTransactionType {
        if self.is_credit() {
            TrustTransactionType::Withdrawal
        } else {
            TrustTransactionType::Deposit
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrustTransactionType::Deposit => "deposit",
            TrustTransactionType::Withdrawal => "withdrawal",
            TrustTransactionType::Interest => "interest",
            TrustTransactionType::Fee => "fee",
        }
    }
}

/// Balance after posting an entry, rejecting overdrafts.
pub fn apply_to_balance(
    balance_cents: i64,
    transaction_type: TrustTransactionType,
    amount_cents: i64,
) -> Result<i64, AppError> {
    if amount_cents <= 0 {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }

    let new_balance = balance_cents
        .checked_add(transaction_type.signed(amount_cents))
        .ok_or_else(|| AppError::Validation("Amount is too large".to_string()))?;

    if new_balance < 0 {
        return Err(AppError::InsufficientFunds);
    }

    Ok(new_balance)
}

/// Signed sum of a sequence of entries.
pub fn ledger_balance<'a, I>(entries: I) -> i64
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    entries
        .into_iter()
        .map(|entry| entry.transaction_type.signed(entry.amount_cents))
        .sum()
}

/// Simple interest on `balance_cents` at `annual_rate_percent` for `days`,
/// on an actual/365 basis, rounded to the cent.
pub fn accrued_interest(balance_cents: i64, annual_rate_percent: Decimal, days: i64) -> i64 {
    if balance_cents <= 0 || days <= 0 || annual_rate_percent <= Decimal::ZERO {
        return 0;
    }

    (Decimal::from(balance_cents) * annual_rate_percent * Decimal::from(days)
        / (Decimal::ONE_HUNDRED * Decimal::from(DAYS_PER_YEAR)))
    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    .to_i64()
    .unwrap_or(0)
}

/// Number of leading entries that bring the ledger to the bank balance.
///
/// Starting from `opening_cents` (the reconciled balance), walks `entries`
/// in posting order and returns the longest prefix whose running balance
/// equals `bank_balance_cents`, or `None` if no prefix matches.
pub fn reconciled_prefix(
    opening_cents: i64,
    entries: &[LedgerEntry],
    bank_balance_cents: i64,
) -> Option<usize> {
    let mut running = opening_cents;
    let mut matched = (running == bank_balance_cents).then_some(0);

    for (index, entry) in entries.iter().enumerate() {
        running += entry.transaction_type.signed(entry.amount_cents);
        if running == bank_balance_cents {
            matched = Some(index + 1);
        }
    }

    matched
}

/// The part of a transaction that affects the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_type: TrustTransactionType,
    pub amount_cents: i64,
}

/// Represents a trust account record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TrustAccount {
    pub id: Uuid,
    pub property_id: Uuid,
    pub account_name: String,
    pub account_type: TrustAccountType,
    pub is_interest_bearing: bool,

    /// Annual rate in percent; present iff the account bears interest.
    pub interest_rate: Option<Decimal>,

    /// Current balance in cents. Never negative.
    pub balance_cents: i64,

    pub bank_name: Option<String>,
    pub account_number_last4: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ledger line of a trust account.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TrustAccountTransaction {
    pub id: Uuid,
    pub trust_account_id: Uuid,
    pub transaction_type: TrustTransactionType,
    pub amount_cents: i64,
    pub balance_after_cents: i64,
    pub transaction_date: NaiveDate,
    pub description: Option<String>,
    pub is_reconciled: bool,
    pub reconciled_at: Option<DateTime<Utc>>,

    /// Set on entries that undo an earlier entry.
    pub reverses_transaction_id: Option<Uuid>,

    pub idempotency_key: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TrustAccountTransaction {
    pub fn ledger_entry(&self) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            transaction_type: self.transaction_type,
            amount_cents: self.amount_cents,
        }
    }
}

/// Request body for creating a trust account.
///
/// # JSON Example
///
/// ```json
/// {
///   "property_id": "550e8400-e29b-41d4-a716-446655440000",
///   "account_name": "Security deposits",
///   "account_type": "security_deposit",
///   "is_interest_bearing": true,
///   "interest_rate": "1.25"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateTrustAccountRequest {
    pub property_id: Uuid,
    pub account_name: String,
    pub account_type: TrustAccountType,
    #[serde(default)]
    pub is_interest_bearing: bool,
    pub interest_rate: Option<Decimal>,
    pub bank_name: Option<String>,
    pub account_number_last4: Option<String>,
}

impl CreateTrustAccountRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.account_name.trim().is_empty() {
            return Err(AppError::Validation(
                "Account name is required".to_string(),
            ));
        }
        match (self.is_interest_bearing, self.interest_rate) {
            (true, Some(rate)) if rate > Decimal::ZERO => {}
            (true, _) => {
                return Err(AppError::Validation(
                    "Interest-bearing accounts need a positive interest rate".to_string(),
                ));
            }
            (false, Some(_)) => {
                return Err(AppError::Validation(
                    "Interest rate is only allowed on interest-bearing accounts".to_string(),
                ));
            }
            (false, None) => {}
        }
        if let Some(last4) = &self.account_number_last4 {
            if last4.len() != 4 || !last4.chars().all(|c| c.is_ascii_digit()) {
                return Err(AppError::Validation(
                    "Account number suffix must be 4 digits".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Request body for deposits, withdrawals and fees.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerEntryRequest {
    pub amount_cents: i64,
    pub transaction_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Request body for moving money between two trust accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub source_account_id: Uuid,
    pub target_account_id: Uuid,
    pub amount_cents: i64,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Both legs of a completed transfer.
#[derive(Debug, Serialize)]
pub struct TransferResult {
    pub withdrawal: TrustAccountTransaction,
    pub deposit: TrustAccountTransaction,
}

/// An interest-bearing account considered by an interest run.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InterestCandidate {
    pub id: Uuid,
    pub balance_cents: i64,
    pub interest_rate: Option<Decimal>,
    pub opened_on: NaiveDate,
    pub last_interest_date: Option<NaiveDate>,
}

impl InterestCandidate {
    /// Days of accrual between the last posting (or opening) and `as_of`.
    pub fn accrual_days(&self, as_of: NaiveDate) -> i64 {
        let since = self.last_interest_date.unwrap_or(self.opened_on);
        (as_of - since).num_days().max(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct InterestRunRequest {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct InterestPosting {
    pub trust_account_id: Uuid,
    pub accrual_days: i64,
    pub interest_cents: i64,
    pub transaction_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct InterestRunResult {
    pub as_of: NaiveDate,
    pub postings: Vec<InterestPosting>,
    pub failed_account_ids: Vec<Uuid>,
}

/// Request body for reconciling against a bank statement.
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub bank_balance_cents: i64,
    pub as_of: NaiveDate,
}

/// Stored record of a reconciliation run.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TrustAccountReconciliation {
    pub id: Uuid,
    pub trust_account_id: Uuid,
    pub as_of_date: NaiveDate,
    pub bank_balance_cents: i64,
    pub ledger_balance_cents: i64,
    pub difference_cents: i64,
    pub matched_transaction_count: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a reconciliation. Differences are reported, never corrected.
#[derive(Debug, Serialize)]
pub struct ReconciliationReport {
    pub reconciliation_id: Uuid,
    pub trust_account_id: Uuid,
    pub as_of: NaiveDate,
    pub bank_balance_cents: i64,
    pub ledger_balance_cents: i64,

    /// `bank_balance_cents - ledger_balance_cents`
    pub difference_cents: i64,

    pub matched_transaction_count: usize,
    pub unmatched_transaction_count: usize,
    pub is_balanced: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReverseTransactionRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRangeQuery {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.end_date < self.start_date {
            return Err(AppError::Validation(
                "end_date must not precede start_date".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-type sums over a set of transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransactionTotals {
    pub deposits_cents: i64,
    pub withdrawals_cents: i64,
    pub interest_cents: i64,
    pub fees_cents: i64,
}

impl TransactionTotals {
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        entries
            .into_iter()
            .fold(Self::default(), |mut totals, entry| {
                match entry.transaction_type {
                    TrustTransactionType::Deposit => totals.deposits_cents += entry.amount_cents,
                    TrustTransactionType::Withdrawal => {
                        totals.withdrawals_cents += entry.amount_cents
                    }
                    TrustTransactionType::Interest => totals.interest_cents += entry.amount_cents,
                    TrustTransactionType::Fee => totals.fees_cents += entry.amount_cents,
                }
                totals
            })
    }

    pub fn net_cents(&self) -> i64 {
        self.deposits_cents + self.interest_cents - self.withdrawals_cents - self.fees_cents
    }
}

/// Account activity over a date range.
#[derive(Debug, Serialize)]
pub struct TrustAccountStatement {
    pub account: TrustAccount,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub opening_balance_cents: i64,
    pub closing_balance_cents: i64,
    pub totals: TransactionTotals,
    pub transactions: Vec<TrustAccountTransaction>,
}

/// Statement plus integrity checks used by auditors.
#[derive(Debug, Serialize)]
pub struct TrustAccountAuditReport {
    pub statement: TrustAccountStatement,
    pub stored_balance_cents: i64,
    pub recomputed_balance_cents: i64,
    pub balance_matches_ledger: bool,
    pub unreconciled_transaction_count: i64,
    pub reversed_transaction_count: i64,
    pub reconciliations: Vec<TrustAccountReconciliation>,
}

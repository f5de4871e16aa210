//! Trust account service - ledger postings, transfers, interest,
//! reconciliation and reporting.
//!
//! # Atomicity Guarantees
//!
//! Every balance change runs inside one PostgreSQL transaction that locks
//! the account row (`SELECT ... FOR UPDATE`), computes the new balance,
//! inserts the ledger line and updates the balance. Transfers lock both
//! accounts in id order before posting either leg, so two opposite
//! transfers cannot deadlock and a failing second leg rolls back the first.

use chrono::{NaiveDate, Utc};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::models::common::{PageMeta, PageParams};
use crate::models::trust_account::{
    CreateTrustAccountRequest, DateRangeQuery, InterestCandidate, InterestPosting,
    InterestRunResult, LedgerEntry, LedgerEntryRequest, ReconcileRequest, ReconciliationReport,
    TransactionTotals, TransferRequest, TransferResult, TrustAccount, TrustAccountAuditReport,
    TrustAccountReconciliation, TrustAccountStatement, TrustAccountTransaction,
    TrustTransactionType, accrued_interest, apply_to_balance, ledger_balance, reconciled_prefix,
};
use crate::services::property_service;

/// Signed amount of a ledger line, in SQL.
const SIGNED_AMOUNT: &str =
    "CASE WHEN transaction_type IN ('deposit', 'interest') THEN amount_cents ELSE -amount_cents END";

/// A ledger line about to be posted.
#[derive(Debug, Clone, Copy)]
pub struct NewLedgerEntry<'a> {
    pub trust_account_id: Uuid,
    pub transaction_type: TrustTransactionType,
    pub amount_cents: i64,
    pub transaction_date: NaiveDate,
    pub description: Option<&'a str>,
    pub idempotency_key: Option<&'a str>,
    pub reverses_transaction_id: Option<Uuid>,
    pub created_by: Uuid,
}

pub async fn create_trust_account(
    pool: &DbPool,
    user_id: Uuid,
    request: CreateTrustAccountRequest,
) -> Result<TrustAccount, AppError> {
    request.validate()?;
    property_service::require_property(pool, user_id, request.property_id).await?;

    let account = sqlx::query_as::<_, TrustAccount>(
        r#"
        INSERT INTO trust_accounts (
            property_id,
            account_name,
            account_type,
            is_interest_bearing,
            interest_rate,
            bank_name,
            account_number_last4
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(request.property_id)
    .bind(request.account_name.trim())
    .bind(request.account_type)
    .bind(request.is_interest_bearing)
    .bind(request.interest_rate)
    .bind(&request.bank_name)
    .bind(&request.account_number_last4)
    .fetch_one(pool)
    .await?;

    tracing::info!(trust_account_id = %account.id, property_id = %account.property_id, "Trust account created");

    Ok(account)
}

pub async fn list_trust_accounts(
    pool: &DbPool,
    user_id: Uuid,
    property_id: Uuid,
) -> Result<Vec<TrustAccount>, AppError> {
    property_service::require_property(pool, user_id, property_id).await?;

    let accounts = sqlx::query_as::<_, TrustAccount>(
        "SELECT * FROM trust_accounts WHERE property_id = $1 ORDER BY created_at",
    )
    .bind(property_id)
    .fetch_all(pool)
    .await?;

    Ok(accounts)
}

pub async fn get_trust_account(
    pool: &DbPool,
    user_id: Uuid,
    account_id: Uuid,
) -> Result<TrustAccount, AppError> {
    sqlx::query_as::<_, TrustAccount>(
        r#"
        SELECT ta.*
        FROM trust_accounts ta
        JOIN properties pr ON pr.id = ta.property_id
        WHERE ta.id = $1 AND pr.owner_id = $2
        "#,
    )
    .bind(account_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Trust account"))
}

/// Post one ledger line and move the balance with it.
///
/// Must run inside a transaction; the account row stays locked until it
/// commits.
///
/// # Errors
///
/// A key already used on the account returns that line instead, provided
/// it has the same type and amount.
///
/// - `NotFound`: account does not exist
/// - `BusinessRule`: account is inactive, or the key belongs to a different entry
/// - `InsufficientFunds`: the entry would make the balance negative
pub async fn post_entry(
    conn: &mut PgConnection,
    entry: NewLedgerEntry<'_>,
) -> Result<TrustAccountTransaction, AppError> {
    let (balance_cents, is_active): (i64, bool) = sqlx::query_as(
        "SELECT balance_cents, is_active FROM trust_accounts WHERE id = $1 FOR UPDATE",
    )
    .bind(entry.trust_account_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Trust account"))?;

    if !is_active {
        return Err(AppError::BusinessRule(
            "Trust account is inactive".to_string(),
        ));
    }

    if let Some(key) = entry.idempotency_key {
        if let Some(existing) =
            find_by_idempotency_key(&mut *conn, entry.trust_account_id, key).await?
        {
            return replayed(existing, entry.transaction_type, entry.amount_cents);
        }
    }

    let new_balance = apply_to_balance(balance_cents, entry.transaction_type, entry.amount_cents)?;

    sqlx::query("UPDATE trust_accounts SET balance_cents = $1, updated_at = NOW() WHERE id = $2")
        .bind(new_balance)
        .bind(entry.trust_account_id)
        .execute(&mut *conn)
        .await?;

    let transaction = sqlx::query_as::<_, TrustAccountTransaction>(
        r#"
        INSERT INTO trust_account_transactions (
            trust_account_id,
            transaction_type,
            amount_cents,
            balance_after_cents,
            transaction_date,
            description,
            reverses_transaction_id,
            idempotency_key,
            created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(entry.trust_account_id)
    .bind(entry.transaction_type)
    .bind(entry.amount_cents)
    .bind(new_balance)
    .bind(entry.transaction_date)
    .bind(entry.description)
    .bind(entry.reverses_transaction_id)
    .bind(entry.idempotency_key)
    .bind(entry.created_by)
    .fetch_one(&mut *conn)
    .await?;

    Ok(transaction)
}

/// Keys are unique per account only.
async fn find_by_idempotency_key<'e>(
    executor: impl PgExecutor<'e>,
    account_id: Uuid,
    key: &str,
) -> Result<Option<TrustAccountTransaction>, AppError> {
    Ok(sqlx::query_as::<_, TrustAccountTransaction>(
        "SELECT * FROM trust_account_transactions WHERE trust_account_id = $1 AND idempotency_key = $2",
    )
    .bind(account_id)
    .bind(key)
    .fetch_optional(executor)
    .await?)
}

fn replayed(
    existing: TrustAccountTransaction,
    transaction_type: TrustTransactionType,
    amount_cents: i64,
) -> Result<TrustAccountTransaction, AppError> {
    if existing.transaction_type != transaction_type || existing.amount_cents != amount_cents {
        return Err(AppError::BusinessRule(
            "Idempotency key was already used for a different entry".to_string(),
        ));
    }
    Ok(existing)
}

async fn post_entry_once(
    pool: &DbPool,
    entry: NewLedgerEntry<'_>,
) -> Result<TrustAccountTransaction, AppError> {
    let mut tx = pool.begin().await?;
    let transaction = post_entry(&mut tx, entry).await?;
    tx.commit().await?;
    Ok(transaction)
}

/// Post a deposit, withdrawal or fee requested through the API.
///
/// A repeated idempotency key returns the line it created the first time.
async fn record_entry(
    pool: &DbPool,
    user_id: Uuid,
    account_id: Uuid,
    transaction_type: TrustTransactionType,
    request: LedgerEntryRequest,
) -> Result<TrustAccountTransaction, AppError> {
    if request.amount_cents <= 0 {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }

    let account = get_trust_account(pool, user_id, account_id).await?;

    if let Some(ref key) = request.idempotency_key {
        if let Some(existing) = find_by_idempotency_key(pool, account.id, key).await? {
            return replayed(existing, transaction_type, request.amount_cents);
        }
    }

    let entry = NewLedgerEntry {
        trust_account_id: account.id,
        transaction_type,
        amount_cents: request.amount_cents,
        transaction_date: request
            .transaction_date
            .unwrap_or_else(|| Utc::now().date_naive()),
        description: request.description.as_deref(),
        idempotency_key: request.idempotency_key.as_deref(),
        reverses_transaction_id: None,
        created_by: user_id,
    };

    let transaction = db::retry_on_conflict(move || post_entry_once(pool, entry)).await?;

    tracing::info!(
        trust_account_id = %account.id,
        transaction_id = %transaction.id,
        transaction_type = transaction_type.as_str(),
        amount_cents = transaction.amount_cents,
        balance_after_cents = transaction.balance_after_cents,
        "Trust account entry posted"
    );

    Ok(transaction)
}

pub async fn record_deposit(
    pool: &DbPool,
    user_id: Uuid,
    account_id: Uuid,
    request: LedgerEntryRequest,
) -> Result<TrustAccountTransaction, AppError> {
    record_entry(pool, user_id, account_id, TrustTransactionType::Deposit, request).await
}

pub async fn record_withdrawal(
    pool: &DbPool,
    user_id: Uuid,
    account_id: Uuid,
    request: LedgerEntryRequest,
) -> Result<TrustAccountTransaction, AppError> {
    record_entry(pool, user_id, account_id, TrustTransactionType::Withdrawal, request).await
}

pub async fn record_fee(
    pool: &DbPool,
    user_id: Uuid,
    account_id: Uuid,
    request: LedgerEntryRequest,
) -> Result<TrustAccountTransaction, AppError> {
    record_entry(pool, user_id, account_id, TrustTransactionType::Fee, request).await
}

/// Move money between two accounts on an open transaction.
///
/// Both rows are locked in id order first; the withdrawal leg is posted
/// before the deposit leg. The caller commits or rolls back.
///
/// With an idempotency key, the source line carries `{key}` and the target
/// line `{key}:credit`. Finding both, matching the request, returns them.
pub async fn transfer_between(
    conn: &mut PgConnection,
    request: &TransferRequest,
    transaction_date: NaiveDate,
    user_id: Uuid,
) -> Result<TransferResult, AppError> {
    let mut ids = [request.source_account_id, request.target_account_id];
    ids.sort();
    sqlx::query("SELECT id FROM trust_accounts WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(&ids[..])
        .execute(&mut *conn)
        .await?;

    let description = request.description.as_deref().unwrap_or("Transfer");
    let credit_key = request
        .idempotency_key
        .as_deref()
        .map(|key| format!("{key}:credit"));

    if let (Some(key), Some(credit_key)) =
        (request.idempotency_key.as_deref(), credit_key.as_deref())
    {
        let withdrawal =
            find_by_idempotency_key(&mut *conn, request.source_account_id, key).await?;
        let deposit =
            find_by_idempotency_key(&mut *conn, request.target_account_id, credit_key).await?;

        match (withdrawal, deposit) {
            (None, None) => {}
            (Some(withdrawal), Some(deposit)) => {
                return Ok(TransferResult {
                    withdrawal: replayed(
                        withdrawal,
                        TrustTransactionType::Withdrawal,
                        request.amount_cents,
                    )?,
                    deposit: replayed(deposit, TrustTransactionType::Deposit, request.amount_cents)?,
                });
            }
            _ => {
                return Err(AppError::BusinessRule(
                    "Idempotency key was already used for a different entry".to_string(),
                ));
            }
        }
    }

    let withdrawal = post_entry(
        &mut *conn,
        NewLedgerEntry {
            trust_account_id: request.source_account_id,
            transaction_type: TrustTransactionType::Withdrawal,
            amount_cents: request.amount_cents,
            transaction_date,
            description: Some(description),
            idempotency_key: request.idempotency_key.as_deref(),
            reverses_transaction_id: None,
            created_by: user_id,
        },
    )
    .await?;

    let deposit = post_entry(
        &mut *conn,
        NewLedgerEntry {
            trust_account_id: request.target_account_id,
            transaction_type: TrustTransactionType::Deposit,
            amount_cents: request.amount_cents,
            transaction_date,
            description: Some(description),
            idempotency_key: credit_key.as_deref(),
            reverses_transaction_id: None,
            created_by: user_id,
        },
    )
    .await?;

    Ok(TransferResult {
        withdrawal,
        deposit,
    })
}

async fn transfer_once(
    pool: &DbPool,
    request: &TransferRequest,
    user_id: Uuid,
) -> Result<TransferResult, AppError> {
    let mut tx = pool.begin().await?;
    let result = transfer_between(&mut tx, request, Utc::now().date_naive(), user_id).await?;
    tx.commit().await?;
    Ok(result)
}

/// Transfer funds between two of the caller's trust accounts.
///
/// # Errors
///
/// - `Validation`: non-positive amount or same source and target
/// - `NotFound`: either account missing or owned by someone else
/// - `InsufficientFunds`: source balance too low (nothing is posted)
pub async fn transfer_funds(
    pool: &DbPool,
    user_id: Uuid,
    request: TransferRequest,
) -> Result<TransferResult, AppError> {
    if request.amount_cents <= 0 {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }
    if request.source_account_id == request.target_account_id {
        return Err(AppError::Validation(
            "Source and target accounts must differ".to_string(),
        ));
    }

    get_trust_account(pool, user_id, request.source_account_id).await?;
    get_trust_account(pool, user_id, request.target_account_id).await?;

    let request = &request;
    let result = db::retry_on_conflict(move || transfer_once(pool, request, user_id)).await?;

    tracing::info!(
        source_account_id = %request.source_account_id,
        target_account_id = %request.target_account_id,
        amount_cents = request.amount_cents,
        "Trust account transfer completed"
    );

    Ok(result)
}

async fn post_interest_once(
    pool: &DbPool,
    account_id: Uuid,
    as_of: NaiveDate,
    user_id: Uuid,
) -> Result<Option<InterestPosting>, AppError> {
    let mut tx = pool.begin().await?;

    let Some(candidate) = sqlx::query_as::<_, InterestCandidate>(
        r#"
        SELECT
            ta.id,
            ta.balance_cents,
            ta.interest_rate,
            ta.created_at::date AS opened_on,
            (
                SELECT MAX(t.transaction_date)
                FROM trust_account_transactions t
                WHERE t.trust_account_id = ta.id AND t.transaction_type = 'interest'
            ) AS last_interest_date
        FROM trust_accounts ta
        WHERE ta.id = $1 AND ta.is_active AND ta.is_interest_bearing
        FOR UPDATE
        "#,
    )
    .bind(account_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Ok(None);
    };

    let Some(rate) = candidate.interest_rate else {
        return Ok(None);
    };
    let accrual_days = candidate.accrual_days(as_of);
    let interest_cents = accrued_interest(candidate.balance_cents, rate, accrual_days);
    if interest_cents < 1 {
        return Ok(None);
    }

    let key = format!("interest:{account_id}:{as_of}");
    if find_by_idempotency_key(&mut *tx, account_id, &key)
        .await?
        .is_some()
    {
        return Ok(None);
    }

    let description = format!("Interest for {accrual_days} days at {rate}%");
    let transaction = post_entry(
        &mut tx,
        NewLedgerEntry {
            trust_account_id: account_id,
            transaction_type: TrustTransactionType::Interest,
            amount_cents: interest_cents,
            transaction_date: as_of,
            description: Some(&description),
            idempotency_key: Some(&key),
            reverses_transaction_id: None,
            created_by: user_id,
        },
    )
    .await?;

    tx.commit().await?;

    Ok(Some(InterestPosting {
        trust_account_id: account_id,
        accrual_days,
        interest_cents,
        transaction_id: transaction.id,
    }))
}

/// Accrue and post interest on every active interest-bearing account of
/// the caller.
///
/// Each account is posted in its own transaction; one failing account is
/// logged and reported without stopping the run. Running twice for the
/// same date posts nothing the second time.
pub async fn calculate_and_apply_interest(
    pool: &DbPool,
    user_id: Uuid,
    as_of: NaiveDate,
) -> Result<InterestRunResult, AppError> {
    let account_ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT ta.id
        FROM trust_accounts ta
        JOIN properties pr ON pr.id = ta.property_id
        WHERE pr.owner_id = $1 AND ta.is_active AND ta.is_interest_bearing
        ORDER BY ta.id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut result = InterestRunResult {
        as_of,
        postings: Vec::new(),
        failed_account_ids: Vec::new(),
    };

    for account_id in account_ids {
        match db::retry_on_conflict(move || post_interest_once(pool, account_id, as_of, user_id))
            .await
        {
            Ok(Some(posting)) => result.postings.push(posting),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(trust_account_id = %account_id, error = %e, "Interest posting failed");
                result.failed_account_ids.push(account_id);
            }
        }
    }

    tracing::info!(
        as_of = %as_of,
        posted = result.postings.len(),
        failed = result.failed_account_ids.len(),
        "Interest run finished"
    );

    Ok(result)
}

async fn reconcile_once(
    pool: &DbPool,
    user_id: Uuid,
    account_id: Uuid,
    request: &ReconcileRequest,
) -> Result<ReconciliationReport, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT id FROM trust_accounts WHERE id = $1 FOR UPDATE")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    let opening_cents: i64 = sqlx::query_scalar(&format!(
        "SELECT COALESCE(SUM({SIGNED_AMOUNT}), 0)::BIGINT FROM trust_account_transactions \
         WHERE trust_account_id = $1 AND is_reconciled"
    ))
    .bind(account_id)
    .fetch_one(&mut *tx)
    .await?;

    let entries = sqlx::query_as::<_, LedgerEntry>(
        r#"
        SELECT id, transaction_type, amount_cents
        FROM trust_account_transactions
        WHERE trust_account_id = $1 AND NOT is_reconciled AND transaction_date <= $2
        ORDER BY transaction_date, created_at, id
        "#,
    )
    .bind(account_id)
    .bind(request.as_of)
    .fetch_all(&mut *tx)
    .await?;

    let ledger_balance_cents = opening_cents + ledger_balance(&entries);
    let matched = reconciled_prefix(opening_cents, &entries, request.bank_balance_cents).unwrap_or(0);
    let matched_ids: Vec<Uuid> = entries[..matched].iter().map(|e| e.id).collect();

    if !matched_ids.is_empty() {
        sqlx::query(
            "UPDATE trust_account_transactions SET is_reconciled = true, reconciled_at = NOW() WHERE id = ANY($1)",
        )
        .bind(&matched_ids)
        .execute(&mut *tx)
        .await?;
    }

    let difference_cents = request.bank_balance_cents - ledger_balance_cents;

    let reconciliation = sqlx::query_as::<_, TrustAccountReconciliation>(
        r#"
        INSERT INTO trust_account_reconciliations (
            trust_account_id,
            as_of_date,
            bank_balance_cents,
            ledger_balance_cents,
            difference_cents,
            matched_transaction_count,
            created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(request.as_of)
    .bind(request.bank_balance_cents)
    .bind(ledger_balance_cents)
    .bind(difference_cents)
    .bind(i32::try_from(matched).unwrap_or(i32::MAX))
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ReconciliationReport {
        reconciliation_id: reconciliation.id,
        trust_account_id: account_id,
        as_of: request.as_of,
        bank_balance_cents: request.bank_balance_cents,
        ledger_balance_cents,
        difference_cents,
        matched_transaction_count: matched,
        unmatched_transaction_count: entries.len() - matched,
        is_balanced: difference_cents == 0,
    })
}

/// Compare the ledger with a bank statement balance.
///
/// Unreconciled lines dated on or before `as_of` are walked in posting
/// order from the reconciled opening balance; the longest prefix that
/// lands exactly on the bank balance is marked reconciled. Any difference
/// is reported, never corrected.
pub async fn reconcile_trust_account(
    pool: &DbPool,
    user_id: Uuid,
    account_id: Uuid,
    request: ReconcileRequest,
) -> Result<ReconciliationReport, AppError> {
    get_trust_account(pool, user_id, account_id).await?;

    let request = &request;
    let report =
        db::retry_on_conflict(move || reconcile_once(pool, user_id, account_id, request)).await?;

    if report.is_balanced {
        tracing::info!(trust_account_id = %account_id, matched = report.matched_transaction_count, "Trust account reconciled");
    } else {
        tracing::warn!(
            trust_account_id = %account_id,
            difference_cents = report.difference_cents,
            "Trust account reconciliation found a difference"
        );
    }

    Ok(report)
}

/// Opening and closing balances, per-type totals and transactions for a
/// date range.
pub async fn generate_statement(
    pool: &DbPool,
    user_id: Uuid,
    account_id: Uuid,
    range: &DateRangeQuery,
) -> Result<TrustAccountStatement, AppError> {
    range.validate()?;
    let account = get_trust_account(pool, user_id, account_id).await?;

    let opening_balance_cents: i64 = sqlx::query_scalar(&format!(
        "SELECT COALESCE(SUM({SIGNED_AMOUNT}), 0)::BIGINT FROM trust_account_transactions \
         WHERE trust_account_id = $1 AND transaction_date < $2"
    ))
    .bind(account_id)
    .bind(range.start_date)
    .fetch_one(pool)
    .await?;

    let transactions = sqlx::query_as::<_, TrustAccountTransaction>(
        r#"
        SELECT *
        FROM trust_account_transactions
        WHERE trust_account_id = $1 AND transaction_date BETWEEN $2 AND $3
        ORDER BY transaction_date, created_at, id
        "#,
    )
    .bind(account_id)
    .bind(range.start_date)
    .bind(range.end_date)
    .fetch_all(pool)
    .await?;

    let entries: Vec<LedgerEntry> = transactions.iter().map(|t| t.ledger_entry()).collect();
    let totals = TransactionTotals::from_entries(&entries);

    Ok(TrustAccountStatement {
        account,
        start_date: range.start_date,
        end_date: range.end_date,
        opening_balance_cents,
        closing_balance_cents: opening_balance_cents + totals.net_cents(),
        totals,
        transactions,
    })
}

/// Statement plus ledger integrity checks and reconciliation history.
pub async fn generate_audit_report(
    pool: &DbPool,
    user_id: Uuid,
    account_id: Uuid,
    range: &DateRangeQuery,
) -> Result<TrustAccountAuditReport, AppError> {
    let statement = generate_statement(pool, user_id, account_id, range).await?;

    let (recomputed_balance_cents, unreconciled_transaction_count, reversed_transaction_count): (
        i64,
        i64,
        i64,
    ) = sqlx::query_as(&format!(
        r#"
        SELECT
            COALESCE(SUM({SIGNED_AMOUNT}), 0)::BIGINT,
            COUNT(*) FILTER (WHERE NOT is_reconciled),
            COUNT(*) FILTER (WHERE reverses_transaction_id IS NOT NULL)
        FROM trust_account_transactions
        WHERE trust_account_id = $1
        "#
    ))
    .bind(account_id)
    .fetch_one(pool)
    .await?;

    let reconciliations = sqlx::query_as::<_, TrustAccountReconciliation>(
        "SELECT * FROM trust_account_reconciliations WHERE trust_account_id = $1 ORDER BY created_at DESC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    let stored_balance_cents = statement.account.balance_cents;
    if stored_balance_cents != recomputed_balance_cents {
        tracing::error!(
            trust_account_id = %account_id,
            stored_balance_cents,
            recomputed_balance_cents,
            "Trust account balance does not match its ledger"
        );
    }

    Ok(TrustAccountAuditReport {
        statement,
        stored_balance_cents,
        recomputed_balance_cents,
        balance_matches_ledger: stored_balance_cents == recomputed_balance_cents,
        unreconciled_transaction_count,
        reversed_transaction_count,
        reconciliations,
    })
}

async fn reverse_once(
    pool: &DbPool,
    user_id: Uuid,
    original: &TrustAccountTransaction,
    description: &str,
) -> Result<TrustAccountTransaction, AppError> {
    let mut tx = pool.begin().await?;

    // Serializes concurrent reversals of the same line
    sqlx::query("SELECT id FROM trust_account_transactions WHERE id = $1 FOR UPDATE")
        .bind(original.id)
        .execute(&mut *tx)
        .await?;

    let already_reversed: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM trust_account_transactions WHERE reverses_transaction_id = $1)",
    )
    .bind(original.id)
    .fetch_one(&mut *tx)
    .await?;
    if already_reversed {
        return Err(AppError::BusinessRule(
            "Transaction is already reversed".to_string(),
        ));
    }

    let reversal = post_entry(
        &mut tx,
        NewLedgerEntry {
            trust_account_id: original.trust_account_id,
            transaction_type: original.transaction_type.reversal(),
            amount_cents: original.amount_cents,
            transaction_date: Utc::now().date_naive(),
            description: Some(description),
            idempotency_key: None,
            reverses_transaction_id: Some(original.id),
            created_by: user_id,
        },
    )
    .await?;

    tx.commit().await?;

    Ok(reversal)
}

/// Undo a ledger line by posting its offsetting entry.
///
/// Lines are never edited or deleted; this is also the only way to undo a
/// reconciled line. A line can be reversed once and reversals themselves
/// cannot be reversed.
pub async fn reverse_transaction(
    pool: &DbPool,
    user_id: Uuid,
    transaction_id: Uuid,
    reason: &str,
) -> Result<TrustAccountTransaction, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::Validation("A reason is required".to_string()));
    }

    let original = sqlx::query_as::<_, TrustAccountTransaction>(
        r#"
        SELECT t.*
        FROM trust_account_transactions t
        JOIN trust_accounts ta ON ta.id = t.trust_account_id
        JOIN properties pr ON pr.id = ta.property_id
        WHERE t.id = $1 AND pr.owner_id = $2
        "#,
    )
    .bind(transaction_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Trust account transaction"))?;

    if original.reverses_transaction_id.is_some() {
        return Err(AppError::BusinessRule(
            "A reversal cannot itself be reversed".to_string(),
        ));
    }

    let description = format!("Reversal of {}: {}", original.id, reason.trim());
    let original = &original;
    let description = description.as_str();
    let reversal =
        db::retry_on_conflict(move || reverse_once(pool, user_id, original, description)).await?;

    tracing::info!(
        transaction_id = %transaction_id,
        reversal_id = %reversal.id,
        "Trust account transaction reversed"
    );

    Ok(reversal)
}

/// Ledger lines of an account, newest first.
pub async fn list_transactions(
    pool: &DbPool,
    user_id: Uuid,
    account_id: Uuid,
    page: PageParams,
) -> Result<(Vec<TrustAccountTransaction>, PageMeta), AppError> {
    get_trust_account(pool, user_id, account_id).await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM trust_account_transactions WHERE trust_account_id = $1",
    )
    .bind(account_id)
    .fetch_one(pool)
    .await?;

    let transactions = sqlx::query_as::<_, TrustAccountTransaction>(
        r#"
        SELECT *
        FROM trust_account_transactions
        WHERE trust_account_id = $1
        ORDER BY transaction_date DESC, created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(account_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((transactions, page.meta(total)))
}

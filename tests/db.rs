//! Database integration tests. They need a running PostgreSQL reachable
//! through `DATABASE_URL`; run them with `cargo test -- --ignored`.

use chrono::NaiveDate;
use property_accounting::error::AppError;
use property_accounting::models::late_fee::{
    ApplyLateFeeRequest, CreateLateFeeConfigurationRequest, LateFeeType,
};
use property_accounting::models::payment::{PaymentStatus, RecordPaymentRequest};
use property_accounting::models::trust_account::{
    CreateTrustAccountRequest, LedgerEntryRequest, ReconcileRequest, TransferRequest,
    TrustAccountType,
};
use property_accounting::services::{
    accounting_module, late_fee_service, rent_tracking_service, trust_account_service,
};
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn seed_property(pool: &PgPool, owner_id: Uuid) -> Uuid {
    sqlx::query_scalar("INSERT INTO properties (owner_id, name) VALUES ($1, 'Elm Court') RETURNING id")
        .bind(owner_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// A property with one leased unit and a single 1,200.00 payment due
/// 2025-04-01. Returns (property_id, payment_id).
async fn seed_payment(pool: &PgPool, owner_id: Uuid) -> (Uuid, Uuid) {
    let property_id = seed_property(pool, owner_id).await;
    let unit_id: Uuid = sqlx::query_scalar(
        "INSERT INTO units (property_id, unit_number, is_occupied) VALUES ($1, '1A', true) RETURNING id",
    )
    .bind(property_id)
    .fetch_one(pool)
    .await
    .unwrap();
    let tenant_id: Uuid = sqlx::query_scalar(
        "INSERT INTO tenants (first_name, last_name, email) VALUES ('Jane', 'Doe', 'jane@example.com') RETURNING id",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    let lease_id: Uuid = sqlx::query_scalar(
        "INSERT INTO leases (unit_id, tenant_id, start_date) VALUES ($1, $2, '2025-01-01') RETURNING id",
    )
    .bind(unit_id)
    .bind(tenant_id)
    .fetch_one(pool)
    .await
    .unwrap();
    let recurring_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO recurring_payments (lease_id, amount_cents, frequency, due_day, start_date)
        VALUES ($1, 120000, 'monthly', 1, '2025-01-01')
        RETURNING id
        "#,
    )
    .bind(lease_id)
    .fetch_one(pool)
    .await
    .unwrap();
    let payment_id: Uuid = sqlx::query_scalar(
        "INSERT INTO payments (recurring_payment_id, amount_cents, due_date) VALUES ($1, 120000, '2025-04-01') RETURNING id",
    )
    .bind(recurring_id)
    .fetch_one(pool)
    .await
    .unwrap();

    (property_id, payment_id)
}

async fn open_account(pool: &PgPool, owner_id: Uuid, property_id: Uuid, name: &str) -> Uuid {
    trust_account_service::create_trust_account(
        pool,
        owner_id,
        CreateTrustAccountRequest {
            property_id,
            account_name: name.to_string(),
            account_type: TrustAccountType::SecurityDeposit,
            is_interest_bearing: false,
            interest_rate: None,
            bank_name: None,
            account_number_last4: None,
        },
    )
    .await
    .unwrap()
    .id
}

async fn fund(pool: &PgPool, owner_id: Uuid, account_id: Uuid, amount_cents: i64) {
    trust_account_service::record_deposit(pool, owner_id, account_id, entry(amount_cents))
        .await
        .unwrap();
}

fn keyed_entry(amount_cents: i64, key: &str) -> LedgerEntryRequest {
    LedgerEntryRequest {
        idempotency_key: Some(key.to_string()),
        ..entry(amount_cents)
    }
}

fn transfer(source: Uuid, target: Uuid, amount_cents: i64, key: &str) -> TransferRequest {
    TransferRequest {
        source_account_id: source,
        target_account_id: target,
        amount_cents,
        description: None,
        idempotency_key: Some(key.to_string()),
    }
}

fn receipt(payment_id: Uuid, amount_cents: i64, key: &str) -> RecordPaymentRequest {
    RecordPaymentRequest {
        payment_id,
        amount_cents,
        payment_date: date(2025, 4, 3),
        payment_method: "ach".to_string(),
        reference_number: None,
        notes: None,
        idempotency_key: Some(key.to_string()),
    }
}

async fn late_fee_rule(pool: &PgPool, owner_id: Uuid, property_id: Uuid, is_compounding: bool) {
    late_fee_service::create_configuration(
        pool,
        owner_id,
        CreateLateFeeConfigurationRequest {
            property_id,
            fee_type: LateFeeType::Fixed,
            fee_amount: dec!(50),
            grace_period_days: 5,
            maximum_fee_cents: None,
            is_compounding,
        },
    )
    .await
    .unwrap();
}

fn entry(amount_cents: i64) -> LedgerEntryRequest {
    LedgerEntryRequest {
        amount_cents,
        transaction_date: Some(date(2025, 4, 1)),
        description: None,
        idempotency_key: None,
    }
}

async fn ledger_sum(pool: &PgPool, account_id: Uuid) -> i64 {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(CASE WHEN transaction_type IN ('deposit', 'interest')
                                 THEN amount_cents ELSE -amount_cents END), 0)::BIGINT
        FROM trust_account_transactions
        WHERE trust_account_id = $1
        "#,
    )
    .bind(account_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn balance_matches_ledger_after_deposit_and_withdrawal(pool: PgPool) {
    let owner = Uuid::new_v4();
    let property_id = seed_property(&pool, owner).await;
    let account_id = open_account(&pool, owner, property_id, "Deposits").await;

    trust_account_service::record_deposit(&pool, owner, account_id, entry(100_000))
        .await
        .unwrap();
    let withdrawal =
        trust_account_service::record_withdrawal(&pool, owner, account_id, entry(30_000))
            .await
            .unwrap();

    let account = trust_account_service::get_trust_account(&pool, owner, account_id)
        .await
        .unwrap();
    assert_eq!(account.balance_cents, 70_000);
    assert_eq!(withdrawal.balance_after_cents, 70_000);
    assert_eq!(ledger_sum(&pool, account_id).await, account.balance_cents);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn overdraft_is_rejected_and_nothing_is_posted(pool: PgPool) {
    let owner = Uuid::new_v4();
    let property_id = seed_property(&pool, owner).await;
    let account_id = open_account(&pool, owner, property_id, "Deposits").await;
    trust_account_service::record_deposit(&pool, owner, account_id, entry(5_000))
        .await
        .unwrap();

    let result =
        trust_account_service::record_withdrawal(&pool, owner, account_id, entry(5_001)).await;

    assert!(matches!(result, Err(AppError::InsufficientFunds)));
    let account = trust_account_service::get_trust_account(&pool, owner, account_id)
        .await
        .unwrap();
    assert_eq!(account.balance_cents, 5_000);
    assert_eq!(ledger_sum(&pool, account_id).await, 5_000);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn failed_credit_leg_rolls_back_the_debit_leg(pool: PgPool) {
    let owner = Uuid::new_v4();
    let property_id = seed_property(&pool, owner).await;
    let source = open_account(&pool, owner, property_id, "Escrow").await;
    trust_account_service::record_deposit(&pool, owner, source, entry(50_000))
        .await
        .unwrap();

    let request = TransferRequest {
        source_account_id: source,
        target_account_id: Uuid::new_v4(),
        amount_cents: 20_000,
        description: None,
        idempotency_key: None,
    };

    let mut tx = pool.begin().await.unwrap();
    let result =
        trust_account_service::transfer_between(&mut tx, &request, date(2025, 4, 2), owner).await;
    assert!(result.is_err());
    tx.rollback().await.unwrap();

    let account = trust_account_service::get_trust_account(&pool, owner, source)
        .await
        .unwrap();
    assert_eq!(account.balance_cents, 50_000);
    let entries: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM trust_account_transactions WHERE trust_account_id = $1",
    )
    .bind(source)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(entries, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn transfer_moves_money_between_accounts(pool: PgPool) {
    let owner = Uuid::new_v4();
    let property_id = seed_property(&pool, owner).await;
    let source = open_account(&pool, owner, property_id, "Escrow").await;
    let target = open_account(&pool, owner, property_id, "Reserve").await;
    trust_account_service::record_deposit(&pool, owner, source, entry(50_000))
        .await
        .unwrap();

    let result = trust_account_service::transfer_funds(
        &pool,
        owner,
        TransferRequest {
            source_account_id: source,
            target_account_id: target,
            amount_cents: 20_000,
            description: Some("Reserve top-up".to_string()),
            idempotency_key: Some("xfer-1".to_string()),
        },
    )
    .await
    .unwrap();

    assert_eq!(result.withdrawal.balance_after_cents, 30_000);
    assert_eq!(result.deposit.balance_after_cents, 20_000);
    assert_eq!(ledger_sum(&pool, source).await, 30_000);
    assert_eq!(ledger_sum(&pool, target).await, 20_000);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn partial_then_full_payment_and_idempotent_retry(pool: PgPool) {
    let owner = Uuid::new_v4();
    let (_, payment_id) = seed_payment(&pool, owner).await;

    let request = |amount_cents: i64, key: &str| RecordPaymentRequest {
        payment_id,
        amount_cents,
        payment_date: date(2025, 4, 3),
        payment_method: "ach".to_string(),
        reference_number: None,
        notes: None,
        idempotency_key: Some(key.to_string()),
    };

    let partial = rent_tracking_service::record_payment(&pool, owner, request(50_000, "p-1"))
        .await
        .unwrap();
    assert_eq!(partial.status, PaymentStatus::Partial);
    assert_eq!(partial.amount_paid_cents, 50_000);

    let retried = rent_tracking_service::record_payment(&pool, owner, request(50_000, "p-1"))
        .await
        .unwrap();
    assert_eq!(retried.amount_paid_cents, 50_000);

    let paid = rent_tracking_service::record_payment(&pool, owner, request(70_000, "p-2"))
        .await
        .unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);
    assert_eq!(paid.amount_paid_cents, 120_000);

    let again = rent_tracking_service::record_payment(&pool, owner, request(1, "p-3")).await;
    assert!(matches!(again, Err(AppError::BusinessRule(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn another_managers_payment_is_not_found(pool: PgPool) {
    let (_, payment_id) = seed_payment(&pool, Uuid::new_v4()).await;

    let result = rent_tracking_service::record_payment(
        &pool,
        Uuid::new_v4(),
        RecordPaymentRequest {
            payment_id,
            amount_cents: 1_000,
            payment_date: date(2025, 4, 3),
            payment_method: "cash".to_string(),
            reference_number: None,
            notes: None,
            idempotency_key: None,
        },
    )
    .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn waiving_a_waived_late_fee_is_rejected(pool: PgPool) {
    let owner = Uuid::new_v4();
    let (_, payment_id) = seed_payment(&pool, owner).await;

    let fee = late_fee_service::apply_late_fee(
        &pool,
        owner,
        ApplyLateFeeRequest {
            payment_id,
            amount_cents: None,
            percentage: Some(rust_decimal::Decimal::new(5, 0)),
            notes: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(fee.amount_cents, 6_000);

    late_fee_service::waive_late_fee(&pool, owner, fee.id, "First offence")
        .await
        .unwrap();
    let second = late_fee_service::waive_late_fee(&pool, owner, fee.id, "Again").await;

    assert!(matches!(second, Err(AppError::BusinessRule(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn same_payment_key_from_two_managers_records_both(pool: PgPool) {
    let owner_a = Uuid::new_v4();
    let owner_b = Uuid::new_v4();
    let (_, payment_a) = seed_payment(&pool, owner_a).await;
    let (_, payment_b) = seed_payment(&pool, owner_b).await;

    let key = "rent-2025-04-unit-12";

    rent_tracking_service::record_payment(&pool, owner_a, receipt(payment_a, 50_000, key))
        .await
        .unwrap();
    let recorded =
        rent_tracking_service::record_payment(&pool, owner_b, receipt(payment_b, 50_000, key))
            .await
            .unwrap();

    assert_eq!(recorded.id, payment_b);
    assert_eq!(recorded.amount_paid_cents, 50_000);
    assert_eq!(recorded.status, PaymentStatus::Partial);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn transfer_keys_are_scoped_to_the_accounts(pool: PgPool) {
    let owner_a = Uuid::new_v4();
    let property_a = seed_property(&pool, owner_a).await;
    let a_source = open_account(&pool, owner_a, property_a, "Escrow").await;
    let a_target = open_account(&pool, owner_a, property_a, "Reserve").await;
    fund(&pool, owner_a, a_source, 100_000).await;

    let owner_b = Uuid::new_v4();
    let property_b = seed_property(&pool, owner_b).await;
    let b_source = open_account(&pool, owner_b, property_b, "Escrow").await;
    let b_target = open_account(&pool, owner_b, property_b, "Reserve").await;
    fund(&pool, owner_b, b_source, 10_000).await;

    let a_request = transfer(a_source, a_target, 15_000, "xfer-1");
    trust_account_service::transfer_funds(&pool, owner_a, a_request)
        .await
        .unwrap();
    let b_request = || transfer(b_source, b_target, 4_000, "xfer-1");
    let result = trust_account_service::transfer_funds(&pool, owner_b, b_request())
        .await
        .unwrap();

    assert_eq!(result.withdrawal.trust_account_id, b_source);
    assert_eq!(result.deposit.trust_account_id, b_target);
    assert_eq!(result.withdrawal.balance_after_cents, 6_000);
    assert_eq!(ledger_sum(&pool, b_source).await, 6_000);
    assert_eq!(ledger_sum(&pool, a_source).await, 85_000);

    let replay = trust_account_service::transfer_funds(&pool, owner_b, b_request())
        .await
        .unwrap();
    assert_eq!(replay.withdrawal.id, result.withdrawal.id);
    assert_eq!(ledger_sum(&pool, b_source).await, 6_000);

    let different_amount = trust_account_service::transfer_funds(
        &pool,
        owner_b,
        transfer(b_source, b_target, 1_000, "xfer-1"),
    )
    .await;
    assert!(matches!(different_amount, Err(AppError::BusinessRule(_))));

    trust_account_service::record_deposit(&pool, owner_a, a_target, keyed_entry(2_500, "dep-1"))
        .await
        .unwrap();
    let b_deposit =
        trust_account_service::record_deposit(&pool, owner_b, b_target, keyed_entry(2_500, "dep-1"))
            .await
            .unwrap();
    assert_eq!(b_deposit.trust_account_id, b_target);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_deposits_with_one_key_post_once(pool: PgPool) {
    let owner = Uuid::new_v4();
    let property_id = seed_property(&pool, owner).await;
    let account_id = open_account(&pool, owner, property_id, "Deposits").await;

    let deposit = || {
        trust_account_service::record_deposit(&pool, owner, account_id, keyed_entry(7_500, "dep-7"))
    };

    let (first, second) = tokio::join!(deposit(), deposit());

    assert_eq!(first.unwrap().id, second.unwrap().id);
    assert_eq!(ledger_sum(&pool, account_id).await, 7_500);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn non_compounding_rule_charges_once_after_grace(pool: PgPool) {
    let owner = Uuid::new_v4();
    let (property_id, payment_id) = seed_payment(&pool, owner).await;
    late_fee_rule(&pool, owner, property_id, false).await;

    let inside_grace =
        late_fee_service::apply_property_late_fees(&pool, property_id, date(2025, 4, 6), owner)
            .await
            .unwrap();
    assert!(inside_grace.is_empty());

    let charged =
        late_fee_service::apply_property_late_fees(&pool, property_id, date(2025, 4, 7), owner)
            .await
            .unwrap();
    assert_eq!(charged.len(), 1);
    assert_eq!(charged[0].payment_id, payment_id);
    assert_eq!(charged[0].amount_cents, 5_000);

    let later =
        late_fee_service::apply_property_late_fees(&pool, property_id, date(2025, 4, 20), owner)
            .await
            .unwrap();
    assert!(later.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn compounding_rule_charges_once_per_date(pool: PgPool) {
    let owner = Uuid::new_v4();
    let (property_id, _) = seed_payment(&pool, owner).await;
    late_fee_rule(&pool, owner, property_id, true).await;

    let pool = &pool;
    let apply =
        move |as_of| late_fee_service::apply_property_late_fees(pool, property_id, as_of, owner);

    assert_eq!(apply(date(2025, 4, 7)).await.unwrap().len(), 1);
    assert!(apply(date(2025, 4, 7)).await.unwrap().is_empty());
    assert_eq!(apply(date(2025, 4, 8)).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn interest_rerun_for_the_same_date_posts_nothing(pool: PgPool) {
    let owner = Uuid::new_v4();
    let property_id = seed_property(&pool, owner).await;
    let account_id = trust_account_service::create_trust_account(
        &pool,
        owner,
        CreateTrustAccountRequest {
            property_id,
            account_name: "Interest deposits".to_string(),
            account_type: TrustAccountType::SecurityDeposit,
            is_interest_bearing: true,
            interest_rate: Some(dec!(2)),
            bank_name: None,
            account_number_last4: None,
        },
    )
    .await
    .unwrap()
    .id;
    fund(&pool, owner, account_id, 1_000_000).await;
    sqlx::query("UPDATE trust_accounts SET created_at = '2025-01-01 12:00:00+00' WHERE id = $1")
        .bind(account_id)
        .execute(&pool)
        .await
        .unwrap();

    let as_of = date(2026, 1, 1);
    let first = trust_account_service::calculate_and_apply_interest(&pool, owner, as_of)
        .await
        .unwrap();
    assert_eq!(first.postings.len(), 1);
    assert_eq!(first.postings[0].interest_cents, 20_000);

    let second = trust_account_service::calculate_and_apply_interest(&pool, owner, as_of)
        .await
        .unwrap();
    assert!(second.postings.is_empty());
    assert!(second.failed_account_ids.is_empty());

    let account = trust_account_service::get_trust_account(&pool, owner, account_id)
        .await
        .unwrap();
    assert_eq!(account.balance_cents, 1_020_000);
    assert_eq!(ledger_sum(&pool, account_id).await, account.balance_cents);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn reconciliation_marks_the_matching_prefix(pool: PgPool) {
    let owner = Uuid::new_v4();
    let property_id = seed_property(&pool, owner).await;
    let account_id = open_account(&pool, owner, property_id, "Deposits").await;
    fund(&pool, owner, account_id, 100_000).await;
    trust_account_service::record_withdrawal(&pool, owner, account_id, entry(30_000))
        .await
        .unwrap();
    fund(&pool, owner, account_id, 5_000).await;

    let report = trust_account_service::reconcile_trust_account(
        &pool,
        owner,
        account_id,
        ReconcileRequest {
            bank_balance_cents: 70_000,
            as_of: date(2025, 4, 30),
        },
    )
    .await
    .unwrap();

    assert_eq!(report.matched_transaction_count, 2);
    assert_eq!(report.unmatched_transaction_count, 1);
    assert_eq!(report.ledger_balance_cents, 75_000);
    assert_eq!(report.difference_cents, -5_000);
    assert!(!report.is_balanced);

    let reconciled: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM trust_account_transactions WHERE trust_account_id = $1 AND is_reconciled",
    )
    .bind(account_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(reconciled, 2);

    let balanced = trust_account_service::reconcile_trust_account(
        &pool,
        owner,
        account_id,
        ReconcileRequest {
            bank_balance_cents: 75_000,
            as_of: date(2025, 4, 30),
        },
    )
    .await
    .unwrap();
    assert_eq!(balanced.matched_transaction_count, 1);
    assert!(balanced.is_balanced);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn a_line_is_reversed_at_most_once(pool: PgPool) {
    let owner = Uuid::new_v4();
    let property_id = seed_property(&pool, owner).await;
    let account_id = open_account(&pool, owner, property_id, "Deposits").await;
    let deposit = trust_account_service::record_deposit(&pool, owner, account_id, entry(10_000))
        .await
        .unwrap();

    let reversal =
        trust_account_service::reverse_transaction(&pool, owner, deposit.id, "Bounced cheque")
            .await
            .unwrap();
    assert_eq!(reversal.reverses_transaction_id, Some(deposit.id));
    assert_eq!(reversal.balance_after_cents, 0);

    let again =
        trust_account_service::reverse_transaction(&pool, owner, deposit.id, "Bounced cheque").await;
    assert!(matches!(again, Err(AppError::BusinessRule(_))));

    let of_reversal =
        trust_account_service::reverse_transaction(&pool, owner, reversal.id, "Undo").await;
    assert!(matches!(of_reversal, Err(AppError::BusinessRule(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_reversals_leave_one_winner(pool: PgPool) {
    let owner = Uuid::new_v4();
    let property_id = seed_property(&pool, owner).await;
    let account_id = open_account(&pool, owner, property_id, "Deposits").await;
    let deposit = trust_account_service::record_deposit(&pool, owner, account_id, entry(10_000))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        trust_account_service::reverse_transaction(&pool, owner, deposit.id, "Duplicate"),
        trust_account_service::reverse_transaction(&pool, owner, deposit.id, "Duplicate"),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(AppError::BusinessRule(_))))
    );
    assert_eq!(ledger_sum(&pool, account_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn recurring_generation_is_idempotent(pool: PgPool) {
    let owner = Uuid::new_v4();
    seed_payment(&pool, owner).await;

    let first = accounting_module::process_recurring_transactions(&pool, owner, date(2025, 4, 15))
        .await
        .unwrap();
    let second = accounting_module::process_recurring_transactions(&pool, owner, date(2025, 4, 15))
        .await
        .unwrap();

    // January through March; April was seeded
    assert_eq!(first, 3);
    assert_eq!(second, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn waiving_a_payment_keeps_its_notes(pool: PgPool) {
    let owner = Uuid::new_v4();
    let (_, payment_id) = seed_payment(&pool, owner).await;
    sqlx::query("UPDATE payments SET notes = 'Tenant on payment plan' WHERE id = $1")
        .bind(payment_id)
        .execute(&pool)
        .await
        .unwrap();

    let waived = rent_tracking_service::waive_payment(&pool, owner, payment_id, "Flood damage")
        .await
        .unwrap();

    assert_eq!(waived.status, PaymentStatus::Waived);
    assert_eq!(waived.notes.as_deref(), Some("Tenant on payment plan"));
    assert_eq!(waived.waived_reason.as_deref(), Some("Flood damage"));
}

//! Database connection pool, migrations and transaction retry.
//!
//! This module provides utilities for:
//! - Creating and managing a PostgreSQL connection pool
//! - Running database migrations automatically
//! - Re-running a balance-mutating transaction when PostgreSQL aborts it
//!   with a serialization failure or deadlock

use std::future::Future;
use std::time::Duration;

use sqlx::{Pool, Postgres};

use crate::error::AppError;

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Attempts made by [`retry_on_conflict`] before the error is returned.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Create a new PostgreSQL connection pool.
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the server
/// cannot be reached.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Files are applied in lexical order, each inside its own transaction, and
/// recorded in `_sqlx_migrations` so they run only once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Returns true when PostgreSQL rolled the transaction back because of a
/// concurrent writer and the whole transaction can be safely re-run.
pub fn is_retryable(error: &AppError) -> bool {
    match error {
        AppError::Database(sqlx::Error::Database(db_error)) => matches!(
            db_error.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}

/// Run `operation` and re-run it when it fails with a retryable conflict.
///
/// `operation` must open and commit its own transaction so that each attempt
/// starts from a clean state.
pub async fn retry_on_conflict<T, F, Fut>(mut operation: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(error) if attempt < MAX_TRANSACTION_ATTEMPTS && is_retryable(&error) => {
                tracing::warn!(attempt, error = %error, "Transaction conflict, retrying");
                tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt))).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_first_success_without_retrying() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = retry_on_conflict(move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_business_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), AppError> = retry_on_conflict(move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::InsufficientFunds)
        })
        .await;

        assert!(matches!(result, Err(AppError::InsufficientFunds)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_database_errors_are_not_retryable() {
        assert!(!is_retryable(&AppError::Validation("bad".to_string())));
        assert!(!is_retryable(&AppError::Database(sqlx::Error::RowNotFound)));
    }
}

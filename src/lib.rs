//! Property accounting service.
//!
//! Rent tracking, late fees, trust accounts, expenses and financial
//! reporting for property managers, served as a JSON API over PostgreSQL.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum
//! - **Database**: PostgreSQL with sqlx; every balance change runs in one
//!   database transaction with the affected rows locked
//! - **Authentication**: HS256 bearer tokens, `sub` is the manager's user id
//! - **Format**: JSON envelope, CSV for report exports

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, Method,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::expense_service::MAX_RECEIPT_BYTES;
use crate::state::AppState;

/// Multipart overhead allowed on top of the receipt itself.
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

/// Build the application router: `/health` is public, everything under
/// `/api/accounting` requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    use handlers::{
        batch, expenses, health, late_fees, notifications, payments, reports, trust_accounts,
    };

    let api = Router::new()
        // Rent tracking
        .route("/payments/due", get(payments::due_payments))
        .route("/payments/record", post(payments::record_payment))
        .route("/payments/reminders", post(payments::send_reminders))
        .route("/payments/{id}/waive", post(payments::waive_payment))
        .route(
            "/recurring-payments",
            get(payments::list_recurring_payments).post(payments::create_recurring_payment),
        )
        .route(
            "/recurring-payments/{id}",
            delete(payments::deactivate_recurring_payment),
        )
        // Late fees
        .route(
            "/late-fees/configurations",
            get(late_fees::list_configurations).post(late_fees::create_configuration),
        )
        .route("/late-fees/calculate", get(late_fees::calculate))
        .route("/late-fees/apply", post(late_fees::apply))
        .route("/late-fees/apply-batch", post(late_fees::apply_batch))
        .route("/late-fees/{id}/waive", post(late_fees::waive))
        .route("/late-fees/{id}/pay", post(late_fees::mark_paid))
        // Trust accounts
        .route(
            "/trust-accounts",
            get(trust_accounts::list_trust_accounts).post(trust_accounts::create_trust_account),
        )
        .route("/trust-accounts/transfer", post(trust_accounts::transfer))
        .route("/trust-accounts/interest", post(trust_accounts::apply_interest))
        .route(
            "/trust-accounts/transactions/{id}/reverse",
            post(trust_accounts::reverse),
        )
        .route("/trust-accounts/{id}", get(trust_accounts::get_trust_account))
        .route("/trust-accounts/{id}/deposit", post(trust_accounts::deposit))
        .route("/trust-accounts/{id}/withdrawal", post(trust_accounts::withdrawal))
        .route("/trust-accounts/{id}/fee", post(trust_accounts::fee))
        .route(
            "/trust-accounts/{id}/transactions",
            get(trust_accounts::list_transactions),
        )
        .route("/trust-accounts/{id}/reconcile", post(trust_accounts::reconcile))
        .route("/trust-accounts/{id}/statement", get(trust_accounts::statement))
        .route("/trust-accounts/{id}/audit", get(trust_accounts::audit))
        // Expenses
        .route(
            "/expenses",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .route("/expenses/{id}/status", patch(expenses::update_status))
        .route(
            "/expense-categories",
            get(expenses::list_categories).post(expenses::create_category),
        )
        .route(
            "/vendors",
            get(expenses::list_vendors).post(expenses::create_vendor),
        )
        .route(
            "/receipts/scan",
            post(expenses::scan_receipt)
                .layer(DefaultBodyLimit::max(MAX_RECEIPT_BYTES + MULTIPART_SLACK_BYTES)),
        )
        // Reports
        .route("/reports/rent-roll", get(reports::rent_roll))
        .route("/reports/expense", get(reports::expense_report))
        .route("/reports/financial", get(reports::financial_report))
        .route("/dashboard", get(reports::dashboard))
        // Batch
        .route("/batch/run", post(batch::run_batch))
        // Notifications
        .route(
            "/notification-endpoints",
            get(notifications::list_endpoints).post(notifications::create_endpoint),
        )
        .route(
            "/notification-endpoints/{id}",
            delete(notifications::delete_endpoint),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/accounting", api)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(state.config.cors_allow_origin.as_deref()) {
        app = app.layer(cors);
    }

    app.with_state(state)
}

/// CORS for a single configured browser origin; none when unset or invalid.
fn cors_layer(origin: Option<&str>) -> Option<CorsLayer> {
    let origin = origin?.trim();
    let Ok(origin) = origin.parse::<HeaderValue>() else {
        tracing::warn!(origin, "Ignoring invalid CORS_ALLOW_ORIGIN");
        return None;
    };

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header::ORIGIN},
    };
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn test_app(cors_allow_origin: Option<&str>) -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/unused")
            .unwrap();
        let config = config::Config {
            database_url: "postgres://postgres@localhost/unused".to_string(),
            jwt_secret: "secret".to_string(),
            server_port: 0,
            db_max_connections: 1,
            ocr_service_url: None,
            notification_timeout_secs: 1,
            cors_allow_origin: cors_allow_origin.map(str::to_string),
        };
        build_router(AppState::new(pool, config).unwrap())
    }

    #[test]
    fn invalid_cors_origin_is_ignored() {
        assert!(cors_layer(None).is_none());
        assert!(cors_layer(Some("bad\norigin")).is_none());
        assert!(cors_layer(Some("https://app.example.com")).is_some());
    }

    #[tokio::test]
    async fn preflight_is_answered_without_a_token() {
        let app = test_app(Some("https://app.example.com"));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/accounting/dashboard")
                    .header(ORIGIN, "https://app.example.com")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://app.example.com"
        );
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let app = test_app(None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/accounting/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

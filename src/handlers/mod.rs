//! HTTP request handlers.
//!
//! Each handler extracts the request (JSON body, path, query, the
//! authenticated user), calls one service and wraps the result in the
//! `ApiResponse` envelope.

pub mod batch;
pub mod expenses;
pub mod health;
pub mod late_fees;
pub mod notifications;
pub mod payments;
pub mod reports;
pub mod trust_accounts;

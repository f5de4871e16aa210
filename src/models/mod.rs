//! Data models representing database entities, request/response bodies and
//! the pure accounting rules that operate on them.

/// Response envelope and pagination
pub mod common;
/// Expenses, categories, vendors and receipts
pub mod expense;
/// Late fee configurations and fee evaluation
pub mod late_fee;
/// Webhook endpoints and reminder payloads
pub mod notification;
/// Recurring payments and payment settlement
pub mod payment;
/// Property ownership
pub mod property;
/// Report shapes and CSV rendering
pub mod report;
/// Trust accounts and ledger rules
pub mod trust_account;

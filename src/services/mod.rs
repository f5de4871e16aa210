//! Business logic services.
//!
//! Services hold the accounting rules and own every database transaction.
//! Handlers only extract input, call a service and wrap the result.

pub mod accounting_module;
pub mod expense_service;
pub mod late_fee_service;
pub mod notification_service;
pub mod property_service;
pub mod receipt_scanner;
pub mod rent_tracking_service;
pub mod trust_account_service;

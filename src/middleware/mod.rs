//! HTTP middleware components.
//!
//! Middleware run before route handlers. They can authenticate requests
//! and short-circuit unauthorized ones.

/// Bearer token authentication middleware
pub mod auth;

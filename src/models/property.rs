//! Property model.
//!
//! Properties are the tenancy boundary: every accounting record hangs off a
//! property, and a property belongs to exactly one manager (`owner_id`).

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a property record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Property {
    pub id: Uuid,

    /// User id of the manager who owns this property.
    ///
    /// Every query is filtered by this column so managers only ever see
    /// their own books.
    pub owner_id: Uuid,

    pub name: String,

    pub created_at: DateTime<Utc>,
}

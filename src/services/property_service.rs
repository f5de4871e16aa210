//! Property ownership checks shared by every service.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::property::Property;

/// Load a property owned by `user_id`.
///
/// Properties of other managers are reported as not found so their
/// existence is not leaked.
pub async fn require_property<'e, E>(
    executor: E,
    user_id: Uuid,
    property_id: Uuid,
) -> Result<Property, AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Property>(
        "SELECT id, owner_id, name, created_at FROM properties WHERE id = $1 AND owner_id = $2",
    )
    .bind(property_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::NotFound("Property"))
}

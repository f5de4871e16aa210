//! Notification models for manager-registered webhook endpoints.
//!
//! # Delivery Flow
//!
//! 1. A manager registers an endpoint via `POST /api/accounting/notification-endpoints`
//! 2. The service generates a secret for HMAC signature verification
//! 3. Reminder runs send a signed `payment.reminder` event to every active endpoint
//! 4. Every delivery attempt is stored in `notification_events`

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::payment::DuePayment;

pub const PAYMENT_REMINDER_EVENT: &str = "payment.reminder";

/// Endpoint registered by a property manager.
///
/// The `secret` is stored in plaintext (required for HMAC generation) but
/// only returned once, at registration.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationEndpoint {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub url: String,
    pub secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationEndpointRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationEndpointResponse {
    pub id: Uuid,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationEndpoint> for NotificationEndpointResponse {
    fn from(endpoint: NotificationEndpoint) -> Self {
        Self {
            id: endpoint.id,
            url: endpoint.url,
            secret: None,
            is_active: endpoint.is_active,
            created_at: endpoint.created_at,
        }
    }
}

impl NotificationEndpointResponse {
    /// Include the secret; only used when the endpoint is created.
    pub fn with_secret(mut self, secret: String) -> Self {
        self.secret = Some(secret);
        self
    }
}

/// Body POSTed to an endpoint.
///
/// ```json
/// {
///   "event_type": "payment.reminder",
///   "event_id": "550e8400-e29b-41d4-a716-446655440000",
///   "created_at": "2025-04-28T08:00:00Z",
///   "data": {
///     "payment_id": "...",
///     "tenant_name": "Jane Doe",
///     "tenant_email": "jane@example.com",
///     "unit_number": "1A",
///     "amount_due_cents": 120000,
///     "due_date": "2025-05-01"
///   }
/// }
/// ```
///
/// The request carries an `X-Webhook-Signature: sha256=<hex>` header holding
/// HMAC-SHA256(secret, body).
#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub event_type: String,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: PaymentReminderData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReminderData {
    pub payment_id: Uuid,
    pub tenant_name: String,
    pub tenant_email: Option<String>,
    pub unit_number: String,
    pub amount_due_cents: i64,
    pub due_date: NaiveDate,
}

impl From<&DuePayment> for PaymentReminderData {
    fn from(payment: &DuePayment) -> Self {
        Self {
            payment_id: payment.id,
            tenant_name: payment.tenant_name.clone(),
            tenant_email: payment.tenant_email.clone(),
            unit_number: payment.unit_number.clone(),
            amount_due_cents: (payment.amount_cents - payment.amount_paid_cents).max(0),
            due_date: payment.due_date,
        }
    }
}

impl NotificationPayload {
    pub fn payment_reminder(event_id: Uuid, payment: &DuePayment) -> Self {
        Self {
            event_type: PAYMENT_REMINDER_EVENT.to_string(),
            event_id,
            created_at: Utc::now(),
            data: payment.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::PaymentStatus;

    #[test]
    fn reminder_reports_the_outstanding_amount() {
        let due = DuePayment {
            id: Uuid::new_v4(),
            recurring_payment_id: Uuid::new_v4(),
            lease_id: Uuid::new_v4(),
            unit_id: Uuid::new_v4(),
            unit_number: "1A".to_string(),
            tenant_name: "Jane Doe".to_string(),
            tenant_email: None,
            amount_cents: 120_000,
            amount_paid_cents: 20_000,
            due_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            payment_date: None,
            status: PaymentStatus::Partial,
        };

        let payload = NotificationPayload::payment_reminder(Uuid::new_v4(), &due);

        assert_eq!(payload.event_type, PAYMENT_REMINDER_EVENT);
        assert_eq!(payload.data.amount_due_cents, 100_000);
        assert_eq!(payload.data.unit_number, "1A");
    }
}

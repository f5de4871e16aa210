//! Notification endpoints and signed payment-reminder delivery.
//!
//! Endpoints are owned by a property manager. Deliveries are signed with
//! HMAC-SHA256 over the raw JSON body and every attempt is logged in
//! `notification_events`, whether or not the endpoint answered.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::notification::{
    NotificationEndpoint, NotificationEndpointRequest, NotificationEndpointResponse,
    NotificationPayload, PAYMENT_REMINDER_EVENT,
};
use crate::models::payment::DuePayment;

type HmacSha256 = Hmac<Sha256>;

const MAX_URL_LEN: usize = 2048;

/// Register an endpoint. The generated secret is returned only here.
pub async fn create_endpoint(
    pool: &DbPool,
    user_id: Uuid,
    request: NotificationEndpointRequest,
) -> Result<NotificationEndpointResponse, AppError> {
    validate_endpoint_url(&request.url)?;

    let secret = generate_secret();

    let endpoint = sqlx::query_as::<_, NotificationEndpoint>(
        r#"
        INSERT INTO notification_endpoints (owner_id, url, secret)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&request.url)
    .bind(&secret)
    .fetch_one(pool)
    .await?;

    tracing::info!(endpoint_id = %endpoint.id, "Notification endpoint registered");

    Ok(NotificationEndpointResponse::from(endpoint).with_secret(secret))
}

pub async fn list_endpoints(
    pool: &DbPool,
    user_id: Uuid,
) -> Result<Vec<NotificationEndpointResponse>, AppError> {
    let endpoints = sqlx::query_as::<_, NotificationEndpoint>(
        "SELECT * FROM notification_endpoints WHERE owner_id = $1 AND is_active ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(endpoints.into_iter().map(Into::into).collect())
}

/// Deactivate an endpoint; its delivery history is kept.
pub async fn delete_endpoint(
    pool: &DbPool,
    user_id: Uuid,
    endpoint_id: Uuid,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE notification_endpoints SET is_active = false WHERE id = $1 AND owner_id = $2 AND is_active",
    )
    .bind(endpoint_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification endpoint"));
    }

    Ok(())
}

/// Send a reminder for each payment to every active endpoint of the manager.
///
/// Returns how many payments reached at least one endpoint. Delivery
/// failures are logged and never abort the run.
pub async fn send_payment_reminders(
    pool: &DbPool,
    http: &reqwest::Client,
    user_id: Uuid,
    payments: &[DuePayment],
) -> Result<usize, AppError> {
    if payments.is_empty() {
        return Ok(0);
    }

    let endpoints = sqlx::query_as::<_, NotificationEndpoint>(
        "SELECT * FROM notification_endpoints WHERE owner_id = $1 AND is_active",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    if endpoints.is_empty() {
        tracing::warn!(%user_id, "No active notification endpoints; reminders skipped");
        return Ok(0);
    }

    let mut reminded = 0;
    for payment in payments {
        let mut delivered = false;
        for endpoint in &endpoints {
            match deliver_reminder(pool, http, endpoint, payment).await {
                Ok(ok) => delivered |= ok,
                Err(e) => {
                    tracing::error!(endpoint_id = %endpoint.id, payment_id = %payment.id, error = %e, "Reminder delivery failed");
                }
            }
        }
        if delivered {
            reminded += 1;
        }
    }

    tracing::info!(%user_id, reminded, total = payments.len(), "Payment reminders sent");

    Ok(reminded)
}

/// POST one signed reminder and record the attempt.
///
/// Returns whether the endpoint answered with a 2xx status.
async fn deliver_reminder(
    pool: &DbPool,
    http: &reqwest::Client,
    endpoint: &NotificationEndpoint,
    payment: &DuePayment,
) -> Result<bool, AppError> {
    let event_id = Uuid::new_v4();
    let payload = NotificationPayload::payment_reminder(event_id, payment);
    let body = serde_json::to_string(&payload)
        .map_err(|e| AppError::Upstream(format!("Failed to serialize payload: {e}")))?;
    let signature = generate_signature(&endpoint.secret, &body)?;

    let response = http
        .post(&endpoint.url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header("X-Webhook-Signature", &signature)
        .header("X-Webhook-Event-Id", event_id.to_string())
        .body(body.clone())
        .send()
        .await;

    let (status, response_body, delivered) = match response {
        Ok(resp) => {
            let status = resp.status();
            let text = resp.text().await.ok();
            (Some(i32::from(status.as_u16())), text, status.is_success())
        }
        Err(e) => (None, Some(format!("Request failed: {e}")), false),
    };

    let payload_value = serde_json::to_value(&payload)
        .map_err(|e| AppError::Upstream(format!("Failed to serialize payload: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO notification_events (
            id,
            endpoint_id,
            event_type,
            payment_id,
            payload,
            response_status,
            response_body
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(event_id)
    .bind(endpoint.id)
    .bind(PAYMENT_REMINDER_EVENT)
    .bind(payment.id)
    .bind(payload_value)
    .bind(status)
    .bind(response_body)
    .execute(pool)
    .await?;

    Ok(delivered)
}

/// `sha256=<hex>` HMAC of the payload under the endpoint secret.
pub fn generate_signature(secret: &str, payload: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Validation(format!("Invalid signing secret: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// 64 hex characters of randomness.
fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// HTTPS only, except plain HTTP to a loopback host.
fn validate_endpoint_url(url: &str) -> Result<(), AppError> {
    if url.len() > MAX_URL_LEN {
        return Err(AppError::Validation(format!(
            "URL exceeds {MAX_URL_LEN} characters"
        )));
    }

    let parsed =
        url::Url::parse(url).map_err(|_| AppError::Validation("Invalid URL format".to_string()))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" if matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "0.0.0.0")) => Ok(()),
        "http" => Err(AppError::Validation(
            "HTTP is only allowed for localhost".to_string(),
        )),
        _ => Err(AppError::Validation(
            "URL must use HTTP or HTTPS".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_and_keyed() {
        let a = generate_signature("secret", r#"{"a":1}"#).unwrap();
        let b = generate_signature("secret", r#"{"a":1}"#).unwrap();
        let c = generate_signature("other", r#"{"a":1}"#).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("sha256="));
        assert_eq!(a.len(), "sha256=".len() + 64);
    }

    #[test]
    fn secrets_are_random_hex() {
        let a = generate_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, generate_secret());
    }

    #[test]
    fn endpoint_urls() {
        assert!(validate_endpoint_url("https://hooks.example.com/rent").is_ok());
        assert!(validate_endpoint_url("http://localhost:9000/hook").is_ok());
        assert!(validate_endpoint_url("http://example.com/hook").is_err());
        assert!(validate_endpoint_url("ftp://example.com").is_err());
        assert!(validate_endpoint_url("not a url").is_err());
        assert!(validate_endpoint_url(&format!("https://e.com/{}", "a".repeat(2048))).is_err());
    }
}

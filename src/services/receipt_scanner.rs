//! Receipt OCR collaborator.
//!
//! Scanning itself happens in an external service; this module only ships
//! the receipt bytes to it and parses the extracted fields.

use std::future::Future;

use url::Url;

use crate::error::AppError;
use crate::models::expense::ScannedReceipt;

/// Extracts vendor, total, date and line items from a receipt image.
pub trait ReceiptScanner: Send + Sync {
    fn scan(
        &self,
        content: &[u8],
        content_type: &str,
    ) -> impl Future<Output = Result<ScannedReceipt, AppError>> + Send;
}

/// HTTP client for the OCR service configured by `OCR_SERVICE_URL`.
///
/// Receipts are POSTed raw to `{OCR_SERVICE_URL}/scan` with their content
/// type; the service answers with a [`ScannedReceipt`] JSON body.
#[derive(Debug, Clone)]
pub struct OcrClient {
    http: reqwest::Client,
    scan_url: Option<Url>,
}

impl OcrClient {
    pub fn new(http: reqwest::Client, base_url: Option<&str>) -> Self {
        let scan_url = base_url.and_then(|base| match scan_endpoint(base) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(base_url = base, error = %e, "Ignoring invalid OCR service URL");
                None
            }
        });

        Self { http, scan_url }
    }

    pub fn is_configured(&self) -> bool {
        self.scan_url.is_some()
    }
}

fn scan_endpoint(base: &str) -> Result<Url, url::ParseError> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    Url::parse(&base)?.join("scan")
}

impl ReceiptScanner for OcrClient {
    async fn scan(&self, content: &[u8], content_type: &str) -> Result<ScannedReceipt, AppError> {
        let url = self
            .scan_url
            .clone()
            .ok_or_else(|| AppError::Upstream("OCR service is not configured".to_string()))?;

        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("OCR request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "OCR service responded with {}",
                response.status()
            )));
        }

        response
            .json::<ScannedReceipt>()
            .await
            .map_err(|e| AppError::Upstream(format!("Unreadable OCR response: {e}")))
    }
}

//! Shared state handed to every handler.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;

use crate::config::Config;
use crate::db::DbPool;
use crate::services::receipt_scanner::OcrClient;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,

    /// Client used for notification deliveries.
    pub http: reqwest::Client,

    pub scanner: OcrClient,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.notification_timeout_secs))
            .build()?;
        let scanner = OcrClient::new(http.clone(), config.ocr_service_url.as_deref());

        Ok(Self {
            pool,
            config: Arc::new(config),
            http,
            scanner,
        })
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

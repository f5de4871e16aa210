//! Application configuration management.
//!
//! Configuration is read from environment variables (and an optional `.env`
//! file) and deserialized into a type-safe struct with `envy`.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `JWT_SECRET` (required): HS256 secret used to verify bearer tokens
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DB_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `OCR_SERVICE_URL` (optional): receipt scanning collaborator
/// - `NOTIFICATION_TIMEOUT_SECS` (optional): webhook delivery timeout, defaults to 5
/// - `CORS_ALLOW_ORIGIN` (optional): single allowed origin for browser clients
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub jwt_secret: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    #[serde(default)]
    pub ocr_service_url: Option<String>,

    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_secs: u64,

    #[serde(default)]
    pub cors_allow_origin: Option<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_notification_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is loaded first if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value cannot
    /// be parsed into its expected type.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        envy::from_env::<Config>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_defaults_for_optional_values() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/test".to_string()),
            ("JWT_SECRET".to_string(), "secret".to_string()),
        ];

        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.notification_timeout_secs, 5);
        assert!(config.ocr_service_url.is_none());
    }

    #[test]
    fn missing_jwt_secret_is_an_error() {
        let vars = vec![(
            "DATABASE_URL".to_string(),
            "postgres://localhost/test".to_string(),
        )];

        assert!(envy::from_iter::<_, Config>(vars).is_err());
    }
}

//! API server configuration

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Shared secret required by the internal retry/failed endpoints
    pub retry_auth_token: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let retry_auth_token = std::env::var("RETRY_AUTH_TOKEN")
            .map_err(|_| anyhow::anyhow!("RETRY_AUTH_TOKEN must be set"))?;
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        Ok(Self {
            database_url,
            bind_address,
            retry_auth_token,
        })
    }
}

use std::env;
use std::time::Duration;
use url::Url;

use crate::orchestrator::SettlementPolicy;

const DEFAULT_PORT: u16 = 4021;
const DEFAULT_DB_PATH: &str = "./tollbooth.db";
const DEFAULT_RATE_LIMIT_RPM: u32 = 60;
const DEFAULT_CACHE_TTL_SECS: u64 = 30;

#[derive(Clone)]
pub struct GatewayConfig {
    /// 32-byte vault key for credential encryption
    pub vault_key: [u8; 32],
    /// Facilitator URL for payment verification and settlement
    pub facilitator_url: String,
    /// HMAC shared secret for facilitator auth (None = dev mode)
    pub hmac_secret: Option<Vec<u8>>,
    /// Facilitator request timeout
    pub facilitator_timeout: Duration,
    /// Default settlement timing for endpoints without an override
    pub default_settlement: SettlementPolicy,
    /// SQLite database path
    pub db_path: String,
    /// Server port
    pub port: u16,
    /// Endpoint config cache TTL
    pub cache_ttl: Duration,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Rate limit requests per minute
    pub rate_limit_rpm: u32,
    /// Bearer token required for /metrics endpoint (None = public)
    pub metrics_token: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("vault_key", &"[REDACTED]")
            .field("facilitator_url", &self.facilitator_url)
            .field(
                "hmac_secret",
                &self.hmac_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("facilitator_timeout", &self.facilitator_timeout)
            .field("default_settlement", &self.default_settlement)
            .field("db_path", &self.db_path)
            .field("port", &self.port)
            .field("cache_ttl", &self.cache_ttl)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: vault key. The gateway refuses to start without it;
        // stored credentials would be unreadable.
        let vault_key_hex =
            env::var("VAULT_KEY").map_err(|_| ConfigError::MissingRequired("VAULT_KEY"))?;
        let vault_key = parse_vault_key(&vault_key_hex)?;

        // Optional: facilitator URL
        let facilitator_url = env::var("FACILITATOR_URL")
            .unwrap_or_else(|_| x402::DEFAULT_FACILITATOR_URL.to_string());
        Url::parse(&facilitator_url)
            .map_err(|_| ConfigError::InvalidUrl(facilitator_url.clone()))?;

        // Optional: HMAC secret
        let hmac_secret = env::var("FACILITATOR_SHARED_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.into_bytes());

        // Optional: facilitator timeout
        let facilitator_timeout = env::var("FACILITATOR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(x402::facilitator::DEFAULT_FACILITATOR_TIMEOUT);

        // Optional: default settlement timing
        let default_settlement = match env::var("SETTLEMENT_MODE") {
            Ok(s) => SettlementPolicy::parse(&s)
                .map_err(|_| ConfigError::InvalidSettlementMode(s))?,
            Err(_) => SettlementPolicy::Synchronous,
        };

        // Optional: database path
        let db_path = env::var("DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

        // Optional: port
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        // Optional: cache TTL
        let cache_ttl = env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_CACHE_TTL_SECS));

        // Optional: allowed origins
        let allowed_origins: Vec<String> = env::var("ALLOWED_ORIGINS")
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ]
            });

        // Optional: rate limit
        let rate_limit_rpm = env::var("RATE_LIMIT_RPM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_RPM);

        // Optional: metrics token
        let metrics_token = env::var("METRICS_TOKEN").ok().filter(|s| !s.is_empty());

        if let Some(ref secret) = hmac_secret {
            if secret.len() < 32 {
                tracing::warn!(
                    "FACILITATOR_SHARED_SECRET is too short ({} bytes, minimum 32); \
                     use `openssl rand -hex 32` to generate a secure secret",
                    secret.len()
                );
            }
        }

        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set; /metrics endpoint is publicly accessible");
        }

        Ok(Self {
            vault_key,
            facilitator_url,
            hmac_secret,
            facilitator_timeout,
            default_settlement,
            db_path,
            port,
            cache_ttl,
            allowed_origins,
            rate_limit_rpm,
            metrics_token,
        })
    }
}

fn parse_vault_key(hex_key: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(hex_key.trim()).map_err(|_| ConfigError::InvalidVaultKey)?;
    let key: [u8; 32] = bytes.try_into().map_err(|_| ConfigError::InvalidVaultKey)?;
    Ok(key)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("VAULT_KEY must be 64 hex characters (32 bytes)")]
    InvalidVaultKey,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid settlement mode: {0} (expected \"sync\" or \"async\")")]
    InvalidSettlementMode(String),
}

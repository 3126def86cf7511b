use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::GatewayError;
use crate::orchestrator::SettlementPolicy;

/// How the decrypted credential is injected into forwarded requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Header,
    Query,
    None,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Header => "header",
            AuthMethod::Query => "query",
            AuthMethod::None => "none",
        }
    }

    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "header" => Ok(AuthMethod::Header),
            "query" => Ok(AuthMethod::Query),
            "none" => Ok(AuthMethod::None),
            other => Err(GatewayError::InvalidConfig(format!(
                "unknown auth method: {other}"
            ))),
        }
    }
}

/// One registered provider endpoint. Read-only to the gateway request path.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EndpointRecord {
    pub provider_id: String,
    pub origin_endpoint: String,
    pub http_method: String,
    pub request_body: Option<String>,
    /// Human-readable price (e.g. "0.01")
    pub price_usd: String,
    /// Price in atomic units (integer string, e.g. "10000")
    pub price_atomic: String,
    pub payout_address: String,
    pub auth_method: AuthMethod,
    pub auth_header_name: Option<String>,
    pub query_param_name: Option<String>,
    /// Vault ciphertext. Never serialized into any response or log.
    #[serde(skip_serializing)]
    pub encrypted_credential: Option<String>,
    pub custom_headers: HashMap<String, String>,
    pub max_timeout_seconds: u64,
    /// Per-endpoint settlement policy override (None = global default).
    pub settlement_mode: Option<SettlementPolicy>,
    pub created_at: i64,
    pub updated_at: i64,
    pub active: bool,
}

/// Parameters for registering an endpoint. The credential arrives already
/// encrypted; the store never sees plaintext secrets.
#[derive(Debug)]
pub struct NewEndpoint {
    pub provider_id: String,
    pub origin_endpoint: String,
    pub http_method: String,
    pub request_body: Option<String>,
    pub price_usd: String,
    pub payout_address: String,
    pub auth_method: AuthMethod,
    pub auth_header_name: Option<String>,
    pub query_param_name: Option<String>,
    pub encrypted_credential: Option<String>,
    pub custom_headers: HashMap<String, String>,
    pub max_timeout_seconds: u64,
    pub settlement_mode: Option<SettlementPolicy>,
}

const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE"];

const MIN_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 300;

/// SQLite-backed endpoint store.
#[derive(Clone)]
pub struct EndpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl EndpointStore {
    pub fn new(path: &str) -> Result<Self, GatewayError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, GatewayError> {
        self.conn
            .lock()
            .map_err(|_| GatewayError::Internal("database lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), GatewayError> {
        let conn = self.lock()?;

        // WAL mode for better concurrent read/write performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS endpoints (
                provider_id TEXT PRIMARY KEY,
                origin_endpoint TEXT NOT NULL,
                http_method TEXT NOT NULL DEFAULT 'GET',
                request_body TEXT,
                price_usd TEXT NOT NULL,
                price_atomic TEXT NOT NULL,
                payout_address TEXT NOT NULL,
                auth_method TEXT NOT NULL DEFAULT 'none',
                auth_header_name TEXT,
                query_param_name TEXT,
                encrypted_credential TEXT,
                custom_headers TEXT NOT NULL DEFAULT '{}',
                max_timeout_seconds INTEGER NOT NULL DEFAULT 30,
                settlement_mode TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS endpoint_stats (
                provider_id TEXT PRIMARY KEY,
                request_count INTEGER NOT NULL DEFAULT 0,
                payment_count INTEGER NOT NULL DEFAULT 0,
                revenue_total TEXT NOT NULL DEFAULT '0',
                last_accessed_at INTEGER
            )
            "#,
            [],
        )?;

        // Settlement ledger: the out-of-band record of every settle attempt.
        // In async mode this is where the final transaction id lands.
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS settlements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                success INTEGER NOT NULL,
                transaction_hash TEXT,
                payer TEXT,
                amount TEXT NOT NULL,
                error_reason TEXT,
                settled_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_settlements_provider ON settlements(provider_id)",
            [],
        )?;

        Ok(())
    }

    /// Register a new endpoint. Validates method, price, timeout and the
    /// auth-method invariants before inserting.
    pub fn create_endpoint(&self, new: NewEndpoint) -> Result<EndpointRecord, GatewayError> {
        if !ALLOWED_METHODS.contains(&new.http_method.as_str()) {
            return Err(GatewayError::InvalidConfig(format!(
                "unsupported HTTP method: {}",
                new.http_method
            )));
        }

        url::Url::parse(&new.origin_endpoint)
            .map_err(|_| GatewayError::InvalidConfig("origin endpoint is not a valid URL".to_string()))?;

        let price_atomic = x402::price::usd_to_atomic(&new.price_usd)
            .map_err(|e| GatewayError::InvalidConfig(e.to_string()))?
            .to_string();

        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&new.max_timeout_seconds) {
            return Err(GatewayError::InvalidConfig(format!(
                "timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds"
            )));
        }

        // Exactly one of auth_header_name/query_param_name is meaningful,
        // and a credential is present iff the auth method needs one.
        match new.auth_method {
            AuthMethod::Header => {
                if new.auth_header_name.as_deref().unwrap_or("").is_empty() {
                    return Err(GatewayError::InvalidConfig(
                        "auth_header_name is required for header auth".to_string(),
                    ));
                }
                if new.encrypted_credential.is_none() {
                    return Err(GatewayError::InvalidConfig(
                        "credential is required for header auth".to_string(),
                    ));
                }
            }
            AuthMethod::Query => {
                if new.encrypted_credential.is_none() {
                    return Err(GatewayError::InvalidConfig(
                        "credential is required for query auth".to_string(),
                    ));
                }
            }
            AuthMethod::None => {
                if new.encrypted_credential.is_some() {
                    return Err(GatewayError::InvalidConfig(
                        "credential must be absent when auth method is none".to_string(),
                    ));
                }
            }
        }

        let auth_header_name = match new.auth_method {
            AuthMethod::Header => new.auth_header_name.clone(),
            _ => None,
        };
        let query_param_name = match new.auth_method {
            AuthMethod::Query => new.query_param_name.clone(),
            _ => None,
        };

        let headers_json = serde_json::to_string(&new.custom_headers)
            .map_err(|e| GatewayError::Internal(format!("failed to serialize headers: {e}")))?;

        let now = chrono::Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO endpoints (
                provider_id, origin_endpoint, http_method, request_body,
                price_usd, price_atomic, payout_address,
                auth_method, auth_header_name, query_param_name, encrypted_credential,
                custom_headers, max_timeout_seconds, settlement_mode,
                created_at, updated_at, active
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, 1)
            "#,
            params![
                new.provider_id,
                new.origin_endpoint,
                new.http_method,
                new.request_body,
                new.price_usd,
                price_atomic,
                new.payout_address,
                new.auth_method.as_str(),
                auth_header_name,
                query_param_name,
                new.encrypted_credential,
                headers_json,
                new.max_timeout_seconds as i64,
                new.settlement_mode.map(|m| m.as_str()),
                now,
                now,
            ],
        )?;

        crate::metrics::ENDPOINTS_REGISTERED.inc();

        Ok(EndpointRecord {
            provider_id: new.provider_id,
            origin_endpoint: new.origin_endpoint,
            http_method: new.http_method,
            request_body: new.request_body,
            price_usd: new.price_usd,
            price_atomic,
            payout_address: new.payout_address,
            auth_method: new.auth_method,
            auth_header_name,
            query_param_name,
            encrypted_credential: new.encrypted_credential,
            custom_headers: new.custom_headers,
            max_timeout_seconds: new.max_timeout_seconds,
            settlement_mode: new.settlement_mode,
            created_at: now,
            updated_at: now,
            active: true,
        })
    }

    /// Get an endpoint by provider id. Inactive endpoints are invisible.
    pub fn get_endpoint(&self, provider_id: &str) -> Result<Option<EndpointRecord>, GatewayError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"
                SELECT provider_id, origin_endpoint, http_method, request_body,
                       price_usd, price_atomic, payout_address,
                       auth_method, auth_header_name, query_param_name, encrypted_credential,
                       custom_headers, max_timeout_seconds, settlement_mode,
                       created_at, updated_at, active
                FROM endpoints
                WHERE provider_id = ?1 AND active = 1
                "#,
                params![provider_id],
                row_to_endpoint,
            )
            .optional()?;
        Ok(row)
    }

    /// Deactivate an endpoint (soft delete).
    pub fn deactivate_endpoint(&self, provider_id: &str) -> Result<(), GatewayError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();
        let rows = conn.execute(
            "UPDATE endpoints SET active = 0, updated_at = ?1 WHERE provider_id = ?2 AND active = 1",
            params![now, provider_id],
        )?;
        if rows == 0 {
            return Err(GatewayError::EndpointNotFound(provider_id.to_string()));
        }
        Ok(())
    }

    /// Record a successful payment: bumps counters and accumulates revenue
    /// as an integer string (revenue can exceed i64).
    pub fn record_payment(&self, provider_id: &str, amount: &str) -> Result<(), GatewayError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();

        let add_amount: u128 = amount.parse().unwrap_or(0);
        let current: u128 = conn
            .query_row(
                "SELECT revenue_total FROM endpoint_stats WHERE provider_id = ?1",
                params![provider_id],
                |row| row.get::<_, String>(0),
            )
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0);
        let new_revenue = (current + add_amount).to_string();

        conn.execute(
            r#"
            INSERT INTO endpoint_stats (provider_id, request_count, payment_count, revenue_total, last_accessed_at)
            VALUES (?1, 1, 1, ?2, ?3)
            ON CONFLICT(provider_id) DO UPDATE SET
                request_count = request_count + 1,
                payment_count = payment_count + 1,
                revenue_total = ?2,
                last_accessed_at = ?3
            "#,
            params![provider_id, new_revenue, now],
        )?;
        Ok(())
    }

    /// Append a settlement outcome to the ledger.
    pub fn record_settlement(
        &self,
        provider_id: &str,
        mode: SettlementPolicy,
        settle: &x402::SettleResponse,
        amount: &str,
    ) -> Result<(), GatewayError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            r#"
            INSERT INTO settlements
                (provider_id, mode, success, transaction_hash, payer, amount, error_reason, settled_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                provider_id,
                mode.as_str(),
                settle.success as i64,
                settle.transaction,
                settle.payer.map(|a| format!("{a:#x}")),
                amount,
                settle.error_reason,
                now,
            ],
        )?;
        Ok(())
    }

    /// Most recent settlement outcomes for an endpoint (newest first).
    pub fn list_settlements(
        &self,
        provider_id: &str,
        limit: u32,
    ) -> Result<Vec<SettlementRecord>, GatewayError> {
        let limit = limit.clamp(1, 500);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT provider_id, mode, success, transaction_hash, payer, amount, error_reason, settled_at
            FROM settlements
            WHERE provider_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt
            .query_map(params![provider_id, limit], |row| {
                Ok(SettlementRecord {
                    provider_id: row.get(0)?,
                    mode: row.get(1)?,
                    success: row.get::<_, i64>(2)? == 1,
                    transaction_hash: row.get(3)?,
                    payer: row.get(4)?,
                    amount: row.get(5)?,
                    error_reason: row.get(6)?,
                    settled_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// One row of the settlement ledger.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SettlementRecord {
    pub provider_id: String,
    pub mode: String,
    pub success: bool,
    pub transaction_hash: Option<String>,
    pub payer: Option<String>,
    pub amount: String,
    pub error_reason: Option<String>,
    pub settled_at: i64,
}

fn row_to_endpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<EndpointRecord> {
    let auth_method_str: String = row.get(7)?;
    let headers_json: String = row.get(11)?;
    let settlement_mode_str: Option<String> = row.get(13)?;
    Ok(EndpointRecord {
        provider_id: row.get(0)?,
        origin_endpoint: row.get(1)?,
        http_method: row.get(2)?,
        request_body: row.get(3)?,
        price_usd: row.get(4)?,
        price_atomic: row.get(5)?,
        payout_address: row.get(6)?,
        auth_method: AuthMethod::parse(&auth_method_str).unwrap_or(AuthMethod::None),
        auth_header_name: row.get(8)?,
        query_param_name: row.get(9)?,
        encrypted_credential: row.get(10)?,
        custom_headers: serde_json::from_str(&headers_json).unwrap_or_default(),
        max_timeout_seconds: row.get::<_, i64>(12)?.max(0) as u64,
        settlement_mode: settlement_mode_str.and_then(|s| SettlementPolicy::parse(&s).ok()),
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        active: row.get::<_, i64>(16)? == 1,
    })
}

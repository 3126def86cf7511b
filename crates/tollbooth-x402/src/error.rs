use thiserror::Error;

/// Errors returned by x402 protocol operations.
#[derive(Debug, Error)]
pub enum X402Error {
    #[error("malformed payment header: {0}")]
    MalformedHeader(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

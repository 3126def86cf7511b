use alloy::primitives::{Address, FixedBytes};
use serde::{Deserialize, Serialize};

/// Signed transfer authorization carried inside an exact-scheme payload.
///
/// `value` is an integer string in atomic units; validity bounds are unix
/// seconds. The nonce is unique per authorization (replay protection is
/// enforced by the facilitator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: String,
    pub valid_after: u64,
    pub valid_before: u64,
    pub nonce: FixedBytes<32>,
}

/// Scheme-specific payload for the "exact" scheme: the authorization plus
/// its EIP-712 signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactPaymentPayload {
    pub signature: String,
    pub authorization: PaymentAuthorization,
}

/// Wire-format payment payload (sent in the X-PAYMENT header, base64-encoded JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub payload: ExactPaymentPayload,
}

/// A single entry in the `accepts` array of a 402 response.
///
/// Derived per request and never persisted; `resource` must equal the exact
/// URL the client requested, including the query string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    /// Integer string in atomic units.
    pub max_amount_required: String,
    pub resource: String,
    pub pay_to: Address,
    pub asset: Address,
    pub max_timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// The 402 response body returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    pub x402_version: u32,
    pub error: String,
    pub accepts: Vec<PaymentRequirements>,
}

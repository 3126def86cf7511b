//! Encoding/decoding of the payment headers.
//!
//! The X-PAYMENT request header and X-PAYMENT-RESPONSE receipt header both
//! carry base64-encoded JSON. Decoding failures are reported with enough
//! detail for a field-level 400; a *missing* header is not a codec concern
//! (the orchestrator answers it with the 402 challenge).

use alloy::primitives::Address;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::constants::X402_VERSION;
use crate::error::X402Error;
use crate::payment::{PaymentPayload, PaymentRequirements};
use crate::response::SettleResponse;

/// Settlement receipt attached to successful responses.
///
/// Synchronous mode fills in the settlement outcome; asynchronous mode
/// marks the receipt pending since only verification has completed by
/// response time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
}

impl PaymentReceipt {
    pub fn settled(settle: &SettleResponse) -> Self {
        Self {
            success: settle.success,
            pending: false,
            transaction: settle.transaction.clone(),
            network: settle.network.clone(),
            payer: settle.payer,
        }
    }

    pub fn pending(network: impl Into<String>, payer: Option<Address>) -> Self {
        Self {
            success: true,
            pending: true,
            transaction: None,
            network: network.into(),
            payer,
        }
    }
}

/// Decode the X-PAYMENT header value into a [`PaymentPayload`].
pub fn decode_payment(header_value: &str) -> Result<PaymentPayload, X402Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(header_value.trim())
        .map_err(|e| X402Error::MalformedHeader(format!("invalid base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| X402Error::MalformedHeader(format!("invalid payload JSON: {e}")))
}

/// Encode a payload for the X-PAYMENT header (used by clients and tests).
pub fn encode_payment(payload: &PaymentPayload) -> Result<String, X402Error> {
    let json = serde_json::to_vec(payload)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

/// Encode a receipt for the X-PAYMENT-RESPONSE header.
pub fn encode_receipt(receipt: &PaymentReceipt) -> Result<String, X402Error> {
    let json = serde_json::to_vec(receipt)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

/// Decode an X-PAYMENT-RESPONSE header value back into a receipt.
pub fn decode_receipt(header_value: &str) -> Result<PaymentReceipt, X402Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(header_value.trim())
        .map_err(|e| X402Error::MalformedHeader(format!("invalid base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| X402Error::MalformedHeader(format!("invalid receipt JSON: {e}")))
}

/// Local pre-checks on a decoded payload against the requirements.
///
/// Signature validity and nonce replay are the facilitator's job; these
/// checks only reject payloads that can never settle, before any network
/// call is made.
pub fn validate_payload(
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
    now_unix: u64,
) -> Result<(), X402Error> {
    if payload.x402_version != X402_VERSION {
        return Err(X402Error::InvalidPayment(format!(
            "unsupported x402 version {}",
            payload.x402_version
        )));
    }
    if payload.scheme != requirements.scheme {
        return Err(X402Error::UnsupportedScheme(payload.scheme.clone()));
    }
    if payload.network != requirements.network {
        return Err(X402Error::InvalidPayment(format!(
            "wrong network: expected {}, got {}",
            requirements.network, payload.network
        )));
    }

    let auth = &payload.payload.authorization;
    if auth.to != requirements.pay_to {
        return Err(X402Error::InvalidPayment(
            "authorization recipient does not match payTo".to_string(),
        ));
    }

    let value: u128 = auth
        .value
        .parse()
        .map_err(|_| X402Error::InvalidPayment("value is not an integer".to_string()))?;
    let required: u128 = requirements
        .max_amount_required
        .parse()
        .map_err(|_| X402Error::InvalidPayment("requirements amount is invalid".to_string()))?;
    if value < required {
        return Err(X402Error::InvalidPayment(format!(
            "insufficient value: {value} < {required}"
        )));
    }

    if auth.valid_after > now_unix {
        return Err(X402Error::InvalidPayment(
            "authorization not yet valid".to_string(),
        ));
    }
    if auth.valid_before < now_unix {
        return Err(X402Error::InvalidPayment(
            "authorization expired".to_string(),
        ));
    }

    Ok(())
}

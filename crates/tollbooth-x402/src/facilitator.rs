//! HTTP client for the external settlement service ("facilitator").
//!
//! The facilitator performs the actual signature/nonce verification and
//! on-chain submission; this adapter only normalizes its answers. Transport
//! failures (connect errors, non-2xx, malformed bodies, timeouts) are folded
//! into the same failure shapes as protocol-level rejections, so callers
//! handle exactly one failure vocabulary. Conservative rule: if we cannot
//! prove settlement happened, it did not.

use std::time::Duration;

use crate::constants::X402_VERSION;
use crate::hmac::compute_hmac;
use crate::payment::{PaymentPayload, PaymentRequirements};
use crate::response::{SettleResponse, VerifyResponse};

/// Default per-call timeout for facilitator requests.
pub const DEFAULT_FACILITATOR_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct FacilitatorClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    /// Shared secret for HMAC request signing (None = unauthenticated).
    hmac_secret: Option<Vec<u8>>,
}

impl FacilitatorClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, hmac_secret: Option<Vec<u8>>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");
        Self {
            base_url: base_url.into(),
            client,
            timeout,
            hmac_secret,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the facilitator to verify a payment authorization.
    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyResponse {
        match self.post("verify", payload, requirements).await {
            Ok(body) => serde_json::from_slice::<VerifyResponse>(&body).unwrap_or_else(|e| {
                tracing::error!(error = %e, "facilitator returned malformed verify body");
                VerifyResponse::invalid("facilitator response was malformed")
            }),
            Err(reason) => VerifyResponse::invalid(reason),
        }
    }

    /// Ask the facilitator to settle a verified payment on-chain.
    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse {
        let network = requirements.network.clone();
        match self.post("settle", payload, requirements).await {
            Ok(body) => serde_json::from_slice::<SettleResponse>(&body).unwrap_or_else(|e| {
                tracing::error!(error = %e, "facilitator returned malformed settle body");
                SettleResponse::failed("facilitator response was malformed", network)
            }),
            Err(reason) => SettleResponse::failed(reason, network),
        }
    }

    async fn post(
        &self,
        endpoint: &str,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<Vec<u8>, String> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        let request_body = serde_json::json!({
            "x402Version": X402_VERSION,
            "paymentPayload": payload,
            "paymentRequirements": requirements,
        });
        let body_bytes = serde_json::to_vec(&request_body)
            .map_err(|e| format!("facilitator request serialization failed: {e}"))?;

        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout);

        if let Some(ref secret) = self.hmac_secret {
            req = req.header("X-Facilitator-Auth", compute_hmac(secret, &body_bytes));
        }

        let response = req
            .body(body_bytes)
            .send()
            .await
            .map_err(|e| format!("facilitator unreachable: {e}"))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| format!("failed to read facilitator response: {e}"))?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                endpoint = endpoint,
                "facilitator returned non-success response"
            );
            return Err(format!("facilitator returned {status}"));
        }

        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BASE_NETWORK, SCHEME_EXACT, USDC_ADDRESS};
    use crate::payment::{ExactPaymentPayload, PaymentAuthorization};
    use alloy::primitives::FixedBytes;

    fn fixture() -> (PaymentPayload, PaymentRequirements) {
        let pay_to = "0x1234567890123456789012345678901234567890"
            .parse()
            .unwrap();
        let payload = PaymentPayload {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_string(),
            network: BASE_NETWORK.to_string(),
            payload: ExactPaymentPayload {
                signature: "0x00".to_string(),
                authorization: PaymentAuthorization {
                    from: pay_to,
                    to: pay_to,
                    value: "10000".to_string(),
                    valid_after: 0,
                    valid_before: u64::MAX,
                    nonce: FixedBytes::ZERO,
                },
            },
        };
        let requirements = PaymentRequirements {
            scheme: SCHEME_EXACT.to_string(),
            network: BASE_NETWORK.to_string(),
            max_amount_required: "10000".to_string(),
            resource: "https://gw.example/p/test".to_string(),
            pay_to,
            asset: USDC_ADDRESS,
            max_timeout_seconds: 30,
            description: None,
            mime_type: None,
        };
        (payload, requirements)
    }

    #[tokio::test]
    async fn test_unreachable_facilitator_normalizes_to_invalid() {
        // Nothing listens on port 1; the transport error must surface as a
        // protocol-shaped rejection, not a panic or a distinct error type.
        let client = FacilitatorClient::new(
            "http://127.0.0.1:1",
            Duration::from_millis(500),
            None,
        );
        let (payload, requirements) = fixture();

        let verify = client.verify(&payload, &requirements).await;
        assert!(!verify.is_valid);
        assert!(verify.invalid_reason.unwrap().contains("unreachable"));

        let settle = client.settle(&payload, &requirements).await;
        assert!(!settle.success);
        assert!(settle.transaction.is_none());
        assert_eq!(settle.network, BASE_NETWORK);
    }
}

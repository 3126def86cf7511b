//! Gateway orchestrator: sequences payment verification, origin forwarding
//! and settlement for one inbound call.
//!
//! One code path serves both settlement timings; [`SettlementPolicy`] only
//! decides whether the settle result is awaited before responding (sync) or
//! resolved in a detached task after the response is sent (async). The
//! ordering invariant — origin forward strictly before settlement — is
//! enforced here and nowhere else: no payment is captured for a failed
//! service call.

use actix_web::HttpResponse;
use bytes::Bytes;
use x402::codec::PaymentReceipt;
use x402::{
    decode_payment, encode_receipt, PaymentPayload, PaymentRequiredBody, PaymentRequirements,
    X402_VERSION,
};

use crate::error::GatewayError;
use crate::forward::{self, OriginResponse};
use crate::metrics::{
    FORWARD_LATENCY, FORWARD_REQUESTS_TOTAL, PAYMENTS_FAILED, PAYMENTS_TOTAL,
    SETTLEMENT_FAILED_AFTER_DELIVERY,
};
use crate::requirements::build_requirements;
use crate::state::AppState;
use crate::store::{AuthMethod, EndpointRecord};

/// When the payment is captured relative to the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementPolicy {
    /// Settle before responding; the caller learns the settlement outcome.
    Synchronous,
    /// Respond right after a successful forward; settle in the background.
    Asynchronous,
}

impl SettlementPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementPolicy::Synchronous => "sync",
            SettlementPolicy::Asynchronous => "async",
        }
    }

    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "sync" => Ok(SettlementPolicy::Synchronous),
            "async" => Ok(SettlementPolicy::Asynchronous),
            other => Err(GatewayError::InvalidConfig(format!(
                "unknown settlement mode: {other}"
            ))),
        }
    }
}

/// Build the 402 challenge returned when no payment accompanies the request.
pub fn payment_required_response(error: &str, requirements: PaymentRequirements) -> HttpResponse {
    HttpResponse::PaymentRequired().json(PaymentRequiredBody {
        x402_version: X402_VERSION,
        error: error.to_string(),
        accepts: vec![requirements],
    })
}

/// Handle one inbound call to a registered endpoint.
///
/// `resource_url` is the exact URL the client requested (query included);
/// it becomes `PaymentRequirements.resource`. `payment_header` is the raw
/// X-PAYMENT value, `None` when the header was absent.
pub async fn handle_paid_call(
    state: &AppState,
    provider_id: &str,
    resource_url: &str,
    inbound_query: Option<&str>,
    payment_header: Option<&str>,
    inbound_body: Bytes,
) -> Result<HttpResponse, GatewayError> {
    let endpoint = state
        .cache
        .get(&state.store, provider_id)?
        .ok_or_else(|| GatewayError::EndpointNotFound(provider_id.to_string()))?;

    let requirements = build_requirements(&endpoint, resource_url)?;

    // No payment presented: challenge, never forward.
    let header_value = match payment_header {
        Some(v) => v,
        None => return Ok(payment_required_response("payment required", requirements)),
    };

    // Present but malformed is a 400, distinct from the 402 challenge.
    let payload =
        decode_payment(header_value).map_err(|e| GatewayError::MalformedPayment(e.to_string()))?;

    // Local pre-checks: reject payloads that can never settle before
    // spending a facilitator round-trip.
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    if let Err(e) = x402::codec::validate_payload(&payload, &requirements, now) {
        PAYMENTS_FAILED.inc();
        return Ok(payment_required_response(&e.to_string(), requirements));
    }

    let verify = state.facilitator.verify(&payload, &requirements).await;
    if !verify.is_valid {
        let reason = verify
            .invalid_reason
            .unwrap_or_else(|| "payment verification failed".to_string());
        tracing::warn!(provider = %provider_id, reason = %reason, "payment rejected by facilitator");
        PAYMENTS_FAILED.inc();
        return Ok(payment_required_response(&reason, requirements));
    }

    // Decrypt the vaulted credential only after the payment is verified.
    let credential = decrypt_credential(state, &endpoint)?;

    // Forward to the origin. On any failure we return 502/504 and settlement
    // is never attempted: the settle calls live strictly below this point.
    FORWARD_REQUESTS_TOTAL.inc();
    let timer = FORWARD_LATENCY.start_timer();
    let origin = forward::forward(
        &state.http_client,
        &endpoint,
        inbound_query,
        &inbound_body,
        credential.as_deref(),
    )
    .await?;
    timer.observe_duration();

    let policy = endpoint
        .settlement_mode
        .unwrap_or(state.config.default_settlement);

    match policy {
        SettlementPolicy::Synchronous => {
            // Settlement is externally visible once dispatched, so it runs
            // in its own task: a client disconnect drops this handler but
            // must not abort the settle mid-flight. The ledger row and the
            // failure accounting live inside the task for the same reason.
            let settle_task = {
                let facilitator = state.facilitator.clone();
                let store = state.store.clone();
                let provider_id = endpoint.provider_id.clone();
                let amount = endpoint.price_atomic.clone();
                let payload = payload.clone();
                let requirements = requirements.clone();
                tokio::spawn(async move {
                    let settle = facilitator.settle(&payload, &requirements).await;
                    if let Err(e) = store.record_settlement(
                        &provider_id,
                        SettlementPolicy::Synchronous,
                        &settle,
                        &amount,
                    ) {
                        tracing::warn!(provider = %provider_id, error = %e, "failed to record settlement");
                    }
                    if !settle.success {
                        // Service was already rendered; must stay reconcilable.
                        SETTLEMENT_FAILED_AFTER_DELIVERY.inc();
                        tracing::error!(
                            provider = %provider_id,
                            payer = ?settle.payer,
                            amount = %amount,
                            reason = ?settle.error_reason,
                            "origin was called but settlement failed; manual reconciliation required"
                        );
                    }
                    settle
                })
            };
            let settle = match settle_task.await {
                Ok(settle) => settle,
                Err(e) => {
                    tracing::error!(error = %e, "settlement task panicked");
                    x402::SettleResponse::failed(
                        "settlement task failed",
                        requirements.network.clone(),
                    )
                }
            };

            if !settle.success {
                let reason = settle
                    .error_reason
                    .clone()
                    .unwrap_or_else(|| "settlement failed".to_string());
                return Ok(payment_required_response(&reason, requirements));
            }

            PAYMENTS_TOTAL.inc();
            record_payment_stats(state, &endpoint);
            let receipt = PaymentReceipt::settled(&settle);
            Ok(success_response(origin, &receipt, true))
        }
        SettlementPolicy::Asynchronous => {
            // Service is delivered on verification alone; settle in the
            // background holding only owned copies of the payment data.
            spawn_background_settle(state, &endpoint, payload, requirements.clone());

            let receipt = PaymentReceipt::pending(requirements.network.clone(), verify.payer);
            Ok(success_response(origin, &receipt, false))
        }
    }
}

fn decrypt_credential(
    state: &AppState,
    endpoint: &EndpointRecord,
) -> Result<Option<String>, GatewayError> {
    if endpoint.auth_method == AuthMethod::None {
        return Ok(None);
    }
    let ciphertext = endpoint.encrypted_credential.as_deref().ok_or_else(|| {
        GatewayError::CredentialCorruption(endpoint.provider_id.clone())
    })?;
    state
        .vault
        .decrypt(ciphertext)
        .map(Some)
        .map_err(|_| GatewayError::CredentialCorruption(endpoint.provider_id.clone()))
}

/// Dispatch the settle call as a detached task. Captures only owned values;
/// nothing request-scoped survives past the response.
fn spawn_background_settle(
    state: &AppState,
    endpoint: &EndpointRecord,
    payload: PaymentPayload,
    requirements: PaymentRequirements,
) {
    let facilitator = state.facilitator.clone();
    let store = state.store.clone();
    let provider_id = endpoint.provider_id.clone();
    let amount = endpoint.price_atomic.clone();

    tokio::spawn(async move {
        let settle = facilitator.settle(&payload, &requirements).await;

        if let Err(e) = store.record_settlement(
            &provider_id,
            SettlementPolicy::Asynchronous,
            &settle,
            &amount,
        ) {
            tracing::warn!(provider = %provider_id, error = %e, "failed to record settlement");
        }

        if settle.success {
            PAYMENTS_TOTAL.inc();
            if let Err(e) = store.record_payment(&provider_id, &amount) {
                tracing::warn!(provider = %provider_id, error = %e, "failed to record payment stats");
            }
            tracing::info!(
                provider = %provider_id,
                transaction = ?settle.transaction,
                payer = ?settle.payer,
                "background settlement confirmed"
            );
        } else {
            // Terminal for this payment attempt: no caller context remains,
            // so the failure surfaces only through the ledger and logs.
            SETTLEMENT_FAILED_AFTER_DELIVERY.inc();
            tracing::error!(
                provider = %provider_id,
                payer = ?settle.payer,
                amount = %amount,
                reason = ?settle.error_reason,
                "background settlement failed; manual reconciliation required"
            );
        }
    });
}

fn record_payment_stats(state: &AppState, endpoint: &EndpointRecord) {
    if let Err(e) = state
        .store
        .record_payment(&endpoint.provider_id, &endpoint.price_atomic)
    {
        tracing::warn!(provider = %endpoint.provider_id, error = %e, "failed to record payment stats");
    }
    crate::metrics::ENDPOINT_PAYMENTS
        .with_label_values(&[&endpoint.provider_id])
        .inc();
    let amount: u64 = endpoint
        .price_atomic
        .parse::<u128>()
        .unwrap_or(0)
        .try_into()
        .unwrap_or(u64::MAX);
    crate::metrics::ENDPOINT_REVENUE
        .with_label_values(&[&endpoint.provider_id])
        .inc_by(amount);
}

/// Build the success response: origin body + receipt header. In synchronous
/// mode (`attach_body_metadata`) the receipt is also embedded into the body,
/// but only when the origin returned a JSON object; other bodies pass
/// through untouched so non-JSON origins are never corrupted.
fn success_response(
    origin: OriginResponse,
    receipt: &PaymentReceipt,
    attach_body_metadata: bool,
) -> HttpResponse {
    let mut builder = HttpResponse::build(
        actix_web::http::StatusCode::from_u16(origin.status)
            .unwrap_or(actix_web::http::StatusCode::OK),
    );

    if let Some(ref ct) = origin.content_type {
        builder.insert_header(("Content-Type", ct.as_str()));
    }

    if let Ok(header_value) = encode_receipt(receipt) {
        builder.insert_header((x402::PAYMENT_RESPONSE_HEADER, header_value));
    }

    if attach_body_metadata {
        if let Ok(serde_json::Value::Object(mut map)) =
            serde_json::from_slice::<serde_json::Value>(&origin.body)
        {
            if let Ok(receipt_value) = serde_json::to_value(receipt) {
                map.insert("payment".to_string(), receipt_value);
                return builder.json(serde_json::Value::Object(map));
            }
        }
    }

    builder.body(origin.body)
}

//! Builds the protocol-mandated payment terms for one inbound request.

use x402::{PaymentRequirements, BASE_NETWORK, SCHEME_EXACT, USDC_ADDRESS};

use crate::error::GatewayError;
use crate::store::EndpointRecord;

/// Derive [`PaymentRequirements`] from an endpoint config and the exact URL
/// the client requested (query string included). `resource` must echo that
/// URL verbatim so the signed payment cannot be detached from the response
/// it paid for.
pub fn build_requirements(
    endpoint: &EndpointRecord,
    resource_url: &str,
) -> Result<PaymentRequirements, GatewayError> {
    let pay_to = endpoint
        .payout_address
        .parse()
        .map_err(|_| GatewayError::Internal("invalid stored payout address".to_string()))?;

    Ok(PaymentRequirements {
        scheme: SCHEME_EXACT.to_string(),
        network: BASE_NETWORK.to_string(),
        max_amount_required: endpoint.price_atomic.clone(),
        resource: resource_url.to_string(),
        pay_to,
        asset: USDC_ADDRESS,
        max_timeout_seconds: endpoint.max_timeout_seconds,
        description: None,
        mime_type: Some("application/json".to_string()),
    })
}

//! Pay-per-call HTTP gateway.
//!
//! Turns registered third-party APIs into x402-paid endpoints: callers hit
//! `/p/{provider_id}`, receive a 402 challenge with payment terms, retry
//! with a signed `X-PAYMENT` header, and the gateway verifies the payment,
//! forwards the call with the provider's vaulted credential, and settles
//! through the facilitator.

pub mod cache;
pub mod config;
pub mod cors;
pub mod error;
pub mod forward;
pub mod metrics;
pub mod orchestrator;
pub mod requirements;
pub mod routes;
pub mod state;
pub mod store;
pub mod vault;

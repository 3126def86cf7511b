//! x402 payment protocol support for the tollbooth gateway.
//!
//! Implements the wire types, header codec, price conversion and the
//! facilitator client used to turn any HTTP API into a pay-per-call
//! service behind HTTP 402 challenges.
//!
//! # Flow
//!
//! 1. Request arrives without an `X-PAYMENT` header → 402 with an
//!    `accepts` array of [`PaymentRequirements`]
//! 2. Client signs an authorization and retries with `X-PAYMENT`
//! 3. The gateway verifies via the facilitator, forwards to the origin
//!    API, then settles (before or after responding, per policy)
//! 4. Successful responses carry an `X-PAYMENT-RESPONSE` receipt

pub mod codec;
pub mod constants;
pub mod error;
pub mod facilitator;
pub mod hmac;
pub mod payment;
pub mod price;
pub mod response;

pub use codec::{decode_payment, encode_payment, encode_receipt, PaymentReceipt};
pub use constants::*;
pub use error::X402Error;
pub use facilitator::FacilitatorClient;
pub use payment::{
    ExactPaymentPayload, PaymentAuthorization, PaymentPayload, PaymentRequiredBody,
    PaymentRequirements,
};
pub use response::{SettleResponse, VerifyResponse};

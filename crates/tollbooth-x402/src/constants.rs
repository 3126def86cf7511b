use alloy::primitives::{address, Address};

/// x402 protocol version carried in every payload and 402 body.
pub const X402_VERSION: u32 = 1;

/// The only payment scheme the gateway accepts.
pub const SCHEME_EXACT: &str = "exact";

/// CAIP-2-style network identifier for Base mainnet.
pub const BASE_NETWORK: &str = "base";

/// USDC contract on Base mainnet.
pub const USDC_ADDRESS: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC has 6 decimal places; one atomic unit is 10^-6 USD.
pub const USDC_DECIMALS: u32 = 6;

/// Request header carrying the base64-encoded payment payload.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Response header carrying the base64-encoded settlement receipt.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Default facilitator endpoint.
pub const DEFAULT_FACILITATOR_URL: &str = "https://x402.org/facilitator";

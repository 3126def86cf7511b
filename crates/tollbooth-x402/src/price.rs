//! USD ⇄ atomic-unit conversion.
//!
//! Conversion to atomic units truncates (floor) so the gateway never demands
//! more than the configured price. All protocol comparisons happen on the
//! integer atomic amounts; [`atomic_to_usd`] exists for display only.

use crate::constants::USDC_DECIMALS;
use crate::error::X402Error;

/// Minimum endpoint price: $0.0001 (100 atomic units).
pub const MIN_PRICE_ATOMIC: u64 = 100;

/// Maximum endpoint price: $1000 (10^9 atomic units).
pub const MAX_PRICE_ATOMIC: u64 = 1_000_000_000;

/// Parse a decimal USD price (e.g. "0.01", "$1.50") into atomic units.
///
/// Fractional digits beyond the asset's precision are truncated, never
/// rounded up. Prices outside `[$0.0001, $1000]` are rejected.
pub fn usd_to_atomic(price: &str) -> Result<u64, X402Error> {
    let trimmed = price.trim().trim_start_matches('$');
    if trimmed.is_empty() {
        return Err(X402Error::InvalidPrice("empty price".to_string()));
    }

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
        || (int_part.is_empty() && frac_part.is_empty())
    {
        return Err(X402Error::InvalidPrice(format!(
            "not a decimal number: {price}"
        )));
    }

    let whole: u64 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| X402Error::InvalidPrice(format!("integer part too large: {price}")))?
    };

    // Truncate the fraction at the asset precision (floor semantics).
    let decimals = USDC_DECIMALS as usize;
    let mut frac_digits: String = frac_part.chars().take(decimals).collect();
    while frac_digits.len() < decimals {
        frac_digits.push('0');
    }
    let frac: u64 = if frac_digits.is_empty() {
        0
    } else {
        frac_digits
            .parse()
            .map_err(|_| X402Error::InvalidPrice(format!("invalid fraction: {price}")))?
    };

    let atomic = whole
        .checked_mul(10u64.pow(USDC_DECIMALS))
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| X402Error::InvalidPrice(format!("price overflow: {price}")))?;

    if !(MIN_PRICE_ATOMIC..=MAX_PRICE_ATOMIC).contains(&atomic) {
        return Err(X402Error::InvalidPrice(format!(
            "price must be between $0.0001 and $1000, got {price}"
        )));
    }

    Ok(atomic)
}

/// Format atomic units as a decimal USD string, for display only.
pub fn atomic_to_usd(units: u64) -> String {
    let scale = 10u64.pow(USDC_DECIMALS);
    let whole = units / scale;
    let frac = units % scale;
    if frac == 0 {
        return format!("{whole}");
    }
    let frac_str = format!("{:06}", frac);
    format!("{whole}.{}", frac_str.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_conversions() {
        assert_eq!(usd_to_atomic("0.01").unwrap(), 10_000);
        assert_eq!(usd_to_atomic("$0.01").unwrap(), 10_000);
        assert_eq!(usd_to_atomic("1").unwrap(), 1_000_000);
        assert_eq!(usd_to_atomic("1.5").unwrap(), 1_500_000);
        assert_eq!(usd_to_atomic("0.0001").unwrap(), 100);
        assert_eq!(usd_to_atomic("1000").unwrap(), 1_000_000_000);
    }

    #[test]
    fn test_truncates_excess_precision() {
        // 7th decimal digit is dropped, never rounded up
        assert_eq!(usd_to_atomic("0.0123456789").unwrap(), 12_345);
        assert_eq!(usd_to_atomic("0.9999999").unwrap(), 999_999);
    }

    #[test]
    fn test_bounds() {
        assert!(usd_to_atomic("0.00009").is_err());
        assert!(usd_to_atomic("1000.000001").is_err());
        assert!(usd_to_atomic("0").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(usd_to_atomic("").is_err());
        assert!(usd_to_atomic("abc").is_err());
        assert!(usd_to_atomic("1.2.3").is_err());
        assert!(usd_to_atomic("-0.01").is_err());
    }

    #[test]
    fn test_atomic_to_usd_display() {
        assert_eq!(atomic_to_usd(10_000), "0.01");
        assert_eq!(atomic_to_usd(1_000_000), "1");
        assert_eq!(atomic_to_usd(1_500_000), "1.5");
        assert_eq!(atomic_to_usd(100), "0.0001");
    }

    #[test]
    fn test_display_never_overstates() {
        // For prices with excess precision, the displayed amount stays <= input
        for price in ["0.0001", "0.01", "0.12345678", "999.9999999"] {
            let units = usd_to_atomic(price).unwrap();
            let display: f64 = atomic_to_usd(units).parse().unwrap();
            let input: f64 = price.parse().unwrap();
            assert!(display <= input, "{display} > {input}");
        }
    }
}

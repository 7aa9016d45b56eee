//! Conversions between human-readable amounts and integer base units
//!
//! Rounding policy: when an input carries more fractional digits than the unit
//! supports (more than 18 for ether), the excess digits are truncated toward
//! zero and a warning is logged. Nothing is ever rounded up.

use crate::{Error, Result};
use alloy::primitives::U256;

/// Decimals of the native currency (1 ether = 10^18 wei)
pub const ETHER_DECIMALS: u32 = 18;

/// Display precision used for account balances
pub const BALANCE_DISPLAY_DECIMALS: u32 = 8;

/// Largest `decimals` whose scale 10^decimals fits in a U256
pub const MAX_DECIMALS: u32 = 77;

/// Parse a decimal ether amount such as `"1.5"` into wei
pub fn parse_ether(amount: &str) -> Result<U256> {
    parse_units(amount, ETHER_DECIMALS)
}

/// Parse a decimal amount into an integer with `decimals` implied places
pub fn parse_units(amount: &str, decimals: u32) -> Result<U256> {
    let amount = amount.trim();
    scale(decimals)?;
    let invalid = || Error::InvalidArgument(format!("Invalid amount: '{}'", amount));

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let decimals = decimals as usize;
    let fraction = if fraction.len() > decimals {
        let (kept, dropped) = fraction.split_at(decimals);
        if dropped.chars().any(|c| c != '0') {
            tracing::warn!(
                amount = %amount,
                dropped_digits = %dropped,
                "Amount has more precision than the unit supports, truncating"
            );
        }
        kept
    } else {
        fraction
    };

    let digits = format!(
        "{}{:0<width$}",
        if whole.is_empty() { "0" } else { whole },
        fraction,
        width = decimals
    );

    U256::from_str_radix(&digits, 10).map_err(|_| invalid())
}

/// 10^decimals, or an error when it does not fit in a U256
fn scale(decimals: u32) -> Result<U256> {
    if decimals > MAX_DECIMALS {
        return Err(Error::InvalidArgument(format!(
            "decimals must be at most {}, got {}",
            MAX_DECIMALS, decimals
        )));
    }
    Ok(U256::from(10).pow(U256::from(decimals)))
}

/// Format a U256 value with decimals, trimming trailing zeros
pub fn format_units(value: U256, decimals: u32) -> Result<String> {
    let divisor = scale(decimals)?;
    if value.is_zero() {
        return Ok("0".to_string());
    }

    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        return Ok(whole.to_string());
    }
    let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
    let trimmed = remainder_str.trim_end_matches('0');
    if trimmed.is_empty() {
        Ok(whole.to_string())
    } else {
        Ok(format!("{}.{}", whole, trimmed))
    }
}

/// Format with exactly `precision` fractional digits, truncating the rest
pub fn format_fixed(value: U256, decimals: u32, precision: u32) -> Result<String> {
    let divisor = scale(decimals)?;
    let whole = value / divisor;
    if precision == 0 {
        return Ok(whole.to_string());
    }
    if precision > MAX_DECIMALS {
        return Err(Error::InvalidArgument(format!(
            "precision must be at most {}, got {}",
            MAX_DECIMALS, precision
        )));
    }

    let remainder = value % divisor;
    let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
    let shown = precision.min(decimals) as usize;
    Ok(format!(
        "{}.{:0<width$}",
        whole,
        &remainder_str[..shown],
        width = precision as usize
    ))
}

/// Balance in ether with the fixed display precision
pub fn format_balance(wei: U256) -> Result<String> {
    format_fixed(wei, ETHER_DECIMALS, BALANCE_DISPLAY_DECIMALS)
}

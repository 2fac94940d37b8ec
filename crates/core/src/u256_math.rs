//! Exact integer arithmetic for order building.
//!
//! Morpho Blue accounts debt in shares; converting between shares and assets
//! must round against the liquidator (up for debt repaid, down for value
//! received) or the protocol rejects the call.

use alloy::primitives::U256;
use liquidator_chain::ORACLE_PRICE_SCALE;
use thiserror::Error;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("zero totals (assets={total_assets}, shares={total_shares})")]
    ZeroTotals { total_assets: U256, total_shares: U256 },

    #[error("overflow in {0}")]
    Overflow(&'static str),

    #[error("cannot express {0} as token units")]
    InvalidAmount(String),
}

/// 10^exp
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Apply basis points reduction (e.g., for slippage).
/// Returns: value * (10000 - basis_points) / 10000
///
/// Example: apply_basis_points(1000, 100) = 990 (1% reduction)
#[inline(always)]
pub fn apply_basis_points(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(10000u16.saturating_sub(basis_points));
    value.saturating_mul(factor) / BPS_DENOMINATOR
}

fn mul_div(a: U256, b: U256, d: U256, round_up: bool, what: &'static str) -> Result<U256, MathError> {
    let product = a.checked_mul(b).ok_or(MathError::Overflow(what))?;
    if round_up {
        let bumped = product
            .checked_add(d - U256::from(1u8))
            .ok_or(MathError::Overflow(what))?;
        Ok(bumped / d)
    } else {
        Ok(product / d)
    }
}

/// `ceil(assets * total_shares / total_assets)`.
///
/// Zero assets give zero shares. Empty totals are an error: the conversion is
/// undefined and a silent zero would build an order that repays nothing.
pub fn assets_to_shares_up(assets: U256, total_assets: U256, total_shares: U256) -> Result<U256, MathError> {
    if assets.is_zero() {
        return Ok(U256::ZERO);
    }
    if total_assets.is_zero() || total_shares.is_zero() {
        return Err(MathError::ZeroTotals { total_assets, total_shares });
    }
    mul_div(assets, total_shares, total_assets, true, "assets_to_shares_up")
}

/// `ceil(shares * total_assets / total_shares)`; zero when there are no shares.
pub fn shares_to_assets_up(shares: U256, total_assets: U256, total_shares: U256) -> Result<U256, MathError> {
    if shares.is_zero() || total_shares.is_zero() {
        return Ok(U256::ZERO);
    }
    mul_div(shares, total_assets, total_shares, true, "shares_to_assets_up")
}

/// Largest debt (loan units) the collateral supports:
/// `floor(floor(collateral * price / 1e36) * lltv / 1e18)`, the same
/// rounding Morpho applies in its health check.
pub fn oracle_max_borrow(collateral: U256, oracle_price: U256, lltv_wad: U256) -> Result<U256, MathError> {
    let value = mul_div(collateral, oracle_price, ORACLE_PRICE_SCALE, false, "oracle_max_borrow")?;
    mul_div(value, lltv_wad, WAD, false, "oracle_max_borrow")
}

/// Convert a decimal amount to token units, rounded to
/// `min(max_places, decimals)` fractional digits (ties to even).
///
/// Non-finite and non-positive amounts map to zero.
pub fn usd_to_units(amount: f64, decimals: u8, max_places: u8) -> Result<U256, MathError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Ok(U256::ZERO);
    }
    let places = usize::from(max_places.min(decimals));
    let rendered = format!("{amount:.places$}");
    parse_units(&rendered, decimals)
}

/// Parse a plain decimal string (`"123.45"`) into units with `decimals`.
/// Extra fractional digits are truncated.
pub fn parse_units(value: &str, decimals: u8) -> Result<U256, MathError> {
    let invalid = || MathError::InvalidAmount(value.to_string());
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let keep = frac.len().min(usize::from(decimals));
    let mut digits = String::with_capacity(whole.len() + usize::from(decimals));
    digits.push_str(whole);
    digits.push_str(&frac[..keep]);
    for _ in keep..usize::from(decimals) {
        digits.push('0');
    }
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(&digits, 10).map_err(|_| invalid())
}

/// Token units as a float amount (display and USD estimates only).
pub fn units_to_f64(units: U256, decimals: u8) -> f64 {
    let raw = units.to_string().parse::<f64>().unwrap_or(0.0);
    raw / 10f64.powi(i32::from(decimals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_basis_points() {
        // 1% reduction (100 bps)
        let value = U256::from(1000u64);
        assert_eq!(apply_basis_points(value, 100), U256::from(990u64));

        // 0.5% slippage on a quote
        assert_eq!(apply_basis_points(U256::from(120u64), 50), U256::from(119u64));

        // 0% reduction
        assert_eq!(apply_basis_points(value, 0), U256::from(1000u64));
    }

    #[test]
    fn test_assets_to_shares_rounds_up() {
        // 10 * 3 / 4 = 7.5 -> 8
        let shares = assets_to_shares_up(U256::from(10u64), U256::from(4u64), U256::from(3u64)).unwrap();
        assert_eq!(shares, U256::from(8u64));

        // exact division does not round
        let shares = assets_to_shares_up(U256::from(10u64), U256::from(5u64), U256::from(5u64)).unwrap();
        assert_eq!(shares, U256::from(10u64));
    }

    #[test]
    fn test_assets_to_shares_zero_cases() {
        assert_eq!(
            assets_to_shares_up(U256::ZERO, U256::ZERO, U256::ZERO).unwrap(),
            U256::ZERO
        );
        assert_eq!(
            assets_to_shares_up(U256::ZERO, U256::from(5u64), U256::from(9u64)).unwrap(),
            U256::ZERO
        );
        assert!(matches!(
            assets_to_shares_up(U256::from(1u64), U256::ZERO, U256::from(9u64)),
            Err(MathError::ZeroTotals { .. })
        ));
        assert!(assets_to_shares_up(U256::from(1u64), U256::from(9u64), U256::ZERO).is_err());
    }

    #[test]
    fn test_shares_to_assets_rounding() {
        let (ta, ts) = (U256::from(1_000u64), U256::from(3u64));
        assert_eq!(shares_to_assets_up(U256::from(3u64), ta, ts).unwrap(), U256::from(1_000u64));
        assert_eq!(shares_to_assets_up(U256::from(1u64), ta, ts).unwrap(), U256::from(334u64));
        assert_eq!(shares_to_assets_up(U256::from(1u64), ta, U256::ZERO).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_oracle_max_borrow() {
        // 1 WETH (1e18) at 3000 USDC (1e6) per WETH, lltv 0.86
        // price = 3000e6 * 1e36 / 1e18 = 3000e24
        let collateral = WAD;
        let price = U256::from(3000u64) * pow10(24);
        let lltv = U256::from(860_000_000_000_000_000u64);
        let max = oracle_max_borrow(collateral, price, lltv).unwrap();
        assert_eq!(max, U256::from(2_580_000_000u64));
    }

    #[test]
    fn test_oracle_max_borrow_large_low_decimal_collateral() {
        // 1M WBTC (8 decimals) against an 18-decimals loan at 60,000 per BTC:
        // price = 60_000e18 * 1e36 / 1e8 = 6e50. collateral * price * lltv
        // alone would not fit in 256 bits.
        let collateral = pow10(14);
        let price = U256::from(60_000u64) * pow10(46);
        let lltv = U256::from(860_000_000_000_000_000u64);
        let max = oracle_max_borrow(collateral, price, lltv).unwrap();
        assert_eq!(max, U256::from(516u64) * pow10(26));
    }

    #[test]
    fn test_usd_to_units_stable_repay() {
        // 10,000 USD of a 6-decimals stable
        let units = usd_to_units(10_000.0, 6, 6).unwrap();
        assert_eq!(units, U256::from(10_000_000_000u64));

        let units = usd_to_units(4.0, 18, 6).unwrap();
        assert_eq!(units, U256::from(4u64) * WAD);

        assert_eq!(usd_to_units(-1.0, 6, 6).unwrap(), U256::ZERO);
        assert_eq!(usd_to_units(f64::NAN, 6, 6).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_usd_to_units_rounds_places() {
        // rounded to 8 places
        let units = usd_to_units(0.123456789123, 18, 8).unwrap();
        assert_eq!(units, U256::from(12_345_679u64) * pow10(10));

        // decimals below places
        let units = usd_to_units(1.239, 2, 8).unwrap();
        assert_eq!(units, U256::from(124u64));
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_units("7", 0).unwrap(), U256::from(7u64));
        assert_eq!(parse_units("0.1234567", 6).unwrap(), U256::from(123_456u64));
        assert!(parse_units("1e5", 6).is_err());
        assert!(parse_units("", 6).is_err());
    }

    #[test]
    fn test_units_to_f64() {
        assert!((units_to_f64(U256::from(1_500_000u64), 6) - 1.5).abs() < 1e-12);
        assert_eq!(units_to_f64(U256::ZERO, 18), 0.0);
    }

    #[test]
    fn test_oracle_scale_constant() {
        assert_eq!(ORACLE_PRICE_SCALE, pow10(36));
        assert_eq!(WAD, pow10(18));
    }
}

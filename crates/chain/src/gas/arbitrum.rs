//! Arbitrum L1 calldata surcharge.

use alloy::primitives::U256;
use serde::Serialize;

/// Gas units charged per calldata byte when every byte is non-zero.
const UNITS_PER_NONZERO_BYTE: u64 = 16;

/// Which precompile read produced the L1 fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum L1FeeMode {
    PricesPerUnit,
    L1GasPriceEstimate,
    Unavailable,
}

/// Worst-case L1 data fee for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct L1CalldataFee {
    pub mode: L1FeeMode,
    pub calldata_units: u64,
    pub fee_wei: U256,
}

pub fn calldata_units_worst_case(calldata_bytes: usize) -> u64 {
    (calldata_bytes as u64).saturating_mul(UNITS_PER_NONZERO_BYTE)
}

impl L1CalldataFee {
    /// Prefer `perL1CalldataUnitWei`; fall back to the L1 gas price estimate.
    pub fn from_prices(calldata_bytes: usize, per_unit_wei: U256, l1_gas_price_wei: Option<U256>) -> Self {
        let units = calldata_units_worst_case(calldata_bytes);
        let (mode, price) = if !per_unit_wei.is_zero() {
            (L1FeeMode::PricesPerUnit, per_unit_wei)
        } else {
            match l1_gas_price_wei {
                Some(p) if !p.is_zero() => (L1FeeMode::L1GasPriceEstimate, p),
                _ => (L1FeeMode::Unavailable, U256::ZERO),
            }
        };
        Self {
            mode,
            calldata_units: units,
            fee_wei: price.saturating_mul(U256::from(units)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            mode: L1FeeMode::Unavailable,
            calldata_units: 0,
            fee_wei: U256::ZERO,
        }
    }

    pub fn fee_usd(&self, eth_usd: f64) -> f64 {
        let wei = self.fee_wei.to_string().parse::<f64>().unwrap_or(0.0);
        wei / 1e18 * eth_usd
    }
}

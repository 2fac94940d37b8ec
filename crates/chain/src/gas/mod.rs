//! Gas pricing: EIP-1559 fee policy, safety-scaled estimates and the
//! Arbitrum L1 calldata surcharge.

mod arbitrum;
mod eip1559;

pub use arbitrum::{calldata_units_worst_case, L1CalldataFee, L1FeeMode};
pub use eip1559::Eip1559GasStrategy;

use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Fee parameters for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasParams {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    /// Base fee the parameters were derived from (for logging).
    pub base_fee: u128,
}

impl GasParams {
    /// Replace the tip, keeping the same headroom over the base fee.
    pub fn with_priority_fee(self, tip: u128) -> Self {
        let headroom = self.max_fee_per_gas.saturating_sub(self.max_priority_fee_per_gas);
        Self {
            max_fee_per_gas: headroom.saturating_add(tip),
            max_priority_fee_per_gas: tip,
            base_fee: self.base_fee,
        }
    }
}

/// Fee policy applied to outgoing transactions.
#[async_trait]
pub trait GasStrategy: Send + Sync + Debug {
    /// Fetch current fee parameters from the given RPC URL.
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams>;

    /// Write the fee fields into `tx`.
    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams);

    fn strategy_name(&self) -> &'static str;
}

/// Scale a gas price by a safety multiplier with 1/1000 precision.
///
/// Non-finite or non-positive multipliers leave the price unchanged.
pub fn scale_gas_price(gas_price: u128, multiplier: f64) -> u128 {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return gas_price;
    }
    let milli = (multiplier * 1000.0).round() as u128;
    gas_price.saturating_mul(milli) / 1000
}

/// Gas cost in ETH for `gas_limit` units at `gas_price_wei`.
pub fn gas_cost_eth(gas_price_wei: u128, gas_limit: u64) -> f64 {
    let wei = gas_price_wei.saturating_mul(u128::from(gas_limit));
    wei as f64 / 1e18
}

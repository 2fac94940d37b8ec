//! EIP-1559 fee policy with an explicit priority tip.
//!
//! Liquidations compete for inclusion, so the tip is the configured value
//! rather than the node's suggestion, and `max_fee` leaves room for base fee
//! growth between simulation and inclusion.

use super::{GasParams, GasStrategy};
use alloy::network::TransactionBuilder;
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug)]
pub struct Eip1559GasStrategy {
    /// Priority fee (tip) in wei.
    priority_fee: u128,
    /// `max_fee = base_fee * multiplier + tip`.
    max_fee_multiplier: f64,
    /// Upper bound for `max_fee_per_gas` in wei; never below the tip.
    max_fee_cap: u128,
}

impl Eip1559GasStrategy {
    pub fn new(priority_fee: u128, max_fee_multiplier: f64) -> Self {
        Self {
            priority_fee,
            max_fee_multiplier,
            max_fee_cap: 500_000_000_000, // 500 gwei
        }
    }

    pub fn with_max_fee_cap(mut self, cap: u128) -> Self {
        self.max_fee_cap = cap;
        self
    }

    /// Fee parameters for a given base fee.
    pub fn params_for_base_fee(&self, base_fee: u128) -> GasParams {
        GasParams {
            max_fee_per_gas: self.calculate_max_fee(base_fee),
            max_priority_fee_per_gas: self.priority_fee,
            base_fee,
        }
    }

    fn calculate_max_fee(&self, base_fee: u128) -> u128 {
        let scaled = ((base_fee as f64) * self.max_fee_multiplier) as u128;
        let max_fee = scaled.saturating_add(self.priority_fee);
        max_fee.min(self.max_fee_cap.max(self.priority_fee))
    }
}

#[async_trait]
impl GasStrategy for Eip1559GasStrategy {
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams> {
        use alloy::providers::{Provider, ProviderBuilder};

        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let block = provider
            .get_block_by_number(alloy::eips::BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to get latest block"))?;

        let base_fee = match block.header.base_fee_per_gas {
            Some(b) => b as u128,
            None => provider.get_gas_price().await?,
        };

        Ok(self.params_for_base_fee(base_fee))
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        tx.set_max_fee_per_gas(params.max_fee_per_gas);
        tx.set_max_priority_fee_per_gas(params.max_priority_fee_per_gas);
    }

    fn strategy_name(&self) -> &'static str {
        "EIP-1559"
    }
}

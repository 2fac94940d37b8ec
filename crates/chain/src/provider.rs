//! Read access to the chain.
//! Uses Alloy providers for type-safe RPC interactions.

use crate::contracts::{
    IArbGasInfo, IMorpho, IMorphoOracle, MarketTotals, PositionState, ARB_GAS_INFO,
    ETH_USD_FEED_ARBITRUM, MORPHO_BLUE_ARBITRUM,
};
use crate::error::with_timeout;
use crate::gas::L1CalldataFee;
use crate::oracle::{ChainlinkFeed, EthPrice};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

/// Every read the pipeline performs against the chain.
///
/// Implementations must bound each call with a timeout.
#[async_trait]
pub trait ChainReader: Send + Sync + Debug {
    async fn chain_id(&self) -> Result<u64>;

    /// Current legacy gas price in wei.
    async fn gas_price(&self) -> Result<u128>;

    /// Whether any bytecode is deployed at `address`.
    async fn has_code(&self, address: Address) -> Result<bool>;

    async fn market_totals(&self, market_id: B256) -> Result<MarketTotals>;

    async fn position(&self, market_id: B256, borrower: Address) -> Result<PositionState>;

    /// Morpho oracle price (loan units per collateral unit, 1e36 scale).
    async fn oracle_price(&self, oracle: Address) -> Result<U256>;

    /// ETH/USD with staleness evaluated at `now`.
    async fn eth_usd_price(&self, now: u64, max_age_sec: u64) -> Result<EthPrice>;

    /// Worst-case L1 data fee for a payload of `calldata_bytes`.
    async fn l1_calldata_fee(&self, calldata_bytes: usize) -> Result<L1CalldataFee>;
}

/// HTTP-backed [`ChainReader`].
#[derive(Debug, Clone)]
pub struct ProviderManager {
    rpc_url: String,
    morpho: Address,
    eth_usd_feed: Address,
    gas_info: Address,
    timeout: Duration,
}

impl ProviderManager {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            morpho: MORPHO_BLUE_ARBITRUM,
            eth_usd_feed: ETH_USD_FEED_ARBITRUM,
            gas_info: ARB_GAS_INFO,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_morpho(mut self, morpho: Address) -> Self {
        self.morpho = morpho;
        self
    }

    pub fn with_eth_usd_feed(mut self, feed: Address) -> Self {
        self.eth_usd_feed = feed;
        self
    }

    pub fn with_gas_info(mut self, gas_info: Address) -> Self {
        self.gas_info = gas_info;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn http(&self) -> Result<impl Provider> {
        Ok(ProviderBuilder::new().on_http(self.rpc_url.parse()?))
    }
}

#[async_trait]
impl ChainReader for ProviderManager {
    async fn chain_id(&self) -> Result<u64> {
        let provider = self.http()?;
        with_timeout("eth_chainId", self.timeout, provider.get_chain_id()).await
    }

    async fn gas_price(&self) -> Result<u128> {
        let provider = self.http()?;
        with_timeout("eth_gasPrice", self.timeout, provider.get_gas_price()).await
    }

    async fn has_code(&self, address: Address) -> Result<bool> {
        let provider = self.http()?;
        let code = with_timeout("eth_getCode", self.timeout, provider.get_code_at(address)).await?;
        debug!(address = %address, code_len = code.len(), "Bytecode check");
        Ok(!code.is_empty())
    }

    async fn market_totals(&self, market_id: B256) -> Result<MarketTotals> {
        let provider = self.http()?;
        let morpho = IMorpho::new(self.morpho, &provider);
        let call = morpho.market(market_id);
        let ret = with_timeout("morpho.market", self.timeout, call.call()).await?;
        Ok(ret.into())
    }

    async fn position(&self, market_id: B256, borrower: Address) -> Result<PositionState> {
        let provider = self.http()?;
        let morpho = IMorpho::new(self.morpho, &provider);
        let call = morpho.position(market_id, borrower);
        let ret = with_timeout("morpho.position", self.timeout, call.call()).await?;
        Ok(ret.into())
    }

    async fn oracle_price(&self, oracle: Address) -> Result<U256> {
        let provider = self.http()?;
        let contract = IMorphoOracle::new(oracle, &provider);
        let call = contract.price();
        let ret = with_timeout("oracle.price", self.timeout, call.call()).await?;
        Ok(ret._0)
    }

    async fn eth_usd_price(&self, now: u64, max_age_sec: u64) -> Result<EthPrice> {
        let provider = self.http()?;
        ChainlinkFeed::new(self.eth_usd_feed, self.timeout)
            .price(&provider, now, max_age_sec)
            .await
    }

    async fn l1_calldata_fee(&self, calldata_bytes: usize) -> Result<L1CalldataFee> {
        let provider = self.http()?;
        let gas_info = IArbGasInfo::new(self.gas_info, &provider);

        let prices_call = gas_info.getPricesInWei();
        let prices = with_timeout("arbGasInfo.getPricesInWei", self.timeout, prices_call.call()).await?;

        let estimate = if prices.perL1CalldataUnitWei.is_zero() {
            let estimate_call = gas_info.getL1GasPriceEstimate();
            Some(
                with_timeout("arbGasInfo.getL1GasPriceEstimate", self.timeout, estimate_call.call())
                    .await?
                    ._0,
            )
        } else {
            None
        };

        let fee = L1CalldataFee::from_prices(calldata_bytes, prices.perL1CalldataUnitWei, estimate);
        debug!(
            mode = ?fee.mode,
            units = fee.calldata_units,
            fee_wei = %fee.fee_wei,
            "L1 calldata fee estimated"
        );
        Ok(fee)
    }
}

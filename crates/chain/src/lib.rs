//! Liquidator chain interaction layer.
//!
//! This crate provides:
//! - Contract bindings for Morpho Blue, the liquidation executor, Chainlink
//!   and the Arbitrum gas-info precompile
//! - [`ChainReader`]: bounded reads (gas price, bytecode, market/position,
//!   oracle price, ETH/USD, L1 calldata fee)
//! - [`LiquidationSubmitter`]: revert-preserving simulation and broadcast
//!   with an explicit tip and gas limit
//! - EIP-1559 fee policy

pub mod contracts;
mod error;
pub mod gas;
pub mod oracle;
mod provider;
mod signer;

pub use contracts::{
    parse_market_id, LiquidationOrder, MarketParams, MarketTotals, PositionState,
    ARB_GAS_INFO, ETH_USD_FEED_ARBITRUM, MORPHO_BLUE_ARBITRUM, ORACLE_PRICE_SCALE,
};
pub use error::{with_timeout, ChainError};
pub use gas::{Eip1559GasStrategy, GasParams, GasStrategy, L1CalldataFee, L1FeeMode};
pub use oracle::{EthPrice, PriceSource};
pub use provider::{ChainReader, ProviderManager};
pub use signer::{ExecutorClient, LiquidationSubmitter, Simulation};

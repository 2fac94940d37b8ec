//! Contract bindings used by the pipeline.
//!
//! - [`morpho`]: Morpho Blue market/position reads and oracle price
//! - [`executor`]: the flash-loan liquidation executor and its order payload
//! - [`common`]: Chainlink feeds and Arbitrum gas info

pub mod common;
pub mod executor;
pub mod morpho;

pub use common::{IAggregatorV3, IArbGasInfo, ARB_GAS_INFO, ETH_USD_FEED_ARBITRUM};
pub use executor::{ILiquidationExecutor, LiquidationOrder, MarketParams};
pub use morpho::{
    parse_market_id, IMorpho, IMorphoOracle, MarketTotals, PositionState, MORPHO_BLUE_ARBITRUM,
    ORACLE_PRICE_SCALE,
};

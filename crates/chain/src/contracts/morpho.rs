//! Morpho Blue bindings and read models.

use alloy::primitives::{address, Address, B256, U256};
use alloy::sol;
use serde::{Deserialize, Serialize};

/// Morpho Blue singleton on Arbitrum One.
pub const MORPHO_BLUE_ARBITRUM: Address = address!("6c247b1F6182318877311737BaC0844bAa518F5e");

/// Scale of `IOracle.price()` (1e36).
pub const ORACLE_PRICE_SCALE: U256 =
    U256::from_limbs([0xb34b9f1000000000, 0xc097ce7bc90715, 0, 0]);

sol! {
    #[sol(rpc)]
    interface IMorpho {
        function market(bytes32 id)
            external
            view
            returns (
                uint128 totalSupplyAssets,
                uint128 totalSupplyShares,
                uint128 totalBorrowAssets,
                uint128 totalBorrowShares,
                uint128 lastUpdate,
                uint128 fee
            );

        function position(bytes32 id, address user)
            external
            view
            returns (uint256 supplyShares, uint128 borrowShares, uint128 collateral);
    }

    /// Morpho oracle: price of 1 collateral unit in loan units, scaled by 1e36.
    #[sol(rpc)]
    interface IMorphoOracle {
        function price() external view returns (uint256);
    }
}

/// Live totals of one Morpho market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTotals {
    pub total_supply_assets: U256,
    pub total_supply_shares: U256,
    pub total_borrow_assets: U256,
    pub total_borrow_shares: U256,
    pub last_update: u64,
    pub fee: U256,
}

impl MarketTotals {
    /// Borrow side is empty, so share conversions are undefined.
    pub fn has_no_borrows(&self) -> bool {
        self.total_borrow_assets.is_zero() || self.total_borrow_shares.is_zero()
    }
}

/// One borrower's position in a market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionState {
    pub supply_shares: U256,
    pub borrow_shares: U256,
    pub collateral: U256,
}

impl From<IMorpho::marketReturn> for MarketTotals {
    fn from(m: IMorpho::marketReturn) -> Self {
        Self {
            total_supply_assets: U256::from(m.totalSupplyAssets),
            total_supply_shares: U256::from(m.totalSupplyShares),
            total_borrow_assets: U256::from(m.totalBorrowAssets),
            total_borrow_shares: U256::from(m.totalBorrowShares),
            last_update: u64::try_from(m.lastUpdate).unwrap_or(u64::MAX),
            fee: U256::from(m.fee),
        }
    }
}

impl From<IMorpho::positionReturn> for PositionState {
    fn from(p: IMorpho::positionReturn) -> Self {
        Self {
            supply_shares: p.supplyShares,
            borrow_shares: U256::from(p.borrowShares),
            collateral: U256::from(p.collateral),
        }
    }
}

/// Parse a market id (`0x` + 64 hex chars).
pub fn parse_market_id(raw: &str) -> Option<B256> {
    raw.trim().parse::<B256>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_totals_from_return() {
        let ret = IMorpho::marketReturn {
            totalSupplyAssets: 1_000,
            totalSupplyShares: 1_000_000,
            totalBorrowAssets: 500,
            totalBorrowShares: 400_000,
            lastUpdate: 1_700_000_000,
            fee: 0,
        };
        let totals = MarketTotals::from(ret);
        assert_eq!(totals.total_borrow_assets, U256::from(500u64));
        assert_eq!(totals.last_update, 1_700_000_000);
        assert!(!totals.has_no_borrows());
        assert!(MarketTotals::default().has_no_borrows());
    }

    #[test]
    fn test_oracle_scale_is_1e36() {
        assert_eq!(ORACLE_PRICE_SCALE, U256::from(10u64).pow(U256::from(36u64)));
    }

    #[test]
    fn test_parse_market_id() {
        let id = format!("0x{}", "ab".repeat(32));
        assert!(parse_market_id(&id).is_some());
        assert!(parse_market_id("0x1234").is_none());
        assert!(parse_market_id("").is_none());
    }
}

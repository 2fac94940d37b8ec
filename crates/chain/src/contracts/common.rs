//! Shared interfaces: Chainlink feeds and the Arbitrum gas-info precompile.

use alloy::primitives::{address, Address};
use alloy::sol;

sol! {
    /// Chainlink AggregatorV3 (subset).
    #[sol(rpc)]
    interface IAggregatorV3 {
        function latestRoundData() external view returns (
            uint80 roundId,
            int256 answer,
            uint256 startedAt,
            uint256 updatedAt,
            uint80 answeredInRound
        );

        function decimals() external view returns (uint8);
    }

    /// Arbitrum `ArbGasInfo` precompile.
    #[sol(rpc)]
    interface IArbGasInfo {
        function getPricesInWei() external view returns (
            uint256 perL2TxWei,
            uint256 perL1CalldataUnitWei,
            uint256 perStorageAllocationWei,
            uint256 perArbGasBaseWei,
            uint256 perArbGasCongestionWei,
            uint256 perArbGasTotalWei
        );

        function getL1GasPriceEstimate() external view returns (uint256);
    }
}

/// `ArbGasInfo` precompile address.
pub const ARB_GAS_INFO: Address = address!("000000000000000000000000000000000000006C");

/// Chainlink ETH/USD on Arbitrum One.
pub const ETH_USD_FEED_ARBITRUM: Address = address!("639Fe6ab55C921f74e7fac1ee960C0B6293ba612");

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn test_selectors() {
        // keccak256("latestRoundData()")[..4]
        assert_eq!(IAggregatorV3::latestRoundDataCall::SELECTOR, [0xfe, 0xaf, 0x96, 0x8c]);
        assert_ne!(
            IArbGasInfo::getPricesInWeiCall::SELECTOR,
            IArbGasInfo::getL1GasPriceEstimateCall::SELECTOR
        );
    }

    #[test]
    fn test_precompile_address() {
        let mut expected = [0u8; 20];
        expected[19] = 0x6c;
        assert_eq!(ARB_GAS_INFO, Address::from(expected));
    }
}

//! Liquidation executor contract interface.
//!
//! The executor takes a Morpho flash loan of the loan token, liquidates the
//! borrower, swaps the seized collateral through the packed Uniswap V3 path,
//! repays the flash loan and reverts unless `minProfit` is left over.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};

sol! {
    #[sol(rpc)]
    interface ILiquidationExecutor {
        struct MarketParams {
            address loanToken;
            address collateralToken;
            address oracle;
            address irm;
            uint256 lltv;
        }

        struct Order {
            MarketParams market;
            address borrower;
            uint256 repayAssets;
            uint256 repaidShares;
            uint256 seizedAssets;
            bytes uniPath;
            uint256 amountOutMin;
            uint256 minProfit;
            uint256 deadline;
            uint256 maxTxGasPrice;
            uint16 referralCode;
            uint256 nonce;
        }

        function execute(Order calldata order) external;
    }
}

/// Morpho market descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParams {
    pub loan_token: Address,
    pub collateral_token: Address,
    pub oracle: Address,
    pub irm: Address,
    /// Liquidation LTV, WAD scaled
    pub lltv: U256,
}

/// Exact payload of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationOrder {
    pub market: MarketParams,
    pub borrower: Address,
    pub repay_assets: U256,
    pub repaid_shares: U256,
    pub seized_assets: U256,
    pub uni_path: Bytes,
    pub amount_out_min: U256,
    pub min_profit: U256,
    /// Unix seconds
    pub deadline: u64,
    pub max_tx_gas_price: U256,
    pub referral_code: u16,
    pub nonce: u64,
}

impl LiquidationOrder {
    /// Morpho takes the liquidation size either as repaid shares or as
    /// seized assets; exactly one of the two must be zero.
    pub fn has_single_size(&self) -> bool {
        self.repaid_shares.is_zero() != self.seized_assets.is_zero()
    }

    /// Copy with a fresh deadline and nonce.
    pub fn refreshed(&self, deadline: u64, nonce: u64) -> Self {
        Self {
            deadline,
            nonce,
            ..self.clone()
        }
    }

    /// ABI-encoded `execute(order)` calldata.
    pub fn calldata(&self) -> Bytes {
        ILiquidationExecutor::executeCall {
            order: self.into(),
        }
        .abi_encode()
        .into()
    }
}

impl From<&MarketParams> for ILiquidationExecutor::MarketParams {
    fn from(m: &MarketParams) -> Self {
        Self {
            loanToken: m.loan_token,
            collateralToken: m.collateral_token,
            oracle: m.oracle,
            irm: m.irm,
            lltv: m.lltv,
        }
    }
}

impl From<&LiquidationOrder> for ILiquidationExecutor::Order {
    fn from(o: &LiquidationOrder) -> Self {
        Self {
            market: (&o.market).into(),
            borrower: o.borrower,
            repayAssets: o.repay_assets,
            repaidShares: o.repaid_shares,
            seizedAssets: o.seized_assets,
            uniPath: o.uni_path.clone(),
            amountOutMin: o.amount_out_min,
            minProfit: o.min_profit,
            deadline: U256::from(o.deadline),
            maxTxGasPrice: o.max_tx_gas_price,
            referralCode: o.referral_code,
            nonce: U256::from(o.nonce),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_order() -> LiquidationOrder {
        LiquidationOrder {
            market: MarketParams {
                loan_token: Address::repeat_byte(1),
                collateral_token: Address::repeat_byte(2),
                oracle: Address::repeat_byte(3),
                irm: Address::repeat_byte(4),
                lltv: U256::from(860_000_000_000_000_000u64),
            },
            borrower: Address::repeat_byte(5),
            repay_assets: U256::from(1_000_000u64),
            repaid_shares: U256::from(999_000_000u64),
            seized_assets: U256::ZERO,
            uni_path: Bytes::from(vec![0u8; 43]),
            amount_out_min: U256::from(990_000u64),
            min_profit: U256::from(4_000_000u64),
            deadline: 1_700_000_180,
            max_tx_gas_price: U256::ZERO,
            referral_code: 0,
            nonce: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_single_size_invariant() {
        let mut order = sample_order();
        assert!(order.has_single_size());

        order.seized_assets = U256::from(1u64);
        assert!(!order.has_single_size());

        order.repaid_shares = U256::ZERO;
        assert!(order.has_single_size());

        order.seized_assets = U256::ZERO;
        assert!(!order.has_single_size());
    }

    #[test]
    fn test_refresh_only_touches_deadline_and_nonce() {
        let order = sample_order();
        let fresh = order.refreshed(42, 7);
        assert_eq!(fresh.deadline, 42);
        assert_eq!(fresh.nonce, 7);
        assert_eq!(fresh.repaid_shares, order.repaid_shares);
        assert_eq!(fresh.uni_path, order.uni_path);
    }

    #[test]
    fn test_calldata_selector_and_decode() {
        let order = sample_order();
        let data = order.calldata();
        assert_eq!(&data[..4], &ILiquidationExecutor::executeCall::SELECTOR);

        let decoded = ILiquidationExecutor::executeCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.order.borrower, order.borrower);
        assert_eq!(decoded.order.nonce, U256::from(order.nonce));
    }

    #[test]
    fn test_order_json_shape() {
        let json = serde_json::to_value(sample_order()).unwrap();
        assert!(json.get("repaidShares").is_some());
        assert!(json["market"].get("collateralToken").is_some());
        let back: LiquidationOrder = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample_order());
    }
}

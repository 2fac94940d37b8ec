//! Uniswap V3 QuoterV2 access batched through Multicall3.
//!
//! Every `quoteExactInputSingle` call in a batch is wrapped in an
//! `aggregate3` call with `allowFailure = true`, so one reverting pool never
//! hides the others and the whole batch costs one `eth_call`.

use super::{QuoteBatcher, QuoteOutcome, QuoteRequest};
use alloy::primitives::{address, Address, Uint, U160};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use alloy::sol_types::{decode_revert_reason, SolCall};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

sol! {
    #[sol(rpc)]
    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params)
            external
            returns (
                uint256 amountOut,
                uint160 sqrtPriceX96After,
                uint32 initializedTicksCrossed,
                uint256 gasEstimate
            );
    }

    #[sol(rpc)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Call3Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external
            payable
            returns (Call3Result[] memory returnData);
    }
}

/// Canonical Multicall3 deployment (same address on every EVM chain).
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Uniswap V3 contract addresses.
#[derive(Debug, Clone)]
pub struct UniswapV3Addresses {
    pub swap_router: Address,
    pub quoter_v2: Address,
    pub multicall3: Address,
}

impl UniswapV3Addresses {
    /// Uniswap V3 deployment on Arbitrum One.
    pub fn arbitrum() -> Self {
        Self {
            swap_router: address!("68b3465833fb72A70ecDF485E0e4C7bD8665Fc45"),
            quoter_v2: address!("61fFE014bA17989E743c5F6cB21bF9697530B21e"),
            multicall3: MULTICALL3,
        }
    }

    /// Override the quoter address.
    pub fn with_quoter(mut self, quoter_v2: Address) -> Self {
        self.quoter_v2 = quoter_v2;
        self
    }

    /// Override the Multicall3 address.
    pub fn with_multicall(mut self, multicall3: Address) -> Self {
        self.multicall3 = multicall3;
        self
    }
}

/// Common Uniswap V3 fee tiers in hundredths of a basis point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeTier {
    /// 0.01% - Ultra stable pairs (e.g., USDC/USDT)
    Lowest = 100,
    /// 0.05% - Stable pairs
    Low = 500,
    /// 0.3% - Standard pairs
    Medium = 3000,
    /// 1% - Exotic pairs
    High = 10000,
}

impl FeeTier {
    pub const ALL: [FeeTier; 4] = [FeeTier::Lowest, FeeTier::Low, FeeTier::Medium, FeeTier::High];

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Standard tiers followed by `extra`, de-duplicated, zero dropped, order kept.
    pub fn merged_with(extra: &[u32]) -> Vec<u32> {
        let mut out: Vec<u32> = Vec::new();
        for fee in Self::ALL.iter().map(|t| t.as_u32()).chain(extra.iter().copied()) {
            if fee > 0 && !out.contains(&fee) {
                out.push(fee);
            }
        }
        out
    }
}

/// Short tag for well-known Arbitrum intermediates, used in route mode names.
pub fn intermediate_label(token: Address) -> &'static str {
    const WETH: Address = address!("82aF49447D8a07e3bd95BD0d56f35241523fbab1");
    const USDC: Address = address!("af88d065e77c8cC2239327C5EDb3A432268e5831");
    const USDT: Address = address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9");
    const DAI: Address = address!("DA10009cBd5D07dd0CeCc66161FC93D7c9000da1");

    match token {
        t if t == WETH => "weth",
        t if t == USDC => "usdc",
        t if t == USDT => "usdt",
        t if t == DAI => "dai",
        _ => "mid",
    }
}

/// [`QuoteBatcher`] backed by QuoterV2 calls aggregated through Multicall3.
#[derive(Debug, Clone)]
pub struct MulticallQuoter {
    rpc_url: String,
    addresses: UniswapV3Addresses,
    timeout: Duration,
}

impl MulticallQuoter {
    pub fn new(rpc_url: impl Into<String>, addresses: UniswapV3Addresses) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            addresses,
            timeout: Duration::from_secs(15),
        }
    }

    /// Set the per-batch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addresses(&self) -> &UniswapV3Addresses {
        &self.addresses
    }

    fn encode_call(&self, req: &QuoteRequest) -> IMulticall3::Call3 {
        let params = IQuoterV2::QuoteExactInputSingleParams {
            tokenIn: req.token_in,
            tokenOut: req.token_out,
            amountIn: req.amount_in,
            fee: Uint::<24, 1>::from(req.fee),
            sqrtPriceLimitX96: U160::ZERO,
        };
        IMulticall3::Call3 {
            target: self.addresses.quoter_v2,
            allowFailure: true,
            callData: IQuoterV2::quoteExactInputSingleCall { params }.abi_encode().into(),
        }
    }
}

fn decode_outcome(result: &IMulticall3::Call3Result) -> QuoteOutcome {
    if !result.success {
        return Err(decode_revert_reason(&result.returnData)
            .unwrap_or_else(|| "reverted".to_string()));
    }
    IQuoterV2::quoteExactInputSingleCall::abi_decode_returns(&result.returnData, true)
        .map(|ret| ret.amountOut)
        .map_err(|e| format!("decode: {e}"))
}

#[async_trait]
impl QuoteBatcher for MulticallQuoter {
    async fn quote_batch(&self, requests: &[QuoteRequest]) -> Result<Vec<QuoteOutcome>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let calls: Vec<_> = requests.iter().map(|r| self.encode_call(r)).collect();

        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let multicall = IMulticall3::new(self.addresses.multicall3, &provider);
        let call = multicall.aggregate3(calls);

        let results = tokio::time::timeout(self.timeout, call.call())
            .await
            .map_err(|_| anyhow::anyhow!("quote batch timed out after {:?}", self.timeout))??
            .returnData;

        if results.len() != requests.len() {
            anyhow::bail!(
                "multicall returned {} results for {} calls",
                results.len(),
                requests.len()
            );
        }

        let outcomes: Vec<QuoteOutcome> = results.iter().map(decode_outcome).collect();
        debug!(
            calls = requests.len(),
            ok = outcomes.iter().filter(|o| o.is_ok()).count(),
            "Quote batch complete"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, U256};

    #[test]
    fn test_arbitrum_addresses() {
        let addrs = UniswapV3Addresses::arbitrum();
        assert_eq!(
            addrs.quoter_v2,
            "0x61fFE014bA17989E743c5F6cB21bF9697530B21e".parse::<Address>().unwrap()
        );
        assert_eq!(addrs.multicall3, MULTICALL3);
    }

    #[test]
    fn test_fee_merge_dedups_and_keeps_order() {
        assert_eq!(FeeTier::merged_with(&[500, 3000, 10000]), vec![100, 500, 3000, 10000]);
        assert_eq!(FeeTier::merged_with(&[0, 2500]), vec![100, 500, 3000, 10000, 2500]);
    }

    #[test]
    fn test_intermediate_labels() {
        let weth: Address = "0x82af49447d8a07e3bd95bd0d56f35241523fbab1".parse().unwrap();
        assert_eq!(intermediate_label(weth), "weth");
        assert_eq!(intermediate_label(Address::repeat_byte(7)), "mid");
    }

    #[test]
    fn test_decode_outcome() {
        let mut words = U256::from(42u64).to_be_bytes::<32>().to_vec();
        words.extend_from_slice(&[0u8; 96]);
        let ok = IMulticall3::Call3Result {
            success: true,
            returnData: words.into(),
        };
        assert_eq!(decode_outcome(&ok), Ok(U256::from(42u64)));

        let reverted = IMulticall3::Call3Result {
            success: false,
            returnData: Bytes::new(),
        };
        assert_eq!(decode_outcome(&reverted), Err("reverted".to_string()));
    }

    #[test]
    fn test_encode_call_targets_quoter() {
        let quoter = MulticallQuoter::new("http://localhost:8545", UniswapV3Addresses::arbitrum());
        let call = quoter.encode_call(&QuoteRequest {
            token_in: Address::repeat_byte(1),
            token_out: Address::repeat_byte(2),
            amount_in: U256::from(10u64),
            fee: 500,
        });
        assert!(call.allowFailure);
        assert_eq!(call.target, quoter.addresses().quoter_v2);
        assert_eq!(&call.callData[..4], &IQuoterV2::quoteExactInputSingleCall::SELECTOR);
    }
}

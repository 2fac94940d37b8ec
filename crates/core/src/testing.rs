//! Test doubles for the chain and quoting seams.

use alloy::primitives::{address, Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use liquidator_api::{QuoteBatcher, QuoteOutcome, QuoteRequest};
use liquidator_chain::{
    ChainReader, EthPrice, L1CalldataFee, LiquidationOrder, LiquidationSubmitter, MarketTotals,
    PositionState, PriceSource, Simulation,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) fn quoter() -> Address {
    address!("61fFE014bA17989E743c5F6cB21bF9697530B21e")
}

/// Deterministic quoter keyed by `(token_in, token_out, fee)`.
#[derive(Debug, Default)]
pub(crate) struct TableQuoter {
    table: HashMap<(Address, Address, u32), QuoteOutcome>,
}

impl TableQuoter {
    pub(crate) fn with(mut self, a: Address, b: Address, fee: u32, out: QuoteOutcome) -> Self {
        self.table.insert((a, b, fee), out);
        self
    }
}

#[async_trait]
impl QuoteBatcher for TableQuoter {
    async fn quote_batch(&self, requests: &[QuoteRequest]) -> Result<Vec<QuoteOutcome>> {
        Ok(requests
            .iter()
            .map(|r| {
                self.table
                    .get(&(r.token_in, r.token_out, r.fee))
                    .cloned()
                    .unwrap_or_else(|| Err("no pool".to_string()))
            })
            .collect())
    }
}

/// Scripted chain state.
#[derive(Debug)]
pub(crate) struct MockChain {
    pub gas_price: u128,
    pub totals: MarketTotals,
    pub position: PositionState,
    pub oracle_price: U256,
    pub fail_market_reads: bool,
    pub market_reads: AtomicUsize,
    pub gas_reads: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            gas_price: 10_000_000,
            totals: MarketTotals {
                total_supply_assets: U256::from(5_000_000_000_000u64),
                total_supply_shares: U256::from(5_000_000_000_000_000_000u128),
                // 1 asset unit = 1e6 shares, plus some accrued interest
                total_borrow_assets: U256::from(2_000_000_000_000u64),
                total_borrow_shares: U256::from(1_900_000_000_000_000_000u128),
                last_update: 1_700_000_000,
                fee: U256::ZERO,
            },
            position: PositionState {
                supply_shares: U256::ZERO,
                borrow_shares: U256::from(19_000_000_000_000_000u128),
                collateral: U256::from(5_000_000_000_000_000_000u128),
            },
            // 4000 USDC (6 dp) per wstETH (18 dp), 1e36 scale
            oracle_price: U256::from(4_000u64) * U256::from(10u64).pow(U256::from(24u64)),
            fail_market_reads: false,
            market_reads: AtomicUsize::new(0),
            gas_reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn chain_id(&self) -> Result<u64> {
        Ok(42161)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.gas_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.gas_price)
    }

    async fn has_code(&self, _address: Address) -> Result<bool> {
        Ok(true)
    }

    async fn market_totals(&self, _market_id: B256) -> Result<MarketTotals> {
        self.market_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_market_reads {
            anyhow::bail!("rpc down");
        }
        Ok(self.totals)
    }

    async fn position(&self, _market_id: B256, _borrower: Address) -> Result<PositionState> {
        Ok(self.position)
    }

    async fn oracle_price(&self, _oracle: Address) -> Result<U256> {
        Ok(self.oracle_price)
    }

    async fn eth_usd_price(&self, now: u64, max_age_sec: u64) -> Result<EthPrice> {
        Ok(EthPrice {
            usd: 2_000.0,
            source: PriceSource::Chainlink,
            stale: false,
            age_sec: 5,
            updated_at: now.saturating_sub(5),
            max_age_sec,
        })
    }

    async fn l1_calldata_fee(&self, calldata_bytes: usize) -> Result<L1CalldataFee> {
        Ok(L1CalldataFee::from_prices(calldata_bytes, U256::from(1_000_000u64), None))
    }
}

/// Submitter that replays scripted simulation outcomes and records calls.
#[derive(Debug, Default)]
pub(crate) struct MockSubmitter {
    outcomes: Mutex<VecDeque<Simulation>>,
    pub simulated: Mutex<Vec<LiquidationOrder>>,
    pub broadcasts: Mutex<Vec<(LiquidationOrder, u64, u128)>>,
}

impl MockSubmitter {
    pub(crate) fn with_outcomes(outcomes: Vec<Simulation>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LiquidationSubmitter for MockSubmitter {
    fn from_address(&self) -> Address {
        Address::repeat_byte(0xaa)
    }

    fn executor_address(&self) -> Address {
        Address::repeat_byte(0xee)
    }

    async fn simulate(&self, order: &LiquidationOrder) -> Result<Simulation> {
        self.simulated.lock().push(order.clone());
        Ok(self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(Simulation::Success { gas_limit: 900_000 }))
    }

    async fn broadcast(&self, order: &LiquidationOrder, gas_limit: u64, priority_fee_wei: u128) -> Result<B256> {
        self.broadcasts
            .lock()
            .push((order.clone(), gas_limit, priority_fee_wei));
        Ok(B256::repeat_byte(0x77))
    }
}

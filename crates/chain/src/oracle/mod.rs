//! USD reference pricing for gas cost conversion.
//!
//! The pipeline needs exactly one live price: ETH/USD, read from a Chainlink
//! aggregator. A feed older than the configured age is not rejected; it is
//! returned with `stale = true` so callers can run in degraded mode and keep
//! execution gated.

mod chainlink;

pub use chainlink::ChainlinkFeed;

use crate::error::ChainError;
use alloy::primitives::{Address, I256};
use serde::{Deserialize, Serialize};

/// Where the ETH/USD price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Chainlink,
    Env,
}

/// ETH/USD price with freshness metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthPrice {
    pub usd: f64,
    pub source: PriceSource,
    pub stale: bool,
    pub age_sec: u64,
    pub updated_at: u64,
    pub max_age_sec: u64,
}

impl EthPrice {
    /// Operator-pinned price; never stale.
    pub fn fixed(usd: f64, max_age_sec: u64) -> Self {
        Self {
            usd,
            source: PriceSource::Env,
            stale: false,
            age_sec: 0,
            updated_at: 0,
            max_age_sec,
        }
    }
}

/// Latest aggregator round.
#[derive(Debug, Clone)]
pub struct RoundData {
    pub round_id: u128,
    pub answer: I256,
    pub updated_at: u64,
    pub decimals: u8,
}

impl RoundData {
    /// Validate the round and derive a price at `now`.
    pub fn to_eth_price(&self, feed: Address, now: u64, max_age_sec: u64) -> Result<EthPrice, ChainError> {
        if self.answer <= I256::ZERO {
            return Err(ChainError::InvalidPrice {
                feed,
                reason: format!("answer={} roundId={}", self.answer, self.round_id),
            });
        }
        if self.updated_at == 0 {
            return Err(ChainError::InvalidPrice {
                feed,
                reason: "updatedAt=0".to_string(),
            });
        }

        let raw = self.answer.to_string().parse::<f64>().unwrap_or(0.0);
        let usd = raw / 10f64.powi(i32::from(self.decimals));
        if !usd.is_finite() || usd <= 0.0 {
            return Err(ChainError::InvalidPrice {
                feed,
                reason: format!("non-finite price {usd}"),
            });
        }

        let age_sec = now.saturating_sub(self.updated_at);
        Ok(EthPrice {
            usd,
            source: PriceSource::Chainlink,
            stale: age_sec > max_age_sec,
            age_sec,
            updated_at: self.updated_at,
            max_age_sec,
        })
    }
}

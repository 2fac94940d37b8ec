//! Chainlink aggregator reader.

use super::{EthPrice, RoundData};
use crate::contracts::IAggregatorV3;
use crate::error::with_timeout;
use alloy::primitives::Address;
use alloy::providers::Provider;
use anyhow::Result;
use std::time::Duration;
use tracing::warn;

/// One Chainlink price feed.
#[derive(Debug, Clone, Copy)]
pub struct ChainlinkFeed {
    feed: Address,
    timeout: Duration,
}

impl ChainlinkFeed {
    pub fn new(feed: Address, timeout: Duration) -> Self {
        Self { feed, timeout }
    }

    pub fn address(&self) -> Address {
        self.feed
    }

    /// Fetch decimals and the latest round.
    pub async fn latest_round<P: Provider>(&self, provider: &P) -> Result<RoundData> {
        let contract = IAggregatorV3::new(self.feed, provider);
        let decimals_call = contract.decimals();
        let round_call = contract.latestRoundData();

        let (decimals, round) = tokio::try_join!(
            with_timeout("feed.decimals", self.timeout, decimals_call.call()),
            with_timeout("feed.latestRoundData", self.timeout, round_call.call()),
        )?;

        Ok(RoundData {
            round_id: round.roundId.to::<u128>(),
            answer: round.answer,
            updated_at: round.updatedAt.saturating_to::<u64>(),
            decimals: decimals._0,
        })
    }

    /// Latest price in USD with staleness evaluated at `now`.
    pub async fn price<P: Provider>(&self, provider: &P, now: u64, max_age_sec: u64) -> Result<EthPrice> {
        let round = self.latest_round(provider).await?;
        let price = round.to_eth_price(self.feed, now, max_age_sec)?;
        if price.stale {
            warn!(
                feed = %self.feed,
                age_sec = price.age_sec,
                max_age_sec,
                updated_at = price.updated_at,
                "Chainlink feed is stale, pricing degraded"
            );
        }
        Ok(price)
    }
}

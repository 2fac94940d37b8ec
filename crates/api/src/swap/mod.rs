//! Swap quoting for liquidation routes.
//!
//! The [`RouteOptimizer`] searches direct and two-hop Uniswap V3 routes for a
//! single `(token_in, token_out, amount_in)` triple. Quotes are requested
//! through a [`QuoteBatcher`], which groups many `quoteExactInputSingle`
//! calls into one round-trip, so a search costs at most two batches no matter
//! how many fee tiers or intermediates are configured.
//!
//! # Example
//!
//! ```rust,ignore
//! use liquidator_api::swap::{MulticallQuoter, RouteOptimizer, RouteQuery};
//!
//! let quoter = MulticallQuoter::new(rpc_url, UniswapV3Addresses::arbitrum());
//! let optimizer = RouteOptimizer::new(Arc::new(quoter));
//! let best = optimizer.best_route(&query).await?;
//! ```

mod path;
mod uniswap_v3;

pub use path::{decode_v3_path, encode_v3_path, PathError, MAX_FEE};
pub use uniswap_v3::{intermediate_label, FeeTier, MulticallQuoter, UniswapV3Addresses};

use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::{debug, warn};

/// A single exact-input quote request against one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub fee: u32,
}

/// Outcome of one call inside a batch: the quoted output or the failure reason.
pub type QuoteOutcome = std::result::Result<U256, String>;

/// Which leg of a route a quote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteLeg {
    Single,
    Hop1,
    Hop2,
}

impl fmt::Display for QuoteLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuoteLeg::Single => "single",
            QuoteLeg::Hop1 => "hop1",
            QuoteLeg::Hop2 => "hop2",
        };
        f.write_str(s)
    }
}

/// Diagnostic record for a failed quote attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteFailure {
    pub fee: u32,
    pub leg: QuoteLeg,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub msg: String,
}

/// Best route found for a quote query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestQuote {
    /// Output of the winning route (exact integer, token_out units)
    pub amount_out: U256,
    /// Route family tag, e.g. `quoterV2_fee_500` or `quoterV2_2hop_weth_500_3000`
    pub mode: String,
    /// Ordered route tokens
    pub tokens: SmallVec<[Address; 3]>,
    /// Per-hop fee tiers
    pub fees: SmallVec<[u32; 2]>,
    /// Packed V3 path for the winning route
    pub path: Bytes,
    /// Number of quote calls issued
    pub attempts: usize,
    /// Number of quote calls that failed
    pub fails: usize,
    /// First failure seen, kept for diagnostics
    pub first_fail: Option<QuoteFailure>,
}

impl BestQuote {
    /// Whether the winner goes through an intermediate token.
    pub fn is_two_hop(&self) -> bool {
        self.fees.len() == 2
    }
}

/// Input of [`RouteOptimizer::best_route`].
#[derive(Debug, Clone)]
pub struct RouteQuery {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    /// Fee tiers tried for direct routes
    pub fee_tiers: Vec<u32>,
    /// Candidate intermediate tokens for two-hop routes
    pub intermediates: Vec<Address>,
    /// Only the first `max_fees_per_hop` tiers are tried on each two-hop leg
    pub max_fees_per_hop: usize,
}

impl RouteQuery {
    /// Create a query with no intermediates and three fees per hop.
    pub fn new(token_in: Address, token_out: Address, amount_in: U256, fee_tiers: Vec<u32>) -> Self {
        Self {
            token_in,
            token_out,
            amount_in,
            fee_tiers,
            intermediates: Vec::new(),
            max_fees_per_hop: 3,
        }
    }

    /// Set intermediate tokens for two-hop routes.
    pub fn with_intermediates(mut self, intermediates: Vec<Address>) -> Self {
        self.intermediates = intermediates;
        self
    }

    /// Set the per-hop fee cap.
    pub fn with_max_fees_per_hop(mut self, max_fees_per_hop: usize) -> Self {
        self.max_fees_per_hop = max_fees_per_hop;
        self
    }

    fn hop_fees(&self) -> &[u32] {
        let n = self.max_fees_per_hop.max(1).min(self.fee_tiers.len());
        &self.fee_tiers[..n]
    }

    fn usable_intermediates(&self) -> impl Iterator<Item = Address> + '_ {
        self.intermediates
            .iter()
            .copied()
            .filter(move |m| *m != self.token_in && *m != self.token_out)
    }
}

/// Batched read access to an exact-input quoter.
///
/// One call to `quote_batch` must cost a single network round-trip. The
/// returned vector is aligned with `requests`; a failing entry does not fail
/// the batch. An `Err` means the whole batch could not be executed.
#[async_trait]
pub trait QuoteBatcher: Send + Sync + Debug {
    async fn quote_batch(&self, requests: &[QuoteRequest]) -> Result<Vec<QuoteOutcome>>;
}

#[derive(Debug, Clone, Copy)]
enum Stage1Slot {
    Direct { fee: u32 },
    Hop1 { mid: Address, fee: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Stage2Slot {
    mid: Address,
    fee1: u32,
    fee2: u32,
}

#[derive(Default)]
struct Tally {
    attempts: usize,
    fails: usize,
    first_fail: Option<QuoteFailure>,
    best: Option<(U256, Route)>,
}

#[derive(Clone)]
enum Route {
    Direct { fee: u32 },
    TwoHop { mid: Address, fee1: u32, fee2: u32 },
}

impl Tally {
    fn fail(&mut self, leg: QuoteLeg, req: &QuoteRequest, msg: String) {
        self.fails += 1;
        if self.first_fail.is_none() {
            self.first_fail = Some(QuoteFailure {
                fee: req.fee,
                leg,
                token_in: req.token_in,
                token_out: req.token_out,
                amount_in: req.amount_in,
                msg,
            });
        }
    }

    /// Strictly greater wins, so the first route found keeps ties.
    fn offer(&mut self, amount_out: U256, route: Route) {
        if amount_out.is_zero() {
            return;
        }
        match &self.best {
            Some((best, _)) if amount_out <= *best => {}
            _ => self.best = Some((amount_out, route)),
        }
    }
}

/// Two-stage best-route search over direct and two-hop routes.
#[derive(Debug, Clone)]
pub struct RouteOptimizer {
    batcher: Arc<dyn QuoteBatcher>,
}

impl RouteOptimizer {
    pub fn new(batcher: Arc<dyn QuoteBatcher>) -> Self {
        Self { batcher }
    }

    /// One batch, rejecting results that are not aligned with `requests`.
    async fn quote_aligned(&self, requests: &[QuoteRequest]) -> Result<Vec<QuoteOutcome>> {
        let outcomes = self.batcher.quote_batch(requests).await?;
        if outcomes.len() != requests.len() {
            anyhow::bail!(
                "quote batch returned {} outcomes for {} requests",
                outcomes.len(),
                requests.len()
            );
        }
        Ok(outcomes)
    }

    /// Find the route with the largest output for `query`.
    ///
    /// Returns `Ok(None)` when every route failed or quoted zero. Errors only
    /// when the first batch cannot be executed at all or comes back
    /// misaligned. A broken second batch counts every second hop as failed.
    pub async fn best_route(&self, query: &RouteQuery) -> Result<Option<BestQuote>> {
        let mut tally = Tally::default();

        // Stage 1: every direct quote plus every first hop.
        let mut slots = Vec::new();
        let mut requests = Vec::new();
        for &fee in &query.fee_tiers {
            slots.push(Stage1Slot::Direct { fee });
            requests.push(QuoteRequest {
                token_in: query.token_in,
                token_out: query.token_out,
                amount_in: query.amount_in,
                fee,
            });
        }
        for mid in query.usable_intermediates() {
            for &fee in query.hop_fees() {
                slots.push(Stage1Slot::Hop1 { mid, fee });
                requests.push(QuoteRequest {
                    token_in: query.token_in,
                    token_out: mid,
                    amount_in: query.amount_in,
                    fee,
                });
            }
        }

        if requests.is_empty() {
            return Ok(None);
        }

        let outcomes = self.quote_aligned(&requests).await?;
        let mut seeds: Vec<(Address, u32, U256)> = Vec::new();

        for ((slot, req), outcome) in slots.iter().zip(&requests).zip(outcomes) {
            tally.attempts += 1;
            let leg = match slot {
                Stage1Slot::Direct { .. } => QuoteLeg::Single,
                Stage1Slot::Hop1 { .. } => QuoteLeg::Hop1,
            };
            match (slot, outcome) {
                (_, Err(msg)) => tally.fail(leg, req, msg),
                (Stage1Slot::Direct { fee }, Ok(out)) => tally.offer(out, Route::Direct { fee: *fee }),
                (Stage1Slot::Hop1 { mid, fee }, Ok(out)) => {
                    if !out.is_zero() {
                        seeds.push((*mid, *fee, out));
                    }
                }
            }
        }

        // Stage 2: second hops seeded with each positive first-hop output.
        if !seeds.is_empty() {
            let mut slots = Vec::new();
            let mut requests = Vec::new();
            for &(mid, fee1, amount) in &seeds {
                for &fee2 in query.hop_fees() {
                    slots.push(Stage2Slot { mid, fee1, fee2 });
                    requests.push(QuoteRequest {
                        token_in: mid,
                        token_out: query.token_out,
                        amount_in: amount,
                        fee: fee2,
                    });
                }
            }

            match self.quote_aligned(&requests).await {
                Ok(outcomes) => {
                    for ((slot, req), outcome) in slots.iter().zip(&requests).zip(outcomes) {
                        tally.attempts += 1;
                        match outcome {
                            Ok(out) => tally.offer(
                                out,
                                Route::TwoHop {
                                    mid: slot.mid,
                                    fee1: slot.fee1,
                                    fee2: slot.fee2,
                                },
                            ),
                            Err(msg) => tally.fail(QuoteLeg::Hop2, req, msg),
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, calls = requests.len(), "Second-hop quote batch failed");
                    for req in &requests {
                        tally.attempts += 1;
                        tally.fail(QuoteLeg::Hop2, req, e.to_string());
                    }
                }
            }
        }

        let Tally {
            attempts,
            fails,
            first_fail,
            best,
        } = tally;

        let Some((amount_out, route)) = best else {
            debug!(
                token_in = %query.token_in,
                token_out = %query.token_out,
                attempts,
                fails,
                "No route with positive output"
            );
            return Ok(None);
        };

        let (tokens, fees, mode): (SmallVec<[Address; 3]>, SmallVec<[u32; 2]>, String) = match route {
            Route::Direct { fee } => (
                SmallVec::from_slice(&[query.token_in, query.token_out]),
                SmallVec::from_slice(&[fee]),
                format!("quoterV2_fee_{fee}"),
            ),
            Route::TwoHop { mid, fee1, fee2 } => (
                SmallVec::from_slice(&[query.token_in, mid, query.token_out]),
                SmallVec::from_slice(&[fee1, fee2]),
                format!("quoterV2_2hop_{}_{fee1}_{fee2}", intermediate_label(mid)),
            ),
        };
        let path = encode_v3_path(&tokens, &fees)?;

        debug!(
            mode = %mode,
            amount_out = %amount_out,
            attempts,
            fails,
            "Best route selected"
        );

        Ok(Some(BestQuote {
            amount_out,
            mode,
            tokens,
            fees,
            path,
            attempts,
            fails,
            first_fail,
        }))
    }
}

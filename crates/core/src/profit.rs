//! Profitability engine.
//!
//! Turns each watched candidate into an [`Opportunity`]: repay size, bonus
//! factor, a quoted (or modelled) gross profit, and the cost lines that bring
//! it down to a net-USD verdict. Candidates are evaluated on a bounded pool
//! and the rows are re-sorted by net profit before they leave this module.

use crate::candidate::Candidate;
use crate::config::{ProfitConfig, QuoteConfig};
use crate::error::{LiquidatorError, Result};
use crate::u256_math::{units_to_f64, usd_to_units};
use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use liquidator_api::{CandidateReason, CandidateStatus, FeeTier, RouteOptimizer, RouteQuery};
use liquidator_chain::gas::{gas_cost_eth, scale_gas_price};
use liquidator_chain::{ChainReader, EthPrice, L1CalldataFee};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info, instrument, warn};

/// Quote mode of a row priced from the bonus model.
pub const MODE_MODEL: &str = "model_bps";

/// Quote mode of a row whose quoting found no route.
pub const MODE_NO_ROUTE: &str = "no_route";

/// Gross profit booked for a quoted candidate without any route.
pub const NO_ROUTE_GROSS_USD: f64 = -1e9;

/// Fractional digits kept when sizing the collateral swap input.
const SEIZED_AMOUNT_PLACES: u8 = 8;

pub const NOTE_PRICING_DEGRADED: &str = "pricing_degraded: blocked for exec";
pub const NOTE_NO_QUOTE: &str = "v0: NO_QUOTE (not executable)";
pub const NOTE_QUOTED_PASS: &str = "v0: QUOTED_PASS";
pub const NOTE_QUOTED_FAIL: &str = "v0: QUOTED_FAIL";

/// Live inputs shared by every evaluation of one run.
#[derive(Debug, Clone)]
pub struct PricingContext {
    pub now: DateTime<Utc>,
    pub eth_price: EthPrice,
    /// Raw `eth_gasPrice`, before the safety multiplier
    pub gas_price_wei: u128,
    /// Quoting enabled and QuoterV2 bytecode present
    pub quoter_ok: bool,
    pub l1_fee: Option<L1CalldataFee>,
}

impl PricingContext {
    /// Gather the run inputs from the chain.
    ///
    /// A pinned `eth_price_usd` bypasses the feed. The L1 fee read is best
    /// effort; every other failure is transient.
    pub async fn fetch(
        reader: &dyn ChainReader,
        profit: &ProfitConfig,
        quote_enabled: bool,
        quoter: Address,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let now_secs = now.timestamp().max(0) as u64;
        let eth_price = match profit.eth_price_usd {
            Some(usd) => EthPrice::fixed(usd, profit.eth_usd_max_age_secs),
            None => reader
                .eth_usd_price(now_secs, profit.eth_usd_max_age_secs)
                .await
                .map_err(LiquidatorError::Transient)?,
        };

        let gas_price_wei = reader.gas_price().await.map_err(LiquidatorError::Transient)?;

        let quoter_ok = if quote_enabled {
            reader.has_code(quoter).await.map_err(LiquidatorError::Transient)?
        } else {
            false
        };
        if quote_enabled && !quoter_ok {
            warn!(quoter = %quoter, "QuoterV2 has no bytecode; quoting disabled for this run");
        }

        let l1_fee = if profit.include_l1_fee {
            match reader.l1_calldata_fee(profit.calldata_bytes).await {
                Ok(fee) => Some(fee),
                Err(e) => {
                    warn!(error = %e, "L1 calldata fee unavailable");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            now,
            eth_price,
            gas_price_wei,
            quoter_ok,
            l1_fee,
        })
    }

    pub fn pricing_degraded(&self) -> bool {
        self.eth_price.stale
    }
}

/// One evaluated candidate (a row of `opportunities.csv`).
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub ts: DateTime<Utc>,
    pub candidate_id: String,
    pub market_id: B256,
    pub borrower: Address,
    pub collateral_token: Address,
    pub loan_token: Address,
    pub oracle: Option<Address>,
    pub irm: Option<Address>,
    pub lltv_wad: Option<U256>,
    pub collateral_symbol: String,
    pub loan_symbol: String,
    pub status: CandidateStatus,
    pub reason: CandidateReason,
    pub lltv: Option<f64>,
    pub proximity: Option<f64>,
    pub repay_usd: f64,
    pub lif: f64,
    pub gross_profit_usd: f64,
    pub estimated_gas_usd: f64,
    pub flash_fee_usd: f64,
    pub slippage_usd: f64,
    pub net_profit_usd: f64,
    pub required_net_usd: f64,
    pub quote_mode: String,
    pub uni_path: Option<Bytes>,
    pub is_quoted: bool,
    pub pass_quoted: bool,
    pub pass_exec: bool,
    pub pass_model: bool,
    pub amount_in_collat: Option<U256>,
    pub amount_out_loan: Option<U256>,
    pub amount_out_usd_adj: Option<f64>,
    pub pass: bool,
    pub note: String,
}

/// Result of [`ProfitEngine::evaluate`].
#[derive(Debug, Clone)]
pub enum Evaluation {
    Scored(Box<Opportunity>),
    /// Pair on the denylist; counted, never priced
    Unsupported,
}

/// Per-run counters written to `tx_sim.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDiagnostics {
    pub passes_quoted: usize,
    pub passes_exec: usize,
    pub diag_exec_pass: u8,
    pub best_quoted_net: Option<f64>,
    pub best_quoted_mode: String,
    pub best_exec_net: Option<f64>,
    pub best_exec_mode: String,
    pub skipped_unsupported: usize,
    pub considered: usize,
    pub produced: usize,
}

/// `tx_sim.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub generated_at: DateTime<Utc>,
    pub required_net_usd: f64,
    pub quote_enabled: bool,
    pub quoter_ok: bool,
    pub estimated_gas_usd: f64,
    #[serde(default)]
    pub l1_fee_usd: Option<f64>,
    pub eth_price: EthPrice,
    pub pricing_degraded: bool,
    pub allow_exec_with_degraded_pricing: bool,
    pub diagnostics: SimulationDiagnostics,
}

/// Rows (sorted by net profit, best first) plus the run summary.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub opportunities: Vec<Opportunity>,
    pub summary: SimulationSummary,
}

/// Bonus factor from the liquidation LTV:
/// `clamp(beta / lltv + (1 - beta), 1, cap)`, and 1.0 outside `(0, 1.5)`.
pub fn liquidation_incentive(lltv: Option<f64>, beta: f64, cap: f64) -> f64 {
    match lltv {
        Some(l) if l.is_finite() && l > 0.0 && l < 1.5 => {
            let lif = beta * (1.0 / l) + (1.0 - beta);
            lif.max(1.0).min(cap)
        }
        _ => 1.0,
    }
}

fn bps(value: f64, bps: u16) -> f64 {
    value * (f64::from(bps) / 10_000.0)
}

fn by_net_desc(a: &Opportunity, b: &Opportunity) -> Ordering {
    b.net_profit_usd
        .partial_cmp(&a.net_profit_usd)
        .unwrap_or(Ordering::Equal)
}

/// Outcome of the pricing step before costs.
struct Gross {
    mode: String,
    gross_usd: f64,
    slippage_usd: f64,
    path: Option<Bytes>,
    amount_in: Option<U256>,
    amount_out: Option<U256>,
    amount_out_usd_adj: Option<f64>,
}

/// Evaluates candidates against live prices and quotes.
#[derive(Debug, Clone)]
pub struct ProfitEngine {
    profit: ProfitConfig,
    quote: QuoteConfig,
    /// Candidates below this proximity are never quoted
    quote_proximity_cutoff: f64,
    optimizer: RouteOptimizer,
}

impl ProfitEngine {
    pub fn new(profit: ProfitConfig, quote: QuoteConfig, quote_proximity_cutoff: f64, optimizer: RouteOptimizer) -> Self {
        Self {
            profit,
            quote,
            quote_proximity_cutoff,
            optimizer,
        }
    }

    /// Gas line of every row: scaled L2 gas plus, optionally, the L1 fee.
    pub fn estimated_gas_usd(&self, ctx: &PricingContext) -> f64 {
        let adjusted = scale_gas_price(ctx.gas_price_wei, self.profit.gas_price_multiplier);
        let l2 = gas_cost_eth(adjusted, self.profit.gas_limit) * ctx.eth_price.usd;
        let l1 = ctx
            .l1_fee
            .as_ref()
            .filter(|_| self.profit.include_l1_fee)
            .map(|fee| fee.fee_usd(ctx.eth_price.usd))
            .unwrap_or(0.0);
        l2 + l1
    }

    fn can_quote(&self, c: &Candidate, ctx: &PricingContext) -> bool {
        self.quote.enabled
            && ctx.quoter_ok
            && c.collateral_price_usd.is_some()
            && c.loan_price_usd.is_some()
            && c.proximity.is_some_and(|p| p >= self.quote_proximity_cutoff)
    }

    async fn quoted_gross(&self, c: &Candidate, repay_usd: f64, lif: f64) -> Gross {
        let slippage_bps = self.profit.slippage_bps;
        let (Some(collateral_px), Some(loan_px)) = (c.collateral_price_usd, c.loan_price_usd) else {
            return self.no_route(None);
        };

        let seized_tokens = repay_usd * lif / collateral_px;
        let amount_in = match usd_to_units(seized_tokens, c.collateral_decimals, SEIZED_AMOUNT_PLACES) {
            Ok(v) if !v.is_zero() => v,
            Ok(_) => return self.no_route(None),
            Err(e) => {
                debug!(candidate_id = %c.candidate_id, error = %e, "Seized amount not representable");
                return self.no_route(None);
            }
        };

        let query = RouteQuery::new(
            c.collateral_token,
            c.loan_token,
            amount_in,
            FeeTier::merged_with(&self.quote.fee_tiers),
        )
        .with_intermediates(self.quote.intermediates.clone())
        .with_max_fees_per_hop(self.quote.max_fees_per_hop);

        let best = match self.optimizer.best_route(&query).await {
            Ok(Some(best)) if !best.amount_out.is_zero() => best,
            Ok(_) => return self.no_route(Some(amount_in)),
            Err(e) => {
                debug!(candidate_id = %c.candidate_id, error = %e, "Route search failed");
                return self.no_route(Some(amount_in));
            }
        };

        if let Some(fail) = &best.first_fail {
            debug!(
                candidate_id = %c.candidate_id,
                attempts = best.attempts,
                fails = best.fails,
                first_fail_leg = %fail.leg,
                first_fail_fee = fail.fee,
                first_fail = %fail.msg,
                "Some quote attempts failed"
            );
        }

        let out_usd = units_to_f64(best.amount_out, c.loan_decimals) * loan_px;
        let out_usd_adj = out_usd * (1.0 - f64::from(slippage_bps) / 10_000.0);
        Gross {
            mode: best.mode,
            gross_usd: out_usd_adj - repay_usd,
            slippage_usd: out_usd - out_usd_adj,
            path: Some(best.path),
            amount_in: Some(amount_in),
            amount_out: Some(best.amount_out),
            amount_out_usd_adj: Some(out_usd_adj),
        }
    }

    fn no_route(&self, amount_in: Option<U256>) -> Gross {
        Gross {
            mode: MODE_NO_ROUTE.to_string(),
            gross_usd: NO_ROUTE_GROSS_USD,
            slippage_usd: 0.0,
            path: None,
            amount_in,
            amount_out: None,
            amount_out_usd_adj: None,
        }
    }

    fn modelled_gross(&self, repay_usd: f64, lif: f64) -> Gross {
        Gross {
            mode: MODE_MODEL.to_string(),
            gross_usd: repay_usd * (lif - 1.0),
            slippage_usd: bps(repay_usd, self.profit.slippage_bps),
            path: None,
            amount_in: None,
            amount_out: None,
            amount_out_usd_adj: None,
        }
    }

    /// Price one candidate.
    #[instrument(skip(self, c, ctx), fields(candidate_id = %c.candidate_id))]
    pub async fn evaluate(&self, c: &Candidate, ctx: &PricingContext) -> Evaluation {
        if c.is_unsupported() {
            debug!(
                collateral = %c.collateral_symbol,
                loan = %c.loan_symbol,
                "Skipping unsupported pair"
            );
            return Evaluation::Unsupported;
        }

        let cfg = &self.profit;
        let required_net_usd = cfg.required_net_usd();
        let repay_usd = c
            .borrow_usd
            .map(|b| b.min(cfg.max_repay_usd))
            .unwrap_or(cfg.max_repay_usd);
        let lif = liquidation_incentive(c.lltv, cfg.lif_beta, cfg.lif_cap);
        let flash_fee_usd = bps(repay_usd, cfg.flash_fee_bps);
        let estimated_gas_usd = self.estimated_gas_usd(ctx);

        let gross = if self.can_quote(c, ctx) {
            self.quoted_gross(c, repay_usd, lif).await
        } else {
            self.modelled_gross(repay_usd, lif)
        };

        let net_profit_usd = gross.gross_usd - estimated_gas_usd - flash_fee_usd - gross.slippage_usd;
        let is_quoted = gross.mode != MODE_MODEL && gross.mode != MODE_NO_ROUTE && gross.amount_out.is_some();
        let degraded_blocked = ctx.pricing_degraded() && !cfg.allow_exec_with_degraded_pricing;
        let pass_quoted = !degraded_blocked && is_quoted && net_profit_usd >= required_net_usd;
        let pass_model = gross.mode == MODE_MODEL && net_profit_usd >= required_net_usd;

        let note = if degraded_blocked {
            NOTE_PRICING_DEGRADED
        } else if !is_quoted {
            NOTE_NO_QUOTE
        } else if pass_quoted {
            NOTE_QUOTED_PASS
        } else {
            NOTE_QUOTED_FAIL
        };

        debug!(
            mode = %gross.mode,
            repay_usd,
            lif,
            gross_profit_usd = gross.gross_usd,
            net_profit_usd,
            pass = pass_quoted,
            "Candidate evaluated"
        );

        Evaluation::Scored(Box::new(Opportunity {
            ts: ctx.now,
            candidate_id: c.candidate_id.clone(),
            market_id: c.market_id,
            borrower: c.borrower,
            collateral_token: c.collateral_token,
            loan_token: c.loan_token,
            oracle: c.oracle,
            irm: c.irm,
            lltv_wad: c.lltv_wad,
            collateral_symbol: c.collateral_symbol.clone(),
            loan_symbol: c.loan_symbol.clone(),
            status: c.status,
            reason: c.reason,
            lltv: c.lltv,
            proximity: c.proximity,
            repay_usd,
            lif,
            gross_profit_usd: gross.gross_usd,
            estimated_gas_usd,
            flash_fee_usd,
            slippage_usd: gross.slippage_usd,
            net_profit_usd,
            required_net_usd,
            quote_mode: gross.mode,
            uni_path: gross.path,
            is_quoted,
            pass_quoted,
            pass_exec: pass_quoted,
            pass_model,
            amount_in_collat: gross.amount_in,
            amount_out_loan: gross.amount_out,
            amount_out_usd_adj: gross.amount_out_usd_adj,
            pass: pass_quoted,
            note: note.to_string(),
        }))
    }

    /// Evaluate every watchable candidate on a pool of `quote.concurrency`
    /// workers and sort the rows by net profit, best first.
    pub async fn evaluate_all(&self, candidates: &[Candidate], ctx: &PricingContext) -> SimulationReport {
        let watched: Vec<&Candidate> = candidates.iter().filter(|c| c.is_watchable()).collect();
        let considered = watched.len();
        let workers = self.quote.concurrency.max(1);

        info!(
            considered,
            workers,
            gas_price_wei = ctx.gas_price_wei,
            estimated_gas_usd = self.estimated_gas_usd(ctx),
            eth_usd = ctx.eth_price.usd,
            pricing_degraded = ctx.pricing_degraded(),
            quoter_ok = ctx.quoter_ok,
            "Evaluating candidates"
        );

        let evaluations: Vec<Evaluation> = stream::iter(watched)
            .map(|c| self.evaluate(c, ctx))
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut skipped_unsupported = 0usize;
        let mut opportunities = Vec::with_capacity(evaluations.len());
        for evaluation in evaluations {
            match evaluation {
                Evaluation::Scored(opp) => opportunities.push(*opp),
                Evaluation::Unsupported => skipped_unsupported += 1,
            }
        }
        opportunities.sort_by(|a, b| by_net_desc(a, b).then_with(|| a.candidate_id.cmp(&b.candidate_id)));

        let diagnostics = diagnose(&opportunities, considered, skipped_unsupported);
        info!(
            considered,
            produced = diagnostics.produced,
            skipped_unsupported,
            passes_quoted = diagnostics.passes_quoted,
            passes_exec = diagnostics.passes_exec,
            best_quoted_net = ?diagnostics.best_quoted_net,
            best_exec_mode = %diagnostics.best_exec_mode,
            "Simulation complete"
        );

        let summary = SimulationSummary {
            generated_at: ctx.now,
            required_net_usd: self.profit.required_net_usd(),
            quote_enabled: self.quote.enabled,
            quoter_ok: ctx.quoter_ok,
            estimated_gas_usd: self.estimated_gas_usd(ctx),
            l1_fee_usd: ctx
                .l1_fee
                .as_ref()
                .map(|fee| fee.fee_usd(ctx.eth_price.usd)),
            eth_price: ctx.eth_price.clone(),
            pricing_degraded: ctx.pricing_degraded(),
            allow_exec_with_degraded_pricing: self.profit.allow_exec_with_degraded_pricing,
            diagnostics,
        };

        SimulationReport {
            opportunities,
            summary,
        }
    }
}

fn diagnose(rows: &[Opportunity], considered: usize, skipped_unsupported: usize) -> SimulationDiagnostics {
    let mut d = SimulationDiagnostics {
        best_quoted_mode: "none".to_string(),
        best_exec_mode: "none".to_string(),
        skipped_unsupported,
        considered,
        produced: rows.len(),
        ..Default::default()
    };

    for row in rows {
        let net = row.net_profit_usd;
        if row.pass_quoted {
            d.passes_quoted += 1;
        }
        if row.pass_exec {
            d.passes_exec += 1;
        }
        if !net.is_finite() {
            continue;
        }
        if row.is_quoted && d.best_quoted_net.map_or(true, |best| net > best) {
            d.best_quoted_net = Some(net);
            d.best_quoted_mode = row.quote_mode.clone();
        }
        if row.pass_exec && d.best_exec_net.map_or(true, |best| net > best) {
            d.best_exec_net = Some(net);
            d.best_exec_mode = row.quote_mode.clone();
        }
    }
    d.diag_exec_pass = u8::from(d.passes_exec > 0);
    d
}

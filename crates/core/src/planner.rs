//! Execution planning: order building and EXEC/WATCH/SKIP triage.
//!
//! The planner ranks quoted, passing rows by net profit, builds exact
//! [`LiquidationOrder`]s for the top N and annotates every other row with
//! the reason it is not executable.

use crate::candidate::Candidate;
use crate::config::{PlanConfig, ProfitConfig};
use crate::cooldown::CooldownStore;
use crate::error::{LiquidatorError, Result};
use crate::profit::Opportunity;
use crate::u256_math::{apply_basis_points, assets_to_shares_up, usd_to_units};
use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use liquidator_api::{encode_v3_path, CandidateStatus};
use liquidator_chain::{ChainReader, LiquidationOrder, MarketParams, MarketTotals};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Fractional digits kept when converting USD intents to loan units.
const ORDER_AMOUNT_PLACES: u8 = 6;

pub const NOTE_EXEC_WITH_ORDER: &str = "EXEC_READY_WITH_ORDER";
pub const NOTE_ORDER_BUILD_FAILED: &str = "ORDER_BUILD_FAILED: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanAction {
    Exec,
    Watch,
    Skip,
}

/// One row of `tx_plan.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanItem {
    pub ts: DateTime<Utc>,
    pub candidate_id: String,
    pub market_id: B256,
    pub borrower: Address,
    pub net_profit_usd: f64,
    pub proximity: Option<f64>,
    pub action: PlanAction,
    pub pass: bool,
    pub note: String,
    /// Present only on `EXEC` items that passed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<LiquidationOrder>,
}

impl PlanItem {
    pub fn is_executable(&self) -> bool {
        self.action == PlanAction::Exec && self.pass && self.order.is_some()
    }
}

/// `tx_plan.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub exec_built: usize,
    #[serde(default)]
    pub exec_downgraded: usize,
    pub items: Vec<PlanItem>,
}

impl Plan {
    pub fn exec_count(&self) -> usize {
        self.items.iter().filter(|i| i.action == PlanAction::Exec).count()
    }

    /// Age at `now`; a plan from the future counts as fresh.
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.generated_at).to_std().unwrap_or_default()
    }
}

fn fee_tag() -> Option<&'static Regex> {
    static FEE_TAG: OnceLock<Option<Regex>> = OnceLock::new();
    FEE_TAG
        .get_or_init(|| Regex::new(r"(?i)fee_(\d+)").ok())
        .as_ref()
}

/// First `fee_<n>` tag of a quote mode, e.g. `quoterV2_fee_500` -> 500.
pub fn parse_fee_from_mode(mode: &str) -> Option<u32> {
    fee_tag()?
        .captures(mode)?
        .get(1)?
        .as_str()
        .parse::<u32>()
        .ok()
        .filter(|fee| *fee > 0)
}

/// Converts an approved opportunity into the exact executor payload.
#[derive(Debug, Clone)]
pub struct OrderBuilder {
    slippage_bps: u16,
    deadline_secs: u64,
    max_tx_gas_price: U256,
    referral_code: u16,
}

impl OrderBuilder {
    pub fn new(slippage_bps: u16, deadline_secs: u64, max_tx_gas_price_wei: u64, referral_code: u16) -> Self {
        Self {
            slippage_bps,
            deadline_secs: deadline_secs.max(60),
            max_tx_gas_price: U256::from(max_tx_gas_price_wei),
            referral_code,
        }
    }

    pub fn from_config(profit: &ProfitConfig, plan: &PlanConfig, max_tx_gas_price_wei: u64) -> Self {
        Self::new(
            profit.slippage_bps,
            plan.order_deadline_secs(),
            max_tx_gas_price_wei,
            plan.referral_code,
        )
    }

    /// USD amount in loan-token units: 1:1 for USD stables, else via the
    /// loan token's USD price.
    fn loan_units(&self, usd: f64, c: &Candidate) -> Result<U256> {
        let tokens = if c.has_loan_stable() {
            usd
        } else {
            let px = c
                .loan_price_usd
                .ok_or_else(|| LiquidatorError::invalid("missing/invalid loanPriceUsd for non-stable loan"))?;
            usd / px
        };
        Ok(usd_to_units(tokens, c.loan_decimals, ORDER_AMOUNT_PLACES)?)
    }

    fn route(&self, opp: &Opportunity, c: &Candidate) -> Result<Bytes> {
        if let Some(path) = opp.uni_path.as_ref().filter(|p| !p.is_empty()) {
            return Ok(path.clone());
        }
        let fee = parse_fee_from_mode(&opp.quote_mode).ok_or_else(|| {
            LiquidatorError::invalid(format!(
                "missing uniPath and cannot parse fee from quoteMode={}",
                opp.quote_mode
            ))
        })?;
        encode_v3_path(&[c.collateral_token, c.loan_token], &[fee])
            .map_err(|e| LiquidatorError::invalid(format!("route encoding: {e}")))
    }

    /// Build the payload, or reject with the reason.
    pub fn build_order(
        &self,
        opp: &Opportunity,
        c: &Candidate,
        totals: &MarketTotals,
        now: DateTime<Utc>,
    ) -> Result<LiquidationOrder> {
        if !opp.repay_usd.is_finite() || opp.repay_usd <= 0.0 {
            return Err(LiquidatorError::invalid(format!("bad repayUsd={}", opp.repay_usd)));
        }
        if !opp.required_net_usd.is_finite() || opp.required_net_usd < 0.0 {
            return Err(LiquidatorError::invalid(format!(
                "bad requiredNetUsd={}",
                opp.required_net_usd
            )));
        }
        let amount_out = opp
            .amount_out_loan
            .ok_or_else(|| LiquidatorError::invalid("missing amountOutLoan"))?;

        let repay_assets = self.loan_units(opp.repay_usd, c)?;
        let min_profit = self.loan_units(opp.required_net_usd, c)?;
        if repay_assets.is_zero() {
            return Err(LiquidatorError::invalid("repayAssets=0"));
        }

        let amount_out_min = apply_basis_points(amount_out, self.slippage_bps);

        if totals.has_no_borrows() {
            return Err(LiquidatorError::invalid("market totals borrow==0 (cannot compute shares)"));
        }
        let repay_capped = repay_assets.min(totals.total_borrow_assets);
        let repaid_shares = assets_to_shares_up(
            repay_capped,
            totals.total_borrow_assets,
            totals.total_borrow_shares,
        )?;
        if repaid_shares.is_zero() {
            return Err(LiquidatorError::invalid("repaidShares=0"));
        }

        let uni_path = self.route(opp, c)?;

        let (Some(oracle), Some(irm)) = (c.oracle, c.irm) else {
            return Err(LiquidatorError::invalid("missing oracle/irm in candidates"));
        };
        let lltv = c
            .lltv_wad
            .ok_or_else(|| LiquidatorError::invalid("missing lltvWad in candidates"))?;

        let now_secs = now.timestamp().max(0) as u64;
        Ok(LiquidationOrder {
            market: MarketParams {
                loan_token: c.loan_token,
                collateral_token: c.collateral_token,
                oracle,
                irm,
                lltv,
            },
            borrower: c.borrower,
            repay_assets: repay_capped,
            repaid_shares,
            seized_assets: U256::ZERO,
            uni_path,
            amount_out_min,
            min_profit,
            deadline: now_secs + self.deadline_secs,
            max_tx_gas_price: self.max_tx_gas_price,
            referral_code: self.referral_code,
            nonce: now.timestamp_millis().max(0) as u64,
        })
    }
}

/// Why a row may or may not be considered for execution.
#[derive(Debug, Clone, PartialEq)]
enum Eligibility {
    Eligible,
    Cooldown { remaining_secs: u64 },
    Stale { age_secs: f64 },
    NoQuote,
    ExecFilter,
    BelowWatch { proximity: Option<f64> },
}

struct Triage<'a> {
    row: &'a Opportunity,
    eligibility: Eligibility,
    exec_candidate: bool,
}

/// Produces the execution plan from evaluated rows.
#[derive(Debug)]
pub struct Planner {
    config: PlanConfig,
    builder: OrderBuilder,
    chain: Arc<dyn ChainReader>,
    cooldown: Arc<dyn CooldownStore>,
}

impl Planner {
    pub fn new(
        config: PlanConfig,
        builder: OrderBuilder,
        chain: Arc<dyn ChainReader>,
        cooldown: Arc<dyn CooldownStore>,
    ) -> Self {
        Self {
            config,
            builder,
            chain,
            cooldown,
        }
    }

    fn triage<'a>(&self, row: &'a Opportunity, cooldown: &HashMap<String, u64>, now: DateTime<Utc>) -> Triage<'a> {
        let now_ms = now.timestamp_millis().max(0) as u64;
        let age_secs = (now - row.ts).num_milliseconds() as f64 / 1000.0;
        let watch_ok = row.proximity.is_some_and(|p| p >= self.config.watch_proximity);
        let exec_ok = row.proximity.is_some_and(|p| p >= self.config.exec_proximity);
        let cooling = self.cooldown.remaining(cooldown, &row.candidate_id, now_ms);

        let eligibility = match cooling {
            Some(rem) if row.pass_exec => Eligibility::Cooldown {
                remaining_secs: rem.as_secs(),
            },
            _ if age_secs > self.config.max_opportunity_age_secs as f64 => Eligibility::Stale { age_secs },
            _ if !row.is_quoted => Eligibility::NoQuote,
            _ if !row.pass_exec => Eligibility::ExecFilter,
            _ if !watch_ok => Eligibility::BelowWatch {
                proximity: row.proximity,
            },
            _ => Eligibility::Eligible,
        };

        Triage {
            row,
            eligibility,
            exec_candidate: (row.status == CandidateStatus::ExecReady || row.pass_exec) && exec_ok,
        }
    }

    fn describe(&self, t: &Triage<'_>) -> (PlanAction, String) {
        let fmt_prox = |p: Option<f64>| p.map_or_else(|| "null".to_string(), |v| v.to_string());
        match &t.eligibility {
            Eligibility::Eligible if t.exec_candidate => (
                PlanAction::Watch,
                format!("EXEC_LIMIT maxExecOrders={}", self.config.max_exec_orders()),
            ),
            Eligibility::Eligible => (
                PlanAction::Watch,
                format!(
                    "WATCH_ONLY status={} prox={} < minExec={}",
                    t.row.status.as_str(),
                    fmt_prox(t.row.proximity),
                    self.config.exec_proximity
                ),
            ),
            Eligibility::Cooldown { remaining_secs } => {
                (PlanAction::Watch, format!("HEALTHY_COOLDOWN remSec={remaining_secs}"))
            }
            Eligibility::Stale { age_secs } => {
                (PlanAction::Watch, format!("STALE_OPPORTUNITY ageSec={age_secs:.1}"))
            }
            Eligibility::NoQuote => (PlanAction::Watch, "NO_QUOTE".to_string()),
            Eligibility::ExecFilter => (PlanAction::Watch, "EXEC_FILTER".to_string()),
            Eligibility::BelowWatch { proximity } => (
                PlanAction::Skip,
                format!(
                    "PROXIMITY_BELOW_MIN prox={} min={}",
                    fmt_prox(*proximity),
                    self.config.watch_proximity
                ),
            ),
        }
    }

    async fn totals_for(
        &self,
        cache: &mut HashMap<B256, std::result::Result<MarketTotals, String>>,
        market_id: B256,
    ) -> Result<MarketTotals> {
        if !cache.contains_key(&market_id) {
            let read = self
                .chain
                .market_totals(market_id)
                .await
                .map_err(|e| format!("market totals read failed: {e}"));
            cache.insert(market_id, read);
        }
        match cache.get(&market_id) {
            Some(Ok(totals)) => Ok(*totals),
            Some(Err(msg)) => Err(LiquidatorError::Transient(anyhow::anyhow!(msg.clone()))),
            None => Err(LiquidatorError::invalid("market totals unavailable")),
        }
    }

    /// Build the plan for `rows` against the normalised `candidates`.
    pub async fn plan(&self, rows: &[Opportunity], candidates: &HashMap<String, Candidate>, now: DateTime<Utc>) -> Result<Plan> {
        let now_ms = now.timestamp_millis().max(0) as u64;
        let cooldown = self.cooldown.load(now_ms)?;

        let triaged: Vec<Triage<'_>> = rows.iter().map(|r| self.triage(r, &cooldown, now)).collect();

        let mut chosen: Vec<&Triage<'_>> = triaged
            .iter()
            .filter(|t| t.eligibility == Eligibility::Eligible && t.exec_candidate)
            .collect();
        chosen.sort_by(|a, b| {
            b.row
                .net_profit_usd
                .partial_cmp(&a.row.net_profit_usd)
                .unwrap_or(Ordering::Equal)
        });
        let chosen: HashSet<&str> = chosen
            .into_iter()
            .take(self.config.max_exec_orders())
            .map(|t| t.row.candidate_id.as_str())
            .collect();

        let mut totals_cache = HashMap::new();
        let mut items = Vec::with_capacity(triaged.len());
        let mut exec_built = 0usize;
        let mut exec_downgraded = 0usize;

        for t in &triaged {
            let row = t.row;
            let mut item = PlanItem {
                ts: now,
                candidate_id: row.candidate_id.clone(),
                market_id: row.market_id,
                borrower: row.borrower,
                net_profit_usd: row.net_profit_usd,
                proximity: row.proximity,
                action: PlanAction::Watch,
                pass: false,
                note: String::new(),
                order: None,
            };

            if !chosen.contains(row.candidate_id.as_str()) {
                let (action, note) = self.describe(t);
                item.action = action;
                item.note = note;
                items.push(item);
                continue;
            }

            let built = match candidates.get(&row.candidate_id) {
                None => Err(LiquidatorError::invalid("candidateId not found in candidates")),
                Some(c) => match self.totals_for(&mut totals_cache, row.market_id).await {
                    Ok(totals) => self.builder.build_order(row, c, &totals, now),
                    Err(e) => Err(e),
                },
            };

            match built {
                Ok(order) => {
                    debug!(
                        candidate_id = %row.candidate_id,
                        repay_assets = %order.repay_assets,
                        repaid_shares = %order.repaid_shares,
                        amount_out_min = %order.amount_out_min,
                        "Order built"
                    );
                    item.action = PlanAction::Exec;
                    item.pass = true;
                    item.note = NOTE_EXEC_WITH_ORDER.to_string();
                    item.order = Some(order);
                    exec_built += 1;
                }
                Err(e) => {
                    warn!(candidate_id = %row.candidate_id, error = %e, "Order build failed; downgraded to WATCH");
                    item.note = format!("{NOTE_ORDER_BUILD_FAILED}{e}");
                    exec_downgraded += 1;
                }
            }
            items.push(item);
        }

        info!(
            rows = items.len(),
            exec_built,
            exec_downgraded,
            max_exec_orders = self.config.max_exec_orders(),
            watch_proximity = self.config.watch_proximity,
            exec_proximity = self.config.exec_proximity,
            market_reads = totals_cache.len(),
            "Plan built"
        );

        Ok(Plan {
            generated_at: now,
            exec_built,
            exec_downgraded,
            items,
        })
    }
}

//! Readiness check run before execution.

use crate::error::{LiquidatorError, Result};
use crate::planner::Plan;
use crate::profit::SimulationSummary;
use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use liquidator_chain::ChainReader;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of one preflight run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightStatus {
    pub rpc_chain_id: u64,
    pub expected_chain_id: u64,
    pub chain_ok: bool,

    pub plan_generated_at: DateTime<Utc>,
    pub plan_age_secs: f64,
    pub exec_count: usize,

    pub sim_age_secs: Option<f64>,
    pub sim_passes_quoted: Option<usize>,
    pub sim_passes_exec: Option<usize>,
    pub sim_has_quoted_pass: Option<bool>,

    pub quote_enabled: bool,
    pub quoter: Address,
    pub quoter_ok: bool,

    pub private_key_loaded: bool,
    pub exec_enabled: bool,

    pub plan_fresh: bool,
    pub sim_fresh: bool,
    pub monitor_ok: bool,
    pub ready_to_exec: bool,
    pub ok: bool,
}

impl PreflightStatus {
    pub fn log(&self) {
        if self.ok {
            info!(status = ?self, "Preflight passed");
        } else {
            error!(status = ?self, "Preflight failed");
        }
    }

    /// `Err(SafetyAbort)` unless the run is ok.
    pub fn ensure_ok(&self) -> Result<()> {
        if self.ok {
            return Ok(());
        }
        Err(LiquidatorError::SafetyAbort(format!(
            "preflight failed: chain_ok={} quoter_ok={} plan_fresh={} sim_fresh={} exec_count={} ready_to_exec={}",
            self.chain_ok, self.quoter_ok, self.plan_fresh, self.sim_fresh, self.exec_count, self.ready_to_exec
        )))
    }
}

fn age_secs(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - then).num_milliseconds() as f64 / 1000.0).max(0.0)
}

#[derive(Debug)]
pub struct Preflight {
    chain: Arc<dyn ChainReader>,
    expected_chain_id: u64,
    quote_enabled: bool,
    quoter: Address,
    private_key_loaded: bool,
    exec_enabled: bool,
    max_age_secs: u64,
}

impl Preflight {
    pub fn new(chain: Arc<dyn ChainReader>, expected_chain_id: u64, quoter: Address) -> Self {
        Self {
            chain,
            expected_chain_id,
            quote_enabled: true,
            quoter,
            private_key_loaded: false,
            exec_enabled: false,
            max_age_secs: 180,
        }
    }

    pub fn with_quoting(mut self, enabled: bool) -> Self {
        self.quote_enabled = enabled;
        self
    }

    pub fn with_execution(mut self, exec_enabled: bool, private_key_loaded: bool) -> Self {
        self.exec_enabled = exec_enabled;
        self.private_key_loaded = private_key_loaded;
        self
    }

    pub fn with_max_age(mut self, secs: u64) -> Self {
        self.max_age_secs = secs;
        self
    }

    /// Evaluate readiness. `sim` is `None` when `tx_sim.json` is missing or
    /// unreadable. RPC failures are errors.
    pub async fn check(&self, plan: &Plan, sim: Option<&SimulationSummary>, now: DateTime<Utc>) -> Result<PreflightStatus> {
        let rpc_chain_id = self.chain.chain_id().await.map_err(LiquidatorError::Transient)?;
        let quoter_ok = if self.quote_enabled {
            self.chain
                .has_code(self.quoter)
                .await
                .map_err(LiquidatorError::Transient)?
        } else {
            true
        };

        let max_age = self.max_age_secs as f64;
        let plan_age_secs = age_secs(plan.generated_at, now);
        let exec_count = plan.exec_count();
        let sim_age_secs = sim.map(|s| age_secs(s.generated_at, now));
        let sim_passes_exec = sim.map(|s| s.diagnostics.passes_exec);

        let chain_ok = rpc_chain_id == self.expected_chain_id;
        let plan_fresh = plan_age_secs <= max_age;
        let sim_fresh = sim_age_secs.is_some_and(|a| a <= max_age);
        let stale_ok = if exec_count == 0 { plan_fresh } else { plan_fresh && sim_fresh };
        let monitor_ok = chain_ok && quoter_ok && stale_ok;
        let ready_to_exec = exec_count > 0 && self.private_key_loaded && self.exec_enabled && plan_fresh && sim_fresh;
        let ok = monitor_ok && (!self.exec_enabled || exec_count == 0 || ready_to_exec);

        Ok(PreflightStatus {
            rpc_chain_id,
            expected_chain_id: self.expected_chain_id,
            chain_ok,
            plan_generated_at: plan.generated_at,
            plan_age_secs,
            exec_count,
            sim_age_secs,
            sim_passes_quoted: sim.map(|s| s.diagnostics.passes_quoted),
            sim_passes_exec,
            sim_has_quoted_pass: sim_passes_exec.map(|n| n > 0),
            quote_enabled: self.quote_enabled,
            quoter: self.quoter,
            quoter_ok,
            private_key_loaded: self.private_key_loaded,
            exec_enabled: self.exec_enabled,
            plan_fresh,
            sim_fresh,
            monitor_ok,
            ready_to_exec,
            ok,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{PlanAction, PlanItem};
    use crate::profit::SimulationDiagnostics;
    use crate::testing::{quoter, MockChain};
    use alloy::primitives::B256;
    use liquidator_chain::EthPrice;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn plan(age_secs: i64, exec: bool) -> Plan {
        let action = if exec { PlanAction::Exec } else { PlanAction::Watch };
        Plan {
            generated_at: now() - chrono::Duration::seconds(age_secs),
            exec_built: 0,
            exec_downgraded: 0,
            items: vec![PlanItem {
                ts: now(),
                candidate_id: "a".into(),
                market_id: B256::ZERO,
                borrower: Address::ZERO,
                net_profit_usd: 1.0,
                proximity: Some(1.0),
                action,
                pass: exec,
                note: String::new(),
                order: None,
            }],
        }
    }

    fn sim(age_secs: i64) -> SimulationSummary {
        SimulationSummary {
            generated_at: now() - chrono::Duration::seconds(age_secs),
            required_net_usd: 4.0,
            quote_enabled: true,
            quoter_ok: true,
            estimated_gas_usd: 0.04,
            l1_fee_usd: None,
            eth_price: EthPrice::fixed(2000.0, 180),
            pricing_degraded: false,
            allow_exec_with_degraded_pricing: false,
            diagnostics: SimulationDiagnostics {
                passes_quoted: 2,
                passes_exec: 1,
                ..Default::default()
            },
        }
    }

    fn preflight(chain_id: u64) -> Preflight {
        Preflight::new(Arc::new(MockChain::default()), chain_id, quoter())
    }

    #[tokio::test]
    async fn test_monitor_only_ok() {
        let status = preflight(42161).check(&plan(10, false), None, now()).await.unwrap();
        assert!(status.chain_ok);
        assert!(status.plan_fresh);
        assert!(!status.sim_fresh);
        assert!(status.monitor_ok);
        assert!(!status.ready_to_exec);
        assert!(status.ok);
        assert!(status.ensure_ok().is_ok());
    }

    #[tokio::test]
    async fn test_exec_items_require_fresh_sim() {
        let p = preflight(42161);
        let status = p.check(&plan(10, true), Some(&sim(181)), now()).await.unwrap();
        assert!(!status.sim_fresh);
        assert!(!status.ok);
        assert!(matches!(status.ensure_ok(), Err(LiquidatorError::SafetyAbort(_))));

        let status = p.check(&plan(10, true), Some(&sim(180)), now()).await.unwrap();
        assert!(status.ok);
        assert_eq!(status.sim_has_quoted_pass, Some(true));
        assert_eq!(status.sim_passes_quoted, Some(2));
    }

    #[tokio::test]
    async fn test_exec_enabled_requires_key() {
        let p = preflight(42161).with_execution(true, false);
        let status = p.check(&plan(5, true), Some(&sim(5)), now()).await.unwrap();
        assert!(status.monitor_ok);
        assert!(!status.ready_to_exec);
        assert!(!status.ok);

        let p = preflight(42161).with_execution(true, true);
        let status = p.check(&plan(5, true), Some(&sim(5)), now()).await.unwrap();
        assert!(status.ready_to_exec);
        assert!(status.ok);

        // exec enabled with nothing to do is fine
        let status = p.check(&plan(5, false), None, now()).await.unwrap();
        assert!(status.ok);
    }

    #[tokio::test]
    async fn test_chain_mismatch_and_stale_plan() {
        let status = preflight(1).check(&plan(5, false), None, now()).await.unwrap();
        assert!(!status.chain_ok);
        assert!(!status.ok);

        let status = preflight(42161).check(&plan(181, false), None, now()).await.unwrap();
        assert!(!status.plan_fresh);
        assert!(!status.ok);
    }
}

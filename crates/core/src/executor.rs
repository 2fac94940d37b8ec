//! Execution state machine.
//!
//! One cycle walks the plan's executable items best-first:
//!
//! ```text
//! IDLE -> SELECTING -> REVALIDATING -> SIMULATING -> BROADCASTING -> DONE
//!                                          |-> SKIPPED (position healthy)
//!                                          '-> FAILED  (any other revert)
//! ```
//!
//! A stale plan aborts before anything is read or written. At most one
//! transaction is sent per cycle.

use crate::config::ExecConfig;
use crate::cooldown::CooldownStore;
use crate::error::{LiquidatorError, Result, RevertKind};
use crate::planner::{Plan, PlanItem};
use crate::u256_math::{oracle_max_borrow, shares_to_assets_up};
use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use liquidator_chain::{ChainReader, LiquidationOrder, LiquidationSubmitter, Simulation};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const NOTE_LIQUIDATION_SENT: &str = "LIQUIDATION_SENT (simulateContract passed)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Idle,
    Selecting,
    Revalidating,
    Simulating,
    Broadcasting,
    Done,
    Skipped,
    Failed,
}

/// One state entered during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub candidate_id: Option<String>,
    pub state: ExecState,
}

/// The plan item a transaction was sent for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCandidate {
    pub candidate_id: String,
    pub market_id: B256,
    pub borrower: Address,
    pub proximity: Option<f64>,
    pub net_profit_usd: f64,
    pub note: String,
}

/// `tx_exec.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub generated_at: DateTime<Utc>,
    pub executor: Address,
    pub selected: SelectedCandidate,
    pub from: Address,
    pub tx_hash: B256,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Broadcast(ExecutionRecord),
    /// Nothing reached broadcast; a normal outcome
    NoTransaction,
    /// Plan older than the ceiling; nothing was attempted
    StalePlan { age_secs: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub selected: usize,
    pub tried: usize,
    pub skipped_healthy: usize,
    pub failed: usize,
    pub gas_aborted: usize,
    pub in_cooldown: usize,
    pub trace: Vec<Transition>,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            outcome: CycleOutcome::NoTransaction,
            selected: 0,
            tried: 0,
            skipped_healthy: 0,
            failed: 0,
            gas_aborted: 0,
            in_cooldown: 0,
            trace: vec![Transition {
                candidate_id: None,
                state: ExecState::Idle,
            }],
        }
    }

    fn enter(&mut self, candidate_id: Option<&str>, state: ExecState) {
        debug!(candidate_id = ?candidate_id, state = ?state, "Exec state");
        self.trace.push(Transition {
            candidate_id: candidate_id.map(str::to_string),
            state,
        });
    }

    pub fn sent(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Broadcast(_))
    }
}

/// Live on-chain view of a position that reverted as healthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthForensics {
    pub borrow_assets: U256,
    pub max_borrow: U256,
    pub oracle_price: U256,
    pub collateral: U256,
    pub is_healthy: bool,
}

/// Runs plan items through simulation and broadcast.
#[derive(Debug)]
pub struct Executor {
    chain: Arc<dyn ChainReader>,
    submitter: Arc<dyn LiquidationSubmitter>,
    cooldown: Arc<dyn CooldownStore>,
    config: ExecConfig,
    deadline_secs: u64,
    record_path: Option<PathBuf>,
}

impl Executor {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        submitter: Arc<dyn LiquidationSubmitter>,
        cooldown: Arc<dyn CooldownStore>,
        config: ExecConfig,
        deadline_secs: u64,
    ) -> Self {
        Self {
            chain,
            submitter,
            cooldown,
            config,
            deadline_secs: deadline_secs.max(60),
            record_path: None,
        }
    }

    /// Persist the broadcast record to `path`.
    pub fn with_record_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.record_path = Some(path.into());
        self
    }

    /// Executable items, best net profit first.
    fn select<'a>(&self, plan: &'a Plan) -> Vec<&'a PlanItem> {
        let mut items: Vec<&PlanItem> = plan.items.iter().filter(|i| i.is_executable()).collect();
        items.sort_by(|a, b| {
            b.net_profit_usd
                .partial_cmp(&a.net_profit_usd)
                .unwrap_or(Ordering::Equal)
        });
        items
    }

    /// Run one execution cycle against `plan`.
    #[instrument(skip(self, plan), fields(items = plan.items.len()))]
    pub async fn run_cycle(&self, plan: &Plan, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut report = CycleReport::new();
        report.enter(None, ExecState::Selecting);

        let age = plan.age(now);
        if age.as_secs_f64() > self.config.plan_max_age_secs as f64 {
            warn!(
                age_secs = age.as_secs(),
                max_age_secs = self.config.plan_max_age_secs,
                "Plan is stale; aborting cycle"
            );
            report.outcome = CycleOutcome::StalePlan { age_secs: age.as_secs() };
            report.enter(None, ExecState::Done);
            return Ok(report);
        }

        let selected = self.select(plan);
        report.selected = selected.len();
        if selected.is_empty() {
            info!("No executable items in plan");
            report.enter(None, ExecState::Done);
            return Ok(report);
        }

        let now_secs = now.timestamp().max(0) as u64;
        let now_ms = now.timestamp_millis().max(0) as u64;
        let cooling = self.cooldown.load(now_ms)?;
        let ceiling = u128::from(self.config.max_tx_gas_price_wei);

        for item in selected {
            let id = item.candidate_id.as_str();
            let Some(order) = item.order.as_ref() else {
                continue;
            };

            if let Some(rem) = self.cooldown.remaining(&cooling, id, now_ms) {
                debug!(candidate_id = %id, remaining_secs = rem.as_secs(), "In healthy cooldown; skipping");
                report.in_cooldown += 1;
                continue;
            }

            report.enter(Some(id), ExecState::Revalidating);
            let gas_price = match self.chain.gas_price().await {
                Ok(p) => p,
                Err(e) => {
                    warn!(candidate_id = %id, error = %e, "Gas price read failed");
                    report.failed += 1;
                    report.enter(Some(id), ExecState::Failed);
                    continue;
                }
            };
            if gas_price > ceiling {
                warn!(
                    candidate_id = %id,
                    gas_price_wei = gas_price,
                    max_tx_gas_price_wei = ceiling,
                    "Gas price above ceiling; skipping candidate"
                );
                report.gas_aborted += 1;
                continue;
            }
            if !order.has_single_size() {
                error!(
                    candidate_id = %id,
                    repaid_shares = %order.repaid_shares,
                    seized_assets = %order.seized_assets,
                    "Malformed order: exactly one of repaidShares/seizedAssets must be zero"
                );
                report.failed += 1;
                report.enter(Some(id), ExecState::Failed);
                continue;
            }

            report.tried += 1;
            let order = order.refreshed(now_secs + self.deadline_secs, now_ms + report.tried as u64);

            report.enter(Some(id), ExecState::Simulating);
            let gas_limit = match self.submitter.simulate(&order).await {
                Ok(Simulation::Success { gas_limit }) => gas_limit,
                Ok(Simulation::Reverted { reason }) => {
                    let revert = LiquidatorError::revert(reason);
                    if let LiquidatorError::Revert {
                        kind: RevertKind::Healthy,
                        ..
                    } = &revert
                    {
                        self.on_healthy(item, &order, now_ms).await;
                        report.skipped_healthy += 1;
                        report.enter(Some(id), ExecState::Skipped);
                    } else {
                        warn!(candidate_id = %id, error = %revert, "Simulation reverted");
                        report.failed += 1;
                        report.enter(Some(id), ExecState::Failed);
                    }
                    continue;
                }
                Err(e) => {
                    warn!(candidate_id = %id, error = %e, "Simulation failed");
                    report.failed += 1;
                    report.enter(Some(id), ExecState::Failed);
                    continue;
                }
            };

            report.enter(Some(id), ExecState::Broadcasting);
            let priority_fee = u128::from(self.config.priority_fee_wei);
            let tx_hash = match self.submitter.broadcast(&order, gas_limit, priority_fee).await {
                Ok(hash) => hash,
                Err(e) => {
                    error!(candidate_id = %id, error = %e, "Broadcast failed");
                    report.failed += 1;
                    report.enter(Some(id), ExecState::Failed);
                    continue;
                }
            };

            let record = ExecutionRecord {
                generated_at: Utc::now(),
                executor: self.submitter.executor_address(),
                selected: SelectedCandidate {
                    candidate_id: item.candidate_id.clone(),
                    market_id: item.market_id,
                    borrower: item.borrower,
                    proximity: item.proximity,
                    net_profit_usd: item.net_profit_usd,
                    note: item.note.clone(),
                },
                from: self.submitter.from_address(),
                tx_hash,
                note: NOTE_LIQUIDATION_SENT.to_string(),
            };
            info!(
                candidate_id = %id,
                tx_hash = %tx_hash,
                gas_limit,
                priority_fee_wei = priority_fee,
                net_profit_usd = item.net_profit_usd,
                "Liquidation sent"
            );
            if let Some(path) = &self.record_path {
                if let Err(e) = crate::artifacts::write_execution_record(path, &record) {
                    error!(
                        candidate_id = %id,
                        tx_hash = %tx_hash,
                        path = %path.display(),
                        error = %e,
                        "Failed to write execution record; transaction already sent"
                    );
                }
            }
            report.outcome = CycleOutcome::Broadcast(record);
            report.enter(Some(id), ExecState::Done);
            return Ok(report);
        }

        info!(
            selected = report.selected,
            tried = report.tried,
            skipped_healthy = report.skipped_healthy,
            failed = report.failed,
            gas_aborted = report.gas_aborted,
            in_cooldown = report.in_cooldown,
            "Exec cycle finished without a transaction"
        );
        report.enter(None, ExecState::Done);
        Ok(report)
    }

    /// Cooldown write plus the forensic read. Neither can change the
    /// classification of the attempt.
    async fn on_healthy(&self, item: &PlanItem, order: &LiquidationOrder, now_ms: u64) {
        let id = item.candidate_id.as_str();
        if let Err(e) = self.cooldown.record(id, now_ms) {
            warn!(candidate_id = %id, error = %e, "Cooldown write failed");
        }
        warn!(
            candidate_id = %id,
            cooldown_secs = self.cooldown.window().as_secs(),
            "Simulation reverted: position is healthy; cooling down"
        );

        match self.forensics(item.market_id, order).await {
            Ok(f) => error!(
                candidate_id = %id,
                api_proximity = ?item.proximity,
                onchain_is_healthy = f.is_healthy,
                borrow_assets = %f.borrow_assets,
                max_borrow = %f.max_borrow,
                collateral = %f.collateral,
                oracle_price = %f.oracle_price,
                "Healthy revert forensics: discovery proximity disagrees with chain state"
            ),
            Err(e) => debug!(candidate_id = %id, error = %e, "Healthy revert forensics unavailable"),
        }
    }

    /// Recompute the health check from live position, totals and oracle price.
    pub async fn forensics(&self, market_id: B256, order: &LiquidationOrder) -> anyhow::Result<HealthForensics> {
        let position = self.chain.position(market_id, order.borrower).await?;
        let totals = self.chain.market_totals(market_id).await?;
        let oracle_price = self.chain.oracle_price(order.market.oracle).await?;

        let borrow_assets = shares_to_assets_up(
            position.borrow_shares,
            totals.total_borrow_assets,
            totals.total_borrow_shares,
        )?;
        let max_borrow = oracle_max_borrow(position.collateral, oracle_price, order.market.lltv)?;

        Ok(HealthForensics {
            borrow_assets,
            max_borrow,
            oracle_price,
            collateral: position.collateral,
            is_healthy: max_borrow >= borrow_assets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::tests::sample_candidate;
    use crate::cooldown::InMemoryCooldownStore;
    use crate::planner::{PlanAction, NOTE_EXEC_WITH_ORDER};
    use crate::testing::{MockChain, MockSubmitter};
    use alloy::primitives::Bytes;
    use liquidator_chain::MarketParams;
    use std::sync::atomic::Ordering as AtomicOrdering;
    use std::time::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn order() -> LiquidationOrder {
        let c = sample_candidate();
        LiquidationOrder {
            market: MarketParams {
                loan_token: c.loan_token,
                collateral_token: c.collateral_token,
                oracle: Address::repeat_byte(0x0e),
                irm: Address::repeat_byte(0x0f),
                lltv: U256::from(860_000_000_000_000_000u64),
            },
            borrower: c.borrower,
            repay_assets: U256::from(10_000_000_000u64),
            repaid_shares: U256::from(9_500_000_000_000_000u64),
            seized_assets: U256::ZERO,
            uni_path: Bytes::from(vec![0u8; 43]),
            amount_out_min: U256::from(10_348_000_000u64),
            min_profit: U256::from(4_000_000u64),
            deadline: 1,
            max_tx_gas_price: U256::from(10_000_000_000u64),
            referral_code: 0,
            nonce: 1,
        }
    }

    fn item(id: &str, net: f64) -> PlanItem {
        PlanItem {
            ts: now(),
            candidate_id: id.to_string(),
            market_id: B256::repeat_byte(0xb8),
            borrower: Address::repeat_byte(0x0b),
            net_profit_usd: net,
            proximity: Some(1.01),
            action: PlanAction::Exec,
            pass: true,
            note: NOTE_EXEC_WITH_ORDER.to_string(),
            order: Some(order()),
        }
    }

    fn plan(items: Vec<PlanItem>, generated_at: DateTime<Utc>) -> Plan {
        Plan {
            generated_at,
            exec_built: items.len(),
            exec_downgraded: 0,
            items,
        }
    }

    struct Harness {
        chain: Arc<MockChain>,
        submitter: Arc<MockSubmitter>,
        cooldown: Arc<InMemoryCooldownStore>,
    }

    impl Harness {
        fn new(chain: MockChain, submitter: MockSubmitter) -> Self {
            Self {
                chain: Arc::new(chain),
                submitter: Arc::new(submitter),
                cooldown: Arc::new(InMemoryCooldownStore::new(Duration::from_secs(900))),
            }
        }

        fn executor(&self) -> Executor {
            Executor::new(
                self.chain.clone(),
                self.submitter.clone(),
                self.cooldown.clone(),
                ExecConfig::default(),
                180,
            )
        }
    }

    #[tokio::test]
    async fn test_stale_plan_aborts_before_any_read() {
        let h = Harness::new(MockChain::default(), MockSubmitter::default());
        let stale = plan(vec![item("a", 10.0)], now() - chrono::Duration::seconds(31));

        let report = h.executor().run_cycle(&stale, now()).await.unwrap();

        assert_eq!(report.outcome, CycleOutcome::StalePlan { age_secs: 31 });
        assert_eq!(report.tried, 0);
        assert!(h.submitter.simulated.lock().is_empty());
        assert!(h.submitter.broadcasts.lock().is_empty());
        assert_eq!(h.chain.gas_reads.load(AtomicOrdering::SeqCst), 0);
        assert!(h.cooldown.is_empty());
    }

    #[tokio::test]
    async fn test_broadcasts_best_item_only() {
        let h = Harness::new(MockChain::default(), MockSubmitter::default());
        let dir = tempfile::tempdir().unwrap();
        let record_path = dir.path().join("tx_exec.json");
        let p = plan(vec![item("low", 5.0), item("high", 50.0)], now());

        let report = h
            .executor()
            .with_record_path(&record_path)
            .run_cycle(&p, now())
            .await
            .unwrap();

        let CycleOutcome::Broadcast(record) = &report.outcome else {
            panic!("expected broadcast, got {:?}", report.outcome);
        };
        assert_eq!(record.selected.candidate_id, "high");
        assert_eq!(record.note, NOTE_LIQUIDATION_SENT);
        assert_eq!(record.from, Address::repeat_byte(0xaa));
        assert_eq!(record.tx_hash, B256::repeat_byte(0x77));

        let broadcasts = h.submitter.broadcasts.lock();
        assert_eq!(broadcasts.len(), 1);
        let (sent, gas_limit, tip) = &broadcasts[0];
        assert_eq!(*gas_limit, 900_000);
        assert_eq!(*tip, 3_000_000_000);
        // deadline and nonce come from execution time, not the plan
        assert_eq!(sent.deadline, now().timestamp() as u64 + 180);
        assert_eq!(sent.nonce, now().timestamp_millis() as u64 + 1);
        assert_eq!(h.submitter.simulated.lock()[0], *sent);

        let on_disk: ExecutionRecord = crate::artifacts::read_json(&record_path).unwrap();
        assert_eq!(&on_disk, record);

        let states: Vec<ExecState> = report.trace.iter().map(|t| t.state).collect();
        assert_eq!(
            states,
            vec![
                ExecState::Idle,
                ExecState::Selecting,
                ExecState::Revalidating,
                ExecState::Simulating,
                ExecState::Broadcasting,
                ExecState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_record_write_failure_keeps_broadcast_outcome() {
        let h = Harness::new(MockChain::default(), MockSubmitter::default());
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the record's parent directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let p = plan(vec![item("a", 10.0)], now());

        let report = h
            .executor()
            .with_record_path(blocker.join("tx_exec.json"))
            .run_cycle(&p, now())
            .await
            .unwrap();

        assert!(report.sent());
        let CycleOutcome::Broadcast(record) = &report.outcome else {
            panic!("expected broadcast, got {:?}", report.outcome);
        };
        assert_eq!(record.tx_hash, B256::repeat_byte(0x77));
        assert_eq!(h.submitter.broadcasts.lock().len(), 1);
        assert_eq!(report.trace.last().map(|t| t.state), Some(ExecState::Done));
    }

    #[tokio::test]
    async fn test_healthy_revert_cools_down_and_next_run_excludes() {
        let h = Harness::new(
            MockChain::default(),
            MockSubmitter::with_outcomes(vec![Simulation::Reverted {
                reason: "position is healthy".to_string(),
            }]),
        );
        let p = plan(vec![item("a", 10.0)], now());

        let report = h.executor().run_cycle(&p, now()).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::NoTransaction);
        assert_eq!(report.skipped_healthy, 1);
        assert!(report.trace.iter().any(|t| t.state == ExecState::Skipped));

        let now_ms = now().timestamp_millis() as u64;
        assert_eq!(h.cooldown.load(now_ms).unwrap().get("a"), Some(&now_ms));

        // default outcome is now success, but the candidate is cooling down
        let later = now() + chrono::Duration::seconds(5);
        let report = h.executor().run_cycle(&plan(vec![item("a", 10.0)], later), later).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::NoTransaction);
        assert_eq!(report.in_cooldown, 1);
        assert_eq!(h.submitter.simulated.lock().len(), 1);
        assert!(h.submitter.broadcasts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_other_revert_fails_and_moves_on() {
        let h = Harness::new(
            MockChain::default(),
            MockSubmitter::with_outcomes(vec![Simulation::Reverted {
                reason: "Too little received".to_string(),
            }]),
        );
        let p = plan(vec![item("first", 20.0), item("second", 10.0)], now());

        let report = h.executor().run_cycle(&p, now()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.tried, 2);
        assert!(h.cooldown.is_empty());
        match &report.outcome {
            CycleOutcome::Broadcast(r) => assert_eq!(r.selected.candidate_id, "second"),
            other => panic!("unexpected {other:?}"),
        }
        let nonces: Vec<u64> = h.submitter.simulated.lock().iter().map(|o| o.nonce).collect();
        assert_ne!(nonces[0], nonces[1]);
    }

    #[tokio::test]
    async fn test_gas_ceiling_skips_without_simulating() {
        let chain = MockChain {
            gas_price: 20_000_000_000,
            ..Default::default()
        };
        let h = Harness::new(chain, MockSubmitter::default());
        let report = h
            .executor()
            .run_cycle(&plan(vec![item("a", 10.0), item("b", 5.0)], now()), now())
            .await
            .unwrap();

        assert_eq!(report.outcome, CycleOutcome::NoTransaction);
        assert_eq!(report.gas_aborted, 2);
        assert!(h.submitter.simulated.lock().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_order_never_simulated() {
        let h = Harness::new(MockChain::default(), MockSubmitter::default());
        let mut bad = item("bad", 99.0);
        if let Some(o) = bad.order.as_mut() {
            o.seized_assets = U256::from(1u64);
        }
        let report = h
            .executor()
            .run_cycle(&plan(vec![bad, item("good", 1.0)], now()), now())
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        let simulated = h.submitter.simulated.lock();
        assert_eq!(simulated.len(), 1);
        assert!(simulated[0].has_single_size());
        assert!(report.sent());
    }

    #[tokio::test]
    async fn test_non_exec_items_ignored() {
        let h = Harness::new(MockChain::default(), MockSubmitter::default());
        let mut watch = item("w", 100.0);
        watch.action = PlanAction::Watch;
        let mut no_order = item("n", 100.0);
        no_order.order = None;

        let report = h
            .executor()
            .run_cycle(&plan(vec![watch, no_order], now()), now())
            .await
            .unwrap();
        assert_eq!(report.selected, 0);
        assert_eq!(report.outcome, CycleOutcome::NoTransaction);
        assert_eq!(h.chain.gas_reads.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forensics_math() {
        let h = Harness::new(MockChain::default(), MockSubmitter::default());
        let f = h
            .executor()
            .forensics(B256::repeat_byte(0xb8), &order())
            .await
            .unwrap();
        // 1.9e16 shares * 2e12 / 1.9e18 = 2e10 (20_000 USDC)
        assert_eq!(f.borrow_assets, U256::from(20_000_000_000u64));
        // 5 wstETH * 4000 * 0.86 = 17_200 USDC
        assert_eq!(f.max_borrow, U256::from(17_200_000_000u64));
        assert!(!f.is_healthy);
    }
}

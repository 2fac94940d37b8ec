//! Stage wiring: builds the chain clients and runs one pipeline stage.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::Utc;
use tracing::{info, warn};

use liquidator_api::{MulticallQuoter, RouteOptimizer};
use liquidator_chain::{ChainReader, Eip1559GasStrategy, ExecutorClient, ProviderManager};
use liquidator_core::artifacts::{
    read_candidates, read_hot_queue, read_opportunities_csv, read_plan, read_sim_summary, write_opportunities_csv,
    write_plan, write_sim_summary,
};
use liquidator_core::{
    index_by_id, normalize_records, BotConfig, ChainEnv, CycleOutcome, CycleReport, DataDir, Executor,
    FileCooldownStore, LiquidatorError, OrderBuilder, Plan, Planner, Preflight, PreflightStatus, PricingContext,
    ProfitEngine, SimulationReport,
};

/// Shared inputs of every stage.
pub struct Context {
    env: ChainEnv,
    config: BotConfig,
    data: DataDir,
    reader: Arc<ProviderManager>,
}

impl Context {
    pub fn new(env: ChainEnv, config: BotConfig) -> Self {
        let reader = ProviderManager::new(env.rpc_url.clone())
            .with_morpho(env.morpho)
            .with_eth_usd_feed(env.eth_usd_feed)
            .with_gas_info(env.gas_info)
            .with_timeout(config.quote.rpc_timeout());
        Self {
            data: DataDir::new(env.data_dir.clone()),
            reader: Arc::new(reader),
            env,
            config,
        }
    }

    fn cooldown(&self) -> Arc<FileCooldownStore> {
        Arc::new(FileCooldownStore::new(
            self.data.cooldown(),
            Duration::from_secs(self.config.exec.healthy_cooldown_secs),
        ))
    }
}

/// Price the hot queue and write `opportunities.csv` plus `tx_sim.json`.
pub async fn simulate(ctx: &Context) -> Result<SimulationReport> {
    let cfg = &ctx.config;
    let queue_path = ctx.data.hot_queue();
    let queue = read_hot_queue(&queue_path).with_context(|| format!("reading {}", queue_path.display()))?;
    let candidates = normalize_records(
        &queue.hot_queue,
        cfg.plan.watch_proximity,
        cfg.plan.exec_proximity,
    );

    let now = Utc::now();
    let pricing = PricingContext::fetch(
        ctx.reader.as_ref(),
        &cfg.profit,
        cfg.quote.enabled,
        ctx.env.quoter_v2,
        now,
    )
    .await?;

    let quoter = MulticallQuoter::new(ctx.env.rpc_url.clone(), ctx.env.uniswap_addresses())
        .with_timeout(cfg.quote.rpc_timeout());
    let engine = ProfitEngine::new(
        cfg.profit.clone(),
        cfg.quote.clone(),
        cfg.plan.watch_proximity,
        RouteOptimizer::new(Arc::new(quoter)),
    );

    let report = engine.evaluate_all(&candidates, &pricing).await;
    write_opportunities_csv(&ctx.data.opportunities(), &report.opportunities)?;
    write_sim_summary(&ctx.data.sim_summary(), &report.summary)?;

    info!(
        rows = report.opportunities.len(),
        passes_exec = report.summary.diagnostics.passes_exec,
        best_exec_net = ?report.summary.diagnostics.best_exec_net,
        path = %ctx.data.opportunities().display(),
        "simulate: wrote opportunities"
    );
    Ok(report)
}

/// Build `tx_plan.json` from the latest opportunities.
pub async fn plan(ctx: &Context) -> Result<Plan> {
    let cfg = &ctx.config;
    let rows = read_opportunities_csv(&ctx.data.opportunities())
        .with_context(|| format!("reading {}", ctx.data.opportunities().display()))?;
    let records = read_candidates(&ctx.data.candidates())
        .with_context(|| format!("reading {}", ctx.data.candidates().display()))?;
    let candidates = index_by_id(normalize_records(
        &records,
        cfg.plan.watch_proximity,
        cfg.plan.exec_proximity,
    ));

    let builder = OrderBuilder::from_config(&cfg.profit, &cfg.plan, cfg.exec.max_tx_gas_price_wei);
    let planner = Planner::new(cfg.plan.clone(), builder, ctx.reader.clone(), ctx.cooldown());
    let plan = planner.plan(&rows, &candidates, Utc::now()).await?;

    write_plan(&ctx.data.plan(), &plan)?;
    info!(
        items = plan.items.len(),
        exec = plan.exec_count(),
        exec_built = plan.exec_built,
        exec_downgraded = plan.exec_downgraded,
        path = %ctx.data.plan().display(),
        "plan: wrote plan"
    );
    Ok(plan)
}

/// Check readiness; errors when the status is not ok.
pub async fn preflight(ctx: &Context) -> Result<PreflightStatus> {
    let cfg = &ctx.config;
    let plan = read_plan(&ctx.data.plan()).with_context(|| format!("reading {}", ctx.data.plan().display()))?;
    let sim = match read_sim_summary(&ctx.data.sim_summary()) {
        Ok(sim) => Some(sim),
        Err(e) => {
            warn!(error = %e, "tx_sim.json unavailable");
            None
        }
    };

    let check = Preflight::new(ctx.reader.clone(), ctx.env.chain_id, ctx.env.quoter_v2)
        .with_quoting(cfg.quote.enabled)
        .with_execution(cfg.exec.enabled, ctx.env.has_private_key())
        .with_max_age(cfg.exec.preflight_max_age_secs);
    let status = check.check(&plan, sim.as_ref(), Utc::now()).await?;

    status.log();
    println!("{}", serde_json::to_string_pretty(&status)?);
    status.ensure_ok()?;
    Ok(status)
}

/// Run one execution cycle over `tx_plan.json`.
pub async fn exec(ctx: &Context) -> Result<CycleReport> {
    let cfg = &ctx.config;
    if !cfg.exec.enabled {
        return Err(LiquidatorError::Config("exec blocked (set EXEC_ENABLED=1)".into()).into());
    }
    let key = ctx
        .env
        .private_key()
        .ok_or_else(|| LiquidatorError::Config("PRIVATE_KEY missing".into()))?;
    let executor_address = ctx.env.require_executor()?;

    let plan = read_plan(&ctx.data.plan()).with_context(|| format!("reading {}", ctx.data.plan().display()))?;

    let chain_id = ctx.reader.chain_id().await?;
    let submitter = ExecutorClient::new(
        key,
        ctx.env.rpc_url.clone(),
        chain_id,
        executor_address,
        Eip1559GasStrategy::new(u128::from(cfg.exec.priority_fee_wei), cfg.profit.gas_price_multiplier)
            .with_max_fee_cap(u128::from(cfg.exec.max_tx_gas_price_wei)),
    )?
    .with_timeout(cfg.quote.rpc_timeout());

    let executor = Executor::new(
        ctx.reader.clone(),
        Arc::new(submitter),
        ctx.cooldown(),
        cfg.exec.clone(),
        cfg.plan.order_deadline_secs(),
    )
    .with_record_path(ctx.data.execution_record());

    let report = executor.run_cycle(&plan, Utc::now()).await?;
    match &report.outcome {
        CycleOutcome::Broadcast(record) => info!(
            tx_hash = %record.tx_hash,
            candidate_id = %record.selected.candidate_id,
            "exec: submitted"
        ),
        CycleOutcome::NoTransaction => info!(
            selected = report.selected,
            tried = report.tried,
            skipped_healthy = report.skipped_healthy,
            failed = report.failed,
            "exec: no transaction sent"
        ),
        CycleOutcome::StalePlan { age_secs } => warn!(age_secs, "exec: plan too old; re-run plan"),
    }
    Ok(report)
}

/// simulate, plan, preflight, exec. Execution is skipped when disabled.
pub async fn cycle(ctx: &Context) -> Result<()> {
    let start = std::time::Instant::now();
    info!("cycle: simulate");
    simulate(ctx).await?;
    info!("cycle: plan");
    plan(ctx).await?;
    info!("cycle: preflight");
    preflight(ctx).await?;

    if ctx.config.exec.enabled {
        info!("cycle: exec");
        exec(ctx).await?;
    } else {
        info!("cycle: execution disabled; stopping after preflight");
    }
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "cycle: complete");
    Ok(())
}

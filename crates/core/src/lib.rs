//! Liquidator core logic.
//!
//! This crate provides the Morpho Blue liquidation pipeline:
//! - Candidate normalisation at the discovery boundary
//! - Profitability engine (quoted or modelled net profit per candidate)
//! - Order building and EXEC/WATCH/SKIP planning
//! - Execution state machine with healthy-revert cooldowns
//! - Preflight readiness checks
//! - Artifact persistence and share math

pub mod artifacts;
mod candidate;
pub mod config;
mod cooldown;
mod error;
mod executor;
mod planner;
mod preflight;
mod profit;
pub mod u256_math;

#[cfg(test)]
mod testing;

pub use artifacts::DataDir;
pub use candidate::{index_by_id, normalize_records, Candidate};
pub use config::{BotConfig, ChainEnv, ExecConfig, PlanConfig, ProfitConfig, QuoteConfig, DEFAULT_CHAIN_ID};
pub use cooldown::{CooldownStore, FileCooldownStore, InMemoryCooldownStore};
pub use error::{LiquidatorError, Result, RevertKind};
pub use executor::{
    CycleOutcome, CycleReport, ExecState, ExecutionRecord, Executor, HealthForensics, SelectedCandidate,
    Transition,
};
pub use planner::{parse_fee_from_mode, OrderBuilder, Plan, PlanAction, PlanItem, Planner};
pub use preflight::{Preflight, PreflightStatus};
pub use profit::{
    liquidation_incentive, Evaluation, Opportunity, PricingContext, ProfitEngine, SimulationDiagnostics,
    SimulationReport, SimulationSummary,
};

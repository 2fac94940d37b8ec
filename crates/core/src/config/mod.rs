//! Configuration for the liquidation pipeline.
//!
//! This module provides:
//! - Bot runtime configuration (profiles, thresholds, cost model, execution gates)
//! - Deployment environment (RPC endpoint, contract addresses, signer key)

mod bot;
mod env;

pub use bot::{BotConfig, ExecConfig, PlanConfig, ProfitConfig, QuoteConfig};
pub use env::{ChainEnv, DEFAULT_CHAIN_ID};

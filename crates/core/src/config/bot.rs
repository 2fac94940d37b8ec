//! Configuration management with profile support.
//!
//! Provides centralized configuration for every pipeline stage with
//! support for named profiles (default, production, aggressive), a TOML
//! file, and individual environment overrides on top.

use crate::error::{LiquidatorError, Result};
use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure containing all pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    #[serde(default)]
    pub quote: QuoteConfig,

    #[serde(default)]
    pub profit: ProfitConfig,

    #[serde(default)]
    pub plan: PlanConfig,

    #[serde(default)]
    pub exec: ExecConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Quote optimizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Quote through QuoterV2 at all (model-only when off)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra fee tiers tried after the standard ones
    #[serde(default = "default_quote_fees")]
    pub fee_tiers: Vec<u32>,

    /// Two-hop intermediates
    #[serde(default = "default_intermediates")]
    pub intermediates: Vec<Address>,

    /// Fee tiers per leg of a two-hop route
    #[serde(default = "default_max_fees_per_hop")]
    pub max_fees_per_hop: usize,

    /// Candidates evaluated concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-call RPC timeout (seconds)
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_quote_fees() -> Vec<u32> {
    vec![500, 3000, 10000]
}
fn default_intermediates() -> Vec<Address> {
    vec![
        address!("82aF49447D8a07e3bd95BD0d56f35241523fbab1"), // WETH
        address!("af88d065e77c8cC2239327C5EDb3A432268e5831"), // USDC
        address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"), // USDT
        address!("DA10009cBd5D07dd0CeCc66161FC93D7c9000da1"), // DAI
    ]
}
fn default_max_fees_per_hop() -> usize {
    3
}
fn default_concurrency() -> usize {
    5
}
fn default_rpc_timeout() -> u64 {
    15
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            fee_tiers: default_quote_fees(),
            intermediates: default_intermediates(),
            max_fees_per_hop: default_max_fees_per_hop(),
            concurrency: default_concurrency(),
            rpc_timeout_secs: default_rpc_timeout(),
        }
    }
}

impl QuoteConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

/// Profitability model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitConfig {
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Safety scale on the live gas price
    #[serde(default = "default_gas_multiplier")]
    pub gas_price_multiplier: f64,

    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,

    #[serde(default = "default_flash_fee_bps")]
    pub flash_fee_bps: u16,

    #[serde(default = "default_min_profit")]
    pub min_profit_net_usd: f64,

    #[serde(default = "default_safety_buffer")]
    pub safety_buffer_usd: f64,

    /// Repay amount cap per liquidation (USD)
    #[serde(default = "default_max_repay")]
    pub max_repay_usd: f64,

    /// Bonus model: `clamp(beta / lltv + (1 - beta), 1, cap)`
    #[serde(default = "default_lif_beta")]
    pub lif_beta: f64,

    #[serde(default = "default_lif_cap")]
    pub lif_cap: f64,

    /// Pinned ETH/USD; skips the Chainlink read
    #[serde(default)]
    pub eth_price_usd: Option<f64>,

    #[serde(default = "default_eth_max_age")]
    pub eth_usd_max_age_secs: u64,

    #[serde(default)]
    pub allow_exec_with_degraded_pricing: bool,

    /// Add the Arbitrum L1 calldata fee to the gas cost
    #[serde(default)]
    pub include_l1_fee: bool,

    #[serde(default = "default_calldata_bytes")]
    pub calldata_bytes: usize,
}

fn default_gas_limit() -> u64 {
    1_200_000
}
fn default_gas_multiplier() -> f64 {
    1.5
}
fn default_slippage_bps() -> u16 {
    50
}
fn default_flash_fee_bps() -> u16 {
    5
}
fn default_min_profit() -> f64 {
    2.0
}
fn default_safety_buffer() -> f64 {
    2.0
}
fn default_max_repay() -> f64 {
    10_000.0
}
fn default_lif_beta() -> f64 {
    0.3
}
fn default_lif_cap() -> f64 {
    1.15
}
fn default_eth_max_age() -> u64 {
    180
}
fn default_calldata_bytes() -> usize {
    64
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            gas_price_multiplier: default_gas_multiplier(),
            slippage_bps: default_slippage_bps(),
            flash_fee_bps: default_flash_fee_bps(),
            min_profit_net_usd: default_min_profit(),
            safety_buffer_usd: default_safety_buffer(),
            max_repay_usd: default_max_repay(),
            lif_beta: default_lif_beta(),
            lif_cap: default_lif_cap(),
            eth_price_usd: None,
            eth_usd_max_age_secs: default_eth_max_age(),
            allow_exec_with_degraded_pricing: false,
            include_l1_fee: false,
            calldata_bytes: default_calldata_bytes(),
        }
    }
}

impl ProfitConfig {
    /// Net profit an opportunity must clear.
    pub fn required_net_usd(&self) -> f64 {
        self.min_profit_net_usd + self.safety_buffer_usd
    }
}

/// Planning thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Proximity at which a position is watched (inclusive)
    #[serde(default = "default_watch_proximity")]
    pub watch_proximity: f64,

    /// Proximity at which a position may be executed (inclusive)
    #[serde(default = "default_exec_proximity")]
    pub exec_proximity: f64,

    /// Opportunity rows older than this are stale
    #[serde(default = "default_max_opp_age")]
    pub max_opportunity_age_secs: u64,

    /// Orders built per plan; clamped to 1..=200
    #[serde(default = "default_max_exec_orders")]
    pub max_exec_orders: usize,

    /// Order validity; never below 60s
    #[serde(default = "default_deadline")]
    pub order_deadline_secs: u64,

    #[serde(default)]
    pub referral_code: u16,
}

fn default_watch_proximity() -> f64 {
    0.94
}
fn default_exec_proximity() -> f64 {
    1.0
}
fn default_max_opp_age() -> u64 {
    60
}
fn default_max_exec_orders() -> usize {
    25
}
fn default_deadline() -> u64 {
    180
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            watch_proximity: default_watch_proximity(),
            exec_proximity: default_exec_proximity(),
            max_opportunity_age_secs: default_max_opp_age(),
            max_exec_orders: default_max_exec_orders(),
            order_deadline_secs: default_deadline(),
            referral_code: 0,
        }
    }
}

impl PlanConfig {
    pub fn max_exec_orders(&self) -> usize {
        self.max_exec_orders.clamp(1, 200)
    }

    pub fn order_deadline_secs(&self) -> u64 {
        self.order_deadline_secs.max(60)
    }
}

/// Execution gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Must be explicitly enabled to sign anything
    #[serde(default)]
    pub enabled: bool,

    /// Gas price ceiling (wei); candidates are skipped above it
    #[serde(default = "default_max_gas_price")]
    pub max_tx_gas_price_wei: u64,

    /// Priority tip (wei)
    #[serde(default = "default_priority_fee")]
    pub priority_fee_wei: u64,

    /// Plan older than this aborts the cycle
    #[serde(default = "default_plan_max_age")]
    pub plan_max_age_secs: u64,

    #[serde(default = "default_cooldown")]
    pub healthy_cooldown_secs: u64,

    /// Artifact freshness checked by preflight
    #[serde(default = "default_preflight_max_age")]
    pub preflight_max_age_secs: u64,
}

fn default_max_gas_price() -> u64 {
    10_000_000_000
}
fn default_priority_fee() -> u64 {
    3_000_000_000
}
fn default_plan_max_age() -> u64 {
    30
}
fn default_cooldown() -> u64 {
    900
}
fn default_preflight_max_age() -> u64 {
    180
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_tx_gas_price_wei: default_max_gas_price(),
            priority_fee_wei: default_priority_fee(),
            plan_max_age_secs: default_plan_max_age(),
            healthy_cooldown_secs: default_cooldown(),
            preflight_max_age_secs: default_preflight_max_age(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            quote: QuoteConfig::default(),
            profit: ProfitConfig::default(),
            plan: PlanConfig::default(),
            exec: ExecConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| LiquidatorError::Config(format!("invalid {name}={raw}")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(LiquidatorError::Config(format!("invalid {name}={raw}"))),
    }
}

fn parse_f64(name: &str, raw: &str) -> Result<f64> {
    let value: f64 = parse_env(name, raw)?;
    if !value.is_finite() {
        return Err(LiquidatorError::Config(format!("invalid {name}={raw}")));
    }
    Ok(value)
}

fn parse_fee_list(name: &str, raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_env::<u32>(name, s))
        .collect()
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Conservative profile: bigger buffer, tighter slippage.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            profit: ProfitConfig {
                slippage_bps: 30,
                safety_buffer_usd: 3.0,
                gas_price_multiplier: 1.5,
                ..Default::default()
            },
            plan: PlanConfig {
                max_exec_orders: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Lower thresholds and a higher tip.
    pub fn aggressive() -> Self {
        Self {
            profile: "aggressive".to_string(),
            quote: QuoteConfig {
                max_fees_per_hop: 4,
                concurrency: 8,
                ..Default::default()
            },
            profit: ProfitConfig {
                min_profit_net_usd: 1.0,
                safety_buffer_usd: 1.0,
                gas_price_multiplier: 2.0,
                ..Default::default()
            },
            plan: PlanConfig {
                watch_proximity: 0.92,
                ..Default::default()
            },
            exec: ExecConfig {
                priority_fee_wei: 5_000_000_000,
                ..Default::default()
            },
        }
    }

    /// Profile from BOT_PROFILE (production, aggressive), or default.
    pub fn from_profile_name(profile: &str) -> Self {
        match profile.to_lowercase().as_str() {
            "production" | "prod" => Self::production(),
            "aggressive" | "aggro" => Self::aggressive(),
            _ => Self::default(),
        }
    }

    /// BOT_CONFIG file or BOT_PROFILE profile, then individual env overrides.
    pub fn load() -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let mut config = match lookup("BOT_CONFIG") {
            Some(path) => Self::from_file(&path)
                .map_err(|e| LiquidatorError::Config(format!("BOT_CONFIG={path}: {e}")))?,
            None => Self::from_profile_name(&lookup("BOT_PROFILE").unwrap_or_default()),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Apply individual overrides. Malformed values are fatal.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("QUOTE_ENABLED") {
            self.quote.enabled = parse_bool("QUOTE_ENABLED", &v)?;
        }
        if let Some(v) = lookup("QUOTE_FEES") {
            let fees = parse_fee_list("QUOTE_FEES", &v)?;
            if !fees.is_empty() {
                self.quote.fee_tiers = fees;
            }
        }
        if let Some(v) = lookup("GAS_LIMIT") {
            self.profit.gas_limit = parse_env("GAS_LIMIT", &v)?;
        }
        if let Some(v) = lookup("GAS_PRICE_MULTIPLIER") {
            let m = parse_f64("GAS_PRICE_MULTIPLIER", &v)?;
            if m <= 0.0 {
                return Err(LiquidatorError::Config(format!("invalid GAS_PRICE_MULTIPLIER={v}")));
            }
            self.profit.gas_price_multiplier = m;
        }
        if let Some(v) = lookup("SLIPPAGE_BPS") {
            self.profit.slippage_bps = parse_env("SLIPPAGE_BPS", &v)?;
        }
        if let Some(v) = lookup("FLASHLOAN_FEE_BPS") {
            self.profit.flash_fee_bps = parse_env("FLASHLOAN_FEE_BPS", &v)?;
        }
        if let Some(v) = lookup("MIN_PROFIT_NET_USD") {
            self.profit.min_profit_net_usd = parse_f64("MIN_PROFIT_NET_USD", &v)?;
        }
        if let Some(v) = lookup("SAFETY_BUFFER_USD") {
            self.profit.safety_buffer_usd = parse_f64("SAFETY_BUFFER_USD", &v)?;
        }
        if let Some(v) = lookup("ETH_PRICE_USD") {
            let px = parse_f64("ETH_PRICE_USD", &v)?;
            self.profit.eth_price_usd = (px > 0.0).then_some(px);
        }
        if let Some(v) = lookup("ETH_USD_MAX_AGE_SEC") {
            self.profit.eth_usd_max_age_secs = parse_env("ETH_USD_MAX_AGE_SEC", &v)?;
        }
        if let Some(v) = lookup("ALLOW_EXEC_WITH_DEGRADED_PRICING") {
            self.profit.allow_exec_with_degraded_pricing =
                parse_bool("ALLOW_EXEC_WITH_DEGRADED_PRICING", &v)?;
        }
        if let Some(v) = lookup("INCLUDE_L1_FEE") {
            self.profit.include_l1_fee = parse_bool("INCLUDE_L1_FEE", &v)?;
        }
        if let Some(v) = lookup("CALLDATA_BYTES") {
            self.profit.calldata_bytes = parse_env("CALLDATA_BYTES", &v)?;
        }
        if let Some(v) = lookup("LIQ_PROX_THRESHOLD").or_else(|| lookup("WATCH_PROX_THRESHOLD")) {
            self.plan.watch_proximity = parse_f64("LIQ_PROX_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("EXEC_PROX_THRESHOLD") {
            self.plan.exec_proximity = parse_f64("EXEC_PROX_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("PLAN_MAX_OPP_AGE_SEC") {
            self.plan.max_opportunity_age_secs = parse_env("PLAN_MAX_OPP_AGE_SEC", &v)?;
        }
        if let Some(v) = lookup("PLAN_MAX_EXEC_ORDERS") {
            self.plan.max_exec_orders = parse_env("PLAN_MAX_EXEC_ORDERS", &v)?;
        }
        if let Some(v) = lookup("ORDER_DEADLINE_SEC") {
            self.plan.order_deadline_secs = parse_env("ORDER_DEADLINE_SEC", &v)?;
        }
        if let Some(v) = lookup("REFERRAL_CODE") {
            self.plan.referral_code = parse_env("REFERRAL_CODE", &v)?;
        }
        if let Some(v) = lookup("EXEC_ENABLED") {
            self.exec.enabled = parse_bool("EXEC_ENABLED", &v)?;
        }
        if let Some(v) = lookup("MAX_TX_GAS_PRICE_WEI") {
            self.exec.max_tx_gas_price_wei = parse_env("MAX_TX_GAS_PRICE_WEI", &v)?;
        }
        if let Some(v) = lookup("TX_PRIORITY_FEE_WEI") {
            self.exec.priority_fee_wei = parse_env("TX_PRIORITY_FEE_WEI", &v)?;
        }
        if let Some(v) = lookup("HEALTHY_COOLDOWN_SEC") {
            self.exec.healthy_cooldown_secs = parse_env("HEALTHY_COOLDOWN_SEC", &v)?;
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            enabled = self.quote.enabled,
            fee_tiers = ?self.quote.fee_tiers,
            intermediates = self.quote.intermediates.len(),
            max_fees_per_hop = self.quote.max_fees_per_hop,
            concurrency = self.quote.concurrency,
            "Quote parameters"
        );
        tracing::info!(
            gas_limit = self.profit.gas_limit,
            gas_multiplier = self.profit.gas_price_multiplier,
            slippage_bps = self.profit.slippage_bps,
            flash_fee_bps = self.profit.flash_fee_bps,
            required_net_usd = self.profit.required_net_usd(),
            "Profit parameters"
        );
        tracing::info!(
            watch = self.plan.watch_proximity,
            exec = self.plan.exec_proximity,
            max_exec_orders = self.plan.max_exec_orders(),
            "Plan thresholds"
        );
        tracing::info!(
            enabled = self.exec.enabled,
            max_gas_price_wei = self.exec.max_tx_gas_price_wei,
            priority_fee_wei = self.exec.priority_fee_wei,
            cooldown_secs = self.exec.healthy_cooldown_secs,
            "Execution gates"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.profit.gas_limit, 1_200_000);
        assert_eq!(config.profit.required_net_usd(), 4.0);
        assert_eq!(config.plan.watch_proximity, 0.94);
        assert_eq!(config.exec.max_tx_gas_price_wei, 10_000_000_000);
        assert_eq!(config.quote.intermediates.len(), 4);
        assert!(!config.exec.enabled);
    }

    #[test]
    fn test_profiles() {
        assert_eq!(BotConfig::from_profile_name("prod").profile, "production");
        assert_eq!(BotConfig::from_profile_name("AGGRESSIVE").profile, "aggressive");
        assert_eq!(BotConfig::from_profile_name("whatever").profile, "default");
        assert!(BotConfig::production().profit.safety_buffer_usd > 2.0);
    }

    #[test]
    fn test_clamps() {
        let mut plan = PlanConfig::default();
        plan.max_exec_orders = 0;
        assert_eq!(plan.max_exec_orders(), 1);
        plan.max_exec_orders = 5_000;
        assert_eq!(plan.max_exec_orders(), 200);
        plan.order_deadline_secs = 10;
        assert_eq!(plan.order_deadline_secs(), 60);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BotConfig::default();
        config
            .apply_overrides(env(&[
                ("QUOTE_FEES", "100, 2500"),
                ("MIN_PROFIT_NET_USD", "5"),
                ("WATCH_PROX_THRESHOLD", "0.9"),
                ("EXEC_ENABLED", "yes"),
                ("ETH_PRICE_USD", "0"),
            ]))
            .unwrap();
        assert_eq!(config.quote.fee_tiers, vec![100, 2500]);
        assert_eq!(config.profit.required_net_usd(), 7.0);
        assert_eq!(config.plan.watch_proximity, 0.9);
        assert!(config.exec.enabled);
        assert!(config.profit.eth_price_usd.is_none());
    }

    #[test]
    fn test_malformed_override_is_fatal() {
        let mut config = BotConfig::default();
        let err = config
            .apply_overrides(env(&[("SLIPPAGE_BPS", "fifty")]))
            .unwrap_err();
        assert!(matches!(err, LiquidatorError::Config(_)));

        let err = config
            .apply_overrides(env(&[("GAS_PRICE_MULTIPLIER", "-1")]))
            .unwrap_err();
        assert!(matches!(err, LiquidatorError::Config(_)));
    }

    #[test]
    fn test_serialization() {
        let config = BotConfig::aggressive();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"aggressive\""));

        let parsed: BotConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.profile, "aggressive");
        assert_eq!(parsed.exec.priority_fee_wei, 5_000_000_000);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: BotConfig = toml::from_str("[profit]\nslippage_bps = 25\n").unwrap();
        assert_eq!(parsed.profit.slippage_bps, 25);
        assert_eq!(parsed.profit.gas_limit, 1_200_000);
        assert_eq!(parsed.profile, "default");
    }
}

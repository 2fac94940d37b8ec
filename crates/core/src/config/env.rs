//! Deployment environment: RPC endpoint, contract addresses, signer key.

use crate::error::{LiquidatorError, Result};
use alloy::primitives::Address;
use liquidator_api::UniswapV3Addresses;
use liquidator_chain::{ARB_GAS_INFO, ETH_USD_FEED_ARBITRUM, MORPHO_BLUE_ARBITRUM};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_CHAIN_ID: u64 = 42161;

/// Values read from the process environment at startup.
#[derive(Clone)]
pub struct ChainEnv {
    pub rpc_url: String,
    pub chain_id: u64,
    pub morpho: Address,
    pub quoter_v2: Address,
    pub multicall3: Address,
    pub eth_usd_feed: Address,
    pub gas_info: Address,
    pub executor: Option<Address>,
    private_key: Option<String>,
    pub data_dir: PathBuf,
}

impl fmt::Debug for ChainEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEnv")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("morpho", &self.morpho)
            .field("quoter_v2", &self.quoter_v2)
            .field("executor", &self.executor)
            .field("private_key_loaded", &self.private_key.is_some())
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

fn parse_address(name: &str, raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| LiquidatorError::Config(format!("invalid {name}={raw}")))
}

/// Placeholders and truncated keys count as no key.
fn usable_private_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() || key == "0x" || key.contains("REPLACE_ME") || key.len() < 10 {
        return None;
    }
    Some(key.to_string())
}

impl ChainEnv {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`. `ARB_RPC_URL` is required; addresses fall back
    /// to the Arbitrum One deployments.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let address_or = |key: &str, default: Address| -> Result<Address> {
            match get(key) {
                Some(raw) => parse_address(key, &raw),
                None => Ok(default),
            }
        };

        let rpc_url = get("ARB_RPC_URL")
            .map(|v| v.trim().to_string())
            .ok_or_else(|| LiquidatorError::Config("ARB_RPC_URL is required".into()))?;

        let chain_id = match get("CHAIN_ID") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| LiquidatorError::Config(format!("invalid CHAIN_ID={raw}")))?,
            None => DEFAULT_CHAIN_ID,
        };

        let uniswap = UniswapV3Addresses::arbitrum();
        let executor = get("EXECUTOR_ADDR")
            .map(|raw| parse_address("EXECUTOR_ADDR", &raw))
            .transpose()?;

        Ok(Self {
            rpc_url,
            chain_id,
            morpho: address_or("MORPHO_ADDR", MORPHO_BLUE_ARBITRUM)?,
            quoter_v2: address_or("UNISWAP_V3_QUOTER_V2", uniswap.quoter_v2)?,
            multicall3: address_or("MULTICALL3_ADDR", uniswap.multicall3)?,
            eth_usd_feed: address_or("ETH_USD_FEED", ETH_USD_FEED_ARBITRUM)?,
            gas_info: address_or("ARB_GASINFO_ADDR", ARB_GAS_INFO)?,
            executor,
            private_key: get("PRIVATE_KEY").and_then(|k| usable_private_key(&k)),
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string())),
        })
    }

    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Executor address, required for anything that signs.
    pub fn require_executor(&self) -> Result<Address> {
        self.executor
            .ok_or_else(|| LiquidatorError::Config("EXECUTOR_ADDR is required".into()))
    }

    pub fn uniswap_addresses(&self) -> UniswapV3Addresses {
        UniswapV3Addresses::arbitrum()
            .with_quoter(self.quoter_v2)
            .with_multicall(self.multicall3)
    }
}

//! Liquidation submission: revert-preserving simulation and broadcast.
//! Uses Alloy providers for type-safe RPC interactions.

use crate::contracts::{ILiquidationExecutor, LiquidationOrder};
use crate::error::ChainError;
use crate::gas::{Eip1559GasStrategy, GasStrategy};
use alloy::contract::Error as ContractError;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::decode_revert_reason;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of a dry-run of the exact payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Simulation {
    /// Call succeeded; `gas_limit` is the node's estimate for the same call.
    Success { gas_limit: u64 },
    /// Call reverted with a decoded reason (or the node's error message).
    Reverted { reason: String },
}

/// Write side of the chain.
///
/// `simulate` must report protocol reverts as [`Simulation::Reverted`] and
/// reserve `Err` for transport problems.
#[async_trait]
pub trait LiquidationSubmitter: Send + Sync + Debug {
    fn from_address(&self) -> Address;

    fn executor_address(&self) -> Address;

    async fn simulate(&self, order: &LiquidationOrder) -> Result<Simulation>;

    /// Sign and send `execute(order)` with an explicit gas limit and tip.
    /// Returns as soon as the node accepts the transaction.
    async fn broadcast(&self, order: &LiquidationOrder, gas_limit: u64, priority_fee_wei: u128) -> Result<B256>;
}

/// [`LiquidationSubmitter`] for the deployed executor contract.
pub struct ExecutorClient {
    rpc_url: String,
    wallet: EthereumWallet,
    from: Address,
    executor: Address,
    chain_id: u64,
    gas_strategy: Eip1559GasStrategy,
    timeout: Duration,
}

impl ExecutorClient {
    pub fn new(
        private_key: &str,
        rpc_url: impl Into<String>,
        chain_id: u64,
        executor: Address,
        gas_strategy: Eip1559GasStrategy,
    ) -> Result<Self> {
        let signer: PrivateKeySigner = private_key.trim().trim_start_matches("0x").parse()?;
        let from = signer.address();
        let client = Self {
            rpc_url: rpc_url.into(),
            wallet: EthereumWallet::from(signer),
            from,
            executor,
            chain_id,
            gas_strategy,
            timeout: Duration::from_secs(15),
        };

        info!(
            from = %from,
            executor = %executor,
            chain_id,
            gas_strategy = client.gas_strategy.strategy_name(),
            "Executor client initialized"
        );
        Ok(client)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        what: &'static str,
        fut: impl std::future::IntoFuture<Output = Result<T, ContractError>>,
    ) -> Result<Result<T, ContractError>> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ChainError::Timeout { what, after: self.timeout }.into())
    }
}

impl Debug for ExecutorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorClient")
            .field("from", &self.from)
            .field("executor", &self.executor)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .finish_non_exhaustive()
    }
}

/// Turn a node error response into a revert; anything else stays an error.
fn classify_call_error(err: ContractError) -> Result<Simulation> {
    if let ContractError::TransportError(transport) = &err {
        if let Some(payload) = transport.as_error_resp() {
            let reason = payload
                .as_revert_data()
                .and_then(|data| decode_revert_reason(&data))
                .unwrap_or_else(|| payload.message.to_string());
            return Ok(Simulation::Reverted { reason });
        }
    }
    Err(err.into())
}

#[async_trait]
impl LiquidationSubmitter for ExecutorClient {
    fn from_address(&self) -> Address {
        self.from
    }

    fn executor_address(&self) -> Address {
        self.executor
    }

    async fn simulate(&self, order: &LiquidationOrder) -> Result<Simulation> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let contract = ILiquidationExecutor::new(self.executor, &provider);
        let call = contract.execute(order.into()).from(self.from);

        let start = Instant::now();
        if let Err(e) = self.bounded("executor.execute(eth_call)", call.call()).await? {
            return classify_call_error(e);
        }

        let gas_limit = match self.bounded("executor.execute(estimateGas)", call.estimate_gas()).await? {
            Ok(gas) => gas,
            Err(e) => return classify_call_error(e),
        };

        debug!(
            borrower = %order.borrower,
            gas_limit,
            sim_ms = start.elapsed().as_millis(),
            "Simulation passed"
        );
        Ok(Simulation::Success { gas_limit })
    }

    async fn broadcast(&self, order: &LiquidationOrder, gas_limit: u64, priority_fee_wei: u128) -> Result<B256> {
        let params = self
            .gas_strategy
            .fetch_params(&self.rpc_url)
            .await?
            .with_priority_fee(priority_fee_wei);

        let mut tx = TransactionRequest::default()
            .with_from(self.from)
            .with_to(self.executor)
            .with_input(order.calldata())
            .with_gas_limit(gas_limit)
            .with_chain_id(self.chain_id);
        self.gas_strategy.apply_gas(&mut tx, &params);

        info!(
            executor = %self.executor,
            borrower = %order.borrower,
            gas_limit,
            max_fee_per_gas = params.max_fee_per_gas,
            priority_fee_wei,
            base_fee = params.base_fee,
            "Sending liquidation"
        );

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        let submit_start = Instant::now();
        let pending = tokio::time::timeout(self.timeout, provider.send_transaction(tx))
            .await
            .map_err(|_| ChainError::Timeout {
                what: "eth_sendRawTransaction",
                after: self.timeout,
            })??;
        let tx_hash = *pending.tx_hash();

        info!(
            tx_hash = %tx_hash,
            submit_ms = submit_start.elapsed().as_millis(),
            "Liquidation submitted"
        );
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (anvil account 0)
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_client_derives_sender() {
        let client = ExecutorClient::new(
            DEV_KEY,
            "http://localhost:8545",
            42161,
            Address::repeat_byte(9),
            Eip1559GasStrategy::new(3_000_000_000, 2.0),
        )
        .unwrap();
        assert_eq!(
            format!("{:?}", client.from_address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(client.executor_address(), Address::repeat_byte(9));
    }

    #[test]
    fn test_bad_key_rejected() {
        let client = ExecutorClient::new(
            "REPLACE_ME",
            "http://localhost:8545",
            42161,
            Address::ZERO,
            Eip1559GasStrategy::new(0, 1.0),
        );
        assert!(client.is_err());
    }

    #[test]
    fn test_debug_hides_wallet() {
        let client = ExecutorClient::new(
            DEV_KEY,
            "http://localhost:8545",
            42161,
            Address::ZERO,
            Eip1559GasStrategy::new(0, 1.0),
        )
        .unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("ac0974bec"));
        assert!(rendered.contains("ExecutorClient"));
    }
}

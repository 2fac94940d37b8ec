//! Typed failures of the chain layer.

use alloy::primitives::Address;
use std::future::IntoFuture;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    #[error("invalid price from {feed}: {reason}")]
    InvalidPrice { feed: Address, reason: String },
}

/// Run an RPC future with a deadline, so a silent node surfaces as [`ChainError::Timeout`].
pub async fn with_timeout<T, E, F>(what: &'static str, after: Duration, fut: F) -> anyhow::Result<T>
where
    F: IntoFuture<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(ChainError::Timeout { what, after }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_surfaces_typed_error() {
        let never = std::future::pending::<Result<(), anyhow::Error>>();
        let err = with_timeout("eth_call", Duration::from_millis(10), never)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChainError>(),
            Some(ChainError::Timeout { what: "eth_call", .. })
        ));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let fut = async { Err::<(), _>(anyhow::anyhow!("boom")) };
        let err = with_timeout("eth_call", Duration::from_secs(1), fut).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}

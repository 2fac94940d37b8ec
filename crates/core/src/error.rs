//! Error taxonomy of the pipeline.

use crate::u256_math::MathError;
use thiserror::Error;

/// How a simulation revert was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertKind {
    /// Position is no longer liquidatable.
    Healthy,
    Other,
}

impl RevertKind {
    pub fn classify(message: &str) -> Self {
        if message.to_lowercase().contains("position is healthy") {
            RevertKind::Healthy
        } else {
            RevertKind::Other
        }
    }
}

#[derive(Debug, Error)]
pub enum LiquidatorError {
    /// Missing or malformed data on one candidate; the batch continues.
    #[error("{0}")]
    InvalidInput(String),

    /// Network failure that may succeed on a later run.
    #[error("transient: {0}")]
    Transient(#[source] anyhow::Error),

    /// Expected operational stop (stale artifact, gas ceiling, degraded pricing).
    #[error("safety abort: {0}")]
    SafetyAbort(String),

    #[error("revert ({kind:?}): {message}")]
    Revert { kind: RevertKind, message: String },

    /// Fatal at startup.
    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
}

impl LiquidatorError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        LiquidatorError::InvalidInput(msg.into())
    }

    pub fn revert(message: impl Into<String>) -> Self {
        let message = message.into();
        LiquidatorError::Revert {
            kind: RevertKind::classify(&message),
            message,
        }
    }
}

pub type Result<T, E = LiquidatorError> = std::result::Result<T, E>;

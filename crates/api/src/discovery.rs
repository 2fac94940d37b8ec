//! Candidate records published by the discovery scanner.
//!
//! Discovery runs on its own schedule and writes two files: a `candidates.jsonl`
//! stream with every scanned position and a `hot_queue.json` ranking of the
//! positions close enough to watch. This module is the wire schema for both.
//! Every field the scanner may omit is optional here; normalisation into the
//! core `Candidate` type happens in one adapter on the consumer side.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Schema version written by the current scanner.
pub const CANDIDATE_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    CANDIDATE_SCHEMA_VERSION
}

/// Scanner verdict on the record's data quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateReason {
    Ok,
    MissingFields,
    LltvOutOfRange,
    LtvOutOfRange,
    #[serde(other)]
    Unknown,
}

impl CandidateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateReason::Ok => "ok",
            CandidateReason::MissingFields => "missing_fields",
            CandidateReason::LltvOutOfRange => "lltv_out_of_range",
            CandidateReason::LtvOutOfRange => "ltv_out_of_range",
            CandidateReason::Unknown => "unknown",
        }
    }

    /// Inverse of [`as_str`](Self::as_str); unrecognised tags map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "ok" => CandidateReason::Ok,
            "missing_fields" => CandidateReason::MissingFields,
            "lltv_out_of_range" => CandidateReason::LltvOutOfRange,
            "ltv_out_of_range" => CandidateReason::LtvOutOfRange,
            _ => CandidateReason::Unknown,
        }
    }
}

/// Scanner proximity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    BelowWatch,
    Watch,
    ExecReady,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::BelowWatch => "below_watch",
            CandidateStatus::Watch => "watch",
            CandidateStatus::ExecReady => "exec_ready",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "below_watch" => Some(CandidateStatus::BelowWatch),
            "watch" => Some(CandidateStatus::Watch),
            "exec_ready" => Some(CandidateStatus::ExecReady),
            _ => None,
        }
    }

    /// Bucket a proximity against the watch and exec thresholds.
    pub fn classify(proximity: Option<f64>, watch: f64, exec: f64) -> Self {
        match proximity {
            Some(p) if p >= exec => CandidateStatus::ExecReady,
            Some(p) if p >= watch => CandidateStatus::Watch,
            _ => CandidateStatus::BelowWatch,
        }
    }
}

/// One scanned position, version 1 of the wire schema.
///
/// Addresses are kept as strings so a malformed value rejects one candidate
/// during normalisation instead of failing the whole file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub rank: Option<u32>,
    pub candidate_id: String,
    pub market_id: String,
    pub borrower: String,
    pub collateral_token: String,
    pub loan_token: String,
    #[serde(default)]
    pub oracle: Option<String>,
    #[serde(default)]
    pub irm: Option<String>,
    #[serde(default)]
    pub collateral_symbol: Option<String>,
    #[serde(default)]
    pub loan_symbol: Option<String>,
    #[serde(default)]
    pub collateral_decimals: Option<u8>,
    #[serde(default)]
    pub loan_decimals: Option<u8>,
    #[serde(default)]
    pub collateral_price_usd: Option<f64>,
    #[serde(default)]
    pub loan_price_usd: Option<f64>,
    #[serde(default)]
    pub borrow_usd: Option<f64>,
    #[serde(default)]
    pub collateral_usd_est: Option<f64>,
    #[serde(default)]
    pub lltv: Option<f64>,
    #[serde(default)]
    pub lltv_wad: Option<String>,
    #[serde(default)]
    pub ltv_est: Option<f64>,
    #[serde(default)]
    pub proximity: Option<f64>,
    #[serde(default)]
    pub reason: Option<CandidateReason>,
    #[serde(default)]
    pub status: Option<CandidateStatus>,
    #[serde(default)]
    pub ts: Option<String>,
}

impl CandidateRecord {
    /// Whether the scanner marked this record usable.
    pub fn is_ok(&self) -> bool {
        self.reason == Some(CandidateReason::Ok)
    }
}

/// `hot_queue.json` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotQueue {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub hot_queue: Vec<CandidateRecord>,
}

/// Parse a `candidates.jsonl` body, skipping lines that do not decode.
pub fn parse_candidates_jsonl(body: &str) -> Vec<CandidateRecord> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_str::<CandidateRecord>(line) {
            Ok(record) if record.schema_version <= CANDIDATE_SCHEMA_VERSION => Some(record),
            Ok(record) => {
                warn!(
                    line = idx + 1,
                    version = record.schema_version,
                    "Skipping candidate with unsupported schema version"
                );
                None
            }
            Err(e) => {
                warn!(line = idx + 1, error = %e, "Skipping undecodable candidate line");
                None
            }
        })
        .collect()
}

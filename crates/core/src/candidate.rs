//! Normalised liquidation candidates.
//!
//! [`Candidate::from_record`] is the only place that deals with the
//! scanner's optional fields; everything downstream works on typed values.

use crate::error::{LiquidatorError, Result};
use alloy::primitives::{address, Address, B256, U256};
use liquidator_api::{CandidateReason, CandidateRecord, CandidateStatus};
use liquidator_chain::parse_market_id;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Tokens the executor cannot route (wrapped savings tokens without pools).
const UNSUPPORTED_TOKENS: [Address; 1] = [
    address!("ddb46999f8891663a8f2828d25298f70416d7610"), // sUSDS
];

const UNSUPPORTED_SYMBOLS: [&str; 1] = ["susds"];

/// Loan tokens whose USD amount maps 1:1 onto token units.
const USD_STABLES: [&str; 4] = ["USDC", "USDT", "DAI", "USDBC"];

/// A borrower position in one Morpho market.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub candidate_id: String,
    pub market_id: B256,
    pub borrower: Address,
    pub collateral_token: Address,
    pub loan_token: Address,
    /// Missing oracle or IRM keeps the candidate observable but not executable
    pub oracle: Option<Address>,
    pub irm: Option<Address>,
    pub collateral_symbol: String,
    pub loan_symbol: String,
    pub collateral_decimals: u8,
    pub loan_decimals: u8,
    pub collateral_price_usd: Option<f64>,
    pub loan_price_usd: Option<f64>,
    pub borrow_usd: Option<f64>,
    pub lltv: Option<f64>,
    pub lltv_wad: Option<U256>,
    pub proximity: Option<f64>,
    pub status: CandidateStatus,
    pub reason: CandidateReason,
}

fn required_address(field: &str, raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| LiquidatorError::invalid(format!("bad {field}={raw}")))
}

fn optional_address(raw: Option<&str>) -> Option<Address> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<Address>().ok())
        .filter(|a| !a.is_zero())
}

fn finite(x: Option<f64>) -> Option<f64> {
    x.filter(|v| v.is_finite())
}

fn positive(x: Option<f64>) -> Option<f64> {
    finite(x).filter(|v| *v > 0.0)
}

impl Candidate {
    /// Normalise one scanner record.
    ///
    /// Malformed identity fields (market id, addresses, decimals) reject the
    /// record. A missing status is derived from `proximity` and the
    /// thresholds; a missing reason from the lltv and proximity fields.
    pub fn from_record(record: &CandidateRecord, watch_proximity: f64, exec_proximity: f64) -> Result<Self> {
        let market_id = parse_market_id(&record.market_id)
            .ok_or_else(|| LiquidatorError::invalid(format!("bad marketId={}", record.market_id)))?;
        let collateral_decimals = record
            .collateral_decimals
            .ok_or_else(|| LiquidatorError::invalid("missing collateralDecimals"))?;
        let loan_decimals = record
            .loan_decimals
            .ok_or_else(|| LiquidatorError::invalid("missing loanDecimals"))?;

        let lltv = finite(record.lltv);
        let proximity = finite(record.proximity);
        let lltv_wad = record
            .lltv_wad
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| U256::from_str_radix(s, 10).ok())
            .filter(|v| !v.is_zero());

        let status = record
            .status
            .unwrap_or_else(|| CandidateStatus::classify(proximity, watch_proximity, exec_proximity));
        let reason = record.reason.unwrap_or(match (lltv, proximity) {
            (None, _) | (_, None) => CandidateReason::MissingFields,
            (Some(l), _) if l <= 0.0 || l >= 1.0 => CandidateReason::LltvOutOfRange,
            _ => CandidateReason::Ok,
        });

        Ok(Self {
            candidate_id: record.candidate_id.clone(),
            market_id,
            borrower: required_address("borrower", &record.borrower)?,
            collateral_token: required_address("collateralToken", &record.collateral_token)?,
            loan_token: required_address("loanToken", &record.loan_token)?,
            oracle: optional_address(record.oracle.as_deref()),
            irm: optional_address(record.irm.as_deref()),
            collateral_symbol: record.collateral_symbol.clone().unwrap_or_default(),
            loan_symbol: record.loan_symbol.clone().unwrap_or_default(),
            collateral_decimals: collateral_decimals.min(36),
            loan_decimals: loan_decimals.min(36),
            collateral_price_usd: positive(record.collateral_price_usd),
            loan_price_usd: positive(record.loan_price_usd),
            borrow_usd: finite(record.borrow_usd),
            lltv,
            lltv_wad,
            proximity,
            status,
            reason,
        })
    }

    /// Either side of the pair is on the denylist (by address or symbol).
    pub fn is_unsupported(&self) -> bool {
        let symbol_hit = |s: &str| UNSUPPORTED_SYMBOLS.contains(&s.to_lowercase().as_str());
        UNSUPPORTED_TOKENS.contains(&self.collateral_token)
            || UNSUPPORTED_TOKENS.contains(&self.loan_token)
            || symbol_hit(&self.collateral_symbol)
            || symbol_hit(&self.loan_symbol)
    }

    pub fn has_loan_stable(&self) -> bool {
        USD_STABLES.contains(&self.loan_symbol.to_uppercase().as_str())
    }

    /// Usable input for the profitability stage.
    pub fn is_watchable(&self) -> bool {
        self.reason == CandidateReason::Ok && self.status != CandidateStatus::BelowWatch
    }

    pub fn market_id_hex(&self) -> String {
        format!("{:#x}", self.market_id)
    }
}

/// Normalise a batch, dropping (and logging) malformed records.
pub fn normalize_records(records: &[CandidateRecord], watch_proximity: f64, exec_proximity: f64) -> Vec<Candidate> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        match Candidate::from_record(record, watch_proximity, exec_proximity) {
            Ok(c) => out.push(c),
            Err(e) => warn!(candidate_id = %record.candidate_id, error = %e, "Rejecting candidate record"),
        }
    }
    debug!(records = records.len(), normalized = out.len(), "Candidates normalized");
    out
}

/// Index by candidate id; later duplicates win.
pub fn index_by_id(candidates: Vec<Candidate>) -> HashMap<String, Candidate> {
    candidates
        .into_iter()
        .map(|c| (c.candidate_id.clone(), c))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const MARKET: &str = "0xb8fc70e82bc5bb53e773626fcc6a23f7eefa036918d7ef216ecfb1950a94a85e";

    pub(crate) fn sample_record() -> CandidateRecord {
        CandidateRecord {
            schema_version: 1,
            candidate_id: "42161|wsteth-usdc|0x01".to_string(),
            market_id: MARKET.to_string(),
            borrower: format!("{}", Address::repeat_byte(0x0b)),
            collateral_token: format!("{}", Address::repeat_byte(0x0c)),
            loan_token: format!("{}", Address::repeat_byte(0x0d)),
            oracle: Some(format!("{}", Address::repeat_byte(0x0e))),
            irm: Some(format!("{}", Address::repeat_byte(0x0f))),
            collateral_symbol: Some("wstETH".to_string()),
            loan_symbol: Some("USDC".to_string()),
            collateral_decimals: Some(18),
            loan_decimals: Some(6),
            collateral_price_usd: Some(4000.0),
            loan_price_usd: Some(1.0),
            borrow_usd: Some(20_000.0),
            lltv: Some(0.86),
            lltv_wad: Some("860000000000000000".to_string()),
            proximity: Some(1.01),
            reason: Some(CandidateReason::Ok),
            status: Some(CandidateStatus::ExecReady),
            ..Default::default()
        }
    }

    pub(crate) fn sample_candidate() -> Candidate {
        Candidate::from_record(&sample_record(), 0.94, 1.0).unwrap()
    }

    #[test]
    fn test_from_record() {
        let c = sample_candidate();
        assert_eq!(c.market_id_hex(), MARKET);
        assert_eq!(c.loan_decimals, 6);
        assert_eq!(c.lltv_wad, Some(U256::from(860_000_000_000_000_000u64)));
        assert!(c.has_loan_stable());
        assert!(c.is_watchable());
        assert!(!c.is_unsupported());
    }

    #[test]
    fn test_missing_optionals_are_tolerated() {
        let mut record = sample_record();
        record.oracle = None;
        record.irm = Some("not-an-address".to_string());
        record.lltv_wad = Some(String::new());
        record.status = None;
        record.reason = None;
        record.proximity = Some(0.95);

        let c = Candidate::from_record(&record, 0.94, 1.0).unwrap();
        assert!(c.oracle.is_none());
        assert!(c.irm.is_none());
        assert!(c.lltv_wad.is_none());
        assert_eq!(c.status, CandidateStatus::Watch);
        assert_eq!(c.reason, CandidateReason::Ok);
    }

    #[test]
    fn test_bad_identity_rejects() {
        let mut record = sample_record();
        record.borrower = "0x123".to_string();
        assert!(matches!(
            Candidate::from_record(&record, 0.94, 1.0),
            Err(LiquidatorError::InvalidInput(_))
        ));

        let mut record = sample_record();
        record.loan_decimals = None;
        assert!(Candidate::from_record(&record, 0.94, 1.0).is_err());
    }

    #[test]
    fn test_unsupported_by_address_and_symbol() {
        let mut record = sample_record();
        record.collateral_token = "0xdDb46999F8891663a8F2828d25298f70416d7610".to_string();
        assert!(Candidate::from_record(&record, 0.94, 1.0).unwrap().is_unsupported());

        let mut record = sample_record();
        record.loan_symbol = Some("sUSDS".to_string());
        assert!(Candidate::from_record(&record, 0.94, 1.0).unwrap().is_unsupported());
    }

    #[test]
    fn test_derived_reason() {
        let mut record = sample_record();
        record.reason = None;
        record.lltv = Some(1.2);
        assert_eq!(
            Candidate::from_record(&record, 0.94, 1.0).unwrap().reason,
            CandidateReason::LltvOutOfRange
        );
        record.lltv = None;
        assert_eq!(
            Candidate::from_record(&record, 0.94, 1.0).unwrap().reason,
            CandidateReason::MissingFields
        );
    }

    #[test]
    fn test_normalize_drops_bad_records() {
        let mut bad = sample_record();
        bad.market_id = "0x01".to_string();
        let out = normalize_records(&[sample_record(), bad], 0.94, 1.0);
        assert_eq!(out.len(), 1);
        assert_eq!(index_by_id(out).len(), 1);
    }
}

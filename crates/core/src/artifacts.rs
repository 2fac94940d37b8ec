//! On-disk artifacts shared between pipeline stages.
//!
//! | file | writer | reader |
//! |------|--------|--------|
//! | `hot_queue.json` | discovery | simulate |
//! | `candidates.jsonl` | discovery | plan |
//! | `opportunities.csv` | simulate | plan |
//! | `tx_sim.json` | simulate | preflight |
//! | `tx_plan.json` | plan | exec, preflight |
//! | `tx_exec.json` | exec | operators |
//! | `healthy_cooldown.json` | exec | plan, exec |
//!
//! Every write goes to a sibling temp file first and is renamed into place.

use crate::error::{LiquidatorError, Result};
use crate::executor::ExecutionRecord;
use crate::planner::Plan;
use crate::profit::{Opportunity, SimulationSummary};
use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, SecondsFormat, Utc};
use liquidator_api::{parse_candidates_jsonl, CandidateReason, CandidateRecord, CandidateStatus, HotQueue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Column order of `opportunities.csv`.
pub const OPPORTUNITY_COLUMNS: [&str; 34] = [
    "ts",
    "candidateId",
    "marketId",
    "borrower",
    "collateralToken",
    "loanToken",
    "oracle",
    "irm",
    "lltvWad",
    "collateral",
    "loan",
    "status",
    "reason",
    "lltv",
    "proximity",
    "repayUsd",
    "lif",
    "grossProfitUsd",
    "estimatedGasUsd",
    "flashFeeUsd",
    "slippageUsd",
    "netProfitUsd",
    "requiredNetUsd",
    "quoteMode",
    "uniPath",
    "isQuoted",
    "passQuoted",
    "passExec",
    "passModel",
    "amountInCollat",
    "amountOutLoan",
    "amountOutUsdAdj",
    "pass",
    "note",
];

/// Artifact locations under one data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hot_queue(&self) -> PathBuf {
        self.root.join("hot_queue.json")
    }

    pub fn candidates(&self) -> PathBuf {
        self.root.join("candidates.jsonl")
    }

    pub fn opportunities(&self) -> PathBuf {
        self.root.join("opportunities.csv")
    }

    pub fn sim_summary(&self) -> PathBuf {
        self.root.join("tx_sim.json")
    }

    pub fn plan(&self) -> PathBuf {
        self.root.join("tx_plan.json")
    }

    pub fn execution_record(&self) -> PathBuf {
        self.root.join("tx_exec.json")
    }

    pub fn cooldown(&self) -> PathBuf {
        self.root.join("healthy_cooldown.json")
    }
}

/// Replace `path` with `body` through a temp file and a rename.
pub fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), bytes = body.len(), "Artifact written");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut body = serde_json::to_vec_pretty(value)?;
    body.push(b'\n');
    write_atomic(path, &body)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let body = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&body)?)
}

pub fn write_plan(path: &Path, plan: &Plan) -> Result<()> {
    write_json(path, plan)
}

pub fn read_plan(path: &Path) -> Result<Plan> {
    read_json(path)
}

pub fn write_sim_summary(path: &Path, summary: &SimulationSummary) -> Result<()> {
    write_json(path, summary)
}

pub fn read_sim_summary(path: &Path) -> Result<SimulationSummary> {
    read_json(path)
}

pub fn write_execution_record(path: &Path, record: &ExecutionRecord) -> Result<()> {
    write_json(path, record)
}

pub fn read_hot_queue(path: &Path) -> Result<HotQueue> {
    read_json(path)
}

/// Candidate records from `candidates.jsonl`; undecodable lines are skipped.
pub fn read_candidates(path: &Path) -> Result<Vec<CandidateRecord>> {
    let body = std::fs::read_to_string(path)?;
    Ok(parse_candidates_jsonl(&body))
}

// --- CSV ---

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split a CSV body into records. Quoted fields may contain separators,
/// doubled quotes and line breaks.
fn parse_records(body: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = body.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            ',' if !in_quotes => record.push(std::mem::take(&mut field)),
            '\r' if !in_quotes => {}
            '\n' if !in_quotes => {
                record.push(std::mem::take(&mut field));
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(ch),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

fn opt_f64(x: Option<f64>) -> String {
    x.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_display<T: std::fmt::Display>(x: Option<T>) -> String {
    x.map(|v| v.to_string()).unwrap_or_default()
}

fn flag(b: bool) -> String {
    let s = if b { "1" } else { "0" };
    s.to_string()
}

fn opportunity_fields(o: &Opportunity) -> [String; 34] {
    [
        o.ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        o.candidate_id.clone(),
        format!("{:#x}", o.market_id),
        o.borrower.to_string(),
        o.collateral_token.to_string(),
        o.loan_token.to_string(),
        opt_display(o.oracle),
        opt_display(o.irm),
        opt_display(o.lltv_wad),
        o.collateral_symbol.clone(),
        o.loan_symbol.clone(),
        o.status.as_str().to_string(),
        o.reason.as_str().to_string(),
        opt_f64(o.lltv),
        opt_f64(o.proximity),
        o.repay_usd.to_string(),
        o.lif.to_string(),
        o.gross_profit_usd.to_string(),
        o.estimated_gas_usd.to_string(),
        o.flash_fee_usd.to_string(),
        o.slippage_usd.to_string(),
        o.net_profit_usd.to_string(),
        o.required_net_usd.to_string(),
        o.quote_mode.clone(),
        opt_display(o.uni_path.as_ref()),
        flag(o.is_quoted),
        flag(o.pass_quoted),
        flag(o.pass_exec),
        flag(o.pass_model),
        opt_display(o.amount_in_collat),
        opt_display(o.amount_out_loan),
        opt_f64(o.amount_out_usd_adj),
        flag(o.pass),
        o.note.clone(),
    ]
}

/// Render rows in [`OPPORTUNITY_COLUMNS`] order.
pub fn opportunities_to_csv(rows: &[Opportunity]) -> String {
    let mut out = OPPORTUNITY_COLUMNS.join(",");
    out.push('\n');
    for row in rows {
        let fields = opportunity_fields(row);
        let line: Vec<String> = fields.iter().map(|f| escape(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// One CSV record looked up by column name.
struct Row<'a> {
    index: &'a HashMap<&'a str, usize>,
    fields: &'a [String],
}

impl Row<'_> {
    fn raw(&self, column: &str) -> &str {
        self.index
            .get(column)
            .and_then(|i| self.fields.get(*i))
            .map(|s| s.trim())
            .unwrap_or("")
    }

    fn text(&self, column: &str) -> String {
        self.raw(column).to_string()
    }

    fn required<T: std::str::FromStr>(&self, column: &str) -> Result<T> {
        let raw = self.raw(column);
        raw.parse::<T>()
            .map_err(|_| LiquidatorError::invalid(format!("bad {column}={raw}")))
    }

    fn optional<T: std::str::FromStr>(&self, column: &str) -> Option<T> {
        Some(self.raw(column))
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<T>().ok())
    }

    fn f64(&self, column: &str) -> Result<f64> {
        self.required::<f64>(column)
    }

    fn units(&self, column: &str) -> Option<U256> {
        Some(self.raw(column))
            .filter(|s| !s.is_empty())
            .and_then(|s| U256::from_str_radix(s, 10).ok())
    }

    fn flag(&self, column: &str) -> bool {
        matches!(self.raw(column).to_lowercase().as_str(), "1" | "true")
    }
}

fn parse_opportunity(row: &Row<'_>) -> Result<Opportunity> {
    let ts = DateTime::parse_from_rfc3339(row.raw("ts"))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| LiquidatorError::invalid(format!("bad ts={}", row.raw("ts"))))?;
    let status = CandidateStatus::parse(row.raw("status"))
        .ok_or_else(|| LiquidatorError::invalid(format!("bad status={}", row.raw("status"))))?;

    Ok(Opportunity {
        ts,
        candidate_id: row.text("candidateId"),
        market_id: row.required::<B256>("marketId")?,
        borrower: row.required::<Address>("borrower")?,
        collateral_token: row.required::<Address>("collateralToken")?,
        loan_token: row.required::<Address>("loanToken")?,
        oracle: row.optional::<Address>("oracle"),
        irm: row.optional::<Address>("irm"),
        lltv_wad: row.units("lltvWad"),
        collateral_symbol: row.text("collateral"),
        loan_symbol: row.text("loan"),
        status,
        reason: CandidateReason::parse(row.raw("reason")),
        lltv: row.optional::<f64>("lltv"),
        proximity: row.optional::<f64>("proximity"),
        repay_usd: row.f64("repayUsd")?,
        lif: row.f64("lif")?,
        gross_profit_usd: row.f64("grossProfitUsd")?,
        estimated_gas_usd: row.f64("estimatedGasUsd")?,
        flash_fee_usd: row.f64("flashFeeUsd")?,
        slippage_usd: row.f64("slippageUsd")?,
        net_profit_usd: row.f64("netProfitUsd")?,
        required_net_usd: row.f64("requiredNetUsd")?,
        quote_mode: row.text("quoteMode"),
        uni_path: row.optional::<Bytes>("uniPath").filter(|p| !p.is_empty()),
        is_quoted: row.flag("isQuoted"),
        pass_quoted: row.flag("passQuoted"),
        pass_exec: row.flag("passExec"),
        pass_model: row.flag("passModel"),
        amount_in_collat: row.units("amountInCollat"),
        amount_out_loan: row.units("amountOutLoan"),
        amount_out_usd_adj: row.optional::<f64>("amountOutUsdAdj"),
        pass: row.flag("pass"),
        note: row.text("note"),
    })
}

/// Parse an `opportunities.csv` body. Columns are matched by header name;
/// rows that do not parse are logged and skipped.
pub fn parse_opportunities_csv(body: &str) -> Vec<Opportunity> {
    let mut records = parse_records(body).into_iter();
    let Some(header) = records.next() else {
        return Vec::new();
    };
    let index: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();

    let mut rows = Vec::new();
    for (line, fields) in records.enumerate() {
        let row = Row {
            index: &index,
            fields: &fields,
        };
        match parse_opportunity(&row) {
            Ok(o) => rows.push(o),
            Err(e) => warn!(line = line + 2, error = %e, "Skipping malformed opportunity row"),
        }
    }
    rows
}

pub fn write_opportunities_csv(path: &Path, rows: &[Opportunity]) -> Result<()> {
    write_atomic(path, opportunities_to_csv(rows).as_bytes())
}

pub fn read_opportunities_csv(path: &Path) -> Result<Vec<Opportunity>> {
    let body = std::fs::read_to_string(path)?;
    Ok(parse_opportunities_csv(&body))
}

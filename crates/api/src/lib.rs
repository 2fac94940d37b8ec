//! Off-chain and quoting clients for the Morpho liquidator.
//!
//! This crate provides:
//! - Discovery: the versioned candidate schema produced by the scanner
//! - Swap: Uniswap V3 route search with Multicall3-batched QuoterV2 quotes

pub mod discovery;
pub mod swap;

pub use discovery::{
    parse_candidates_jsonl, CandidateReason, CandidateRecord, CandidateStatus, HotQueue,
    CANDIDATE_SCHEMA_VERSION,
};
pub use swap::{
    decode_v3_path, encode_v3_path, intermediate_label, BestQuote, FeeTier, MulticallQuoter,
    PathError, QuoteBatcher, QuoteFailure, QuoteLeg, QuoteOutcome, QuoteRequest, RouteOptimizer,
    RouteQuery, UniswapV3Addresses,
};

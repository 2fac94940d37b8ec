//! Uniswap V3 packed path encoding.
//!
//! A path is `token (20 bytes) | fee (3 bytes, big-endian) | token | ...`,
//! the layout expected by `SwapRouter02.exactInput` and `QuoterV2.quoteExactInput`.

use alloy::primitives::{Address, Bytes};
use thiserror::Error;

/// Largest fee value accepted in a path (100% in hundredths of a bip).
pub const MAX_FEE: u32 = 1_000_000;

const ADDR_LEN: usize = 20;
const FEE_LEN: usize = 3;
const HOP_LEN: usize = FEE_LEN + ADDR_LEN;

/// Route encoding/decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path needs at least 2 tokens, got {0}")]
    TooFewTokens(usize),
    #[error("fee count mismatch: {tokens} tokens need {expected} fees, got {fees}")]
    FeeCountMismatch {
        tokens: usize,
        expected: usize,
        fees: usize,
    },
    #[error("invalid fee tier {0}")]
    InvalidFee(u32),
    #[error("malformed path of {0} bytes")]
    BadLength(usize),
}

/// Encode `tokens`/`fees` into packed path bytes.
pub fn encode_v3_path(tokens: &[Address], fees: &[u32]) -> Result<Bytes, PathError> {
    if tokens.len() < 2 {
        return Err(PathError::TooFewTokens(tokens.len()));
    }
    if fees.len() != tokens.len() - 1 {
        return Err(PathError::FeeCountMismatch {
            tokens: tokens.len(),
            expected: tokens.len() - 1,
            fees: fees.len(),
        });
    }

    let mut out = Vec::with_capacity(ADDR_LEN + fees.len() * HOP_LEN);
    out.extend_from_slice(tokens[0].as_slice());
    for (fee, token) in fees.iter().zip(&tokens[1..]) {
        if *fee > MAX_FEE {
            return Err(PathError::InvalidFee(*fee));
        }
        out.extend_from_slice(&fee.to_be_bytes()[1..]);
        out.extend_from_slice(token.as_slice());
    }
    Ok(Bytes::from(out))
}

/// Decode packed path bytes back into `(tokens, fees)`.
pub fn decode_v3_path(path: &[u8]) -> Result<(Vec<Address>, Vec<u32>), PathError> {
    if path.len() < ADDR_LEN + HOP_LEN || (path.len() - ADDR_LEN) % HOP_LEN != 0 {
        return Err(PathError::BadLength(path.len()));
    }

    let hops = (path.len() - ADDR_LEN) / HOP_LEN;
    let mut tokens = Vec::with_capacity(hops + 1);
    let mut fees = Vec::with_capacity(hops);

    tokens.push(Address::from_slice(&path[..ADDR_LEN]));
    for hop in path[ADDR_LEN..].chunks_exact(HOP_LEN) {
        let fee = u32::from_be_bytes([0, hop[0], hop[1], hop[2]]);
        if fee > MAX_FEE {
            return Err(PathError::InvalidFee(fee));
        }
        fees.push(fee);
        tokens.push(Address::from_slice(&hop[FEE_LEN..]));
    }
    Ok((tokens, fees))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_hop_layout() {
        let a = Address::repeat_byte(0xaa);
        let b = Address::repeat_byte(0xbb);
        let path = encode_v3_path(&[a, b], &[500]).unwrap();

        assert_eq!(path.len(), 43);
        assert_eq!(&path[20..23], &[0x00, 0x01, 0xf4]);

        let (tokens, fees) = decode_v3_path(&path).unwrap();
        assert_eq!(tokens, vec![a, b]);
        assert_eq!(fees, vec![500]);
    }

    #[test]
    fn test_two_hop_decode() {
        let a = Address::repeat_byte(1);
        let m = Address::repeat_byte(2);
        let b = Address::repeat_byte(3);
        let path = encode_v3_path(&[a, m, b], &[3000, 100]).unwrap();
        assert_eq!(path.len(), 66);

        let (tokens, fees) = decode_v3_path(&path).unwrap();
        assert_eq!(tokens, vec![a, m, b]);
        assert_eq!(fees, vec![3000, 100]);
    }

    #[test]
    fn test_encode_rejects_bad_input() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);

        assert_eq!(encode_v3_path(&[a], &[]), Err(PathError::TooFewTokens(1)));
        assert!(matches!(
            encode_v3_path(&[a, b], &[500, 3000]),
            Err(PathError::FeeCountMismatch { .. })
        ));
        assert_eq!(
            encode_v3_path(&[a, b], &[1_000_001]),
            Err(PathError::InvalidFee(1_000_001))
        );
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert_eq!(decode_v3_path(&[0u8; 42]), Err(PathError::BadLength(42)));
        assert_eq!(decode_v3_path(&[0u8; 20]), Err(PathError::BadLength(20)));
    }
}

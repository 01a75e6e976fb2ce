//! Address encoding and parsing.
//!
//! Full-format address: bech32m(prefix, `0x00` ‖ code_hash(32) ‖ hash_type(1) ‖ args).
//! Prefix is `ckb` on mainnet and `ckt` on testnets. Addresses are longer
//! than the 90-character limit of BIP-350, so no length limit is enforced.

use thiserror::Error;

use crate::chain::types::{HashType, Script, H256};

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Reverse lookup table: ASCII byte → 5-bit value (0xFF = invalid).
const CHARSET_REV: [u8; 128] = {
    let mut table = [0xFFu8; 128];
    let mut i = 0;
    while i < 32 {
        table[CHARSET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

const BECH32M_CONST: u32 = 0x2bc8_30a3;
const CHECKSUM_CHARS: usize = 6;
const FORMAT_FULL: u8 = 0x00;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("malformed address '{0}'")]
    Malformed(String),

    #[error("invalid character {0:?} in address")]
    InvalidChar(char),

    #[error("address checksum mismatch")]
    Checksum,

    #[error("address prefix '{found}' does not match network prefix '{expected}'")]
    PrefixMismatch { expected: String, found: String },

    #[error("unsupported address format 0x{0:02x}")]
    UnsupportedFormat(u8),

    #[error("invalid address payload: {0}")]
    Payload(String),
}

fn polymod(values: &[u8]) -> u32 {
    const GEN: [u32; 5] = [0x3b6a_57b2, 0x2650_8e6d, 0x1ea1_19fa, 0x3d42_33dd, 0x2a14_62b3];
    let mut chk: u32 = 1;
    for &v in values {
        let top = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ v as u32;
        for (i, g) in GEN.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let mut out: Vec<u8> = hrp.bytes().map(|b| b >> 5).collect();
    out.push(0);
    out.extend(hrp.bytes().map(|b| b & 0x1f));
    out
}

fn create_checksum(hrp: &str, data: &[u8]) -> [u8; CHECKSUM_CHARS] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; CHECKSUM_CHARS]);
    let pm = polymod(&values) ^ BECH32M_CONST;
    let mut out = [0u8; CHECKSUM_CHARS];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ((pm >> (5 * (5 - i))) & 0x1f) as u8;
    }
    out
}

fn verify_checksum(hrp: &str, data: &[u8]) -> bool {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    polymod(&values) == BECH32M_CONST
}

/// Regroup bits between 8-bit bytes and 5-bit words.
fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max = (1u32 << to) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for &value in data {
        if (value as u32) >> from != 0 {
            return None;
        }
        acc = (acc << from) | value as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max) != 0 {
        return None;
    }
    Some(out)
}

/// Encode `script` as a full-format address under `prefix`.
pub fn encode_address(script: &Script, prefix: &str) -> String {
    let mut payload = Vec::with_capacity(34 + script.args.len());
    payload.push(FORMAT_FULL);
    payload.extend_from_slice(script.code_hash.as_bytes());
    payload.push(script.hash_type.to_byte());
    payload.extend_from_slice(&script.args);

    // 8 → 5 with padding never fails for byte input.
    let data = convert_bits(&payload, 8, 5, true).unwrap_or_default();
    let checksum = create_checksum(prefix, &data);

    let mut out = String::with_capacity(prefix.len() + 1 + data.len() + CHECKSUM_CHARS);
    out.push_str(prefix);
    out.push('1');
    for &d in data.iter().chain(checksum.iter()) {
        out.push(CHARSET[d as usize] as char);
    }
    out
}

/// Parse a full-format address, requiring `expected_prefix`.
pub fn parse_address(address: &str, expected_prefix: &str) -> Result<Script, AddressError> {
    if address.chars().any(|c| c.is_ascii_uppercase()) && address.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AddressError::Malformed(address.to_string()));
    }
    let lowered = address.to_ascii_lowercase();
    let (hrp, rest) = lowered
        .rsplit_once('1')
        .ok_or_else(|| AddressError::Malformed(address.to_string()))?;
    if hrp.is_empty() || rest.len() < CHECKSUM_CHARS {
        return Err(AddressError::Malformed(address.to_string()));
    }
    if hrp != expected_prefix {
        return Err(AddressError::PrefixMismatch {
            expected: expected_prefix.to_string(),
            found: hrp.to_string(),
        });
    }

    let mut data = Vec::with_capacity(rest.len());
    for c in rest.chars() {
        let value = (c as u32)
            .try_into()
            .ok()
            .and_then(|b: u8| CHARSET_REV.get(b as usize).copied())
            .filter(|v| *v != 0xFF)
            .ok_or(AddressError::InvalidChar(c))?;
        data.push(value);
    }
    if !verify_checksum(hrp, &data) {
        return Err(AddressError::Checksum);
    }

    let words = &data[..data.len() - CHECKSUM_CHARS];
    let payload = convert_bits(words, 5, 8, false)
        .ok_or_else(|| AddressError::Payload("non-zero padding".to_string()))?;

    let format = *payload
        .first()
        .ok_or_else(|| AddressError::Payload("empty payload".to_string()))?;
    if format != FORMAT_FULL {
        return Err(AddressError::UnsupportedFormat(format));
    }
    if payload.len() < 34 {
        return Err(AddressError::Payload(format!("payload too short ({} bytes)", payload.len())));
    }
    let code_hash = H256::from_slice(&payload[1..33])
        .map_err(|e| AddressError::Payload(e.to_string()))?;
    let hash_type = HashType::from_byte(payload[33])
        .ok_or_else(|| AddressError::Payload(format!("unknown hash type {}", payload[33])))?;

    Ok(Script::new(code_hash, hash_type, payload[34..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lock() -> Script {
        Script::new(H256([0x9b; 32]), HashType::Type, vec![0x01; 22])
    }

    #[test]
    fn test_encode_then_parse() {
        let address = encode_address(&sample_lock(), "ckt");
        assert!(address.starts_with("ckt1q"));
        assert_eq!(parse_address(&address, "ckt").unwrap(), sample_lock());
    }

    #[test]
    fn test_prefix_mismatch() {
        let address = encode_address(&sample_lock(), "ckb");
        assert_eq!(
            parse_address(&address, "ckt"),
            Err(AddressError::PrefixMismatch { expected: "ckt".into(), found: "ckb".into() })
        );
    }

    #[test]
    fn test_corrupted_checksum() {
        let mut address = encode_address(&sample_lock(), "ckt");
        let last = address.pop().unwrap();
        address.push(if last == 'q' { 'p' } else { 'q' });
        assert_eq!(parse_address(&address, "ckt"), Err(AddressError::Checksum));
    }

    #[test]
    fn test_invalid_character() {
        let address = format!("{}b", encode_address(&sample_lock(), "ckt"));
        assert_eq!(parse_address(&address, "ckt"), Err(AddressError::InvalidChar('b')));
    }

    #[test]
    fn test_garbage() {
        assert!(matches!(parse_address("not-an-address", "ckt"), Err(AddressError::Malformed(_))));
        assert!(parse_address("", "ckt").is_err());
    }

    #[test]
    fn test_known_testnet_address_parses() {
        // Fee recipient used by the test-mint scenario.
        let lock = parse_address(
            "ckt1qzda0cr08m85hc8jlnfp3zer7xulejywt49kt2rr0vthywaa50xwsqt7flvttxlkc6demckpu7waxp7ped6ekaga6suuq",
            "ckt",
        )
        .unwrap();
        assert_eq!(
            lock.code_hash.to_string(),
            "0x9bd7e06f3ecf4be0f2fcd2188b23f1b9fcc88e5d4b65a8637b17723bbda3cce8"
        );
        assert_eq!(lock.hash_type, HashType::Type);
        assert_eq!(lock.args.len(), 20);
    }
}

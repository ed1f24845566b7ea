//! Minimal Solidity ABI helpers for the custody contract.
//!
//! Only static types are needed (`bytes32`, `address`, `uint256`, `bool`),
//! each occupying one 32-byte word, so calldata is simply a 4-byte selector
//! followed by words and return data is a sequence of words.

use thiserror::Error;

use crate::fingerprint::keccak256;

/// Size of one ABI word.
pub const WORD_LEN: usize = 32;

/// One ABI-encoded word.
pub type Word = [u8; WORD_LEN];

/// Length of an EVM address in bytes.
const ADDRESS_LEN: usize = 20;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AbiError {
    #[error("invalid hex data: {0}")]
    InvalidHex(String),
    #[error("return data is {0} bytes, not a whole number of words")]
    Misaligned(usize),
    #[error("expected at least {expected} words, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("value does not fit in 64 bits")]
    Overflow,
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
    #[error("invalid hex quantity {0:?}")]
    InvalidQuantity(String),
}

fn strip_0x(text: &str) -> &str {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
}

/// 4-byte function selector: the first bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Event topic: the full `keccak256(signature)`.
pub fn event_topic(signature: &str) -> Word {
    keccak256(signature.as_bytes())
}

/// `0x`-prefixed calldata for `signature` applied to `args`.
pub fn encode_call(signature: &str, args: &[Word]) -> String {
    let mut data = Vec::with_capacity(4 + args.len() * WORD_LEN);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(arg);
    }
    format!("0x{}", hex::encode(data))
}

/// Returns `true` for `0x` followed by 40 hex digits (any case).
pub fn is_valid_address(addr: &str) -> bool {
    addr.len() == 2 + ADDRESS_LEN * 2
        && (addr.starts_with("0x") || addr.starts_with("0X"))
        && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Left-pads an address into a word.
pub fn address_word(addr: &str) -> Result<Word, AbiError> {
    if !is_valid_address(addr) {
        return Err(AbiError::InvalidAddress(addr.to_string()));
    }
    let bytes = hex::decode(&addr[2..]).map_err(|e| AbiError::InvalidHex(e.to_string()))?;
    let mut word = [0u8; WORD_LEN];
    word[WORD_LEN - ADDRESS_LEN..].copy_from_slice(&bytes);
    Ok(word)
}

/// Big-endian `uint256` word holding `value`.
pub fn u64_word(value: u64) -> Word {
    let mut word = [0u8; WORD_LEN];
    word[WORD_LEN - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Splits hex return data into words.
pub fn decode_words(data: &str) -> Result<Vec<Word>, AbiError> {
    let bytes = hex::decode(strip_0x(data)).map_err(|e| AbiError::InvalidHex(e.to_string()))?;
    if bytes.len() % WORD_LEN != 0 {
        return Err(AbiError::Misaligned(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(WORD_LEN)
        .map(|chunk| {
            let mut word = [0u8; WORD_LEN];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// Parses a single-word hex value (e.g. an indexed event topic).
pub fn decode_word(data: &str) -> Result<Word, AbiError> {
    let words = decode_words(data)?;
    match words.as_slice() {
        [word] => Ok(*word),
        _ => Err(AbiError::TooShort {
            expected: 1,
            actual: words.len(),
        }),
    }
}

/// Requires at least `expected` words.
pub fn expect_words(words: &[Word], expected: usize) -> Result<(), AbiError> {
    if words.len() < expected {
        return Err(AbiError::TooShort {
            expected,
            actual: words.len(),
        });
    }
    Ok(())
}

/// Reads a `uint256` word that must fit in 64 bits.
pub fn word_to_u64(word: &Word) -> Result<u64, AbiError> {
    if word[..WORD_LEN - 8].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&word[WORD_LEN - 8..]);
    Ok(u64::from_be_bytes(raw))
}

/// Reads a `bool` word; any non-zero value is `true`.
pub fn word_to_bool(word: &Word) -> bool {
    word.iter().any(|b| *b != 0)
}

/// Reads an `address` word as lowercase `0x`-prefixed hex.
pub fn word_to_address(word: &Word) -> String {
    format!("0x{}", hex::encode(&word[WORD_LEN - ADDRESS_LEN..]))
}

/// Parses a JSON-RPC hex quantity such as `"0x1b4"`.
pub fn parse_quantity(text: &str) -> Result<u64, AbiError> {
    let digits = strip_0x(text);
    if digits.is_empty() {
        return Err(AbiError::InvalidQuantity(text.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| AbiError::InvalidQuantity(text.to_string()))
}

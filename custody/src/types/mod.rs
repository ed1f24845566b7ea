//! Core domain types used by the custody pipeline.
//!
//! This module defines strongly-typed digests, identifiers, identities and
//! roles that are shared across the pipeline, the client adapters and the
//! catalog backends. As elsewhere in the crate, the goal is to avoid "naked"
//! strings and byte buffers in public APIs and to use domain-specific
//! newtypes instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Evidence records, their lifecycle and submitter-supplied metadata.
pub mod evidence;
/// Records read back from (and receipts returned by) the ledger.
pub mod ledger;

pub use evidence::{
    CustodyState, DEFAULT_MEDIA_TYPE, EvidenceMetadata, EvidenceRecord, GeoPoint, IllegalTransition,
    StoredContent,
};
pub use ledger::{AnchorReceipt, LedgerRecord};

/// Length in bytes of both digest domains (SHA-256 and Keccak-256).
pub const DIGEST_LEN: usize = 32;

/// Error returned when a textual digest cannot be parsed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DigestParseError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
    #[error("expected 32-byte digest, got {0} bytes")]
    WrongLength(usize),
}

/// Fixed-width 256-bit digest.
///
/// This is the backing representation of both [`Fingerprint`] and
/// [`Commitment`]. It is always exactly [`DIGEST_LEN`] bytes long and has a
/// single canonical textual form: lowercase hex without a `0x` prefix.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Digest256(pub [u8; DIGEST_LEN]);

impl Digest256 {
    /// Returns the underlying 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Canonical lowercase hex encoding (64 chars, no prefix).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a digest from hex text.
    ///
    /// Accepts upper- or lowercase digits and an optional `0x` prefix, which
    /// is how EVM ledgers report `bytes32` values.
    pub fn from_hex(text: &str) -> Result<Self, DigestParseError> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| DigestParseError::InvalidHex(e.to_string()))?;
        if bytes.len() != DIGEST_LEN {
            return Err(DigestParseError::WrongLength(bytes.len()));
        }
        let mut arr = [0u8; DIGEST_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Digest256(arr))
    }
}

impl fmt::Display for Digest256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// SHA-256 content fingerprint of an evidence file.
///
/// Serialized as canonical hex so that exported metadata and persisted
/// catalog records carry the same text the commitment is derived from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(pub Digest256);

impl Fingerprint {
    pub fn as_digest(&self) -> &Digest256 {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn from_hex(text: &str) -> Result<Self, DigestParseError> {
        Digest256::from_hex(text).map(Fingerprint)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DigestParseError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Fingerprint::from_hex(&text)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ledger commitment: the `bytes32` value anchored for a fingerprint.
///
/// Two commitments are equal exactly when their canonical hex encodings are
/// equal ignoring case, which is the comparison verification relies on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Commitment(pub Digest256);

impl Commitment {
    pub fn as_digest(&self) -> &Digest256 {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// `0x`-prefixed form used on the wire to EVM ledgers.
    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", self.0.to_hex())
    }

    pub fn from_hex(text: &str) -> Result<Self, DigestParseError> {
        Digest256::from_hex(text).map(Commitment)
    }
}

impl From<Commitment> for String {
    fn from(c: Commitment) -> Self {
        c.to_hex()
    }
}

impl TryFrom<String> for Commitment {
    type Error = DigestParseError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Commitment::from_hex(&text)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ledger-assigned evidence identifier.
///
/// Identifiers are handed out by the ledger on every successful anchor and
/// increase monotonically per ledger instance. They are never generated on
/// the client side.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct EvidenceId(pub u64);

impl EvidenceId {
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Big-endian key bytes; keeps catalog iteration in id order.
    pub fn to_key(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content identifier assigned by the content-addressed store.
///
/// Opaque to the pipeline: equal CIDs are assumed to name equal content,
/// but nothing in this crate interprets the string.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Cid(pub String);

impl Cid {
    pub fn new(cid: impl Into<String>) -> Self {
        Cid(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a submitter or requester in the identity/role store.
///
/// For EVM ledgers this is the account address. Identities are trimmed and
/// lowercased on construction so that checksummed and plain addresses map
/// to the same catalog index entry.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(identity: impl AsRef<str>) -> Self {
        Identity(identity.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Roles that may be granted to an identity by the role store.
///
/// `Reviewer` and `Auditor` correspond to the judge and lawyer roles of the
/// deployed custody contract.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Reviewer,
    Auditor,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Reviewer, Role::Auditor];

    pub fn name(&self) -> &'static str {
        match self {
            Role::Reviewer => "reviewer",
            Role::Auditor => "auditor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

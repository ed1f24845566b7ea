//! Types returned by the external ledger.

use serde::{Deserialize, Serialize};

use super::{Commitment, EvidenceId};

/// Acknowledgement of a successful anchor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    /// Identifier the ledger assigned to the new record.
    pub record_id: EvidenceId,
    /// Transaction reference (hash) of the anchoring transaction.
    pub tx_ref: String,
}

/// Authoritative record as read back from the ledger.
///
/// `exists == false` is a normal answer for identifiers that were never
/// anchored; in that case the remaining fields carry the ledger's zero
/// values and must not be interpreted.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub record_id: EvidenceId,
    pub commitment: Commitment,
    /// Address of the account recorded as submitter.
    pub submitter: String,
    /// Ledger-assigned timestamp, seconds since Unix epoch.
    pub timestamp: u64,
    pub exists: bool,
}

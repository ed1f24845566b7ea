//! Ledger and role-store abstractions used by the pipeline.

use std::sync::Arc;

use thiserror::Error;

use crate::types::{AnchorReceipt, Commitment, EvidenceId, Identity, LedgerRecord, Role};

use super::error::FailureKind;

/// Errors surfaced by ledger clients.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LedgerError {
    /// Node unreachable, request timed out, or confirmation never arrived.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    /// Ledger refused the request (unauthorized submitter, revert, bad input).
    #[error("ledger rejected request: {0}")]
    Rejected(String),
    /// Ledger answered with something this client cannot interpret.
    #[error("malformed ledger response: {0}")]
    Protocol(String),
}

impl LedgerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LedgerError::Unavailable(_) | LedgerError::Protocol(_) => {
                FailureKind::TransientUnavailable
            }
            LedgerError::Rejected(_) => FailureKind::Rejected,
        }
    }
}

/// Append-only ledger that anchors commitments.
///
/// `anchor` blocks until the ledger has confirmed the record (or the
/// client's timeout elapses). The ledger assigns a fresh identifier on every
/// successful call and has no dedup key, so callers must not blindly retry.
pub trait Ledger: Send + Sync {
    fn anchor(
        &self,
        commitment: &Commitment,
        submitter: &Identity,
    ) -> Result<AnchorReceipt, LedgerError>;

    /// Reads a record back. Unknown identifiers yield `exists == false`,
    /// not an error.
    fn fetch(&self, record_id: EvidenceId) -> Result<LedgerRecord, LedgerError>;
}

/// Read-only capability check against the identity/role store.
pub trait RoleDirectory: Send + Sync {
    fn has_role(&self, identity: &Identity, role: Role) -> Result<bool, LedgerError>;
}

impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    fn anchor(
        &self,
        commitment: &Commitment,
        submitter: &Identity,
    ) -> Result<AnchorReceipt, LedgerError> {
        (**self).anchor(commitment, submitter)
    }

    fn fetch(&self, record_id: EvidenceId) -> Result<LedgerRecord, LedgerError> {
        (**self).fetch(record_id)
    }
}

impl<T: RoleDirectory + ?Sized> RoleDirectory for Arc<T> {
    fn has_role(&self, identity: &Identity, role: Role) -> Result<bool, LedgerError> {
        (**self).has_role(identity, role)
    }
}

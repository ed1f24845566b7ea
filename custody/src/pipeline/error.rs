//! Pipeline-level errors.
//!
//! Every failure maps onto one [`FailureKind`], which is what callers use to
//! decide between retrying, fixing the request, or reporting a finding.
//! `Inconclusive` (could not check) and a `Tampered` verdict (checked and
//! failed) are never conflated: the former is an error here, the latter is
//! a successful verification with a negative verdict.

use std::fmt;

use thiserror::Error;

use crate::types::{AnchorReceipt, EvidenceId, Identity, StoredContent};

use super::catalog::CatalogError;
use super::ledger::LedgerError;
use super::store::StoreError;

/// Coarse failure taxonomy shared by every layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FailureKind {
    /// Store or ledger unreachable or timed out; safe to retry.
    TransientUnavailable,
    /// Request refused; retrying unchanged will fail again.
    Rejected,
    /// Missing CID, ledger record or catalog entry.
    NotFound,
    /// Verification could not complete.
    Inconclusive,
    /// Requester lacks the required role.
    Unauthorized,
}

/// Ingest step at which a failure occurred.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum IngestStep {
    /// Validating a resumed ingest before anchoring.
    Resume,
    Upload,
    Anchor,
    /// Recording the anchored record in the catalog.
    Persist,
}

impl IngestStep {
    pub fn name(&self) -> &'static str {
        match self {
            IngestStep::Resume => "resume",
            IngestStep::Upload => "upload",
            IngestStep::Anchor => "anchor",
            IngestStep::Persist => "persist",
        }
    }
}

impl fmt::Display for IngestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Underlying cause of an [`IngestError`].
#[derive(Debug, Error)]
pub enum IngestCause {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("invalid resume request: {0}")]
    InvalidResume(String),
}

/// Failed ingest, with enough context to retry.
///
/// - `stored` is set once the upload succeeded.
/// - `anchored` is set once the ledger accepted the record.
///
/// See [`IngestError::recovery`] for what to do with them.
#[derive(Debug, Error)]
#[error("ingest failed at {step} step: {cause}")]
pub struct IngestError {
    pub step: IngestStep,
    pub stored: Option<StoredContent>,
    pub anchored: Option<AnchorReceipt>,
    #[source]
    pub cause: IngestCause,
}

impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match &self.cause {
            IngestCause::Store(e) => e.kind(),
            IngestCause::Ledger(e) => e.kind(),
            IngestCause::Catalog(e) => e.kind(),
            IngestCause::InvalidResume(_) => FailureKind::Rejected,
        }
    }

    /// How the failed ingest can be completed without duplicating work.
    pub fn recovery(&self) -> Recovery {
        match (&self.stored, &self.anchored) {
            // The ledger holds the record: anchoring again would duplicate it.
            (_, Some(_)) => Recovery::Reconcile,
            (Some(_), None) => Recovery::Resume,
            (None, None) => Recovery::Restart,
        }
    }

    /// CID of the already-uploaded bytes, if the upload step succeeded.
    pub fn cid(&self) -> Option<&crate::types::Cid> {
        self.stored.as_ref().map(|s| &s.cid)
    }
}

/// Next step after a failed ingest.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Recovery {
    /// Nothing usable was stored; ingest the file again.
    Restart,
    /// Bytes are stored but not anchored:
    /// `EvidenceCoordinator::resume_ingest`.
    Resume,
    /// The ledger accepted the record but it is not catalogued:
    /// `EvidenceCoordinator::reconcile_anchored`.
    Reconcile,
}

impl Recovery {
    pub fn name(&self) -> &'static str {
        match self {
            Recovery::Restart => "restart",
            Recovery::Resume => "resume",
            Recovery::Reconcile => "reconcile",
        }
    }
}

/// External dependency that prevented a verification from completing.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Dependency {
    Store,
    Ledger,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Store => f.write_str("content store"),
            Dependency::Ledger => f.write_str("ledger"),
        }
    }
}

/// Why a verification was inconclusive.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InconclusiveReason {
    #[error("evidence bytes could not be retrieved: {0}")]
    Store(StoreError),
    #[error("ledger could not be read: {0}")]
    Ledger(LedgerError),
    #[error("ledger has no record {0}")]
    LedgerRecordMissing(EvidenceId),
}

impl InconclusiveReason {
    /// The dependency that was missing.
    pub fn dependency(&self) -> Dependency {
        match self {
            InconclusiveReason::Store(_) => Dependency::Store,
            InconclusiveReason::Ledger(_) | InconclusiveReason::LedgerRecordMissing(_) => {
                Dependency::Ledger
            }
        }
    }
}

/// Failed verification or retrieval.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("{requester} holds none of the roles required for this operation")]
    Unauthorized { requester: Identity },
    /// The role store itself could not be consulted.
    #[error("role check failed: {0}")]
    RoleCheck(LedgerError),
    #[error("evidence {0} is not catalogued")]
    NotFound(EvidenceId),
    #[error("verification of evidence {evidence_id} inconclusive ({}): {reason}", .reason.dependency())]
    Inconclusive {
        evidence_id: EvidenceId,
        reason: InconclusiveReason,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl VerifyError {
    pub fn kind(&self) -> FailureKind {
        match self {
            VerifyError::Unauthorized { .. } => FailureKind::Unauthorized,
            VerifyError::RoleCheck(e) => e.kind(),
            VerifyError::NotFound(_) => FailureKind::NotFound,
            VerifyError::Inconclusive { .. } => FailureKind::Inconclusive,
            VerifyError::Catalog(e) => e.kind(),
        }
    }
}

//! Evidence catalog abstraction.
//!
//! The catalog is the only mutable state shared between pipeline runs. It
//! is keyed by the ledger-assigned evidence id and keeps a secondary index
//! by submitter. Records enter the catalog already anchored; afterwards the
//! only permitted change is a verification annotation.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{CustodyState, EvidenceId, EvidenceRecord, IllegalTransition, Identity};

use super::error::FailureKind;

/// Errors raised by catalog backends.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog backend error: {0}")]
    Backend(String),
    #[error("corrupted catalog entry: {0}")]
    Corrupted(String),
    /// A record with this id is already present; ids are write-once.
    #[error("evidence {0} is already catalogued")]
    AlreadyExists(EvidenceId),
    #[error("evidence {0} is not catalogued")]
    NotFound(EvidenceId),
    /// Only `Anchored` records may be inserted.
    #[error("refusing to catalogue evidence {id} in state {state}")]
    NotAnchored { id: EvidenceId, state: CustodyState },
    #[error(transparent)]
    Transition(#[from] IllegalTransition),
}

impl CatalogError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CatalogError::NotFound(_) => FailureKind::NotFound,
            CatalogError::AlreadyExists(_)
            | CatalogError::NotAnchored { .. }
            | CatalogError::Transition(_) => FailureKind::Rejected,
            CatalogError::Backend(_) | CatalogError::Corrupted(_) => {
                FailureKind::TransientUnavailable
            }
        }
    }
}

/// Durable record of every anchored evidence item.
///
/// All methods take `&self`: backends provide their own interior
/// synchronization so one catalog can serve concurrent pipeline runs.
pub trait EvidenceCatalog: Send + Sync {
    /// Persists a newly anchored record. Fails if the id is already present
    /// or the record is not in the `Anchored` state.
    fn insert(&self, record: EvidenceRecord) -> Result<(), CatalogError>;

    fn get(&self, id: EvidenceId) -> Result<Option<EvidenceRecord>, CatalogError>;

    /// Appends a verification outcome and returns the updated record.
    fn annotate(
        &self,
        id: EvidenceId,
        outcome: CustodyState,
        at: DateTime<Utc>,
    ) -> Result<EvidenceRecord, CatalogError>;

    /// All evidence by `submitter`, newest first.
    fn list_by_submitter(&self, submitter: &Identity) -> Result<Vec<EvidenceRecord>, CatalogError>;

    /// Every catalogued record in id order.
    fn list_all(&self) -> Result<Vec<EvidenceRecord>, CatalogError>;
}

/// Shared admission check for [`EvidenceCatalog::insert`] implementations.
pub fn check_insertable(record: &EvidenceRecord) -> Result<(), CatalogError> {
    if record.status != CustodyState::Anchored {
        return Err(CatalogError::NotAnchored {
            id: record.evidence_id,
            state: record.status,
        });
    }
    Ok(())
}

/// Orders records newest first, breaking ties by descending id.
pub fn sort_newest_first(records: &mut [EvidenceRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.evidence_id.cmp(&a.evidence_id))
    });
}

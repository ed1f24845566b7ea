//! In-memory evidence catalog.
//!
//! Keeps all records in a `BTreeMap` keyed by `EvidenceId` behind an
//! `RwLock`, so iteration is naturally in id order. Nothing survives the
//! process.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::pipeline::catalog::{
    CatalogError, EvidenceCatalog, check_insertable, sort_newest_first,
};
use crate::types::{CustodyState, EvidenceId, EvidenceRecord, Identity};

/// In-memory implementation of [`EvidenceCatalog`].
#[derive(Default)]
pub struct InMemoryCatalog {
    records: RwLock<BTreeMap<EvidenceId, EvidenceRecord>>,
}

fn poisoned() -> CatalogError {
    CatalogError::Backend("in-memory catalog lock poisoned".to_string())
}

impl InMemoryCatalog {
    /// Creates a new, empty in-memory catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of catalogued records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns `true` if no records are catalogued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EvidenceCatalog for InMemoryCatalog {
    fn insert(&self, record: EvidenceRecord) -> Result<(), CatalogError> {
        check_insertable(&record)?;
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if records.contains_key(&record.evidence_id) {
            return Err(CatalogError::AlreadyExists(record.evidence_id));
        }
        records.insert(record.evidence_id, record);
        Ok(())
    }

    fn get(&self, id: EvidenceId) -> Result<Option<EvidenceRecord>, CatalogError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(&id).cloned())
    }

    fn annotate(
        &self,
        id: EvidenceId,
        outcome: CustodyState,
        at: DateTime<Utc>,
    ) -> Result<EvidenceRecord, CatalogError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let record = records.get_mut(&id).ok_or(CatalogError::NotFound(id))?;
        record.annotate(outcome, at)?;
        Ok(record.clone())
    }

    fn list_by_submitter(&self, submitter: &Identity) -> Result<Vec<EvidenceRecord>, CatalogError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut matching: Vec<EvidenceRecord> = records
            .values()
            .filter(|r| &r.submitter == submitter)
            .cloned()
            .collect();
        sort_newest_first(&mut matching);
        Ok(matching)
    }

    fn list_all(&self) -> Result<Vec<EvidenceRecord>, CatalogError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.values().cloned().collect())
    }
}

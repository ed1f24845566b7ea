//! RocksDB-backed evidence catalog.
//!
//! Records are persisted in dedicated column families:
//!
//! - `"evidence"`: maps `EvidenceId` (8 bytes, big-endian) -> bincode record,
//! - `"by_submitter"`: secondary index keyed by
//!   `len(submitter) as u32 BE ++ submitter ++ evidence_id`, with empty
//!   values. The length prefix keeps one submitter's prefix from matching
//!   another's keys whatever bytes the identities contain.
//!
//! Both entries of a record are written in one `WriteBatch`, so the index
//! never points at a missing record.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::catalog::{
    CatalogError, EvidenceCatalog, check_insertable, sort_newest_first,
};
use crate::types::{CustodyState, EvidenceId, EvidenceRecord, Identity};

const CF_EVIDENCE: &str = "evidence";
const CF_BY_SUBMITTER: &str = "by_submitter";
const ID_KEY_LEN: usize = 8;

/// Configuration for [`RocksDbCatalog`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/custody-catalog".to_string(),
            create_if_missing: true,
        }
    }
}

/// Storage-level error type.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("rocksdb: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("missing column family {0:?}")]
    MissingColumnFamily(&'static str),
    #[error("record encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("record decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("writer lock poisoned")]
    LockPoisoned,
    #[error("submitter identity too long to index")]
    IdentityTooLong,
}

impl From<StorageError> for CatalogError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Decode(_) => CatalogError::Corrupted(e.to_string()),
            _ => CatalogError::Backend(e.to_string()),
        }
    }
}

/// RocksDB-backed implementation of [`EvidenceCatalog`].
pub struct RocksDbCatalog {
    db: DB,
    /// Serializes read-modify-write sequences (write-once check, annotate).
    writer: Mutex<()>,
}

impl RocksDbCatalog {
    /// Opens (or creates) a catalog at the configured path.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_EVIDENCE, Options::default()),
            ColumnFamilyDescriptor::new(CF_BY_SUBMITTER, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        tracing::debug!(path = %cfg.path, "opened evidence catalog");

        Ok(Self {
            db,
            writer: Mutex::new(()),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    fn encode(record: &EvidenceRecord) -> Result<Vec<u8>, StorageError> {
        Ok(bincode::serde::encode_to_vec(
            record,
            bincode::config::standard(),
        )?)
    }

    fn decode(bytes: &[u8]) -> Result<EvidenceRecord, StorageError> {
        let (record, _): (EvidenceRecord, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(record)
    }

    fn submitter_prefix(submitter: &Identity) -> Result<Vec<u8>, StorageError> {
        let bytes = submitter.as_str().as_bytes();
        let len = u32::try_from(bytes.len()).map_err(|_| StorageError::IdentityTooLong)?;
        let mut prefix = Vec::with_capacity(4 + bytes.len() + ID_KEY_LEN);
        prefix.extend_from_slice(&len.to_be_bytes());
        prefix.extend_from_slice(bytes);
        Ok(prefix)
    }

    fn index_key(record: &EvidenceRecord) -> Result<Vec<u8>, StorageError> {
        let mut key = Self::submitter_prefix(&record.submitter)?;
        key.extend_from_slice(&record.evidence_id.to_key());
        Ok(key)
    }

    fn load(&self, id: EvidenceId) -> Result<Option<EvidenceRecord>, StorageError> {
        let cf = self.cf(CF_EVIDENCE)?;
        match self.db.get_cf(cf, id.to_key())? {
            None => Ok(None),
            Some(bytes) => Self::decode(&bytes).map(Some),
        }
    }

    fn ids_for(&self, submitter: &Identity) -> Result<Vec<EvidenceId>, StorageError> {
        let cf = self.cf(CF_BY_SUBMITTER)?;
        let prefix = Self::submitter_prefix(submitter)?;

        let mut ids = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let suffix = &key[prefix.len()..];
            let raw: [u8; ID_KEY_LEN] = suffix.try_into().map_err(|_| {
                StorageError::Decode(bincode::error::DecodeError::Other(
                    "submitter index key has wrong length",
                ))
            })?;
            ids.push(EvidenceId(u64::from_be_bytes(raw)));
        }
        Ok(ids)
    }
}

impl EvidenceCatalog for RocksDbCatalog {
    fn insert(&self, record: EvidenceRecord) -> Result<(), CatalogError> {
        check_insertable(&record)?;
        let _guard = self.writer.lock().map_err(|_| StorageError::LockPoisoned)?;

        let cf_evidence = self.cf(CF_EVIDENCE)?;
        let cf_index = self.cf(CF_BY_SUBMITTER)?;
        let key = record.evidence_id.to_key();

        if self
            .db
            .get_cf(cf_evidence, key)
            .map_err(StorageError::from)?
            .is_some()
        {
            return Err(CatalogError::AlreadyExists(record.evidence_id));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_evidence, key, Self::encode(&record)?);
        batch.put_cf(cf_index, Self::index_key(&record)?, b"");
        self.db.write(batch).map_err(StorageError::from)?;
        Ok(())
    }

    fn get(&self, id: EvidenceId) -> Result<Option<EvidenceRecord>, CatalogError> {
        Ok(self.load(id)?)
    }

    fn annotate(
        &self,
        id: EvidenceId,
        outcome: CustodyState,
        at: DateTime<Utc>,
    ) -> Result<EvidenceRecord, CatalogError> {
        let _guard = self.writer.lock().map_err(|_| StorageError::LockPoisoned)?;

        let mut record = self.load(id)?.ok_or(CatalogError::NotFound(id))?;
        record.annotate(outcome, at)?;

        let cf = self.cf(CF_EVIDENCE)?;
        self.db
            .put_cf(cf, id.to_key(), Self::encode(&record)?)
            .map_err(StorageError::from)?;
        Ok(record)
    }

    fn list_by_submitter(&self, submitter: &Identity) -> Result<Vec<EvidenceRecord>, CatalogError> {
        let mut records = Vec::new();
        for id in self.ids_for(submitter)? {
            match self.load(id)? {
                Some(record) => records.push(record),
                None => {
                    return Err(CatalogError::Corrupted(format!(
                        "submitter index references missing evidence {id}"
                    )));
                }
            }
        }
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn list_all(&self) -> Result<Vec<EvidenceRecord>, CatalogError> {
        let cf = self.cf(CF_EVIDENCE)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.map_err(StorageError::from)?;
            records.push(Self::decode(&value)?);
        }
        Ok(records)
    }
}

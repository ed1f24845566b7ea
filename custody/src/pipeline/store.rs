//! Content-store abstraction used by the pipeline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Cid;

use super::error::FailureKind;

/// Acknowledgement of a successful upload.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub cid: Cid,
    /// Size in bytes as confirmed by the store.
    pub size: u64,
}

/// Outcome of a best-effort pin request.
///
/// Pinning only asks the store to retain an object; failing to pin never
/// invalidates an upload that already returned a CID.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PinOutcome {
    pub ok: bool,
    pub error: Option<String>,
}

impl PinOutcome {
    pub fn pinned() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// Errors surfaced by content-store clients.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StoreError {
    /// Store unreachable or the request timed out.
    #[error("content store unavailable: {0}")]
    Unavailable(String),
    /// Store reachable but refused or failed the write.
    #[error("content store rejected write: {0}")]
    WriteFailed(String),
    /// No object is known for this CID.
    #[error("no object stored under CID {0}")]
    NotFound(Cid),
}

impl StoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StoreError::Unavailable(_) => FailureKind::TransientUnavailable,
            StoreError::WriteFailed(_) => FailureKind::Rejected,
            StoreError::NotFound(_) => FailureKind::NotFound,
        }
    }
}

/// Abstract content-addressed store.
///
/// Implementations are blocking and must bound every network call with a
/// timeout; a timeout is reported as [`StoreError::Unavailable`].
pub trait ContentStore: Send + Sync {
    /// Stores `bytes` and returns the store-assigned CID and confirmed size.
    fn upload(&self, bytes: &[u8], file_name: &str) -> Result<UploadReceipt, StoreError>;

    /// Fetches the complete object stored under `cid`.
    fn retrieve(&self, cid: &Cid) -> Result<Vec<u8>, StoreError>;

    /// Requests durable retention of `cid`. Never fails the caller.
    fn pin(&self, cid: &Cid) -> PinOutcome;
}

impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    fn upload(&self, bytes: &[u8], file_name: &str) -> Result<UploadReceipt, StoreError> {
        (**self).upload(bytes, file_name)
    }

    fn retrieve(&self, cid: &Cid) -> Result<Vec<u8>, StoreError> {
        (**self).retrieve(cid)
    }

    fn pin(&self, cid: &Cid) -> PinOutcome {
        (**self).pin(cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullStore;

    impl ContentStore for NullStore {
        fn upload(&self, bytes: &[u8], _file_name: &str) -> Result<UploadReceipt, StoreError> {
            Ok(UploadReceipt {
                cid: Cid::new("null"),
                size: bytes.len() as u64,
            })
        }

        fn retrieve(&self, cid: &Cid) -> Result<Vec<u8>, StoreError> {
            Err(StoreError::NotFound(cid.clone()))
        }

        fn pin(&self, _cid: &Cid) -> PinOutcome {
            PinOutcome::failed("null store cannot pin")
        }
    }

    #[test]
    fn content_store_trait_is_object_safe() {
        let store: Arc<dyn ContentStore> = Arc::new(NullStore);
        let receipt = store.upload(b"abc", "a.bin").expect("upload");
        assert_eq!(receipt.size, 3);
        assert!(!store.pin(&receipt.cid).ok);
    }

    #[test]
    fn store_errors_map_onto_failure_kinds() {
        assert_eq!(
            StoreError::Unavailable("timeout".into()).kind(),
            FailureKind::TransientUnavailable
        );
        assert_eq!(StoreError::WriteFailed("quota".into()).kind(), FailureKind::Rejected);
        assert_eq!(StoreError::NotFound(Cid::new("x")).kind(), FailureKind::NotFound);
    }
}

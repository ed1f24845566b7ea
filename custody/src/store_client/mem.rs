//! In-memory content store.
//!
//! Objects are addressed by `"mem-" ++ sha256(bytes)` so that, like a real
//! content-addressed store, uploading identical bytes twice yields the same
//! CID. Test hooks allow simulating outages, rejected writes, failed pins
//! and out-of-band mutation of stored bytes.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::fingerprint;
use crate::pipeline::store::{ContentStore, PinOutcome, StoreError, UploadReceipt};
use crate::types::Cid;

/// In-memory implementation of [`ContentStore`].
#[derive(Default)]
pub struct InMemoryContentStore {
    objects: RwLock<HashMap<Cid, Vec<u8>>>,
    pinned: RwLock<Vec<Cid>>,
    offline: AtomicBool,
    fail_uploads: AtomicBool,
    fail_pins: AtomicBool,
    upload_calls: AtomicUsize,
    retrieve_calls: AtomicUsize,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// CID this store assigns to `bytes`.
    pub fn cid_for(bytes: &[u8]) -> Cid {
        Cid::new(format!("mem-{}", fingerprint::fingerprint(bytes)))
    }

    /// Replaces the bytes stored under `cid` without changing the CID,
    /// as an attacker with write access to the backing store could.
    pub fn tamper(&self, cid: &Cid, bytes: Vec<u8>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(cid.clone(), bytes);
        }
    }

    /// Drops the object stored under `cid`, e.g. after garbage collection.
    pub fn evict(&self, cid: &Cid) {
        if let Ok(mut objects) = self.objects.write() {
            objects.remove(cid);
        }
    }

    /// Makes every call fail as if the store were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes uploads fail with [`StoreError::WriteFailed`].
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Makes pin requests fail.
    pub fn set_fail_pins(&self, fail: bool) {
        self.fail_pins.store(fail, Ordering::SeqCst);
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    pub fn is_pinned(&self, cid: &Cid) -> bool {
        self.pinned
            .read()
            .map(|p| p.contains(cid))
            .unwrap_or(false)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

impl ContentStore for InMemoryContentStore {
    fn upload(&self, bytes: &[u8], _file_name: &str) -> Result<UploadReceipt, StoreError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("upload refused".to_string()));
        }

        let cid = Self::cid_for(bytes);
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.entry(cid.clone()).or_insert_with(|| bytes.to_vec());

        Ok(UploadReceipt {
            cid,
            size: bytes.len() as u64,
        })
    }

    fn retrieve(&self, cid: &Cid) -> Result<Vec<u8>, StoreError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let objects = self.objects.read().map_err(|_| poisoned())?;
        objects
            .get(cid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(cid.clone()))
    }

    fn pin(&self, cid: &Cid) -> PinOutcome {
        if let Err(e) = self.check_online() {
            return PinOutcome::failed(e.to_string());
        }
        if self.fail_pins.load(Ordering::SeqCst) {
            return PinOutcome::failed("pin refused");
        }

        let known = self
            .objects
            .read()
            .map(|o| o.contains_key(cid))
            .unwrap_or(false);
        if !known {
            return PinOutcome::failed(format!("no object stored under CID {cid}"));
        }

        match self.pinned.write() {
            Ok(mut pinned) => {
                if !pinned.contains(cid) {
                    pinned.push(cid.clone());
                }
                PinOutcome::pinned()
            }
            Err(_) => PinOutcome::failed("in-memory store lock poisoned"),
        }
    }
}

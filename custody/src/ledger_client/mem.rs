//! In-memory ledger and role directory.
//!
//! Mirrors the custody contract: identifiers start at 1 and increase by one
//! per anchor, unknown identifiers read back with `exists == false`, and
//! roles are a simple grant table. Test hooks simulate outages, rejected
//! transactions and lost acknowledgements.

use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;

use crate::pipeline::ledger::{Ledger, LedgerError, RoleDirectory};
use crate::types::{
    AnchorReceipt, Commitment, DIGEST_LEN, Digest256, EvidenceId, Identity, LedgerRecord, Role,
};

/// In-memory implementation of [`Ledger`] and [`RoleDirectory`].
#[derive(Default)]
pub struct InMemoryLedger {
    /// `records[i]` holds evidence id `i + 1`; `None` marks a forgotten record.
    records: RwLock<Vec<Option<LedgerRecord>>>,
    roles: RwLock<HashSet<(Identity, Role)>>,
    offline: AtomicBool,
    roles_offline: AtomicBool,
    rejecting: AtomicBool,
    drop_acks: AtomicBool,
    anchor_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

fn poisoned() -> LedgerError {
    LedgerError::Unavailable("in-memory ledger lock poisoned".to_string())
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_role(&self, identity: &Identity, role: Role) {
        if let Ok(mut roles) = self.roles.write() {
            roles.insert((identity.clone(), role));
        }
    }

    pub fn revoke_role(&self, identity: &Identity, role: Role) {
        if let Ok(mut roles) = self.roles.write() {
            roles.remove(&(identity.clone(), role));
        }
    }

    /// Makes `anchor` and `fetch` fail as if the node were unreachable.
    /// Role checks are controlled separately by [`set_roles_offline`](Self::set_roles_offline).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_roles_offline(&self, offline: bool) {
        self.roles_offline.store(offline, Ordering::SeqCst);
    }

    /// Makes `anchor` fail with [`LedgerError::Rejected`].
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Records anchors but reports them as timed out, as when the
    /// confirmation is lost on the way back to the caller.
    pub fn set_drop_acks(&self, drop: bool) {
        self.drop_acks.store(drop, Ordering::SeqCst);
    }

    /// Removes a record so that it reads back with `exists == false`.
    pub fn forget(&self, id: EvidenceId) {
        let Ok(mut records) = self.records.write() else {
            return;
        };
        if let Some(slot) = (id.get() as usize)
            .checked_sub(1)
            .and_then(|i| records.get_mut(i))
        {
            *slot = None;
        }
    }

    /// Number of records ever anchored, including forgotten ones.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn anchor_calls(&self) -> usize {
        self.anchor_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(
                "in-memory ledger is offline".to_string(),
            ));
        }
        Ok(())
    }
}

impl Ledger for InMemoryLedger {
    fn anchor(
        &self,
        commitment: &Commitment,
        submitter: &Identity,
    ) -> Result<AnchorReceipt, LedgerError> {
        self.anchor_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("transaction reverted".to_string()));
        }

        let mut records = self.records.write().map_err(|_| poisoned())?;
        let record_id = EvidenceId(records.len() as u64 + 1);
        records.push(Some(LedgerRecord {
            record_id,
            commitment: *commitment,
            submitter: submitter.as_str().to_string(),
            timestamp: Utc::now().timestamp().max(0) as u64,
            exists: true,
        }));

        let tx_ref = format!("0x{:064x}", record_id.get());
        if self.drop_acks.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(format!(
                "transaction {tx_ref} not confirmed in time"
            )));
        }

        Ok(AnchorReceipt { record_id, tx_ref })
    }

    fn fetch(&self, record_id: EvidenceId) -> Result<LedgerRecord, LedgerError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let records = self.records.read().map_err(|_| poisoned())?;
        let found = (record_id.get() as usize)
            .checked_sub(1)
            .and_then(|i| records.get(i))
            .and_then(Option::as_ref);

        Ok(match found {
            Some(record) => record.clone(),
            None => LedgerRecord {
                record_id,
                commitment: Commitment(Digest256([0u8; DIGEST_LEN])),
                submitter: format!("0x{}", "0".repeat(40)),
                timestamp: 0,
                exists: false,
            },
        })
    }
}

impl RoleDirectory for InMemoryLedger {
    fn has_role(&self, identity: &Identity, role: Role) -> Result<bool, LedgerError> {
        if self.roles_offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(
                "in-memory role store is offline".to_string(),
            ));
        }
        let roles = self.roles.read().map_err(|_| poisoned())?;
        Ok(roles.contains(&(identity.clone(), role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{commitment_for, fingerprint};

    #[test]
    fn ids_start_at_one_and_increase() {
        let ledger = InMemoryLedger::new();
        let submitter = Identity::new("0xofficer");
        let c = commitment_for(&fingerprint(b"a"));

        let first = ledger.anchor(&c, &submitter).expect("anchor");
        let second = ledger.anchor(&c, &submitter).expect("anchor");
        assert_eq!(first.record_id, EvidenceId(1));
        assert_eq!(second.record_id, EvidenceId(2));
        assert_ne!(first.tx_ref, second.tx_ref);

        let record = ledger.fetch(EvidenceId(2)).expect("fetch");
        assert!(record.exists);
        assert_eq!(record.commitment, c);
        assert_eq!(record.submitter, "0xofficer");
    }

    #[test]
    fn unknown_ids_do_not_exist() {
        let ledger = InMemoryLedger::new();
        assert!(!ledger.fetch(EvidenceId(0)).expect("fetch").exists);
        assert!(!ledger.fetch(EvidenceId(5)).expect("fetch").exists);
    }

    #[test]
    fn lost_ack_still_records() {
        let ledger = InMemoryLedger::new();
        ledger.set_drop_acks(true);
        let c = commitment_for(&fingerprint(b"x"));

        let err = ledger.anchor(&c, &Identity::new("0xa")).unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn roles_are_granted_per_identity() {
        let ledger = InMemoryLedger::new();
        let judge = Identity::new("0xJudge");
        ledger.grant_role(&judge, Role::Reviewer);

        assert!(ledger.has_role(&Identity::new("0xjudge"), Role::Reviewer).expect("role check"));
        assert!(!ledger.has_role(&judge, Role::Auditor).expect("role check"));

        ledger.revoke_role(&judge, Role::Reviewer);
        assert!(!ledger.has_role(&judge, Role::Reviewer).expect("role check"));

        ledger.set_roles_offline(true);
        assert!(ledger.has_role(&judge, Role::Reviewer).is_err());
    }
}

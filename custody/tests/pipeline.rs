//! End-to-end pipeline behaviour over in-memory collaborators.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};

use custody::fingerprint::{commitment_for, fingerprint};
use custody::pipeline::InconclusiveReason;
use custody::{
    AnchorReceipt, CatalogError, CustodyState, EvidenceCatalog, EvidenceCoordinator, EvidenceId,
    EvidenceMetadata, EvidenceRecord, FailureKind, GeoPoint, Identity, InMemoryCatalog,
    InMemoryContentStore, InMemoryLedger, IngestStep, Ledger, MetricsRegistry, PipelineConfig,
    Recovery, RocksDbCatalog, RocksDbConfig, Role, StoreError, StoredContent, Verdict, VerifyError,
};

type Coordinator<C = InMemoryCatalog> =
    EvidenceCoordinator<Arc<InMemoryContentStore>, Arc<InMemoryLedger>, Arc<InMemoryLedger>, C>;

struct Harness<C = InMemoryCatalog> {
    coordinator: Coordinator<C>,
    store: Arc<InMemoryContentStore>,
    ledger: Arc<InMemoryLedger>,
}

fn officer() -> Identity {
    Identity::new("0x70997970c51812dc3a010c7d01b50e0d17dc79c8")
}

fn judge() -> Identity {
    Identity::new("0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc")
}

fn lawyer() -> Identity {
    Identity::new("0x90f79bf6eb2c4f870365e785982e1f101e93b906")
}

fn harness_with<C: EvidenceCatalog>(catalog: C) -> Harness<C> {
    let store = Arc::new(InMemoryContentStore::new());
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.grant_role(&judge(), Role::Reviewer);
    ledger.grant_role(&lawyer(), Role::Auditor);

    let coordinator = EvidenceCoordinator::new(
        PipelineConfig::default(),
        store.clone(),
        ledger.clone(),
        ledger.clone(),
        catalog,
    );
    Harness {
        coordinator,
        store,
        ledger,
    }
}

fn harness() -> Harness {
    harness_with(InMemoryCatalog::new())
}

fn photo_metadata() -> EvidenceMetadata {
    EvidenceMetadata {
        media_type: "image/jpeg".to_string(),
        description: "rear window".to_string(),
        geolocation: GeoPoint::new(12.97, 77.59),
    }
}

#[test]
fn hello_evd_is_anchored_as_first_record_and_verifies() {
    let h = harness();

    let receipt = h
        .coordinator
        .ingest(b"hello-evd", "hello.txt", &officer(), EvidenceMetadata::default())
        .expect("ingest succeeds");
    let record = receipt.record;

    assert_eq!(record.evidence_id, EvidenceId(1));
    assert_eq!(
        record.content.fingerprint.to_hex(),
        "1245f6ac0093b5912eda8128da78780625203c4778eb78bd0f1b1d2c7bb436b6"
    );
    assert_eq!(
        record.commitment.to_hex(),
        "a41b2d8006757350bcfb8c709d4a838b6d28a04405b4f811b1e3520951eb9d83"
    );
    assert_eq!(record.content.size, 9);
    assert!(h.store.is_pinned(&record.content.cid));

    let anchored = h.ledger.fetch(EvidenceId(1)).expect("ledger read");
    assert!(anchored.exists);
    assert_eq!(anchored.commitment, record.commitment);
    assert_eq!(anchored.submitter, officer().as_str());

    let report = h
        .coordinator
        .verify(EvidenceId(1), &judge())
        .expect("verification completes");
    assert_eq!(report.verdict, Verdict::Verified);
    assert_eq!(report.size, 9);
    assert_eq!(report.ledger_commitment, record.commitment);

    let stored = h
        .coordinator
        .catalog()
        .get(EvidenceId(1))
        .expect("catalog read")
        .expect("record present");
    assert_eq!(stored.status, CustodyState::Verified);
    assert!(stored.last_verified_at.is_some());
}

#[test]
fn single_bit_flip_is_reported_as_tampered() {
    let h = harness();
    let original = vec![0x5Au8; 4096];

    let receipt = h
        .coordinator
        .ingest(&original, "scene.jpg", &officer(), photo_metadata())
        .expect("ingest succeeds");
    let id = receipt.record.evidence_id;

    let mut flipped = original.clone();
    flipped[2048] ^= 0x01;
    h.store.tamper(&receipt.record.content.cid, flipped);

    let report = h.coordinator.verify(id, &lawyer()).expect("verification completes");
    assert_eq!(report.verdict, Verdict::Tampered);
    assert_ne!(report.commitment, report.ledger_commitment);

    let record = h.coordinator.catalog().get(id).expect("read").expect("present");
    assert_eq!(record.status, CustodyState::Tampered);
    // The anchored commitment cached in the catalog is untouched.
    assert_eq!(record.commitment, receipt.record.commitment);

    // Restoring the bytes and re-verifying records a new outcome.
    h.store.tamper(&receipt.record.content.cid, original);
    let report = h.coordinator.verify(id, &judge()).expect("verification completes");
    assert_eq!(report.verdict, Verdict::Verified);
}

#[test]
fn anchor_failure_keeps_cid_and_resume_does_not_reupload() {
    let h = harness();
    h.ledger.set_offline(true);

    let err = h
        .coordinator
        .ingest(b"bodycam footage", "cam.mp4", &officer(), EvidenceMetadata::default())
        .unwrap_err();
    assert_eq!(err.step, IngestStep::Anchor);
    assert_eq!(err.kind(), FailureKind::TransientUnavailable);
    let stored = err.stored.clone().expect("upload succeeded before the anchor");
    assert_eq!(stored.fingerprint, fingerprint(b"bodycam footage"));
    assert!(h.coordinator.catalog().list_all().expect("list").is_empty());
    assert_eq!(h.store.upload_calls(), 1);

    h.ledger.set_offline(false);
    let receipt = h
        .coordinator
        .resume_ingest(stored, "cam.mp4", &officer(), EvidenceMetadata::default())
        .expect("resume succeeds");

    assert_eq!(h.store.upload_calls(), 1);
    assert_eq!(receipt.record.evidence_id, EvidenceId(1));
    assert_eq!(receipt.record.commitment, commitment_for(&fingerprint(b"bodycam footage")));

    let report = h
        .coordinator
        .verify(receipt.record.evidence_id, &judge())
        .expect("verification completes");
    assert_eq!(report.verdict, Verdict::Verified);
}

#[test]
fn lost_anchor_ack_is_not_retried() {
    let h = harness();
    h.ledger.set_drop_acks(true);

    let err = h
        .coordinator
        .ingest(b"once", "once.bin", &officer(), EvidenceMetadata::default())
        .unwrap_err();

    assert_eq!(err.step, IngestStep::Anchor);
    assert_eq!(h.ledger.anchor_calls(), 1);
    assert_eq!(h.ledger.len(), 1);
    assert!(h.coordinator.catalog().is_empty());
}

#[test]
fn rejected_anchor_is_not_transient() {
    let h = harness();
    h.ledger.set_rejecting(true);

    let err = h
        .coordinator
        .ingest(b"refused", "r.bin", &officer(), EvidenceMetadata::default())
        .unwrap_err();
    assert_eq!(err.step, IngestStep::Anchor);
    assert_eq!(err.kind(), FailureKind::Rejected);
    assert!(err.cid().is_some());
}

#[test]
fn resume_with_empty_cid_is_rejected_before_anchoring() {
    let h = harness();
    let stored = StoredContent {
        cid: custody::Cid::new(""),
        size: 3,
        fingerprint: fingerprint(b"abc"),
    };

    let err = h
        .coordinator
        .resume_ingest(stored, "abc.txt", &officer(), EvidenceMetadata::default())
        .unwrap_err();
    assert_eq!(err.step, IngestStep::Resume);
    assert_eq!(err.kind(), FailureKind::Rejected);
    assert_eq!(h.ledger.anchor_calls(), 0);
}

#[test]
fn resume_with_wrong_fingerprint_or_size_anchors_nothing() {
    let h = harness();
    h.ledger.set_offline(true);
    let err = h
        .coordinator
        .ingest(b"real bytes", "real.bin", &officer(), EvidenceMetadata::default())
        .unwrap_err();
    let stored = err.stored.expect("upload succeeded");
    h.ledger.set_offline(false);
    let anchors = h.ledger.anchor_calls();

    let mistyped = StoredContent {
        fingerprint: fingerprint(b"other bytes"),
        ..stored.clone()
    };
    let err = h
        .coordinator
        .resume_ingest(mistyped, "real.bin", &officer(), EvidenceMetadata::default())
        .unwrap_err();
    assert_eq!(err.step, IngestStep::Resume);
    assert_eq!(err.kind(), FailureKind::Rejected);
    assert_eq!(err.recovery(), Recovery::Restart);

    let wrong_size = StoredContent {
        size: 999,
        ..stored.clone()
    };
    let err = h
        .coordinator
        .resume_ingest(wrong_size, "real.bin", &officer(), EvidenceMetadata::default())
        .unwrap_err();
    assert_eq!(err.step, IngestStep::Resume);

    assert_eq!(h.ledger.anchor_calls(), anchors);
    assert!(h.ledger.is_empty());
    assert_eq!(h.store.upload_calls(), 1);
    assert!(h.coordinator.catalog().is_empty());
}

#[test]
fn resume_of_evicted_content_is_not_anchored() {
    let h = harness();
    h.ledger.set_offline(true);
    let err = h
        .coordinator
        .ingest(b"short-lived", "s.bin", &officer(), EvidenceMetadata::default())
        .unwrap_err();
    let stored = err.stored.expect("upload succeeded");
    h.ledger.set_offline(false);
    h.store.evict(&stored.cid);
    let anchors = h.ledger.anchor_calls();

    let err = h
        .coordinator
        .resume_ingest(stored, "s.bin", &officer(), EvidenceMetadata::default())
        .unwrap_err();
    assert_eq!(err.step, IngestStep::Resume);
    assert_eq!(err.kind(), FailureKind::NotFound);
    assert_eq!(h.ledger.anchor_calls(), anchors);
    assert!(h.ledger.is_empty());
}

#[test]
fn unauthorized_requester_touches_no_data() {
    let h = harness();
    let receipt = h
        .coordinator
        .ingest(b"sealed", "s.bin", &officer(), EvidenceMetadata::default())
        .expect("ingest");
    let retrieves = h.store.retrieve_calls();
    let fetches = h.ledger.fetch_calls();

    let err = h
        .coordinator
        .verify(receipt.record.evidence_id, &officer())
        .unwrap_err();
    assert!(matches!(err, VerifyError::Unauthorized { .. }));
    assert_eq!(err.kind(), FailureKind::Unauthorized);

    assert_eq!(h.store.retrieve_calls(), retrieves);
    assert_eq!(h.ledger.fetch_calls(), fetches);

    let record = h
        .coordinator
        .catalog()
        .get(receipt.record.evidence_id)
        .expect("read")
        .expect("present");
    assert_eq!(record.status, CustodyState::Anchored);
}

#[test]
fn role_store_outage_is_not_reported_as_unauthorized() {
    let h = harness();
    h.ledger.set_roles_offline(true);

    let err = h.coordinator.verify(EvidenceId(1), &judge()).unwrap_err();
    assert!(matches!(err, VerifyError::RoleCheck(_)));
    assert_eq!(err.kind(), FailureKind::TransientUnavailable);
}

#[test]
fn unknown_evidence_is_not_found() {
    let h = harness();
    let err = h.coordinator.verify(EvidenceId(42), &judge()).unwrap_err();
    assert!(matches!(err, VerifyError::NotFound(EvidenceId(42))));
    assert_eq!(h.store.retrieve_calls(), 0);
}

#[test]
fn retrieval_is_role_gated_and_returns_stored_bytes() {
    let h = harness();
    let receipt = h
        .coordinator
        .ingest(b"bodycam-0412", "cam.mp4", &officer(), photo_metadata())
        .expect("ingest");
    let id = receipt.record.evidence_id;

    let (record, bytes) = h.coordinator.retrieve(id, &lawyer()).expect("retrieve");
    assert_eq!(bytes, b"bodycam-0412");
    assert_eq!(record.file_name, "cam.mp4");

    let err = h.coordinator.retrieve(id, &officer()).unwrap_err();
    assert!(matches!(err, VerifyError::Unauthorized { .. }));

    h.store.evict(&receipt.record.content.cid);
    let err = h.coordinator.retrieve(id, &judge()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::Inconclusive);
}

#[test]
fn dependency_outages_are_inconclusive_and_leave_status_alone() {
    let h = harness();
    let receipt = h
        .coordinator
        .ingest(b"fragile", "f.bin", &officer(), EvidenceMetadata::default())
        .expect("ingest");
    let id = receipt.record.evidence_id;

    h.store.set_offline(true);
    let err = h.coordinator.verify(id, &judge()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::Inconclusive);
    assert!(matches!(
        err,
        VerifyError::Inconclusive {
            reason: InconclusiveReason::Store(StoreError::Unavailable(_)),
            ..
        }
    ));
    h.store.set_offline(false);

    h.ledger.set_offline(true);
    let err = h.coordinator.verify(id, &judge()).unwrap_err();
    assert!(matches!(
        err,
        VerifyError::Inconclusive {
            reason: InconclusiveReason::Ledger(_),
            ..
        }
    ));
    h.ledger.set_offline(false);

    h.store.evict(&receipt.record.content.cid);
    let err = h.coordinator.verify(id, &judge()).unwrap_err();
    assert!(matches!(
        err,
        VerifyError::Inconclusive {
            reason: InconclusiveReason::Store(StoreError::NotFound(_)),
            ..
        }
    ));

    let record = h.coordinator.catalog().get(id).expect("read").expect("present");
    assert_eq!(record.status, CustodyState::Anchored);
    assert!(record.last_verified_at.is_none());
    assert_eq!(record.content, receipt.record.content);
    assert_eq!(record.commitment, receipt.record.commitment);
}

#[test]
fn missing_ledger_record_is_inconclusive() {
    let h = harness();
    let receipt = h
        .coordinator
        .ingest(b"orphan", "o.bin", &officer(), EvidenceMetadata::default())
        .expect("ingest");
    h.ledger.forget(receipt.record.evidence_id);

    let err = h
        .coordinator
        .verify(receipt.record.evidence_id, &judge())
        .unwrap_err();
    assert!(matches!(
        err,
        VerifyError::Inconclusive {
            reason: InconclusiveReason::LedgerRecordMissing(_),
            ..
        }
    ));
}

/// Catalog whose writes always fail.
struct ReadOnlyCatalog(InMemoryCatalog);

impl EvidenceCatalog for ReadOnlyCatalog {
    fn insert(&self, _record: EvidenceRecord) -> Result<(), CatalogError> {
        Err(CatalogError::Backend("disk full".to_string()))
    }

    fn get(&self, id: EvidenceId) -> Result<Option<EvidenceRecord>, CatalogError> {
        self.0.get(id)
    }

    fn annotate(
        &self,
        _id: EvidenceId,
        _outcome: CustodyState,
        _at: DateTime<Utc>,
    ) -> Result<EvidenceRecord, CatalogError> {
        Err(CatalogError::Backend("disk full".to_string()))
    }

    fn list_by_submitter(&self, submitter: &Identity) -> Result<Vec<EvidenceRecord>, CatalogError> {
        self.0.list_by_submitter(submitter)
    }

    fn list_all(&self) -> Result<Vec<EvidenceRecord>, CatalogError> {
        self.0.list_all()
    }
}

#[test]
fn persist_failure_reports_the_ledger_record() {
    let h = harness_with(ReadOnlyCatalog(InMemoryCatalog::new()));

    let err = h
        .coordinator
        .ingest(b"anchored only", "a.bin", &officer(), EvidenceMetadata::default())
        .unwrap_err();

    assert_eq!(err.step, IngestStep::Persist);
    assert_eq!(err.recovery(), Recovery::Reconcile);
    let anchor = err.anchored.expect("ledger accepted the record");
    assert_eq!(anchor.record_id, EvidenceId(1));
    assert!(err.stored.is_some());
}

#[test]
fn persist_failure_is_reconciled_without_a_second_anchor() {
    let h = harness_with(ReadOnlyCatalog(InMemoryCatalog::new()));
    let err = h
        .coordinator
        .ingest(b"anchored only", "a.bin", &officer(), photo_metadata())
        .unwrap_err();
    let stored = err.stored.clone().expect("stored");
    let anchor = err.anchored.clone().expect("anchored");
    assert_eq!(h.ledger.anchor_calls(), 1);

    // Same store and ledger, catalog writable again.
    let coordinator = EvidenceCoordinator::new(
        PipelineConfig::default(),
        h.store.clone(),
        h.ledger.clone(),
        h.ledger.clone(),
        InMemoryCatalog::new(),
    );
    let receipt = coordinator
        .reconcile_anchored(stored, anchor.clone(), "a.bin", &officer(), photo_metadata())
        .expect("reconcile succeeds");

    assert_eq!(h.ledger.anchor_calls(), 1);
    assert_eq!(h.ledger.len(), 1);
    assert_eq!(receipt.record.evidence_id, anchor.record_id);
    assert_eq!(receipt.record.tx_ref, anchor.tx_ref);
    assert_eq!(receipt.record.status, CustodyState::Anchored);

    let report = coordinator
        .verify(anchor.record_id, &judge())
        .expect("verification completes");
    assert_eq!(report.verdict, Verdict::Verified);
}

#[test]
fn reconcile_rejects_a_receipt_for_other_content() {
    let h = harness();
    let first = h
        .coordinator
        .ingest(b"first", "1.bin", &officer(), EvidenceMetadata::default())
        .expect("ingest");
    let second = h
        .coordinator
        .ingest(b"second", "2.bin", &officer(), EvidenceMetadata::default())
        .expect("ingest");
    let anchors = h.ledger.anchor_calls();

    let err = h
        .coordinator
        .reconcile_anchored(
            second.record.content.clone(),
            AnchorReceipt {
                record_id: first.record.evidence_id,
                tx_ref: first.record.tx_ref.clone(),
            },
            "2.bin",
            &officer(),
            EvidenceMetadata::default(),
        )
        .unwrap_err();
    assert_eq!(err.step, IngestStep::Resume);
    assert_eq!(err.kind(), FailureKind::Rejected);
    assert_eq!(err.recovery(), Recovery::Reconcile);
    assert_eq!(h.ledger.anchor_calls(), anchors);

    let err = h
        .coordinator
        .reconcile_anchored(
            second.record.content.clone(),
            AnchorReceipt {
                record_id: EvidenceId(99),
                tx_ref: "0x0".to_string(),
            },
            "2.bin",
            &officer(),
            EvidenceMetadata::default(),
        )
        .unwrap_err();
    assert_eq!(err.step, IngestStep::Resume);
    assert_eq!(h.ledger.anchor_calls(), anchors);
}

#[test]
fn verdict_survives_failed_annotation() {
    let inner = InMemoryCatalog::new();
    let seeded = harness();
    let receipt = seeded
        .coordinator
        .ingest(b"annotated", "n.bin", &officer(), EvidenceMetadata::default())
        .expect("ingest");
    inner.insert(receipt.record.clone()).expect("seed catalog");

    let coordinator = EvidenceCoordinator::new(
        PipelineConfig::default(),
        seeded.store.clone(),
        seeded.ledger.clone(),
        seeded.ledger.clone(),
        ReadOnlyCatalog(inner),
    );

    let report = coordinator
        .verify(receipt.record.evidence_id, &judge())
        .expect("verdict is still returned");
    assert_eq!(report.verdict, Verdict::Verified);
    assert!(!report.annotation_persisted);
}

#[test]
fn pinning_can_be_disabled() {
    let store = Arc::new(InMemoryContentStore::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let coordinator = EvidenceCoordinator::new(
        PipelineConfig {
            pin_after_anchor: false,
            ..PipelineConfig::default()
        },
        store.clone(),
        ledger.clone(),
        ledger,
        InMemoryCatalog::new(),
    );

    let receipt = coordinator
        .ingest(b"unpinned", "u.bin", &officer(), EvidenceMetadata::default())
        .expect("ingest");
    assert!(receipt.pin.is_none());
    assert!(!store.is_pinned(&receipt.record.content.cid));
}

#[test]
fn concurrent_ingests_get_distinct_ids() {
    let h = harness();
    let coordinator = Arc::new(h.coordinator);

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                coordinator
                    .ingest(&[i; 64], &format!("item-{i}.bin"), &officer(), EvidenceMetadata::default())
                    .expect("ingest succeeds")
                    .record
                    .evidence_id
            })
        })
        .collect();

    let mut ids: Vec<u64> = handles
        .into_iter()
        .map(|h| h.join().expect("ingest thread").get())
        .collect();
    ids.sort();
    assert_eq!(ids, (1..=8).collect::<Vec<u64>>());

    let listed = coordinator.list_by_submitter(&officer()).expect("list");
    assert_eq!(listed.len(), 8);
    for pair in listed.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }
}

#[test]
fn metrics_count_outcomes() {
    let h = harness();
    let registry = Arc::new(MetricsRegistry::new().expect("metrics registry"));
    let coordinator = h.coordinator.with_metrics(registry.clone());

    let receipt = coordinator
        .ingest(b"counted", "c.bin", &officer(), EvidenceMetadata::default())
        .expect("ingest");
    coordinator
        .verify(receipt.record.evidence_id, &judge())
        .expect("verify");
    let _ = coordinator.verify(receipt.record.evidence_id, &officer());

    let text = registry.gather_text();
    assert!(text.contains(r#"custody_pipeline_ingests_total{outcome="anchored"} 1"#));
    assert!(text.contains(r#"custody_pipeline_verifications_total{outcome="verified"} 1"#));
    assert!(text.contains(r#"custody_pipeline_verifications_total{outcome="unauthorized"} 1"#));
}

#[test]
fn rocksdb_catalog_keeps_records_across_restarts() {
    let tmp = tempfile::TempDir::new().expect("temp dir");
    let cfg = RocksDbConfig {
        path: tmp.path().to_string_lossy().to_string(),
        create_if_missing: true,
    };

    let store = Arc::new(InMemoryContentStore::new());
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.grant_role(&judge(), Role::Reviewer);

    let id = {
        let coordinator = EvidenceCoordinator::new(
            PipelineConfig::default(),
            store.clone(),
            ledger.clone(),
            ledger.clone(),
            RocksDbCatalog::open(&cfg).expect("open catalog"),
        );
        coordinator
            .ingest(b"durable", "d.bin", &officer(), photo_metadata())
            .expect("ingest")
            .record
            .evidence_id
    };

    let coordinator = EvidenceCoordinator::new(
        PipelineConfig::default(),
        store,
        ledger.clone(),
        ledger,
        RocksDbCatalog::open(&cfg).expect("reopen catalog"),
    );
    let report = coordinator.verify(id, &judge()).expect("verify");
    assert_eq!(report.verdict, Verdict::Verified);

    let listed = coordinator.list_by_submitter(&officer()).expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, CustodyState::Verified);
    assert_eq!(listed[0].metadata, photo_metadata());
}

//! Evidence coordinator: the ingest and verify pipelines.
//!
//! The coordinator wires together:
//!
//! - a [`ContentStore`] holding evidence bytes,
//! - a [`Ledger`] anchoring commitments,
//! - a [`RoleDirectory`] gating who may verify or retrieve, and
//! - an [`EvidenceCatalog`] recording anchored items.
//!
//! It owns step ordering and the partial-failure policy. Store upload always
//! precedes the ledger anchor, so the ledger never references bytes that
//! were not stored. No automatic retries are performed: a lost anchor
//! acknowledgement retried blindly would create a second ledger record.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fingerprint;
use crate::metrics::MetricsRegistry;
use crate::types::{
    AnchorReceipt, Cid, Commitment, CustodyState, EvidenceId, EvidenceMetadata, EvidenceRecord,
    Fingerprint, Identity, StoredContent,
};

use super::catalog::{CatalogError, EvidenceCatalog};
use super::config::PipelineConfig;
use super::error::{InconclusiveReason, IngestCause, IngestError, IngestStep, VerifyError};
use super::ledger::{Ledger, RoleDirectory};
use super::store::{ContentStore, PinOutcome};

/// Successful ingest.
#[derive(Clone, Debug)]
pub struct IngestReceipt {
    /// The anchored, catalogued record.
    pub record: EvidenceRecord,
    /// Advisory pin outcome; `None` when pinning is disabled.
    pub pin: Option<PinOutcome>,
}

impl IngestReceipt {
    /// Non-fatal warnings to surface to the submitter.
    pub fn warnings(&self) -> Vec<String> {
        match &self.pin {
            Some(PinOutcome {
                ok: false, error, ..
            }) => vec![format!(
                "content {} was not pinned: {}",
                self.record.content.cid,
                error.as_deref().unwrap_or("unknown error")
            )],
            _ => Vec::new(),
        }
    }
}

/// Definitive verification outcome.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Verified,
    Tampered,
}

impl Verdict {
    pub fn as_state(&self) -> CustodyState {
        match self {
            Verdict::Verified => CustodyState::Verified,
            Verdict::Tampered => CustodyState::Tampered,
        }
    }
}

/// Details of a completed verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerificationReport {
    pub evidence_id: EvidenceId,
    pub cid: Cid,
    pub verdict: Verdict,
    /// Length of the retrieved bytes.
    pub size: u64,
    /// Fingerprint recomputed from the retrieved bytes.
    pub fingerprint: Fingerprint,
    /// Commitment re-derived from `fingerprint`.
    pub commitment: Commitment,
    /// Commitment read from the ledger.
    pub ledger_commitment: Commitment,
    pub ledger_submitter: String,
    pub ledger_timestamp: u64,
    /// Whether the recomputed fingerprint equals the catalog's cached copy.
    /// Diagnostic only; the verdict is decided against the ledger.
    pub catalog_fingerprint_matches: bool,
    pub checked_at: DateTime<Utc>,
    /// Whether the outcome annotation reached the catalog.
    pub annotation_persisted: bool,
}

/// Tracks one item through `Pending -> Stored -> Anchored`, or `Failed`.
struct Progress {
    state: CustodyState,
}

impl Progress {
    fn pending() -> Self {
        Self {
            state: CustodyState::Pending,
        }
    }

    fn stored() -> Self {
        Self {
            state: CustodyState::Stored,
        }
    }

    fn advance(&mut self, next: CustodyState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal custody transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "custody state change");
        self.state = next;
    }
}

/// Byte-exact commitment comparison.
///
/// Both sides were parsed from hex case-insensitively, so this is equality
/// of canonical hex encodings ignoring case. No other criterion applies.
fn commitments_match(fresh: &Commitment, anchored: &Commitment) -> bool {
    fresh.as_digest().as_bytes() == anchored.as_digest().as_bytes()
}

/// Fully-configurable evidence coordinator.
///
/// Generic over:
///
/// - `S`: content store implementing [`ContentStore`],
/// - `L`: ledger implementing [`Ledger`],
/// - `R`: role store implementing [`RoleDirectory`],
/// - `C`: catalog implementing [`EvidenceCatalog`].
///
/// All operations take `&self`; the coordinator holds no lock across items,
/// so one instance can be shared (e.g. in an `Arc`) by concurrent callers.
pub struct EvidenceCoordinator<S, L, R, C> {
    config: PipelineConfig,
    store: S,
    ledger: L,
    roles: R,
    catalog: C,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<S, L, R, C> EvidenceCoordinator<S, L, R, C>
where
    S: ContentStore,
    L: Ledger,
    R: RoleDirectory,
    C: EvidenceCatalog,
{
    /// Creates a new coordinator.
    pub fn new(config: PipelineConfig, store: S, ledger: L, roles: R, catalog: C) -> Self {
        Self {
            config,
            store,
            ledger,
            roles,
            catalog,
            metrics: None,
        }
    }

    /// Records pipeline metrics into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Ingests one evidence file.
    ///
    /// 1. Fingerprints the complete buffer.
    /// 2. Uploads it to the content store (`Stored`).
    /// 3. Anchors the derived commitment on the ledger (`Anchored`) and
    ///    catalogues the record.
    /// 4. Requests a pin; the outcome is advisory only.
    ///
    /// On failure the error names the failed step. Once the upload has
    /// succeeded the error carries the stored CID and fingerprint, which
    /// [`resume_ingest`](Self::resume_ingest) accepts to retry the anchor
    /// without uploading again.
    pub fn ingest(
        &self,
        bytes: &[u8],
        file_name: &str,
        submitter: &Identity,
        metadata: EvidenceMetadata,
    ) -> Result<IngestReceipt, IngestError> {
        let started = Instant::now();
        let mut progress = Progress::pending();

        let fingerprint = fingerprint::fingerprint(bytes);
        tracing::info!(
            file_name,
            submitter = %submitter,
            fingerprint = %fingerprint,
            size = bytes.len(),
            "ingesting evidence"
        );

        let upload = match self.store.upload(bytes, file_name) {
            Ok(upload) => upload,
            Err(e) => {
                progress.advance(CustodyState::Failed);
                tracing::warn!(file_name, error = %e, "evidence upload failed");
                self.count_ingest("upload_failed");
                return Err(IngestError {
                    step: IngestStep::Upload,
                    stored: None,
                    anchored: None,
                    cause: e.into(),
                });
            }
        };

        let stored = StoredContent {
            cid: upload.cid,
            size: upload.size,
            fingerprint,
        };
        progress.advance(CustodyState::Stored);
        tracing::debug!(cid = %stored.cid, size = stored.size, "evidence stored");

        self.anchor_and_catalogue(progress, stored, file_name, submitter, metadata, started)
    }

    /// Re-anchors bytes that a previous ingest already uploaded.
    ///
    /// Use this after an [`IngestStep::Anchor`] failure: `stored` is then
    /// taken from [`IngestError::stored`]. The bytes under `stored.cid` are
    /// read back (never uploaded) and must hash to `stored.fingerprint` with
    /// the recorded size before anything is anchored.
    ///
    /// After a [`IngestStep::Persist`] failure the ledger already holds the
    /// record; use [`reconcile_anchored`](Self::reconcile_anchored) instead.
    pub fn resume_ingest(
        &self,
        stored: StoredContent,
        file_name: &str,
        submitter: &Identity,
        metadata: EvidenceMetadata,
    ) -> Result<IngestReceipt, IngestError> {
        let started = Instant::now();
        self.check_stored(&stored, None)?;

        tracing::info!(
            file_name,
            submitter = %submitter,
            cid = %stored.cid,
            fingerprint = %stored.fingerprint,
            "resuming ingest of stored evidence"
        );

        self.anchor_and_catalogue(
            Progress::stored(),
            stored,
            file_name,
            submitter,
            metadata,
            started,
        )
    }

    /// Catalogues a record the ledger accepted but the catalog did not.
    ///
    /// `stored` and `anchor` come from an [`IngestError`] at the
    /// [`IngestStep::Persist`] step. The ledger is read, not written: the
    /// record under `anchor.record_id` must commit to `stored.fingerprint`,
    /// and the stored bytes must still match it.
    pub fn reconcile_anchored(
        &self,
        stored: StoredContent,
        anchor: AnchorReceipt,
        file_name: &str,
        submitter: &Identity,
        metadata: EvidenceMetadata,
    ) -> Result<IngestReceipt, IngestError> {
        let started = Instant::now();
        self.check_stored(&stored, Some(&anchor))?;

        let commitment = fingerprint::commitment_for(&stored.fingerprint);
        let reject = |reason: String, stored: Option<StoredContent>| {
            self.count_ingest("resume_rejected");
            IngestError {
                step: IngestStep::Resume,
                stored,
                anchored: Some(anchor.clone()),
                cause: IngestCause::InvalidResume(reason),
            }
        };

        let on_ledger = match self.ledger.fetch(anchor.record_id) {
            Ok(record) => record,
            Err(e) => {
                self.count_ingest("resume_rejected");
                return Err(IngestError {
                    step: IngestStep::Resume,
                    stored: Some(stored),
                    anchored: Some(anchor.clone()),
                    cause: e.into(),
                });
            }
        };
        if !on_ledger.exists {
            return Err(reject(
                format!("ledger has no record {}", anchor.record_id),
                None,
            ));
        }
        if !commitments_match(&commitment, &on_ledger.commitment) {
            return Err(reject(
                format!(
                    "ledger record {} commits to {}, not {}",
                    anchor.record_id, on_ledger.commitment, commitment
                ),
                None,
            ));
        }

        tracing::info!(
            evidence_id = %anchor.record_id,
            cid = %stored.cid,
            tx_ref = %anchor.tx_ref,
            "reconciling anchored evidence"
        );

        self.catalogue(
            Progress::stored(),
            stored,
            anchor,
            commitment,
            file_name,
            submitter,
            metadata,
            started,
        )
    }

    /// Checks that `stored` describes bytes the content store really holds.
    fn check_stored(
        &self,
        stored: &StoredContent,
        anchored: Option<&AnchorReceipt>,
    ) -> Result<(), IngestError> {
        let invalid = |reason: String| {
            self.count_ingest("resume_rejected");
            IngestError {
                step: IngestStep::Resume,
                stored: None,
                anchored: anchored.cloned(),
                cause: IngestCause::InvalidResume(reason),
            }
        };

        if stored.cid.as_str().trim().is_empty() {
            return Err(invalid("stored content has an empty CID".to_string()));
        }

        let bytes = match self.store.retrieve(&stored.cid) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(cid = %stored.cid, error = %e, "could not read back stored evidence");
                self.count_ingest("resume_rejected");
                return Err(IngestError {
                    step: IngestStep::Resume,
                    stored: Some(stored.clone()),
                    anchored: anchored.cloned(),
                    cause: e.into(),
                });
            }
        };

        let actual = fingerprint::fingerprint(&bytes);
        if actual != stored.fingerprint {
            return Err(invalid(format!(
                "content {} hashes to {actual}, not {}",
                stored.cid, stored.fingerprint
            )));
        }
        if bytes.len() as u64 != stored.size {
            return Err(invalid(format!(
                "content {} is {} bytes, not {}",
                stored.cid,
                bytes.len(),
                stored.size
            )));
        }
        Ok(())
    }

    fn anchor_and_catalogue(
        &self,
        mut progress: Progress,
        stored: StoredContent,
        file_name: &str,
        submitter: &Identity,
        metadata: EvidenceMetadata,
        started: Instant,
    ) -> Result<IngestReceipt, IngestError> {
        let commitment = fingerprint::commitment_for(&stored.fingerprint);

        let anchor = match self.ledger.anchor(&commitment, submitter) {
            Ok(anchor) => anchor,
            Err(e) => {
                progress.advance(CustodyState::Failed);
                // The uploaded object stays in the store unreferenced; the
                // error hands its CID back for a resume.
                tracing::warn!(
                    cid = %stored.cid,
                    commitment = %commitment,
                    error = %e,
                    "ledger anchor failed"
                );
                self.count_ingest("anchor_failed");
                return Err(IngestError {
                    step: IngestStep::Anchor,
                    stored: Some(stored),
                    anchored: None,
                    cause: e.into(),
                });
            }
        };
        self.catalogue(
            progress, stored, anchor, commitment, file_name, submitter, metadata, started,
        )
    }

    /// Records an anchored item in the catalog, then requests a pin.
    #[allow(clippy::too_many_arguments)]
    fn catalogue(
        &self,
        mut progress: Progress,
        stored: StoredContent,
        anchor: AnchorReceipt,
        commitment: Commitment,
        file_name: &str,
        submitter: &Identity,
        metadata: EvidenceMetadata,
        started: Instant,
    ) -> Result<IngestReceipt, IngestError> {
        progress.advance(CustodyState::Anchored);

        let record = EvidenceRecord {
            evidence_id: anchor.record_id,
            content: stored,
            file_name: file_name.to_string(),
            commitment,
            submitter: submitter.clone(),
            tx_ref: anchor.tx_ref.clone(),
            status: CustodyState::Anchored,
            created_at: Utc::now(),
            last_verified_at: None,
            metadata,
        };

        if let Err(e) = self.catalog.insert(record.clone()) {
            tracing::error!(
                evidence_id = %anchor.record_id,
                tx_ref = %anchor.tx_ref,
                error = %e,
                "evidence anchored on ledger but not catalogued"
            );
            self.count_ingest("persist_failed");
            return Err(IngestError {
                step: IngestStep::Persist,
                stored: Some(record.content),
                anchored: Some(anchor),
                cause: e.into(),
            });
        }

        tracing::info!(
            evidence_id = %record.evidence_id,
            cid = %record.content.cid,
            tx_ref = %record.tx_ref,
            "evidence anchored"
        );

        let pin = self.config.pin_after_anchor.then(|| {
            let outcome = self.store.pin(&record.content.cid);
            if !outcome.ok {
                tracing::warn!(
                    evidence_id = %record.evidence_id,
                    cid = %record.content.cid,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "pin request failed; content may be garbage collected"
                );
                if let Some(m) = &self.metrics {
                    m.pipeline.pin_failures_total.inc();
                }
            }
            outcome
        });

        self.count_ingest("anchored");
        if let Some(m) = &self.metrics {
            m.pipeline
                .ingest_seconds
                .observe(started.elapsed().as_secs_f64());
        }

        Ok(IngestReceipt { record, pin })
    }

    /// Verifies that the stored bytes of `evidence_id` still match the
    /// commitment anchored on the ledger.
    ///
    /// `requester` must hold one of the configured roles; otherwise no
    /// store or ledger data is touched. Failure to retrieve the bytes or to
    /// read the ledger record is reported as
    /// [`VerifyError::Inconclusive`], never as a `Tampered` verdict.
    pub fn verify(
        &self,
        evidence_id: EvidenceId,
        requester: &Identity,
    ) -> Result<VerificationReport, VerifyError> {
        let started = Instant::now();
        let result = self.verify_inner(evidence_id, requester);

        let outcome = match &result {
            Ok(report) => match report.verdict {
                Verdict::Verified => "verified",
                Verdict::Tampered => "tampered",
            },
            Err(VerifyError::Unauthorized { .. }) => "unauthorized",
            Err(VerifyError::NotFound(_)) => "not_found",
            Err(VerifyError::Inconclusive { .. }) => "inconclusive",
            Err(VerifyError::RoleCheck(_) | VerifyError::Catalog(_)) => "error",
        };
        if let Some(m) = &self.metrics {
            m.pipeline
                .verifications_total
                .with_label_values(&[outcome])
                .inc();
            m.pipeline
                .verify_seconds
                .observe(started.elapsed().as_secs_f64());
        }

        result
    }

    fn verify_inner(
        &self,
        evidence_id: EvidenceId,
        requester: &Identity,
    ) -> Result<VerificationReport, VerifyError> {
        self.authorize(requester)?;

        let record = self
            .catalog
            .get(evidence_id)?
            .ok_or(VerifyError::NotFound(evidence_id))?;

        let bytes = self.store.retrieve(&record.content.cid).map_err(|e| {
            tracing::warn!(evidence_id = %evidence_id, cid = %record.content.cid, error = %e, "evidence retrieval failed");
            VerifyError::Inconclusive {
                evidence_id,
                reason: InconclusiveReason::Store(e),
            }
        })?;

        let fresh_fingerprint = fingerprint::fingerprint(&bytes);
        let fresh_commitment = fingerprint::commitment_for(&fresh_fingerprint);

        let anchored = self.ledger.fetch(evidence_id).map_err(|e| {
            tracing::warn!(evidence_id = %evidence_id, error = %e, "ledger read failed");
            VerifyError::Inconclusive {
                evidence_id,
                reason: InconclusiveReason::Ledger(e),
            }
        })?;
        if !anchored.exists {
            tracing::warn!(evidence_id = %evidence_id, "catalogued evidence has no ledger record");
            return Err(VerifyError::Inconclusive {
                evidence_id,
                reason: InconclusiveReason::LedgerRecordMissing(evidence_id),
            });
        }

        let verdict = if commitments_match(&fresh_commitment, &anchored.commitment) {
            Verdict::Verified
        } else {
            Verdict::Tampered
        };

        let checked_at = Utc::now();
        let annotation_persisted =
            match self
                .catalog
                .annotate(evidence_id, verdict.as_state(), checked_at)
            {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(evidence_id = %evidence_id, error = %e, "could not record verification outcome");
                    false
                }
            };

        match verdict {
            Verdict::Verified => tracing::info!(
                evidence_id = %evidence_id,
                requester = %requester,
                "evidence verified against ledger"
            ),
            Verdict::Tampered => tracing::warn!(
                evidence_id = %evidence_id,
                requester = %requester,
                expected = %anchored.commitment,
                actual = %fresh_commitment,
                "evidence does not match ledger commitment"
            ),
        }

        Ok(VerificationReport {
            evidence_id,
            cid: record.content.cid,
            verdict,
            size: bytes.len() as u64,
            fingerprint: fresh_fingerprint,
            commitment: fresh_commitment,
            ledger_commitment: anchored.commitment,
            ledger_submitter: anchored.submitter,
            ledger_timestamp: anchored.timestamp,
            catalog_fingerprint_matches: fresh_fingerprint == record.content.fingerprint,
            checked_at,
            annotation_persisted,
        })
    }

    /// Returns the stored bytes of `evidence_id` to an authorized requester.
    ///
    /// Uses the same role gate as [`verify`](Self::verify). The bytes are
    /// returned as stored; callers wanting an authenticity guarantee should
    /// verify as well.
    pub fn retrieve(
        &self,
        evidence_id: EvidenceId,
        requester: &Identity,
    ) -> Result<(EvidenceRecord, Vec<u8>), VerifyError> {
        self.authorize(requester)?;

        let record = self
            .catalog
            .get(evidence_id)?
            .ok_or(VerifyError::NotFound(evidence_id))?;

        let bytes = self
            .store
            .retrieve(&record.content.cid)
            .map_err(|e| VerifyError::Inconclusive {
                evidence_id,
                reason: InconclusiveReason::Store(e),
            })?;

        tracing::info!(evidence_id = %evidence_id, requester = %requester, size = bytes.len(), "evidence retrieved");
        Ok((record, bytes))
    }

    /// All evidence submitted by `submitter`, newest first.
    pub fn list_by_submitter(
        &self,
        submitter: &Identity,
    ) -> Result<Vec<EvidenceRecord>, CatalogError> {
        self.catalog.list_by_submitter(submitter)
    }

    fn authorize(&self, requester: &Identity) -> Result<(), VerifyError> {
        for role in &self.config.authorized_roles {
            if self
                .roles
                .has_role(requester, *role)
                .map_err(VerifyError::RoleCheck)?
            {
                return Ok(());
            }
        }
        tracing::warn!(requester = %requester, "requester lacks a required role");
        Err(VerifyError::Unauthorized {
            requester: requester.clone(),
        })
    }

    fn count_ingest(&self, outcome: &str) {
        if let Some(m) = &self.metrics {
            m.pipeline.ingests_total.with_label_values(&[outcome]).inc();
        }
    }
}

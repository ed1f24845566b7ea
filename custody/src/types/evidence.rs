//! Evidence records and their custody lifecycle.
//!
//! An [`EvidenceRecord`] is the catalog's view of one evidence item. It ties
//! together:
//!
//! - the stored bytes ([`StoredContent`]: CID, size and fingerprint, which
//!   are always set together),
//! - the ledger anchor (evidence id, commitment and transaction reference),
//! - submitter-supplied metadata ([`EvidenceMetadata`]),
//!
//! together with the [`CustodyState`] the item has reached.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Cid, Commitment, EvidenceId, Fingerprint, Identity};

/// Media type recorded when the submitter does not declare one.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Lifecycle state of an evidence item.
///
/// ```text
/// Pending -> Stored -> Anchored -> Verified | Tampered
///    \         \
///     `-------> `---> Failed
/// ```
///
/// Only `Anchored`, `Verified` and `Tampered` are ever persisted in the
/// catalog; `Pending` and `Stored` exist for the duration of one ingest.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyState {
    Pending,
    Stored,
    Anchored,
    Verified,
    Tampered,
    Failed,
}

impl CustodyState {
    pub fn name(&self) -> &'static str {
        match self {
            CustodyState::Pending => "pending",
            CustodyState::Stored => "stored",
            CustodyState::Anchored => "anchored",
            CustodyState::Verified => "verified",
            CustodyState::Tampered => "tampered",
            CustodyState::Failed => "failed",
        }
    }

    /// Returns `true` if the ingest/verify state machine allows moving from
    /// `self` to `next`. Transitions only ever move forward.
    pub fn can_advance_to(&self, next: CustodyState) -> bool {
        use CustodyState::*;
        matches!(
            (self, next),
            (Pending, Stored)
                | (Pending, Failed)
                | (Stored, Anchored)
                | (Stored, Failed)
                | (Anchored, Verified)
                | (Anchored, Tampered)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CustodyState::Verified | CustodyState::Tampered | CustodyState::Failed
        )
    }

    /// Whether a record in this state may receive a verification outcome.
    ///
    /// Re-verifying an item appends a fresh outcome; the outcome is an
    /// annotation, not a change to the anchored fields.
    pub fn accepts_verification(&self) -> bool {
        matches!(
            self,
            CustodyState::Anchored | CustodyState::Verified | CustodyState::Tampered
        )
    }
}

impl fmt::Display for CustodyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rejected lifecycle change on a record.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("illegal custody transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: CustodyState,
    pub to: CustodyState,
}

/// Bytes accepted by the content store, as seen by the pipeline.
///
/// The CID and the fingerprint only ever travel together, so no record can
/// point at stored bytes without also recording what those bytes hash to.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoredContent {
    /// Store-assigned content identifier.
    pub cid: Cid,
    /// Size in bytes confirmed by the store.
    pub size: u64,
    /// SHA-256 fingerprint computed over the full buffer before upload.
    pub fingerprint: Fingerprint,
}

/// WGS84 coordinates where the evidence was collected.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Returns `None` for coordinates outside the valid WGS84 ranges.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let lat_ok = (-90.0..=90.0).contains(&latitude);
        let lon_ok = (-180.0..=180.0).contains(&longitude);
        (lat_ok && lon_ok).then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// Submitter-supplied metadata accompanying an ingest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    /// Declared media type, e.g. `"image/jpeg"`.
    pub media_type: String,
    /// Free-form description of the evidence.
    pub description: String,
    /// Optional collection location.
    pub geolocation: Option<GeoPoint>,
}

impl Default for EvidenceMetadata {
    fn default() -> Self {
        Self {
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            description: String::new(),
            geolocation: None,
        }
    }
}

/// Catalog entry for one anchored evidence item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Ledger-assigned identifier, also the catalog key.
    pub evidence_id: EvidenceId,

    /// Stored bytes: CID, confirmed size and content fingerprint.
    pub content: StoredContent,

    /// Original file name as supplied at ingest.
    pub file_name: String,

    /// Commitment anchored on the ledger for `content.fingerprint`.
    ///
    /// Write-once: this is a cached copy of what the ledger holds, and
    /// verification always re-reads the ledger rather than trusting it.
    pub commitment: Commitment,

    /// Identity that submitted the evidence.
    pub submitter: Identity,

    /// Ledger transaction reference for the anchor.
    pub tx_ref: String,

    /// Current lifecycle state.
    pub status: CustodyState,

    pub created_at: DateTime<Utc>,

    /// Time of the most recent verification outcome, if any.
    pub last_verified_at: Option<DateTime<Utc>>,

    pub metadata: EvidenceMetadata,
}

impl EvidenceRecord {
    /// Records a verification outcome (`Verified` or `Tampered`).
    ///
    /// Only the status and `last_verified_at` change; the content and
    /// anchor fields are never touched.
    pub fn annotate(
        &mut self,
        outcome: CustodyState,
        at: DateTime<Utc>,
    ) -> Result<(), IllegalTransition> {
        let is_outcome = matches!(outcome, CustodyState::Verified | CustodyState::Tampered);
        if !is_outcome || !self.status.accepts_verification() {
            return Err(IllegalTransition {
                from: self.status,
                to: outcome,
            });
        }
        self.status = outcome;
        self.last_verified_at = Some(at);
        Ok(())
    }
}

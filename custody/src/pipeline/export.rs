//! JSON export of catalog metadata.
//!
//! Produces the per-submitter metadata file handed to reviewers alongside
//! downloaded evidence. Field names are part of that file format.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{EvidenceRecord, GeoPoint};

/// One exported evidence entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEntry<'a> {
    pub evidence_id: u64,
    pub file_name: &'a str,
    pub file_type: &'a str,
    pub file_size: u64,
    pub ipfs_hash: &'a str,
    pub blockchain_hash: &'a str,
    pub file_hash: String,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub description: &'a str,
    pub gps_coordinates: Option<GeoPoint>,
}

impl<'a> From<&'a EvidenceRecord> for ExportEntry<'a> {
    fn from(r: &'a EvidenceRecord) -> Self {
        Self {
            evidence_id: r.evidence_id.get(),
            file_name: &r.file_name,
            file_type: &r.metadata.media_type,
            file_size: r.content.size,
            ipfs_hash: r.content.cid.as_str(),
            blockchain_hash: &r.tx_ref,
            file_hash: r.content.fingerprint.to_hex(),
            status: r.status.name(),
            timestamp: r.created_at,
            description: &r.metadata.description,
            gps_coordinates: r.metadata.geolocation,
        }
    }
}

/// Renders `records` as a pretty-printed JSON array.
pub fn export_json(records: &[EvidenceRecord]) -> serde_json::Result<String> {
    let entries: Vec<ExportEntry<'_>> = records.iter().map(ExportEntry::from).collect();
    serde_json::to_string_pretty(&entries)
}

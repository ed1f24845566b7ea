//! Evidence ingest and verification pipeline.
//!
//! This module contains:
//!
//! - the collaborator traits the pipeline is generic over
//!   ([`store::ContentStore`], [`ledger::Ledger`],
//!   [`ledger::RoleDirectory`], [`catalog::EvidenceCatalog`]),
//! - the shared error taxonomy ([`error`]),
//! - the [`coordinator::EvidenceCoordinator`] that sequences ingest and
//!   verification against those collaborators,
//! - JSON metadata export for catalogued evidence ([`export`]).

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod ledger;
pub mod store;

pub use catalog::{CatalogError, EvidenceCatalog};
pub use config::PipelineConfig;
pub use coordinator::{EvidenceCoordinator, IngestReceipt, Verdict, VerificationReport};
pub use error::{
    Dependency, FailureKind, InconclusiveReason, IngestCause, IngestError, IngestStep, Recovery,
    VerifyError,
};
pub use export::{ExportEntry, export_json};
pub use ledger::{Ledger, LedgerError, RoleDirectory};
pub use store::{ContentStore, PinOutcome, StoreError, UploadReceipt};

//! Evidence custody library crate.
//!
//! This crate provides the building blocks of a chain-of-custody pipeline
//! in which evidence bytes live in a content-addressed store and their
//! fingerprints are anchored on an append-only ledger:
//!
//! - strongly-typed domain types (`types`),
//! - content fingerprints and ledger commitments (`fingerprint`),
//! - the ingest/verify coordinator and its collaborator traits (`pipeline`),
//! - catalog backends (`storage`),
//! - content-store clients (`store_client`),
//! - ledger clients (`ledger_client`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level configuration (`config`).
//!
//! Binaries compose these pieces; tests swap the network clients for the
//! in-memory ones.

pub mod config;
pub mod fingerprint;
pub mod ledger_client;
pub mod metrics;
pub mod pipeline;
pub mod storage;
pub mod store_client;
pub mod types;

// Re-export top-level configuration types.
pub use config::{ConfigError, CustodyConfig, Deployment, MetricsConfig};

// Re-export the coordinator, its traits and errors.
pub use pipeline::{
    CatalogError, ContentStore, EvidenceCatalog, EvidenceCoordinator, FailureKind,
    InconclusiveReason, IngestError, IngestReceipt, IngestStep, Ledger, LedgerError,
    PinOutcome, PipelineConfig, Recovery, RoleDirectory, StoreError, Verdict, VerificationReport,
    VerifyError, export_json,
};

// Re-export catalog backends.
pub use storage::{InMemoryCatalog, RocksDbCatalog, RocksDbConfig};

// Re-export clients.
pub use ledger_client::{EvmLedger, InMemoryLedger, LedgerRpcConfig};
pub use store_client::{InMemoryContentStore, IpfsConfig, IpfsContentStore};

pub use metrics::{MetricsRegistry, PipelineMetrics};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the default ledger client, shared as ledger and role
/// directory.
pub type DefaultLedger = std::sync::Arc<EvmLedger>;

/// Type alias for the default coordinator stack used against live services.
///
/// This uses:
///
/// - [`IpfsContentStore`] for evidence bytes,
/// - [`EvmLedger`] as both ledger and role directory,
/// - [`RocksDbCatalog`] for the evidence catalog.
pub type DefaultCoordinator =
    EvidenceCoordinator<IpfsContentStore, DefaultLedger, DefaultLedger, RocksDbCatalog>;

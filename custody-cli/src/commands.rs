//! Subcommand handlers.
//!
//! Each handler returns the process exit code on success; errors bubble up
//! to `main` as `anyhow::Error` and exit with 1.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, bail};
use clap::Args;
use serde::Serialize;

use custody::pipeline::{Dependency, IngestError, IngestReceipt, VerifyError};
use custody::store_client::ipfs::gateway_url;
use custody::{
    AnchorReceipt, Cid, CustodyConfig, DefaultCoordinator, DEFAULT_MEDIA_TYPE, EvidenceCatalog,
    EvidenceCoordinator, EvidenceId, EvidenceMetadata, EvmLedger, Fingerprint, GeoPoint, Identity,
    IpfsContentStore, MetricsRegistry, RocksDbCatalog, StoredContent, Verdict, export_json,
    fingerprint,
};

/// Exit code for a completed verification that found tampering.
const EXIT_TAMPERED: u8 = 2;
/// Exit code for a verification that could not complete.
const EXIT_INCONCLUSIVE: u8 = 3;

/// Resolved configuration and shared handles for one invocation.
pub struct Context {
    pub config: CustodyConfig,
    pub metrics: Option<Arc<MetricsRegistry>>,
}

impl Context {
    fn catalog(&self) -> anyhow::Result<RocksDbCatalog> {
        RocksDbCatalog::open(&self.config.catalog).with_context(|| {
            format!(
                "failed to open evidence catalog at {}",
                self.config.catalog.path
            )
        })
    }

    fn coordinator(&self) -> anyhow::Result<DefaultCoordinator> {
        let store = IpfsContentStore::new(&self.config.content_store)
            .context("failed to create IPFS client")?;
        let ledger = Arc::new(
            EvmLedger::new(self.config.ledger.clone()).context("failed to create ledger client")?,
        );
        let catalog = self.catalog()?;

        let coordinator = EvidenceCoordinator::new(
            self.config.pipeline.clone(),
            store,
            ledger.clone(),
            ledger,
            catalog,
        );
        Ok(match &self.metrics {
            Some(metrics) => coordinator.with_metrics(metrics.clone()),
            None => coordinator,
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Optional metadata accompanying an ingest.
#[derive(Args, Debug, Default)]
pub struct MetadataArgs {
    /// Declared media type (default: application/octet-stream).
    #[arg(long)]
    pub media_type: Option<String>,

    /// Free-form description.
    #[arg(long)]
    pub description: Option<String>,

    /// Collection latitude (WGS84).
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Collection longitude (WGS84).
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,
}

impl MetadataArgs {
    fn to_metadata(&self) -> anyhow::Result<EvidenceMetadata> {
        let geolocation = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => match GeoPoint::new(lat, lon) {
                Some(point) => Some(point),
                None => bail!("coordinates ({lat}, {lon}) are out of range"),
            },
            _ => None,
        };
        Ok(EvidenceMetadata {
            media_type: self
                .media_type
                .clone()
                .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string()),
            description: self.description.clone().unwrap_or_default(),
            geolocation,
        })
    }
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Evidence file to ingest.
    pub file: PathBuf,

    /// Ledger address of the submitting officer.
    #[arg(long)]
    pub submitter: String,

    /// Name to record instead of the file's own name.
    #[arg(long)]
    pub file_name: Option<String>,

    #[command(flatten)]
    pub metadata: MetadataArgs,
}

/// Content reported by a failed ingest.
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// CID reported by the failed ingest.
    #[arg(long)]
    pub cid: String,

    /// Size in bytes reported by the failed ingest.
    #[arg(long)]
    pub size: u64,

    /// SHA-256 fingerprint (hex) reported by the failed ingest.
    #[arg(long)]
    pub fingerprint: String,

    #[arg(long)]
    pub file_name: String,

    #[arg(long)]
    pub submitter: String,

    #[command(flatten)]
    pub metadata: MetadataArgs,
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub content: ResumeArgs,

    /// Ledger id reported as `anchored_evidence_id`.
    #[arg(long)]
    pub evidence_id: u64,

    /// Transaction reference reported as `anchored_tx_ref`.
    #[arg(long)]
    pub tx_ref: String,
}

/// Exit codes: 0 verified, 2 tampered, 3 inconclusive, 1 any other error.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    pub evidence_id: u64,

    /// Ledger address of the reviewer or auditor asking.
    #[arg(long)]
    pub requester: String,
}

#[derive(Args, Debug)]
pub struct RetrieveArgs {
    pub evidence_id: u64,

    #[arg(long)]
    pub requester: String,

    /// Output path (default: the recorded file name in the current directory).
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub submitter: String,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Only export evidence from this submitter.
    #[arg(long)]
    pub submitter: Option<String>,

    /// Write to this file instead of stdout.
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct GatewayArgs {
    pub cid: String,
}

#[derive(Serialize)]
struct IngestOutput {
    evidence_id: EvidenceId,
    cid: Cid,
    size: u64,
    fingerprint: Fingerprint,
    commitment: String,
    tx_ref: String,
    gateway_url: String,
    warnings: Vec<String>,
}

impl IngestOutput {
    fn new(receipt: &IngestReceipt, config: &CustodyConfig) -> Self {
        let record = &receipt.record;
        Self {
            evidence_id: record.evidence_id,
            cid: record.content.cid.clone(),
            size: record.content.size,
            fingerprint: record.content.fingerprint,
            commitment: record.commitment.to_prefixed_hex(),
            tx_ref: record.tx_ref.clone(),
            gateway_url: gateway_url(&config.content_store.gateway_url, &record.content.cid),
            warnings: receipt.warnings(),
        }
    }
}

/// Printed when an ingest fails, so the operator can complete it.
#[derive(Serialize)]
struct IngestFailure<'a> {
    step: &'static str,
    error: String,
    /// `resume`: run `custody resume` with `stored`.
    /// `reconcile`: run `custody reconcile` with `stored` and the anchored
    /// id and tx ref; resuming would anchor a second ledger record.
    /// `restart`: ingest the file again.
    recovery: &'static str,
    stored: Option<&'a StoredContent>,
    anchored_evidence_id: Option<EvidenceId>,
    anchored_tx_ref: Option<&'a str>,
}

impl<'a> From<&'a IngestError> for IngestFailure<'a> {
    fn from(err: &'a IngestError) -> Self {
        Self {
            step: err.step.name(),
            error: err.cause.to_string(),
            recovery: err.recovery().name(),
            stored: err.stored.as_ref(),
            anchored_evidence_id: err.anchored.as_ref().map(|a| a.record_id),
            anchored_tx_ref: err.anchored.as_ref().map(|a| a.tx_ref.as_str()),
        }
    }
}

fn finish_ingest(
    ctx: &Context,
    result: Result<IngestReceipt, IngestError>,
) -> anyhow::Result<u8> {
    match result {
        Ok(receipt) => {
            for warning in receipt.warnings() {
                tracing::warn!("{warning}");
            }
            print_json(&IngestOutput::new(&receipt, &ctx.config))?;
            Ok(0)
        }
        Err(err) => {
            tracing::error!(step = %err.step, "{err}");
            print_json(&IngestFailure::from(&err))?;
            Ok(1)
        }
    }
}

pub fn run_ingest(ctx: &Context, args: &IngestArgs) -> anyhow::Result<u8> {
    let bytes = fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let file_name = match &args.file_name {
        Some(name) => name.clone(),
        None => args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("evidence path has no file name")?,
    };
    let metadata = args.metadata.to_metadata()?;
    let submitter = Identity::new(&args.submitter);

    let coordinator = ctx.coordinator()?;
    finish_ingest(
        ctx,
        coordinator.ingest(&bytes, &file_name, &submitter, metadata),
    )
}

impl ResumeArgs {
    fn stored(&self) -> anyhow::Result<StoredContent> {
        Ok(StoredContent {
            cid: Cid::new(self.cid.trim()),
            size: self.size,
            fingerprint: Fingerprint::from_hex(&self.fingerprint)
                .context("--fingerprint must be a 32-byte hex digest")?,
        })
    }
}

pub fn run_resume(ctx: &Context, args: &ResumeArgs) -> anyhow::Result<u8> {
    let stored = args.stored()?;
    let metadata = args.metadata.to_metadata()?;
    let submitter = Identity::new(&args.submitter);

    let coordinator = ctx.coordinator()?;
    finish_ingest(
        ctx,
        coordinator.resume_ingest(stored, &args.file_name, &submitter, metadata),
    )
}

pub fn run_reconcile(ctx: &Context, args: &ReconcileArgs) -> anyhow::Result<u8> {
    let content = &args.content;
    let stored = content.stored()?;
    let anchor = AnchorReceipt {
        record_id: EvidenceId(args.evidence_id),
        tx_ref: args.tx_ref.trim().to_string(),
    };
    let metadata = content.metadata.to_metadata()?;
    let submitter = Identity::new(&content.submitter);

    let coordinator = ctx.coordinator()?;
    finish_ingest(
        ctx,
        coordinator.reconcile_anchored(stored, anchor, &content.file_name, &submitter, metadata),
    )
}

#[derive(Serialize)]
struct InconclusiveOutput {
    evidence_id: EvidenceId,
    outcome: &'static str,
    dependency: String,
    reason: String,
}

pub fn run_verify(ctx: &Context, args: &VerifyArgs) -> anyhow::Result<u8> {
    let coordinator = ctx.coordinator()?;
    let requester = Identity::new(&args.requester);

    match coordinator.verify(EvidenceId(args.evidence_id), &requester) {
        Ok(report) => {
            print_json(&report)?;
            Ok(match report.verdict {
                Verdict::Verified => 0,
                Verdict::Tampered => EXIT_TAMPERED,
            })
        }
        Err(VerifyError::Inconclusive {
            evidence_id,
            reason,
        }) => {
            let dependency: Dependency = reason.dependency();
            print_json(&InconclusiveOutput {
                evidence_id,
                outcome: "inconclusive",
                dependency: dependency.to_string(),
                reason: reason.to_string(),
            })?;
            Ok(EXIT_INCONCLUSIVE)
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Serialize)]
struct RetrieveOutput<'a> {
    evidence_id: EvidenceId,
    path: &'a Path,
    size: usize,
    fingerprint: Fingerprint,
    /// Whether the bytes still hash to the fingerprint recorded at ingest.
    matches_catalog: bool,
}

pub fn run_retrieve(ctx: &Context, args: &RetrieveArgs) -> anyhow::Result<u8> {
    let coordinator = ctx.coordinator()?;
    let requester = Identity::new(&args.requester);

    let (record, bytes) = coordinator.retrieve(EvidenceId(args.evidence_id), &requester)?;

    let out = match &args.out {
        Some(path) => path.clone(),
        // Only the final component of the recorded name is trusted.
        None => Path::new(&record.file_name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("evidence-{}", record.evidence_id))),
    };
    fs::write(&out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;

    let fp = fingerprint::fingerprint(&bytes);
    print_json(&RetrieveOutput {
        evidence_id: record.evidence_id,
        path: &out,
        size: bytes.len(),
        fingerprint: fp,
        matches_catalog: fp == record.content.fingerprint,
    })?;
    Ok(0)
}

pub fn run_list(ctx: &Context, args: &ListArgs) -> anyhow::Result<u8> {
    let catalog = ctx.catalog()?;
    let records = catalog.list_by_submitter(&Identity::new(&args.submitter))?;
    print_json(&records)?;
    Ok(0)
}

pub fn run_export(ctx: &Context, args: &ExportArgs) -> anyhow::Result<u8> {
    let catalog = ctx.catalog()?;
    let records = match &args.submitter {
        Some(submitter) => catalog.list_by_submitter(&Identity::new(submitter))?,
        None => catalog.list_all()?,
    };
    let json = export_json(&records)?;

    match &args.out {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), count = records.len(), "exported evidence metadata");
        }
        None => println!("{json}"),
    }
    Ok(0)
}

pub fn run_gateway_url(ctx: &Context, args: &GatewayArgs) -> anyhow::Result<u8> {
    let cid = args.cid.trim();
    if cid.is_empty() {
        bail!("CID must not be empty");
    }
    println!(
        "{}",
        gateway_url(&ctx.config.content_store.gateway_url, &Cid::new(cid))
    );
    Ok(0)
}

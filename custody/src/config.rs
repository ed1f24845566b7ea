//! Top-level configuration for the custody pipeline.
//!
//! This module aggregates configuration for:
//!
//! - pipeline policy (`PipelineConfig`),
//! - the evidence catalog (RocksDB path and creation flags),
//! - the content store client (IPFS API/gateway URLs + timeout),
//! - the ledger client (RPC URL, contract and sender addresses, timeouts),
//! - metrics output.
//!
//! Sources are layered, lowest precedence first: built-in defaults, an
//! optional JSON file, then environment variables. The ledger contract
//! address can also be read from a `deployment.json` written when the
//! contract was deployed.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger_client::LedgerRpcConfig;
use crate::pipeline::PipelineConfig;
use crate::storage::RocksDbConfig;
use crate::store_client::IpfsConfig;

/// Environment variables recognised by [`CustodyConfig::apply_env`].
pub const ENV_IPFS_URL: &str = "IPFS_URL";
pub const ENV_IPFS_GATEWAY_URL: &str = "IPFS_GATEWAY_URL";
pub const ENV_BLOCKCHAIN_RPC_URL: &str = "BLOCKCHAIN_RPC_URL";
pub const ENV_CONTRACT_ADDRESS: &str = "CONTRACT_ADDRESS";
pub const ENV_LEDGER_FROM_ADDRESS: &str = "LEDGER_FROM_ADDRESS";
pub const ENV_CATALOG_PATH: &str = "CUSTODY_CATALOG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} does not contain a contractAddress")]
    MissingContractAddress(PathBuf),
}

/// Configuration for metrics output.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to record pipeline metrics.
    pub enabled: bool,
    /// Prometheus textfile to write after each command, if any.
    pub textfile: Option<PathBuf>,
}

/// Contract deployment record.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub contract_address: Option<String>,
    pub network: Option<String>,
}

impl Deployment {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Top-level configuration.
///
/// This aggregates all the sub-configs needed to wire up a coordinator:
///
/// - pipeline policy (`pipeline`),
/// - persistent catalog (`catalog`),
/// - content store client (`content_store`),
/// - ledger client (`ledger`),
/// - metrics output (`metrics`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    pub pipeline: PipelineConfig,
    pub catalog: RocksDbConfig,
    pub content_store: IpfsConfig,
    pub ledger: LedgerRpcConfig,
    pub metrics: MetricsConfig,
}

impl CustodyConfig {
    /// Reads a JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overrides fields from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overrides fields from `lookup`; empty values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_IPFS_URL) {
            self.content_store.api_url = v;
        }
        if let Some(v) = get(ENV_IPFS_GATEWAY_URL) {
            self.content_store.gateway_url = v;
        }
        if let Some(v) = get(ENV_BLOCKCHAIN_RPC_URL) {
            self.ledger.rpc_url = v;
        }
        if let Some(v) = get(ENV_CONTRACT_ADDRESS) {
            self.ledger.contract_address = v;
        }
        if let Some(v) = get(ENV_LEDGER_FROM_ADDRESS) {
            self.ledger.from_address = v;
        }
        if let Some(v) = get(ENV_CATALOG_PATH) {
            self.catalog.path = v;
        }
    }

    /// Takes the ledger contract address from a deployment record.
    pub fn apply_deployment(&mut self, path: &Path) -> Result<(), ConfigError> {
        let deployment = Deployment::from_file(path)?;
        let address = deployment
            .contract_address
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingContractAddress(path.to_path_buf()))?;
        tracing::debug!(
            contract = %address,
            network = deployment.network.as_deref().unwrap_or("unknown"),
            "using contract address from deployment file"
        );
        self.ledger.contract_address = address;
        Ok(())
    }
}

/// Serde adapter storing a `Duration` as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

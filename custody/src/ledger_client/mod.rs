//! Clients for the append-only ledger and its role store.
//!
//! This module provides concrete implementations of the
//! [`crate::pipeline::ledger::Ledger`] and
//! [`crate::pipeline::ledger::RoleDirectory`] traits:
//!
//! - [`rpc::EvmLedger`] talks to a deployed custody contract over EVM
//!   JSON-RPC (with [`abi`] holding the calldata helpers),
//! - [`mem::InMemoryLedger`] keeps records and role grants in memory for
//!   tests and dry runs.

pub mod abi;
pub mod mem;
pub mod rpc;

pub use mem::InMemoryLedger;
pub use rpc::{EvmLedger, LedgerRpcConfig};

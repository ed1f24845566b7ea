//! Catalog backends.
//!
//! This module provides concrete implementations of the
//! [`crate::pipeline::catalog::EvidenceCatalog`] trait, including:
//!
//! - an in-memory catalog ([`mem::InMemoryCatalog`]) suitable for tests and
//!   dry runs,
//! - a RocksDB-backed catalog ([`rocksdb::RocksDbCatalog`]) for operators
//!   that need records to survive restarts.

pub mod mem;
pub mod rocksdb;

pub use mem::InMemoryCatalog;
pub use rocksdb::{RocksDbCatalog, RocksDbConfig};

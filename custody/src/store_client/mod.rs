//! Clients for the content-addressed evidence store.
//!
//! This module provides concrete implementations of the
//! [`crate::pipeline::store::ContentStore`] trait:
//!
//! - [`ipfs::IpfsContentStore`] talks to an IPFS node over its HTTP RPC API,
//! - [`mem::InMemoryContentStore`] keeps objects in process memory and can
//!   simulate outages and out-of-band tampering for tests.

pub mod ipfs;
pub mod mem;

pub use ipfs::{IpfsConfig, IpfsContentStore};
pub use mem::InMemoryContentStore;

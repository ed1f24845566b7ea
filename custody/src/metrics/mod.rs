//! Metrics and instrumentation for the custody pipeline.
//!
//! This module defines Prometheus-compatible metrics for ingest and
//! verification runs and renders them in the Prometheus text format.
//!
//! Typical usage:
//!
//! ```ignore
//! use std::sync::Arc;
//! use custody::metrics::MetricsRegistry;
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let coordinator = coordinator.with_metrics(registry.clone());
//!
//! // ... run ingests / verifications ...
//!
//! std::fs::write("custody.prom", registry.gather_text())?;
//! ```

pub mod prometheus;

pub use prometheus::{MetricsRegistry, PipelineMetrics};

//! Self metrics for the relay process.
//!
//! Stored as atomics behind `DashMap` label maps and rendered in the text
//! exposition format by the self-metrics `/metrics` handler.

pub mod metrics;

pub use metrics::RelayMetrics;

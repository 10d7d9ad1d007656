//! Metrics collection and export for scalarweb.
//!
//! This crate provides a unified metrics interface using the `metrics` crate facade.
//! When the `prometheus` feature is enabled, metrics are exported in Prometheus format.
//!
//! # Usage
//!
//! ```rust,ignore
//! use scalarweb_metrics::{auth, counter, labels};
//!
//! counter!(auth::RENEWALS_TOTAL, labels::HOST => "tv.local").increment(1);
//! ```
//!
//! # Features
//!
//! - `prometheus`: render recorded metrics in Prometheus text format

mod definitions;
pub mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, histogram};

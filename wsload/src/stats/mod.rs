//! Throughput and concurrency accounting
//!
//! This module provides:
//! - `MetricsAggregator`, the single owner of the request counters and the
//!   open-connection gauge
//! - `Reporter`, the once-per-window snapshot loop that prints the rate line

mod aggregator;
mod reporter;

pub use aggregator::{MetricsAggregator, OpenConnection, Snapshot};
pub use reporter::{ReportStyle, Reporter};

//! Statistics and metrics
//!
//! Provides observability into the publish session.

pub mod metrics;

pub use metrics::{Statistics, StatsHandle};

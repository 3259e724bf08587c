//! Metric name parsing and catalog resolution.

pub mod parse;
pub mod resolve;

//! Metric name decomposition.
//!
//! A metric name is a hierarchical, unit-qualified base name (for example
//! `sm__cycles_active.sum`) optionally followed by trailing modifier
//! sigils: `+` keeps per-instance values, `$` requests isolation (already
//! the default), `&` disables isolation. Parsing is pure and total;
//! anything unrecognized at the tail is simply left in the base name and
//! the defaults stand.

use crate::backend::{RollupOp, Submetric};

/// A decomposed metric name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMetric {
    /// Base name identifying the hardware counter family.
    pub base_name: String,
    /// Instance rollup. Always `Sum` today; carried so evaluation requests
    /// have a single source of truth.
    pub rollup: RollupOp,
    /// Derived view. Always `None` today.
    pub submetric: Submetric,
    /// Exclude contributions from concurrently overlapping ranges.
    pub isolated: bool,
    /// Keep per-instance values through collection.
    pub keep_instances: bool,
}

/// Parses a metric name into its base name and modifiers. Never fails.
pub fn parse_metric_name(name: &str) -> ParsedMetric {
    let mut base = name.trim();
    let mut isolated = true;
    let mut keep_instances = true;

    if let Some(stripped) = base.strip_suffix('+') {
        keep_instances = true;
        base = stripped;
    }

    if let Some(stripped) = base.strip_suffix('$') {
        isolated = true;
        base = stripped;
    } else if let Some(stripped) = base.strip_suffix('&') {
        isolated = false;
        base = stripped;
    }

    ParsedMetric {
        base_name: base.to_string(),
        rollup: RollupOp::Sum,
        submetric: Submetric::None,
        isolated,
        keep_instances,
    }
}

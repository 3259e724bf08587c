//! Catalog resolution of parsed metric names.
//!
//! The per-chip catalog runs to thousands of entries, so instead of a
//! linear scan per requested name the catalog is read once into a
//! name→index map and reused for every lookup. Duplicate catalog names
//! keep the first index, matching a first-match scan.

use std::collections::HashMap;

use tracing::warn;

use crate::backend::{ConfigContext, RawMetricRequest};
use crate::error::{BackendCall, Error, Result};
use crate::metric::parse::parse_metric_name;

/// One-time name→index view of a chip's raw-metric catalog.
#[derive(Debug)]
pub struct CatalogIndex {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl CatalogIndex {
    /// Reads the full catalog from an open config context.
    pub fn from_context(ctx: &dyn ConfigContext) -> Result<Self> {
        let num_metrics = ctx.num_metrics().during("num_metrics")?;

        let mut names = Vec::with_capacity(num_metrics);
        let mut by_name = HashMap::with_capacity(num_metrics);
        for index in 0..num_metrics {
            let name = ctx.metric_name(index).during("metric_name")?;
            by_name.entry(name.clone()).or_insert(index);
            names.push(name);
        }

        Ok(Self { names, by_name })
    }

    /// All catalog names, in catalog order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Catalog index of a base name, if present.
    pub fn lookup(&self, base_name: &str) -> Option<usize> {
        self.by_name.get(base_name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Resolves requested metric names into ordered raw-metric requests.
///
/// `keep_instances` is forced to true on every request regardless of the
/// parsed modifier: collection of metrics without instances is broken in
/// the backend, so instance data is always retained.
///
/// Names with no catalog entry are dropped from the result without
/// failing the other names; each drop is logged. With `strict` set, the
/// first unresolved name fails the whole call instead.
pub fn resolve_requests(
    chip: &str,
    index: &CatalogIndex,
    metric_names: &[&str],
    strict: bool,
) -> Result<Vec<RawMetricRequest>> {
    let mut requests = Vec::with_capacity(metric_names.len());

    for &name in metric_names {
        let parsed = parse_metric_name(name);
        match index.lookup(&parsed.base_name) {
            Some(catalog_index) => {
                requests.push(RawMetricRequest {
                    name: index.names[catalog_index].clone(),
                    isolated: parsed.isolated,
                    keep_instances: true,
                });
            }
            None if strict => {
                return Err(Error::UnresolvedMetric {
                    name: name.to_string(),
                    chip: chip.to_string(),
                });
            }
            None => {
                warn!(metric = name, chip, "no catalog entry for metric, dropping");
            }
        }
    }

    Ok(requests)
}

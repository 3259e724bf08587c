//! Catalog listing with the optional submetric display filter.

use crate::metric::resolve::CatalogIndex;

/// Lists raw metric names in catalog order.
///
/// With `include_submetrics` unset, names matching the submetric-variant
/// heuristic are hidden. The filter is presentation-only: it never
/// affects resolution or evaluation.
pub(crate) fn raw_metric_names(index: &CatalogIndex, include_submetrics: bool) -> Vec<String> {
    index
        .names()
        .iter()
        .filter(|name| include_submetrics || !is_submetric_variant(name))
        .cloned()
        .collect()
}

/// Infix heuristic for submetric variants of a unit-qualified name.
fn is_submetric_variant(name: &str) -> bool {
    name.contains("__")
        && (name.contains("_peak_") || name.contains("_per_cycle_") || name.contains("_pct_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::SimBackend;
    use crate::backend::CounterBackend;

    fn index() -> CatalogIndex {
        let backend = SimBackend::new().with_chip(
            "sim100",
            &[
                "sm__cycles_active.sum",
                "sm__throughput_peak_sustained.avg",
                "sm__inst_executed_per_cycle_active.avg",
                "gpu__time_pct_of_peak.avg",
                "dram__bytes_read.sum",
            ],
        );
        let ctx = backend.open_config_context("sim100").expect("open");
        CatalogIndex::from_context(ctx.as_ref()).expect("index")
    }

    #[test]
    fn test_filter_hides_submetric_variants() {
        let names = raw_metric_names(&index(), false);
        assert_eq!(
            names,
            vec![
                "sm__cycles_active.sum".to_string(),
                "dram__bytes_read.sum".to_string(),
            ],
        );
    }

    #[test]
    fn test_unfiltered_listing_is_catalog_order() {
        let names = raw_metric_names(&index(), true);
        assert_eq!(names.len(), 5);
        assert_eq!(names[1], "sm__throughput_peak_sustained.avg");
    }

    #[test]
    fn test_heuristic_requires_unit_qualifier() {
        // No "__" separator, so the peak infix alone does not hide it.
        assert!(!is_submetric_variant("plain_peak_rate"));
        assert!(is_submetric_variant("sm__x_peak_y"));
        assert!(is_submetric_variant("sm__x_per_cycle_y"));
        assert!(is_submetric_variant("sm__x_pct_y"));
        assert!(!is_submetric_variant("sm__cycles_active.sum"));
    }
}

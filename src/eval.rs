//! Per-range metric evaluation over a collected counter data image.

use crate::backend::{CounterBackend, EvalRequest, RollupOp, Submetric};
use crate::error::{BackendCall, Error, Result};
use crate::metric::parse::{parse_metric_name, ParsedMetric};

/// Scalar metric value for one execution range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeValue {
    /// Hierarchical range name, nested descriptions joined with "/".
    pub range_name: String,
    /// Evaluated scalar.
    pub value: f64,
}

/// Evaluation output for one requested metric: one value per collected
/// range, in collection order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    /// The metric name as requested (modifiers included).
    pub metric_name: String,
    /// Total ranges in the image; always equals `ranges.len()`.
    pub num_ranges: usize,
    /// Per-range values in collection order, never reordered.
    pub ranges: Vec<RangeValue>,
}

/// Evaluates `metric_names` against a filled counter data image.
///
/// Every evaluation request is fixed to rollup SUM and submetric NONE,
/// whatever the metric's declared type. That is correct for plain
/// counters and a known simplification for ratio/percentage/latency
/// metrics, which would need a different rollup.
///
/// Any backend failure aborts the whole evaluation with no partial
/// results; the evaluator context and scratch buffer are released on
/// every exit path.
pub(crate) fn evaluate<B: CounterBackend>(
    backend: &B,
    chip: &str,
    image: &[u8],
    metric_names: &[&str],
) -> Result<Vec<MetricResult>> {
    if image.is_empty() {
        return Err(Error::EmptyCounterData);
    }

    let num_ranges = backend.num_ranges(image).during("num_ranges")?;

    let parsed: Vec<ParsedMetric> = metric_names
        .iter()
        .map(|name| parse_metric_name(name))
        .collect();

    let mut results: Vec<MetricResult> = metric_names
        .iter()
        .map(|name| MetricResult {
            metric_name: name.to_string(),
            num_ranges,
            ranges: Vec::with_capacity(num_ranges),
        })
        .collect();

    let scratch_size = backend
        .evaluator_scratch_size(chip)
        .during("evaluator_scratch_size")?;
    let scratch = vec![0u8; scratch_size];

    let mut evaluator = backend
        .open_evaluator(chip, image, scratch)
        .during("open_evaluator")?;

    // Requests are range-independent, so they are built once up front.
    let mut requests = Vec::with_capacity(parsed.len());
    for metric in &parsed {
        let (metric_type, metric_index) = evaluator
            .metric_type_and_index(&metric.base_name)
            .during("metric_type_and_index")?;
        requests.push(EvalRequest {
            metric_index,
            metric_type,
            rollup: RollupOp::Sum,
            submetric: Submetric::None,
        });
    }

    // The last parsed modifier wins for the whole batch.
    let isolated = parsed.last().map_or(true, |metric| metric.isolated);

    let mut values = vec![0.0f64; requests.len()];
    for range_index in 0..num_ranges {
        let descriptions = backend
            .range_descriptions(image, range_index)
            .during("range_descriptions")?;
        let range_name = descriptions.join("/");

        evaluator
            .evaluate_range(range_index, &requests, isolated, &mut values)
            .during("evaluate_range")?;

        for (result, &value) in results.iter_mut().zip(&values) {
            result.ranges.push(RangeValue {
                range_name: range_name.clone(),
                value,
            });
        }
    }

    Ok(results)
}

//! Ports to the hardware counter backend.
//!
//! The backend owns the binary layout of the configuration image, the
//! counter data prefix, and the collected counter data image; the library
//! treats all three as opaque byte sequences and only sequences the calls.
//!
//! Every context handed out by a backend is a short-lived, call-scoped
//! resource: implementations release the underlying backend object in
//! `Drop`, so release runs exactly once on every exit path, success or
//! failure.

pub mod sim;

use crate::error::BackendError;

/// Aggregation applied across counted instances of a raw metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RollupOp {
    /// Sum all instances. The evaluation path currently fixes every
    /// request to this rollup.
    #[default]
    Sum,
    /// Average across instances.
    Avg,
    /// Minimum instance value.
    Min,
    /// Maximum instance value.
    Max,
}

/// Derived view of a metric selectable at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Submetric {
    /// Plain value, no derived view. The evaluation path currently fixes
    /// every request to this submetric.
    #[default]
    None,
    /// Peak-rate view.
    Peak,
    /// Per-cycle rate view.
    PerCycle,
    /// Percentage-of-peak view.
    Pct,
}

/// Backend-assigned classification of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Monotonic event count.
    Counter,
    /// Ratio or percentage of a peak rate.
    Ratio,
    /// Bytes or operations per unit time.
    Throughput,
}

/// One catalog-resolved raw metric dependency.
///
/// The owned `name` is stable backing storage: downstream batched calls
/// may hold references into it for the duration of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMetricRequest {
    /// Canonical catalog name of the raw metric.
    pub name: String,
    /// Exclude contributions from concurrently overlapping ranges.
    pub isolated: bool,
    /// Keep per-instance values instead of pre-collapsing them.
    pub keep_instances: bool,
}

/// One metric in a batched per-range evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalRequest {
    /// Index assigned by the evaluator for the metric's base name.
    pub metric_index: usize,
    /// Classification reported by the evaluator.
    pub metric_type: MetricType,
    /// Instance rollup to apply.
    pub rollup: RollupOp,
    /// Derived view to apply.
    pub submetric: Submetric,
}

/// Raw-metrics-config context: catalog enumeration plus configuration
/// image generation for one chip.
pub trait ConfigContext {
    /// Number of raw metrics in the chip's catalog.
    fn num_metrics(&self) -> Result<usize, BackendError>;

    /// Catalog name of the raw metric at `index`, in catalog order.
    fn metric_name(&self, index: usize) -> Result<String, BackendError>;

    /// Open a pass group for scheduling.
    fn begin_pass_group(&mut self) -> Result<(), BackendError>;

    /// Add resolved requests to the open pass group in one batched call.
    fn add_metrics(&mut self, requests: &[RawMetricRequest]) -> Result<(), BackendError>;

    /// Close the pass group.
    fn end_pass_group(&mut self) -> Result<(), BackendError>;

    /// Generate the collection configuration from the scheduled metrics.
    fn generate(&mut self) -> Result<(), BackendError>;

    /// Serialize the configuration image.
    ///
    /// Two-phase size-then-fill contract: `None` returns the required byte
    /// length without writing; `Some(buf)` fills a buffer of at least that
    /// length and returns the bytes written.
    fn config_image(&mut self, buf: Option<&mut [u8]>) -> Result<usize, BackendError>;
}

/// Counter-data-builder context: produces the storage-schema prefix the
/// external collector uses to allocate the counter data image.
pub trait DataBuilderContext {
    /// Add resolved requests in one batched call.
    fn add_metrics(&mut self, requests: &[RawMetricRequest]) -> Result<(), BackendError>;

    /// Serialize the counter data prefix. Same two-phase contract as
    /// [`ConfigContext::config_image`].
    fn counter_data_prefix(&mut self, buf: Option<&mut [u8]>) -> Result<usize, BackendError>;
}

/// Metrics-evaluator context bound to one (chip, counter data image,
/// scratch buffer) triple. Valid only for the call that opened it.
pub trait EvaluatorContext {
    /// Resolve a base metric name to its evaluator type and index.
    fn metric_type_and_index(&self, name: &str) -> Result<(MetricType, usize), BackendError>;

    /// Evaluate all `requests` for one range in a single batched call,
    /// writing one scalar per request into `values`.
    fn evaluate_range(
        &mut self,
        range_index: usize,
        requests: &[EvalRequest],
        isolated: bool,
        values: &mut [f64],
    ) -> Result<(), BackendError>;
}

/// The external counter-collection backend.
///
/// All calls are blocking and synchronous; the backend may stall the
/// caller indefinitely. No timeout or cancellation is supported.
pub trait CounterBackend {
    /// One-time process-wide initialization. Must be idempotent: repeated
    /// calls are safe no-ops after the first.
    fn initialize(&self) -> Result<(), BackendError>;

    /// Enumerate supported chip identifiers.
    fn supported_chips(&self) -> Result<Vec<String>, BackendError>;

    /// Open a raw-metrics-config context for `chip`.
    fn open_config_context(&self, chip: &str) -> Result<Box<dyn ConfigContext>, BackendError>;

    /// Open a counter-data-builder context for `chip`.
    fn open_data_builder(&self, chip: &str) -> Result<Box<dyn DataBuilderContext>, BackendError>;

    /// Required scratch buffer size for an evaluator sized to `chip`.
    fn evaluator_scratch_size(&self, chip: &str) -> Result<usize, BackendError>;

    /// Open an evaluator bound to `chip`, a filled counter data image, and
    /// a scratch buffer of at least [`evaluator_scratch_size`] bytes.
    ///
    /// [`evaluator_scratch_size`]: CounterBackend::evaluator_scratch_size
    fn open_evaluator(
        &self,
        chip: &str,
        image: &[u8],
        scratch: Vec<u8>,
    ) -> Result<Box<dyn EvaluatorContext>, BackendError>;

    /// Number of collected ranges in a counter data image.
    fn num_ranges(&self, image: &[u8]) -> Result<usize, BackendError>;

    /// Nested range-description components for one range, outermost first.
    fn range_descriptions(
        &self,
        image: &[u8],
        range_index: usize,
    ) -> Result<Vec<String>, BackendError>;
}

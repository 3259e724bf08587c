//! Deterministic in-memory counter backend.
//!
//! Stands in for the vendor SDK the way the original project ships a stub
//! host-util build: the blobs are real byte sequences with a private
//! little-endian layout, the contexts enforce the call protocol, and
//! evaluation applies the requested rollup over recorded instance values.
//! [`SimBackend::synthesize_image`] plays the role of the external
//! collector, turning a counter data prefix plus recorded ranges into a
//! filled counter data image.
//!
//! The backend also counts opened and released contexts so tests can
//! assert that every exit path releases what it acquired.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{
    ConfigContext, CounterBackend, DataBuilderContext, EvalRequest, EvaluatorContext, MetricType,
    RawMetricRequest, RollupOp,
};
use crate::error::BackendError;

const CONFIG_MAGIC: &[u8; 4] = b"SCFG";
const PREFIX_MAGIC: &[u8; 4] = b"SPFX";
const IMAGE_MAGIC: &[u8; 4] = b"SDAT";

/// One recorded execution range handed to [`SimBackend::synthesize_image`].
#[derive(Debug, Clone, Default)]
pub struct SimRange {
    /// Nested range descriptions, outermost first.
    pub descriptions: Vec<String>,
    /// Per-counter instance values, keyed by catalog name.
    pub counters: Vec<(String, Vec<f64>)>,
}

impl SimRange {
    /// Builds a range from description components.
    pub fn new(descriptions: &[&str]) -> Self {
        Self {
            descriptions: descriptions.iter().map(|d| d.to_string()).collect(),
            counters: Vec::new(),
        }
    }

    /// Records instance values for one counter.
    pub fn counter(mut self, name: &str, instances: &[f64]) -> Self {
        self.counters.push((name.to_string(), instances.to_vec()));
        self
    }
}

#[derive(Debug, Clone)]
struct SimChip {
    name: String,
    catalog: Vec<String>,
}

#[derive(Debug, Default)]
struct SimState {
    chips: Vec<SimChip>,
    init_calls: u32,
    contexts_opened: usize,
    contexts_released: usize,
}

/// Deterministic in-memory implementation of [`CounterBackend`].
#[derive(Debug, Clone, Default)]
pub struct SimBackend {
    state: Arc<Mutex<SimState>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a chip with the given raw-metric catalog, in catalog order.
    pub fn with_chip(self, name: &str, catalog: &[&str]) -> Self {
        {
            let mut state = self.state.lock().expect("sim state poisoned");
            state.chips.push(SimChip {
                name: name.to_string(),
                catalog: catalog.iter().map(|m| m.to_string()).collect(),
            });
        }
        self
    }

    /// Number of times `initialize` has been called.
    pub fn init_calls(&self) -> u32 {
        self.state.lock().expect("sim state poisoned").init_calls
    }

    /// Total contexts opened so far.
    pub fn contexts_opened(&self) -> usize {
        self.state.lock().expect("sim state poisoned").contexts_opened
    }

    /// Total contexts released so far.
    pub fn contexts_released(&self) -> usize {
        self.state
            .lock()
            .expect("sim state poisoned")
            .contexts_released
    }

    /// Builds a filled counter data image from a prefix and recorded
    /// ranges, standing in for the external collection step.
    pub fn synthesize_image(
        &self,
        prefix: &[u8],
        ranges: &[SimRange],
    ) -> Result<Vec<u8>, BackendError> {
        let mut cur = Cursor::new(prefix);
        cur.expect_magic(PREFIX_MAGIC, "counter data prefix")?;
        let chip = cur.read_str()?;

        let mut out = Vec::with_capacity(prefix.len() + 64 * ranges.len());
        out.extend_from_slice(IMAGE_MAGIC);
        write_str(&mut out, &chip);
        write_u32(&mut out, ranges.len() as u32);
        for range in ranges {
            write_u32(&mut out, range.descriptions.len() as u32);
            for description in &range.descriptions {
                write_str(&mut out, description);
            }
            write_u32(&mut out, range.counters.len() as u32);
            for (name, instances) in &range.counters {
                write_str(&mut out, name);
                write_u32(&mut out, instances.len() as u32);
                for value in instances {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        Ok(out)
    }

    fn chip(&self, name: &str) -> Result<SimChip, BackendError> {
        let state = self.state.lock().expect("sim state poisoned");
        state
            .chips
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| BackendError::new(format!("unknown chip {name:?}")))
    }

    fn track_open(&self) {
        self.state.lock().expect("sim state poisoned").contexts_opened += 1;
    }
}

impl CounterBackend for SimBackend {
    fn initialize(&self) -> Result<(), BackendError> {
        // Idempotent: every call after the first is a no-op. The call count
        // is kept only so tests can observe idempotence.
        self.state.lock().expect("sim state poisoned").init_calls += 1;
        Ok(())
    }

    fn supported_chips(&self) -> Result<Vec<String>, BackendError> {
        let state = self.state.lock().expect("sim state poisoned");
        Ok(state.chips.iter().map(|c| c.name.clone()).collect())
    }

    fn open_config_context(&self, chip: &str) -> Result<Box<dyn ConfigContext>, BackendError> {
        let chip = self.chip(chip)?;
        self.track_open();
        Ok(Box::new(SimConfigContext {
            state: Arc::clone(&self.state),
            chip: chip.name,
            catalog: chip.catalog,
            requests: Vec::new(),
            in_pass_group: false,
            image: None,
        }))
    }

    fn open_data_builder(&self, chip: &str) -> Result<Box<dyn DataBuilderContext>, BackendError> {
        let chip = self.chip(chip)?;
        self.track_open();
        Ok(Box::new(SimDataBuilder {
            state: Arc::clone(&self.state),
            chip: chip.name,
            requests: Vec::new(),
        }))
    }

    fn evaluator_scratch_size(&self, chip: &str) -> Result<usize, BackendError> {
        let chip = self.chip(chip)?;
        Ok(64 + 16 * chip.catalog.len())
    }

    fn open_evaluator(
        &self,
        chip: &str,
        image: &[u8],
        scratch: Vec<u8>,
    ) -> Result<Box<dyn EvaluatorContext>, BackendError> {
        let chip = self.chip(chip)?;
        let required = 64 + 16 * chip.catalog.len();
        if scratch.len() < required {
            return Err(BackendError::new(format!(
                "scratch buffer too small: {} < {required}",
                scratch.len(),
            )));
        }

        let decoded = decode_image(image)?;
        if decoded.chip != chip.name {
            return Err(BackendError::new(format!(
                "counter data image was collected on chip {:?}, not {:?}",
                decoded.chip, chip.name,
            )));
        }

        self.track_open();
        Ok(Box::new(SimEvaluator {
            state: Arc::clone(&self.state),
            catalog: chip.catalog,
            ranges: decoded.ranges,
            _scratch: scratch,
        }))
    }

    fn num_ranges(&self, image: &[u8]) -> Result<usize, BackendError> {
        Ok(decode_image(image)?.ranges.len())
    }

    fn range_descriptions(
        &self,
        image: &[u8],
        range_index: usize,
    ) -> Result<Vec<String>, BackendError> {
        let decoded = decode_image(image)?;
        decoded
            .ranges
            .get(range_index)
            .map(|r| r.descriptions.clone())
            .ok_or_else(|| {
                BackendError::new(format!(
                    "range index {range_index} out of bounds ({} ranges)",
                    decoded.ranges.len(),
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

struct SimConfigContext {
    state: Arc<Mutex<SimState>>,
    chip: String,
    catalog: Vec<String>,
    requests: Vec<RawMetricRequest>,
    in_pass_group: bool,
    image: Option<Vec<u8>>,
}

impl ConfigContext for SimConfigContext {
    fn num_metrics(&self) -> Result<usize, BackendError> {
        Ok(self.catalog.len())
    }

    fn metric_name(&self, index: usize) -> Result<String, BackendError> {
        self.catalog
            .get(index)
            .cloned()
            .ok_or_else(|| BackendError::new(format!("metric index {index} out of bounds")))
    }

    fn begin_pass_group(&mut self) -> Result<(), BackendError> {
        if self.in_pass_group {
            return Err(BackendError::new("pass group already open"));
        }
        self.in_pass_group = true;
        Ok(())
    }

    fn add_metrics(&mut self, requests: &[RawMetricRequest]) -> Result<(), BackendError> {
        if !self.in_pass_group {
            return Err(BackendError::new("add_metrics outside a pass group"));
        }
        self.requests.extend_from_slice(requests);
        Ok(())
    }

    fn end_pass_group(&mut self) -> Result<(), BackendError> {
        if !self.in_pass_group {
            return Err(BackendError::new("no pass group open"));
        }
        self.in_pass_group = false;
        Ok(())
    }

    fn generate(&mut self) -> Result<(), BackendError> {
        if self.in_pass_group {
            return Err(BackendError::new("generate with a pass group still open"));
        }
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(CONFIG_MAGIC);
        write_str(&mut out, &self.chip);
        write_requests(&mut out, &self.requests);
        self.image = Some(out);
        Ok(())
    }

    fn config_image(&mut self, buf: Option<&mut [u8]>) -> Result<usize, BackendError> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| BackendError::new("config image not generated"))?;
        fill(image, buf)
    }
}

impl Drop for SimConfigContext {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.contexts_released += 1;
        }
    }
}

struct SimDataBuilder {
    state: Arc<Mutex<SimState>>,
    chip: String,
    requests: Vec<RawMetricRequest>,
}

impl DataBuilderContext for SimDataBuilder {
    fn add_metrics(&mut self, requests: &[RawMetricRequest]) -> Result<(), BackendError> {
        self.requests.extend_from_slice(requests);
        Ok(())
    }

    fn counter_data_prefix(&mut self, buf: Option<&mut [u8]>) -> Result<usize, BackendError> {
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(PREFIX_MAGIC);
        write_str(&mut out, &self.chip);
        write_requests(&mut out, &self.requests);
        fill(&out, buf)
    }
}

impl Drop for SimDataBuilder {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.contexts_released += 1;
        }
    }
}

struct SimEvaluator {
    state: Arc<Mutex<SimState>>,
    catalog: Vec<String>,
    ranges: Vec<DecodedRange>,
    _scratch: Vec<u8>,
}

impl EvaluatorContext for SimEvaluator {
    fn metric_type_and_index(&self, name: &str) -> Result<(MetricType, usize), BackendError> {
        let index = self
            .catalog
            .iter()
            .position(|m| m == name)
            .ok_or_else(|| BackendError::new(format!("evaluator has no metric {name:?}")))?;

        let metric_type = if name.contains("_pct_") || name.ends_with("_pct") {
            MetricType::Ratio
        } else if name.contains("throughput") {
            MetricType::Throughput
        } else {
            MetricType::Counter
        };
        Ok((metric_type, index))
    }

    fn evaluate_range(
        &mut self,
        range_index: usize,
        requests: &[EvalRequest],
        _isolated: bool,
        values: &mut [f64],
    ) -> Result<(), BackendError> {
        if values.len() != requests.len() {
            return Err(BackendError::new("values length != requests length"));
        }
        let range = self.ranges.get(range_index).ok_or_else(|| {
            BackendError::new(format!("range index {range_index} out of bounds"))
        })?;

        for (slot, request) in values.iter_mut().zip(requests) {
            let name = self.catalog.get(request.metric_index).ok_or_else(|| {
                BackendError::new(format!("metric index {} out of bounds", request.metric_index))
            })?;
            // Counters not present in the image were not collected; they
            // read as zero, like an untouched image region.
            let instances = range
                .counters
                .get(name.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            *slot = rollup(request.rollup, instances);
        }
        Ok(())
    }
}

impl Drop for SimEvaluator {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.contexts_released += 1;
        }
    }
}

fn rollup(op: RollupOp, instances: &[f64]) -> f64 {
    match op {
        RollupOp::Sum => instances.iter().sum(),
        RollupOp::Avg => {
            if instances.is_empty() {
                0.0
            } else {
                instances.iter().sum::<f64>() / instances.len() as f64
            }
        }
        RollupOp::Min => instances.iter().copied().fold(f64::INFINITY, f64::min),
        RollupOp::Max => instances.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

// ---------------------------------------------------------------------------
// Blob encoding (little-endian, length-prefixed fields)
// ---------------------------------------------------------------------------

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn write_requests(out: &mut Vec<u8>, requests: &[RawMetricRequest]) {
    write_u32(out, requests.len() as u32);
    for request in requests {
        write_str(out, &request.name);
        out.push(u8::from(request.isolated));
        out.push(u8::from(request.keep_instances));
    }
}

/// Two-phase fill: `None` reports the length, `Some` copies into a buffer
/// that must be at least that long.
fn fill(data: &[u8], buf: Option<&mut [u8]>) -> Result<usize, BackendError> {
    match buf {
        None => Ok(data.len()),
        Some(buf) => {
            if buf.len() < data.len() {
                return Err(BackendError::new(format!(
                    "destination buffer too small: {} < {}",
                    buf.len(),
                    data.len(),
                )));
            }
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }
}

#[derive(Debug)]
struct DecodedRange {
    descriptions: Vec<String>,
    counters: HashMap<String, Vec<f64>>,
}

#[derive(Debug)]
struct DecodedImage {
    chip: String,
    ranges: Vec<DecodedRange>,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BackendError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| BackendError::new("blob truncated"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn expect_magic(&mut self, magic: &[u8; 4], what: &str) -> Result<(), BackendError> {
        if self.take(4)? != magic {
            return Err(BackendError::new(format!("not a {what} blob")));
        }
        Ok(())
    }

    fn read_u32(&mut self) -> Result<u32, BackendError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f64(&mut self) -> Result<f64, BackendError> {
        let bytes = self.take(8)?;
        let mut fixed = [0u8; 8];
        fixed.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(fixed))
    }

    fn read_str(&mut self) -> Result<String, BackendError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| BackendError::new("invalid utf-8 in blob"))
    }
}

fn decode_image(image: &[u8]) -> Result<DecodedImage, BackendError> {
    let mut cur = Cursor::new(image);
    cur.expect_magic(IMAGE_MAGIC, "counter data image")?;
    let chip = cur.read_str()?;

    let num_ranges = cur.read_u32()? as usize;
    let mut ranges = Vec::with_capacity(num_ranges);
    for _ in 0..num_ranges {
        let num_descriptions = cur.read_u32()? as usize;
        let mut descriptions = Vec::with_capacity(num_descriptions);
        for _ in 0..num_descriptions {
            descriptions.push(cur.read_str()?);
        }

        let num_counters = cur.read_u32()? as usize;
        let mut counters = HashMap::with_capacity(num_counters);
        for _ in 0..num_counters {
            let name = cur.read_str()?;
            let num_instances = cur.read_u32()? as usize;
            let mut instances = Vec::with_capacity(num_instances);
            for _ in 0..num_instances {
                instances.push(cur.read_f64()?);
            }
            counters.insert(name, instances);
        }

        ranges.push(DecodedRange {
            descriptions,
            counters,
        });
    }

    Ok(DecodedImage { chip, ranges })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SimBackend {
        SimBackend::new().with_chip(
            "sim100",
            &[
                "sm__cycles_active.sum",
                "sm__warps_launched.sum",
                "dram__bytes_read.sum",
            ],
        )
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let backend = backend();
        backend.initialize().expect("init");
        backend.initialize().expect("init again");
        assert_eq!(backend.init_calls(), 2);
        assert!(backend.supported_chips().expect("chips").contains(&"sim100".to_string()));
    }

    #[test]
    fn test_config_context_enforces_protocol() {
        let backend = backend();
        let mut ctx = backend.open_config_context("sim100").expect("open");

        let request = RawMetricRequest {
            name: "sm__cycles_active.sum".to_string(),
            isolated: true,
            keep_instances: true,
        };

        // add_metrics requires an open pass group.
        assert!(ctx.add_metrics(std::slice::from_ref(&request)).is_err());

        ctx.begin_pass_group().expect("begin");
        ctx.add_metrics(std::slice::from_ref(&request)).expect("add");

        // generate requires the pass group to be closed.
        assert!(ctx.generate().is_err());
        ctx.end_pass_group().expect("end");
        ctx.generate().expect("generate");

        let size = ctx.config_image(None).expect("size");
        let mut buf = vec![0u8; size];
        let written = ctx.config_image(Some(&mut buf)).expect("fill");
        assert_eq!(written, size);
        assert_eq!(&buf[..4], CONFIG_MAGIC);
    }

    #[test]
    fn test_config_image_before_generate_fails() {
        let backend = backend();
        let mut ctx = backend.open_config_context("sim100").expect("open");
        assert!(ctx.config_image(None).is_err());
    }

    #[test]
    fn test_two_phase_fill_rejects_short_buffer() {
        let data = [1u8, 2, 3, 4];
        let mut short = [0u8; 2];
        assert!(fill(&data, Some(&mut short)).is_err());
        assert_eq!(fill(&data, None).expect("size"), 4);
    }

    #[test]
    fn test_unknown_chip_is_a_backend_error() {
        let backend = backend();
        assert!(backend.open_config_context("no_such_chip").is_err());
        assert!(backend.open_data_builder("no_such_chip").is_err());
        assert!(backend.evaluator_scratch_size("no_such_chip").is_err());
    }

    #[test]
    fn test_synthesized_image_decodes() {
        let backend = backend();
        let mut builder = backend.open_data_builder("sim100").expect("open");
        let size = builder.counter_data_prefix(None).expect("size");
        let mut prefix = vec![0u8; size];
        builder.counter_data_prefix(Some(&mut prefix)).expect("fill");

        let ranges = vec![
            SimRange::new(&["kernelA"]).counter("sm__cycles_active.sum", &[1.0, 2.0]),
            SimRange::new(&["kernelA", "pass0"]).counter("sm__cycles_active.sum", &[3.0]),
        ];
        let image = backend.synthesize_image(&prefix, &ranges).expect("image");

        assert_eq!(backend.num_ranges(&image).expect("ranges"), 2);
        assert_eq!(
            backend.range_descriptions(&image, 1).expect("descriptions"),
            vec!["kernelA".to_string(), "pass0".to_string()],
        );
        assert!(backend.range_descriptions(&image, 2).is_err());
    }

    #[test]
    fn test_evaluator_rejects_wrong_chip_image() {
        let backend = backend().with_chip("sim200", &["sm__cycles_active.sum"]);

        let mut builder = backend.open_data_builder("sim100").expect("open");
        let size = builder.counter_data_prefix(None).expect("size");
        let mut prefix = vec![0u8; size];
        builder.counter_data_prefix(Some(&mut prefix)).expect("fill");
        let image = backend
            .synthesize_image(&prefix, &[SimRange::new(&["r0"])])
            .expect("image");

        let scratch = vec![0u8; backend.evaluator_scratch_size("sim200").expect("size")];
        assert!(backend.open_evaluator("sim200", &image, scratch).is_err());
    }

    #[test]
    fn test_rollup_ops() {
        let instances = [1.0, 2.0, 3.0];
        assert_eq!(rollup(RollupOp::Sum, &instances), 6.0);
        assert_eq!(rollup(RollupOp::Avg, &instances), 2.0);
        assert_eq!(rollup(RollupOp::Min, &instances), 1.0);
        assert_eq!(rollup(RollupOp::Max, &instances), 3.0);
        assert_eq!(rollup(RollupOp::Sum, &[]), 0.0);
        assert_eq!(rollup(RollupOp::Avg, &[]), 0.0);
    }

    #[test]
    fn test_contexts_balance_on_drop() {
        let backend = backend();
        {
            let _ctx = backend.open_config_context("sim100").expect("open");
            let _builder = backend.open_data_builder("sim100").expect("open");
        }
        assert_eq!(backend.contexts_opened(), 2);
        assert_eq!(backend.contexts_released(), 2);
    }
}

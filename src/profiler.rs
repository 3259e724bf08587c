use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::backend::CounterBackend;
use crate::catalog;
use crate::config::Options;
use crate::error::{BackendCall, Result};
use crate::eval::{self, MetricResult};
use crate::image;
use crate::metric::resolve::{resolve_requests, CatalogIndex};

/// A profiling session over one counter backend.
///
/// Construction runs the backend's one-time idempotent initialization;
/// every subsequent operation is a sequence of blocking backend calls
/// whose contexts live only for that call. The session holds no mutable
/// state across calls beyond the per-chip catalog cache.
pub struct Profiler<B> {
    backend: B,
    options: Options,
    catalogs: Mutex<HashMap<String, Arc<CatalogIndex>>>,
}

impl<B: CounterBackend> Profiler<B> {
    /// Creates a session, initializing the backend.
    pub fn new(backend: B, options: Options) -> Result<Self> {
        backend.initialize().during("initialize")?;

        Ok(Self {
            backend,
            options,
            catalogs: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a session with default options.
    pub fn with_defaults(backend: B) -> Result<Self> {
        Self::new(backend, Options::default())
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Generates the collection configuration image for `metric_names` on
    /// `chip`. Deterministic for the same chip and ordered name list.
    pub fn config_image(&self, chip: &str, metric_names: &[&str]) -> Result<Vec<u8>> {
        let index = self.catalog(chip)?;
        let requests =
            resolve_requests(chip, &index, metric_names, self.options.strict_resolution)?;

        let mut ctx = self
            .backend
            .open_config_context(chip)
            .during("open_config_context")?;
        image::build_config_image(ctx.as_mut(), &requests)
    }

    /// Generates the counter data prefix (storage schema) for the same
    /// resolved request set as [`config_image`](Self::config_image); the
    /// external collector uses it to allocate the counter data image.
    pub fn counter_data_prefix(&self, chip: &str, metric_names: &[&str]) -> Result<Vec<u8>> {
        let index = self.catalog(chip)?;
        let requests =
            resolve_requests(chip, &index, metric_names, self.options.strict_resolution)?;

        let mut builder = self
            .backend
            .open_data_builder(chip)
            .during("open_data_builder")?;
        image::build_counter_data_prefix(builder.as_mut(), &requests)
    }

    /// Evaluates `metric_names` against a filled counter data image,
    /// producing one result per metric with one value per range in
    /// collection order.
    pub fn evaluate(
        &self,
        chip: &str,
        image: &[u8],
        metric_names: &[&str],
    ) -> Result<Vec<MetricResult>> {
        eval::evaluate(&self.backend, chip, image, metric_names)
    }

    /// Lists supported chip identifiers.
    pub fn supported_chips(&self) -> Result<Vec<String>> {
        self.backend.supported_chips().during("supported_chips")
    }

    /// Lists a chip's raw metric names in catalog order, optionally hiding
    /// submetric variants from the listing.
    pub fn raw_metric_names(&self, chip: &str, include_submetrics: bool) -> Result<Vec<String>> {
        let index = self.catalog(chip)?;
        Ok(catalog::raw_metric_names(&index, include_submetrics))
    }

    fn catalog(&self, chip: &str) -> Result<Arc<CatalogIndex>> {
        if !self.options.catalog_cache {
            return Ok(Arc::new(self.build_catalog(chip)?));
        }

        let mut cache = self.catalogs.lock().expect("catalog cache poisoned");
        if let Some(index) = cache.get(chip) {
            return Ok(Arc::clone(index));
        }

        let index = Arc::new(self.build_catalog(chip)?);
        cache.insert(chip.to_string(), Arc::clone(&index));
        Ok(index)
    }

    fn build_catalog(&self, chip: &str) -> Result<CatalogIndex> {
        let ctx = self
            .backend
            .open_config_context(chip)
            .during("open_config_context")?;
        let index = CatalogIndex::from_context(ctx.as_ref())?;

        debug!(chip, metrics = index.len(), "built catalog index");
        Ok(index)
    }
}

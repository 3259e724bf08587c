//! Host-side configuration and evaluation of hardware performance counter
//! collection.
//!
//! The pipeline has two phases around an external collection step. Before
//! collection, human-readable metric names are parsed, resolved against
//! the chip's raw-metric catalog, and turned into two mutually compatible
//! opaque blobs: the collection configuration image and the counter data
//! prefix (the storage schema the collector uses to allocate the counter
//! data image). After collection, the filled image is evaluated per range
//! into scalar metric values.
//!
//! All hardware interaction goes through the [`backend::CounterBackend`]
//! port; [`backend::sim::SimBackend`] is a deterministic in-memory
//! implementation for SDK-less environments and tests.
//!
//! ```
//! use perfhost::backend::sim::{SimBackend, SimRange};
//! use perfhost::Profiler;
//!
//! let backend = SimBackend::new().with_chip("sim100", &["sm__cycles_active.sum"]);
//! let profiler = Profiler::with_defaults(backend).expect("init");
//!
//! let metrics = ["sm__cycles_active.sum"];
//! let _config = profiler.config_image("sim100", &metrics).expect("config");
//! let prefix = profiler.counter_data_prefix("sim100", &metrics).expect("prefix");
//!
//! // Collection happens externally; the sim backend stands in for it.
//! let ranges = [SimRange::new(&["kernelA"]).counter("sm__cycles_active.sum", &[40.0, 2.0])];
//! let image = profiler.backend().synthesize_image(&prefix, &ranges).expect("collect");
//!
//! let results = profiler.evaluate("sim100", &image, &metrics).expect("evaluate");
//! assert_eq!(results[0].ranges[0].value, 42.0);
//! ```

pub mod backend;
mod catalog;
pub mod config;
pub mod error;
pub mod eval;
mod image;
pub mod metric;
mod profiler;

pub use config::Options;
pub use error::{BackendError, Error, Result};
pub use eval::{MetricResult, RangeValue};
pub use profiler::Profiler;

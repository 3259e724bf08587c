//! Configuration image and counter data prefix generation.
//!
//! Both artifacts are produced from the same ordered resolved request set;
//! they are mutually compatible only when chip and request order match.
//! Serialization follows the backend's two-phase size-then-fill contract:
//! query the byte length with no destination, allocate exactly that, then
//! query again into the buffer.

use crate::backend::{ConfigContext, DataBuilderContext, RawMetricRequest};
use crate::error::{BackendCall, BackendError, Result};

/// Runs the two-phase serialization against a backend call.
pub(crate) fn fill_two_phase<F>(call: &'static str, mut serialize: F) -> Result<Vec<u8>>
where
    F: FnMut(Option<&mut [u8]>) -> std::result::Result<usize, BackendError>,
{
    let size = serialize(None).during(call)?;
    let mut buf = vec![0u8; size];
    serialize(Some(&mut buf)).during(call)?;
    Ok(buf)
}

/// Drives an open config context through pass-group scheduling and
/// serializes the collection configuration image.
pub(crate) fn build_config_image(
    ctx: &mut dyn ConfigContext,
    requests: &[RawMetricRequest],
) -> Result<Vec<u8>> {
    ctx.begin_pass_group().during("begin_pass_group")?;
    if !requests.is_empty() {
        ctx.add_metrics(requests).during("add_metrics")?;
    }
    ctx.end_pass_group().during("end_pass_group")?;
    ctx.generate().during("generate_config_image")?;

    fill_two_phase("config_image", |buf| ctx.config_image(buf))
}

/// Feeds the resolved requests to a counter-data builder and serializes
/// the storage-schema prefix the collector uses to allocate the image.
pub(crate) fn build_counter_data_prefix(
    builder: &mut dyn DataBuilderContext,
    requests: &[RawMetricRequest],
) -> Result<Vec<u8>> {
    if !requests.is_empty() {
        builder.add_metrics(requests).during("add_metrics")?;
    }

    fill_two_phase("counter_data_prefix", |buf| builder.counter_data_prefix(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::SimBackend;
    use crate::backend::CounterBackend;
    use crate::error::Error;

    fn backend() -> SimBackend {
        SimBackend::new().with_chip("sim100", &["sm__cycles_active.sum"])
    }

    fn request() -> RawMetricRequest {
        RawMetricRequest {
            name: "sm__cycles_active.sum".to_string(),
            isolated: true,
            keep_instances: true,
        }
    }

    #[test]
    fn test_config_image_deterministic_across_contexts() {
        let backend = backend();
        let requests = vec![request()];

        let mut first = backend.open_config_context("sim100").expect("open");
        let image_a = build_config_image(first.as_mut(), &requests).expect("build");
        drop(first);

        let mut second = backend.open_config_context("sim100").expect("open");
        let image_b = build_config_image(second.as_mut(), &requests).expect("build");

        assert_eq!(image_a.len(), image_b.len());
        assert_eq!(image_a, image_b);
    }

    #[test]
    fn test_empty_request_set_still_produces_an_image() {
        let backend = backend();
        let mut ctx = backend.open_config_context("sim100").expect("open");
        let image = build_config_image(ctx.as_mut(), &[]).expect("build");
        assert!(!image.is_empty());
    }

    #[test]
    fn test_failure_is_tagged_with_the_call() {
        let backend = backend();
        let mut ctx = backend.open_config_context("sim100").expect("open");
        // Force a protocol violation so add_metrics fails inside the backend.
        ctx.begin_pass_group().expect("begin");

        let err = build_config_image(ctx.as_mut(), &[request()]).unwrap_err();
        match err {
            Error::Backend { call, .. } => assert_eq!(call, "begin_pass_group"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_prefix_differs_from_config_image() {
        let backend = backend();
        let requests = vec![request()];

        let mut ctx = backend.open_config_context("sim100").expect("open");
        let image = build_config_image(ctx.as_mut(), &requests).expect("image");

        let mut builder = backend.open_data_builder("sim100").expect("open");
        let prefix = build_counter_data_prefix(builder.as_mut(), &requests).expect("prefix");

        assert_ne!(image, prefix);
    }
}

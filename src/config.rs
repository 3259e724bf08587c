use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Behavior options for a [`Profiler`](crate::Profiler) session.
#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    /// Fail with [`Error::UnresolvedMetric`](crate::Error::UnresolvedMetric)
    /// when a requested metric name has no catalog entry, instead of the
    /// historical behavior of dropping the name. Default: false.
    #[serde(default)]
    pub strict_resolution: bool,

    /// Cache the per-chip catalog index across calls. Disabling forces a
    /// fresh catalog scan on every operation. Default: true.
    #[serde(default = "default_true")]
    pub catalog_cache: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            strict_resolution: false,
            catalog_cache: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Options {
    /// Load options from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading options file {}", path.display()))?;

        let options: Options = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing options file {}", path.display()))?;

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert!(!options.strict_resolution);
        assert!(options.catalog_cache);
    }

    #[test]
    fn test_empty_yaml_yields_defaults() {
        let options: Options = serde_yaml::from_str("{}").expect("parse");
        assert!(!options.strict_resolution);
        assert!(options.catalog_cache);
    }

    #[test]
    fn test_yaml_overrides() {
        let options: Options =
            serde_yaml::from_str("strict_resolution: true\ncatalog_cache: false\n").expect("parse");
        assert!(options.strict_resolution);
        assert!(!options.catalog_cache);
    }
}

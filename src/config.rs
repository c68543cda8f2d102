//! Runtime configuration types.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Output format for the GC statistics report printed at exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatsFormat {
    #[default]
    Human,
    Json,
}

/// Garbage collector tuning.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GcConfig {
    /// Whether GC is enabled (default: true)
    pub enabled: bool,
    /// Collect before every allocation.
    pub stress: bool,
    /// After a cycle the next threshold is `live_bytes * growth_factor`.
    pub growth_factor: f64,
    /// Lower bound for the collection threshold, in bytes.
    pub initial_threshold: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stress: false,
            growth_factor: 2.0,
            initial_threshold: 1024 * 1024,
        }
    }
}

/// Runtime configuration for the VM
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub gc: GcConfig,
    /// Print the disassembly of every compiled chunk before running it.
    pub dump_bytecode: bool,
    pub gc_stats: Option<StatsFormat>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl RuntimeConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.gc.enabled);
        assert!(!config.gc.stress);
        assert_eq!(config.gc.growth_factor, 2.0);
        assert_eq!(config.gc.initial_threshold, 1024 * 1024);
        assert_eq!(config.gc_stats, None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RuntimeConfig::from_toml(
            r#"
            gc_stats = "json"

            [gc]
            stress = true
            "#,
        )
        .unwrap();
        assert!(config.gc.stress);
        assert!(config.gc.enabled);
        assert_eq!(config.gc.growth_factor, 2.0);
        assert_eq!(config.gc_stats, Some(StatsFormat::Json));
        assert!(!config.dump_bytecode);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(RuntimeConfig::from_toml("[gc]\nturbo = true\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dump_bytecode = true").unwrap();
        writeln!(file, "[gc]").unwrap();
        writeln!(file, "initial_threshold = 4096").unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();
        assert!(config.dump_bytecode);
        assert_eq!(config.gc.initial_threshold, 4096);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/loxide.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/loxide.toml"));
    }
}

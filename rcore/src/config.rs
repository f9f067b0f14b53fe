//! Interpreter configuration, read from `rcore.toml`

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File looked up in the working directory when no path is given
pub const CONFIG_FILE: &str = "rcore.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub lookup: LookupConfig,
    pub calls: CallConfig,
    pub repl: ReplConfig,
}

/// `[lookup]`: variable resolver cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LookupConfig {
    pub cache: bool,
    /// Invalidations after which a site stays on the slow path
    pub max_invalidations: usize,
    /// Sites remembered before the oldest half is dropped
    pub max_sites: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        LookupConfig {
            cache: true,
            max_invalidations: 8,
            max_sites: 4096,
        }
    }
}

/// `[calls]`: call dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallConfig {
    /// Match plans remembered per call site; 0 disables the cache
    pub site_cache_size: usize,
    /// Nested calls allowed before "evaluation nested too deeply"
    pub max_depth: usize,
    /// Call sites remembered before the oldest half is dropped
    pub max_sites: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        CallConfig {
            site_cache_size: 4,
            max_depth: 5000,
            max_sites: 4096,
        }
    }
}

/// `[repl]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplConfig {
    pub prompt: String,
    pub history: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        ReplConfig {
            prompt: "> ".to_string(),
            history: true,
        }
    }
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|err| Error::config_error(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|err| Error::io_error(format!("failed to read {}: {}", path.display(), err)))?;
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        toml::from_str(&content).map_err(|err| {
            Error::config_error(format!("failed to parse {}: {}", path.display(), err))
        })
    }

    /// `explicit` if given, else `rcore.toml` in the working directory if present,
    /// else the defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(CONFIG_FILE);
                if path.exists() {
                    tracing::debug!(path = %path.display(), "loading configuration");
                    Self::load(path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.lookup.cache);
        assert_eq!(config.lookup.max_invalidations, 8);
        assert_eq!(config.calls.site_cache_size, 4);
        assert_eq!(config.lookup.max_sites, 4096);
        assert_eq!(config.calls.max_sites, 4096);
        assert_eq!(config.repl.prompt, "> ");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml("[lookup]\ncache = false\n").unwrap();
        assert!(!config.lookup.cache);
        assert_eq!(config.lookup.max_invalidations, 8);
        assert_eq!(config.calls, CallConfig::default());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Config::from_toml("[calls]\nsite_cache = 3\n").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("rcore-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, "[repl]\nprompt = \"R> \"\nhistory = false\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.repl.prompt, "R> ");
        assert!(!config.repl.history);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load(Path::new("/nonexistent/rcore.toml")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}

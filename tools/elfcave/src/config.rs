//! `elfcave.toml` loading.
//!
//! ```toml
//! [inject]
//! policy = "largest"
//! backup = true
//! ```
//!
//! Every key is optional. Command-line flags take precedence.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use elfcave_inject::CavePolicy;
use serde::Deserialize;

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "elfcave.toml";

/// Cave selection policy as spelled in configuration and on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// First cave in segment order.
    #[default]
    First,
    /// Cave with the most verified bytes.
    Largest,
}

impl From<Policy> for CavePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::First => Self::First,
            Policy::Largest => Self::Largest,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// `[inject]` table.
    pub inject: InjectConfig,
}

/// Defaults for the `inject` subcommand.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InjectConfig {
    /// Cave selection policy.
    pub policy: Policy,
    /// Write `<FILE>.bak` before patching.
    pub backup: bool,
}

impl Config {
    /// Load `path`, or [`DEFAULT_CONFIG`] from the working directory.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Read and parse one configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error naming `path` if it cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Parse configuration text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed text, unknown keys or an unknown
    /// policy name.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn reads_inject_table() {
        let config = Config::parse("[inject]\npolicy = \"largest\"\nbackup = true\n").unwrap();
        assert_eq!(config.inject.policy, Policy::Largest);
        assert!(config.inject.backup);
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let config = Config::parse("[inject]\nbackup = true\n").unwrap();
        assert_eq!(config.inject.policy, Policy::First);
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(Config::parse("[inject]\npolicy = \"random\"\n").is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Config::parse("[inject]\nbakup = true\n").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elfcave.toml");
        std::fs::write(&path, "[inject]\npolicy = \"largest\"\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().inject.policy, Policy::Largest);
    }

    #[test]
    fn policy_maps_to_cave_policy() {
        assert_eq!(CavePolicy::from(Policy::First), CavePolicy::First);
        assert_eq!(CavePolicy::from(Policy::Largest), CavePolicy::Largest);
    }
}

// src/config.rs

//! Run configuration
//!
//! Everything tunable lives here: destination roots come from the caller,
//! but rules, the external archiver registry, and the tuning knobs load
//! from a TOML file. Every field has a default, and the defaults behave
//! correctly with no config file at all - in particular an empty rule set
//! just defers every decision to content comparison.

use crate::error::{Error, Result};
use crate::rules::{RuleEntry, RuleSet};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// One registered external archiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiverEntry {
    /// Display name in logs and outcomes
    pub name: String,
    /// Program to resolve on PATH
    pub program: String,
    /// Argument template; `{root}`, `{output}`, `{manifest}`, `{format}`,
    /// `{threads}` and `{level}` are substituted per task
    #[serde(default)]
    pub args: Vec<String>,
    /// Container formats this tool can produce
    #[serde(default)]
    pub formats: Vec<String>,
}

/// Tunable knobs and registries for a packaging run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Worker count; defaults to available CPU parallelism when unset
    pub threads: Option<usize>,

    /// Ceiling on directory nesting below the candidate root
    pub max_depth: usize,

    /// Budget for the one-shot lock-wait retry on copy failure, in
    /// milliseconds; unset disables the probe entirely
    pub lock_wait_ms: Option<u64>,

    /// Compression level hint passed to archive strategies
    pub compression_level: i32,

    /// Per-attempt timeout for external archivers, in seconds
    pub archiver_timeout_secs: u64,

    /// Ordered path rules; first match wins
    #[serde(rename = "rule")]
    pub rules: Vec<RuleEntry>,

    /// External archiver registry, in rank order
    #[serde(rename = "archiver")]
    pub archivers: Vec<ArchiverEntry>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            threads: None,
            max_depth: crate::walk::DEFAULT_MAX_DEPTH,
            lock_wait_ms: None,
            compression_level: 3,
            archiver_timeout_secs: 600,
            rules: Vec::new(),
            archivers: Vec::new(),
        }
    }
}

impl PackConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))?;
        debug!(
            "Loaded config from {}: {} rules, {} archivers",
            path.display(),
            config.rules.len(),
            config.archivers.len()
        );
        Ok(config)
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Compile the configured rule set, failing early on bad patterns
    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::compile(&self.rules)
    }

    /// Lock-wait budget as a duration, when configured
    pub fn lock_wait(&self) -> Option<Duration> {
        self.lock_wait_ms.map(Duration::from_millis)
    }

    /// External archiver attempt timeout
    pub fn archiver_timeout(&self) -> Duration {
        Duration::from_secs(self.archiver_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleAction;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_usable() {
        let config = PackConfig::default();
        assert_eq!(config.max_depth, 20);
        assert!(config.rules.is_empty());
        assert!(config.rule_set().unwrap().is_empty());
        assert!(config.lock_wait().is_none());
    }

    #[test]
    fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("baler.toml");
        fs::write(
            &path,
            r#"
threads = 4
max_depth = 12
lock_wait_ms = 1500
compression_level = 9

[[rule]]
pattern = "interface/*"
force = "loose"

[[rule]]
pattern = "meshes/*"
force = "pack"

[[archiver]]
name = "bsarch"
program = "bsarch"
args = ["pack", "{root}", "{output}"]
formats = ["bsa", "ba2"]
"#,
        )
        .unwrap();

        let config = PackConfig::load(&path).unwrap();
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.max_depth, 12);
        assert_eq!(config.lock_wait(), Some(Duration::from_millis(1500)));
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].force, RuleAction::Loose);
        assert_eq!(config.archivers.len(), 1);
        assert_eq!(config.archivers[0].formats, vec!["bsa", "ba2"]);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("baler.toml");
        fs::write(&path, "threads = 2\n").unwrap();

        let config = PackConfig::load(&path).unwrap();
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.max_depth, 20);
        assert_eq!(config.compression_level, 3);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "threads = \"many\"\n").unwrap();

        let err = PackConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = PackConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bad_rule_pattern_fails_at_compile() {
        let mut config = PackConfig::default();
        config.rules.push(RuleEntry {
            pattern: "[broken".to_string(),
            force: RuleAction::Pack,
        });
        assert!(config.rule_set().is_err());
    }
}

//! Configuration file schema for logsieve.
//!
//! A config file tunes the line gates and accumulator ceilings, disables
//! parsers by id, and sets the severity that fails a scan.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::parser::accumulator::{DEFAULT_MAX_CONTEXT_BYTES, DEFAULT_MAX_CONTEXT_LINES};
use crate::parser::{builtin_parser_ids, AccumulatorLimits, ParserRegistry};
use crate::preprocess::{LineLimits, DEFAULT_MAX_LINE_LENGTH, DEFAULT_MIN_LINE_LENGTH};
use crate::record::Severity;

/// File names looked up in the working directory, in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["logsieve.yaml", ".logsieve.yaml"];

static USER_CONFIG_DIR: Lazy<Option<PathBuf>> = Lazy::new(|| {
    directories::ProjectDirs::from("", "", "logsieve").map(|d| d.config_dir().to_path_buf())
});

/// Errors raised while loading or validating a config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("unknown parser '{0}' (see `logsieve parsers`)")]
    UnknownParser(String),
}

/// Severity threshold at which a scan reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailOn {
    #[default]
    Error,
    Warning,
    Never,
}

impl FailOn {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailOn::Error => "error",
            FailOn::Warning => "warning",
            FailOn::Never => "never",
        }
    }

    /// Whether a record of this severity fails the scan.
    pub fn trips(&self, severity: Severity) -> bool {
        match self {
            FailOn::Error => severity == Severity::Error,
            FailOn::Warning => true,
            FailOn::Never => false,
        }
    }
}

impl std::str::FromStr for FailOn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(FailOn::Error),
            "warning" => Ok(FailOn::Warning),
            "never" => Ok(FailOn::Never),
            _ => Err(format!("unknown fail-on level: {} (expected error, warning or never)", s)),
        }
    }
}

/// Line gates and accumulator ceilings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub min_line_length: usize,
    pub max_line_length: usize,
    pub max_context_lines: usize,
    pub max_context_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_line_length: DEFAULT_MIN_LINE_LENGTH,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_context_lines: DEFAULT_MAX_CONTEXT_LINES,
            max_context_bytes: DEFAULT_MAX_CONTEXT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParsersConfig {
    /// Parser ids to leave out of the registry.
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub parsers: ParsersConfig,
    #[serde(default)]
    pub fail_on: FailOn,
}

impl Config {
    /// Parse and validate a config file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse_str(&content).map_err(|e| match e {
            ConfigError::Yaml { source, .. } => ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate config text. An empty document is the default.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
                path: PathBuf::new(),
                source,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Find a config file: the working directory first, then the user's
    /// config directory.
    pub fn discover(cwd: &Path) -> Option<PathBuf> {
        let local = CONFIG_FILE_NAMES
            .iter()
            .map(|name| cwd.join(name))
            .find(|p| p.is_file());
        local.or_else(|| {
            USER_CONFIG_DIR
                .as_ref()
                .map(|dir| dir.join(CONFIG_FILE_NAMES[0]))
                .filter(|p| p.is_file())
        })
    }

    /// Load an explicit file, a discovered one, or the defaults.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        match explicit.map(Path::to_path_buf).or_else(|| Self::discover(cwd)) {
            Some(path) => Self::parse_file(path),
            None => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.limits;
        if l.min_line_length >= l.max_line_length {
            return Err(ConfigError::Invalid(format!(
                "limits.min_line_length ({}) must be below limits.max_line_length ({})",
                l.min_line_length, l.max_line_length
            )));
        }
        if l.max_context_lines == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_context_lines must be positive".to_string(),
            ));
        }
        if l.max_context_bytes == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_context_bytes must be positive".to_string(),
            ));
        }
        let known = builtin_parser_ids();
        if let Some(unknown) = self
            .parsers
            .disabled
            .iter()
            .find(|id| !known.contains(&id.as_str()))
        {
            return Err(ConfigError::UnknownParser(unknown.clone()));
        }
        Ok(())
    }

    pub fn line_limits(&self) -> LineLimits {
        LineLimits {
            min_len: self.limits.min_line_length,
            max_len: self.limits.max_line_length,
        }
    }

    pub fn accumulator_limits(&self) -> AccumulatorLimits {
        AccumulatorLimits {
            max_lines: self.limits.max_context_lines,
            max_bytes: self.limits.max_context_bytes,
        }
    }

    /// A fresh registry configured from this file. Call once per stream.
    pub fn build_registry(&self) -> ParserRegistry {
        let mut registry = ParserRegistry::with_limits(self.line_limits(), self.accumulator_limits());
        for id in &self.parsers.disabled {
            registry.disable(id);
        }
        registry
    }
}

/// Config written by `logsieve init`.
pub const DEFAULT_CONFIG_YAML: &str = r#"# logsieve configuration
#
# Lines shorter or longer than these bounds are skipped before any
# pattern runs. Multi-line blocks (stack traces, rustc diagnostics)
# stop growing at the context ceilings and are marked truncated.
limits:
  min_line_length: 3
  max_line_length: 4096
  max_context_lines: 200
  max_context_bytes: 65536

parsers:
  # Any of: typescript, rust, eslint, go, python, infrastructure, generic
  disabled: []

# Severity that makes `logsieve scan` exit non-zero: error, warning or never
fail_on: error
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_yaml_parses_to_defaults() {
        let config = Config::parse_str(DEFAULT_CONFIG_YAML).unwrap();
        assert_eq!(config.line_limits(), LineLimits::default());
        assert_eq!(config.accumulator_limits(), AccumulatorLimits::default());
        assert!(config.parsers.disabled.is_empty());
        assert_eq!(config.fail_on, FailOn::Error);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse_str("limits:\n  max_context_lines: 10\nfail_on: warning\n").unwrap();
        assert_eq!(config.limits.max_context_lines, 10);
        assert_eq!(config.limits.max_line_length, DEFAULT_MAX_LINE_LENGTH);
        assert_eq!(config.fail_on, FailOn::Warning);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::parse_str("  \n").unwrap();
        assert_eq!(config.fail_on, FailOn::Error);
    }

    #[test]
    fn test_rejects_inverted_line_limits() {
        let err = Config::parse_str("limits:\n  min_line_length: 100\n  max_line_length: 10\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_zero_ceilings() {
        let err = Config::parse_str("limits:\n  max_context_bytes: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unknown_parser() {
        let err = Config::parse_str("parsers:\n  disabled: [cobol]\n").unwrap_err();
        match err {
            ConfigError::UnknownParser(id) => assert_eq!(id, "cobol"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_bad_yaml_reports_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "limits: [unterminated").unwrap();
        let err = Config::parse_file(file.path()).unwrap_err();
        match err {
            ConfigError::Yaml { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::parse_file(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_discover_prefers_working_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".logsieve.yaml"), "fail_on: never\n").unwrap();
        let found = Config::discover(dir.path()).unwrap();
        assert_eq!(found, dir.path().join(".logsieve.yaml"));

        fs::write(dir.path().join("logsieve.yaml"), "fail_on: warning\n").unwrap();
        let found = Config::discover(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("logsieve.yaml"));

        let config = Config::load(None, dir.path()).unwrap();
        assert_eq!(config.fail_on, FailOn::Warning);
    }

    #[test]
    fn test_build_registry_disables_parsers() {
        let config = Config::parse_str("parsers:\n  disabled: [generic, infrastructure]\n").unwrap();
        let registry = config.build_registry();
        let ids = registry.parser_ids();
        assert!(!ids.contains(&"generic"));
        assert!(!ids.contains(&"infrastructure"));
        assert!(ids.contains(&"rust"));
    }

    #[test]
    fn test_fail_on_threshold() {
        assert!(FailOn::Error.trips(Severity::Error));
        assert!(!FailOn::Error.trips(Severity::Warning));
        assert!(FailOn::Warning.trips(Severity::Warning));
        assert!(!FailOn::Never.trips(Severity::Error));
        assert_eq!("WARNING".parse::<FailOn>(), Ok(FailOn::Warning));
        assert!("sometimes".parse::<FailOn>().is_err());
    }
}

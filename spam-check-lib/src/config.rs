//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and environment
//! variables and merging them with proper precedence rules.

use crate::error::SpamCheckError;
use crate::types::{AliasTable, PipelineConfig, MAX_LIMIT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration loaded from TOML files.
///
/// ```toml
/// [defaults]
/// message_batch_size = 10
/// max_concurrent_checks = 4
///
/// [aliases]
/// "old@example.com" = "new@example.com"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Pipeline limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Canonical email to alternate identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<HashMap<String, String>>,
}

/// Default pipeline limits.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefaultsConfig {
    /// Users per message lookup call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_batch_size: Option<usize>,

    /// Concurrent spam classification calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_checks: Option<usize>,
}

impl FileConfig {
    /// Overlay this file's settings on `config`.
    pub fn apply_to(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(defaults) = &self.defaults {
            if let Some(size) = defaults.message_batch_size {
                config = config.with_message_batch_size(size);
            }
            if let Some(max) = defaults.max_concurrent_checks {
                config = config.with_max_concurrent_checks(max);
            }
        }
        if let Some(aliases) = &self.aliases {
            // Keys are matched against canonical emails.
            let table: AliasTable = aliases
                .iter()
                .map(|(from, to)| (from.trim().to_lowercase(), to.trim().to_string()))
                .collect();
            config = config.with_aliases(table);
        }
        config
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to report which files were picked up
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The parsed configuration or an error if reading, parsing or
    /// validation fails.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, SpamCheckError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SpamCheckError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            SpamCheckError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)?;

        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config is lowest, then the home directory file, then a file in
    /// the current directory.
    pub fn discover_and_load(&self) -> Result<FileConfig, SpamCheckError> {
        let mut merged_config = FileConfig::default();
        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    if self.verbose {
                        debug!(path = %path.display(), "loaded configuration file");
                    }
                    merged_config = self.merge_configs(merged_config, config);
                }
                Err(err) => warn!(path = %path.display(), error = %err, "ignoring configuration file"),
            }
        }

        Ok(merged_config)
    }

    /// Get the local configuration file path.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./spam-check.toml", "./.spam-check.toml"]
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Get the global configuration file path in the user's home directory.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        [".spam-check.toml", "spam-check.toml"]
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// Get the XDG configuration file path.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("spam-check").join("config.toml");
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Merge two configurations; values from `higher` win.
    ///
    /// Alias maps are merged entry by entry.
    fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(mut lower_defaults), Some(higher_defaults)) => {
                    if higher_defaults.message_batch_size.is_some() {
                        lower_defaults.message_batch_size = higher_defaults.message_batch_size;
                    }
                    if higher_defaults.max_concurrent_checks.is_some() {
                        lower_defaults.max_concurrent_checks =
                            higher_defaults.max_concurrent_checks;
                    }
                    Some(lower_defaults)
                }
                (lower_defaults, higher_defaults) => higher_defaults.or(lower_defaults),
            },
            aliases: match (lower.aliases, higher.aliases) {
                (Some(mut lower_aliases), Some(higher_aliases)) => {
                    lower_aliases.extend(higher_aliases);
                    Some(lower_aliases)
                }
                (lower_aliases, higher_aliases) => higher_aliases.or(lower_aliases),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), SpamCheckError> {
        if let Some(defaults) = &config.defaults {
            if let Some(size) = defaults.message_batch_size {
                validate_limit("message_batch_size", size)?;
            }
            if let Some(max) = defaults.max_concurrent_checks {
                validate_limit("max_concurrent_checks", max)?;
            }
        }

        if let Some(aliases) = &config.aliases {
            for (from, to) in aliases {
                if from.trim().is_empty() || to.trim().is_empty() {
                    return Err(SpamCheckError::config(format!(
                        "Alias '{}' = '{}' must name both identifiers",
                        from, to
                    )));
                }
            }
        }

        Ok(())
    }
}

fn validate_limit(name: &str, value: usize) -> Result<(), SpamCheckError> {
    if value == 0 || value > MAX_LIMIT {
        return Err(SpamCheckError::config(format!(
            "{} must be between 1 and {}",
            name, MAX_LIMIT
        )));
    }
    Ok(())
}

/// Environment variable configuration (SC_* variables).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub message_batch_size: Option<usize>,
    pub max_concurrent_checks: Option<usize>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Parse SC_* values from `(name, value)` pairs.
    ///
    /// Invalid values are logged and ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut env_config = EnvConfig::default();

        for (key, value) in vars {
            let value = value.as_ref().trim();
            match key.as_ref() {
                "SC_BATCH_SIZE" => env_config.message_batch_size = parse_limit("SC_BATCH_SIZE", value),
                "SC_MAX_CHECKS" => {
                    env_config.max_concurrent_checks = parse_limit("SC_MAX_CHECKS", value)
                }
                "SC_CONFIG" if !value.is_empty() => env_config.config = Some(value.to_string()),
                _ => {}
            }
        }

        env_config
    }

    /// Overlay the environment settings on `config`.
    pub fn apply_to(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(size) = self.message_batch_size {
            config = config.with_message_batch_size(size);
        }
        if let Some(max) = self.max_concurrent_checks {
            config = config.with_max_concurrent_checks(max);
        }
        config
    }
}

fn parse_limit(name: &str, value: &str) -> Option<usize> {
    match value.parse::<usize>() {
        Ok(limit) if limit > 0 && limit <= MAX_LIMIT => {
            debug!(name, limit, "using environment override");
            Some(limit)
        }
        _ => {
            warn!(name, value, "ignoring invalid value, must be 1-{}", MAX_LIMIT);
            None
        }
    }
}

/// Load configuration from the process environment.
pub fn load_env_config() -> EnvConfig {
    EnvConfig::from_vars(env::vars())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_load_valid_config() {
        let temp_file = write_config(
            r#"
[defaults]
message_batch_size = 10
max_concurrent_checks = 4

[aliases]
" Old@Example.com" = "new@example.com"
"#,
        );

        let manager = ConfigManager::new(false);
        let config = manager.load_file(temp_file.path()).unwrap();

        let defaults = config.defaults.clone().unwrap();
        assert_eq!(defaults.message_batch_size, Some(10));
        assert_eq!(defaults.max_concurrent_checks, Some(4));

        let pipeline = config.apply_to(PipelineConfig::default());
        assert_eq!(pipeline.message_batch_size, 10);
        assert_eq!(pipeline.max_concurrent_checks, 4);
        assert_eq!(
            pipeline.aliases.alias_of("old@example.com"),
            Some("new@example.com")
        );
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let manager = ConfigManager::new(false);

        let zero = write_config("[defaults]\nmessage_batch_size = 0\n");
        assert!(manager.load_file(zero.path()).is_err());

        let huge = write_config("[defaults]\nmax_concurrent_checks = 5000\n");
        assert!(manager.load_file(huge.path()).is_err());
    }

    #[test]
    fn test_empty_alias_rejected() {
        let manager = ConfigManager::new(false);
        let file = write_config("[aliases]\n\"a@example.com\" = \"\"\n");
        assert!(matches!(
            manager.load_file(file.path()),
            Err(SpamCheckError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let manager = ConfigManager::new(false);
        assert!(matches!(
            manager.load_file("/nonexistent/spam-check.toml"),
            Err(SpamCheckError::FileError { .. })
        ));
    }

    #[test]
    fn test_merge_configs() {
        let manager = ConfigManager::new(false);

        let lower = FileConfig {
            defaults: Some(DefaultsConfig {
                message_batch_size: Some(2),
                max_concurrent_checks: Some(5),
            }),
            aliases: Some(HashMap::from([
                ("a@x".to_string(), "b@x".to_string()),
                ("c@x".to_string(), "d@x".to_string()),
            ])),
        };

        let higher = FileConfig {
            defaults: Some(DefaultsConfig {
                max_concurrent_checks: Some(8),
                ..Default::default()
            }),
            aliases: Some(HashMap::from([("a@x".to_string(), "z@x".to_string())])),
        };

        let merged = manager.merge_configs(lower, higher);
        let defaults = merged.defaults.unwrap();
        assert_eq!(defaults.message_batch_size, Some(2)); // Lower preserved
        assert_eq!(defaults.max_concurrent_checks, Some(8)); // Higher wins

        let aliases = merged.aliases.unwrap();
        assert_eq!(aliases.get("a@x"), Some(&"z@x".to_string()));
        assert_eq!(aliases.get("c@x"), Some(&"d@x".to_string()));
    }

    #[test]
    fn test_env_config_parsing() {
        let env = EnvConfig::from_vars([
            ("SC_BATCH_SIZE", "7"),
            ("SC_MAX_CHECKS", "0"),
            ("SC_CONFIG", "/tmp/sc.toml"),
            ("PATH", "/usr/bin"),
        ]);

        assert_eq!(env.message_batch_size, Some(7));
        assert_eq!(env.max_concurrent_checks, None);
        assert_eq!(env.config, Some("/tmp/sc.toml".to_string()));

        let config = env.apply_to(PipelineConfig::default());
        assert_eq!(config.message_batch_size, 7);
        assert_eq!(config.max_concurrent_checks, 5);
    }
}

//! Configuration management.
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! `REGISTRY_GC_*` environment variables. Command-line flags are applied
//! last by the CLI.
//!
//! ```toml
//! repository = "web"
//! region = "us-east-1"
//! inventory = "images.json"
//! delete_untagged = true
//! batch_size = 100
//!
//! [keep]
//! release = 4
//! build = 8
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use crate::gc::RetentionPolicy;
use crate::registry::DEFAULT_BATCH_SIZE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "REGISTRY_GC_CONFIG_PATH";

/// Largest batch size accepted from configuration.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Main configuration for registry-gc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcConfig {
    /// Repository to collect.
    pub repository: Option<String>,
    /// Registry region, reported alongside the repository.
    pub region: Option<String>,
    /// Snapshot file backing the registry.
    pub inventory: Option<PathBuf>,
    /// Retention policy.
    pub policy: RetentionPolicy,
    /// Maximum images per delete call.
    pub batch_size: usize,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Logging section of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing` filter directive, e.g. `info` or `registry_gc=debug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Output format: `pretty` or `json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Log file; logs go to stderr when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
///
/// Scalar keys come before tables so the struct also serializes to valid
/// TOML.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Repository name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Snapshot path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,
    /// Delete untagged images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_untagged: Option<bool>,
    /// Delete batch size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// Keep counts by tag prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<BTreeMap<String, u32>>,
    /// Logging section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSettings>,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            repository: None,
            region: None,
            inventory: None,
            policy: RetentionPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            logging: LoggingSettings::default(),
        }
    }
}

impl GcConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration TOML.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::operation("parse_config_file", e))?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::operation("read_config_file", format!("{}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/registry-gc/` on macOS)
    /// 2. XDG config dir (`~/.config/registry-gc/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs
            .config_dir()
            .join("registry-gc")
            .join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("registry-gc")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Loads configuration from `path`, `REGISTRY_GC_CONFIG_PATH` or the
    /// default location, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be loaded or an
    /// override has an invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            Self::load_from_file(path)?
        } else if let Some(env_path) = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
        {
            Self::load_from_file(Path::new(&env_path))?
        } else {
            Self::load_default()
        };

        config.apply_env_overrides_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `REGISTRY_GC_*` overrides using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a boolean or numeric variable cannot be parsed.
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(repository) = get("REGISTRY_GC_REPOSITORY") {
            self.repository = Some(repository);
        }
        if let Some(region) = get("REGISTRY_GC_REGION") {
            self.region = Some(region);
        } else if self.region.is_none() {
            self.region = get("AWS_DEFAULT_REGION");
        }
        if let Some(inventory) = get("REGISTRY_GC_INVENTORY") {
            self.inventory = Some(PathBuf::from(inventory));
        }
        if let Some(value) = get("REGISTRY_GC_DELETE_UNTAGGED") {
            self.policy.delete_untagged = parse_bool("REGISTRY_GC_DELETE_UNTAGGED", &value)?;
        }
        if let Some(value) = get("REGISTRY_GC_BATCH_SIZE") {
            self.batch_size = value.trim().parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "REGISTRY_GC_BATCH_SIZE must be a positive integer, got '{value}'"
                ))
            })?;
        }
        if let Some(level) = get("REGISTRY_GC_LOG_LEVEL") {
            self.logging.level = Some(level);
        }
        if let Some(format) = get("REGISTRY_GC_LOG_FORMAT") {
            self.logging.format = Some(format);
        }
        if let Some(file) = get("REGISTRY_GC_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }

        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `batch_size` is outside `1..=1000`.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::InvalidInput(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }

    /// Returns the configured repository.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no repository is set.
    pub fn require_repository(&self) -> Result<&str> {
        self.repository
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(
                    "no repository given (use --repo, `repository` or REGISTRY_GC_REPOSITORY)"
                        .to_string(),
                )
            })
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        let file = ConfigFile {
            repository: self.repository.clone(),
            region: self.region.clone(),
            inventory: self
                .inventory
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            delete_untagged: Some(self.policy.delete_untagged),
            batch_size: Some(self.batch_size),
            keep: Some(self.policy.keep_counts.clone()),
            logging: Some(self.logging.clone()),
        };
        toml::to_string(&file).map_err(|e| Error::operation("serialize_config", e))
    }

    /// Converts a `ConfigFile` to `GcConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        config.repository = file.repository;
        config.region = file.region;
        config.inventory = file.inventory.map(PathBuf::from);
        if let Some(delete_untagged) = file.delete_untagged {
            config.policy.delete_untagged = delete_untagged;
        }
        if let Some(batch_size) = file.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(keep) = file.keep {
            config.policy.keep_counts = keep;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        config
    }

    /// Sets the repository.
    #[must_use]
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// Sets the inventory snapshot path.
    #[must_use]
    pub fn with_inventory(mut self, path: impl Into<PathBuf>) -> Self {
        self.inventory = Some(path.into());
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetentionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{key} must be a boolean, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GcConfig::default();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.policy.is_empty());
        assert!(!config.policy.delete_untagged);
        assert!(config.repository.is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = GcConfig::from_toml(
            r#"
repository = "web"
region = "eu-west-1"
delete_untagged = true
batch_size = 50

[keep]
release = 4
build = 8

[logging]
level = "debug"
format = "json"
"#,
        )
        .expect("valid config");

        assert_eq!(config.repository.as_deref(), Some("web"));
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.batch_size, 50);
        assert!(config.policy.delete_untagged);
        assert_eq!(config.policy.keep_count("release"), Some(4));
        assert_eq!(config.policy.keep_count("build"), Some(8));
        assert_eq!(config.logging.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_negative_keep_count_rejected() {
        let err = GcConfig::from_toml("[keep]\nrelease = -1\n").expect_err("negative count");
        assert!(err.to_string().contains("parse_config_file"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(GcConfig::from_toml("keep_untagged = true\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "repository = \"api\"\n[keep]\nv = 2\n").expect("write");

        let config = GcConfig::load_from_file(&path).expect("load");
        assert_eq!(config.repository.as_deref(), Some("api"));
        assert_eq!(config.policy.keep_count("v"), Some(2));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = GcConfig::load_from_file(Path::new("/nonexistent/registry-gc.toml"))
            .expect_err("missing file");
        assert!(err.to_string().contains("read_config_file"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GcConfig::new().with_repository("web");
        config
            .apply_env_overrides_with(env(&[
                ("REGISTRY_GC_REPOSITORY", "api"),
                ("REGISTRY_GC_DELETE_UNTAGGED", "yes"),
                ("REGISTRY_GC_BATCH_SIZE", "25"),
                ("REGISTRY_GC_LOG_FORMAT", "json"),
                ("AWS_DEFAULT_REGION", "us-east-2"),
            ]))
            .expect("overrides apply");

        assert_eq!(config.repository.as_deref(), Some("api"));
        assert!(config.policy.delete_untagged);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.region.as_deref(), Some("us-east-2"));
        assert_eq!(config.logging.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_region_env_precedence() {
        let mut config = GcConfig::new();
        config
            .apply_env_overrides_with(env(&[
                ("REGISTRY_GC_REGION", "ap-south-1"),
                ("AWS_DEFAULT_REGION", "us-east-2"),
            ]))
            .expect("overrides apply");
        assert_eq!(config.region.as_deref(), Some("ap-south-1"));

        let mut configured = GcConfig::from_toml("region = \"eu-west-1\"\n").expect("valid");
        configured
            .apply_env_overrides_with(env(&[("AWS_DEFAULT_REGION", "us-east-2")]))
            .expect("overrides apply");
        assert_eq!(configured.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_env_bad_bool() {
        let mut config = GcConfig::new();
        let err = config
            .apply_env_overrides_with(env(&[("REGISTRY_GC_DELETE_UNTAGGED", "maybe")]))
            .expect_err("bad bool");
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let mut config = GcConfig::new().with_repository("web");
        config
            .apply_env_overrides_with(env(&[("REGISTRY_GC_REPOSITORY", "  ")]))
            .expect("overrides apply");
        assert_eq!(config.repository.as_deref(), Some("web"));
    }

    #[test]
    fn test_validate_batch_size() {
        let mut config = GcConfig::new();
        assert!(config.validate().is_ok());
        config.batch_size = 0;
        assert!(config.validate().is_err());
        config.batch_size = MAX_BATCH_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_require_repository() {
        assert!(GcConfig::new().require_repository().is_err());
        assert_eq!(
            GcConfig::new()
                .with_repository("web")
                .require_repository()
                .expect("set"),
            "web"
        );
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let config = GcConfig::new()
            .with_repository("web")
            .with_inventory("images.json")
            .with_policy(
                RetentionPolicy::new()
                    .with_keep("release", 4)
                    .with_delete_untagged(true),
            );

        let rendered = config.to_toml().expect("serialize");
        let parsed = GcConfig::from_toml(&rendered).expect("parse back");
        assert_eq!(parsed, config);
    }
}

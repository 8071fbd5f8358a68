mod defaults;
mod env;
pub mod types;
mod validation;

use std::path::Path;

pub use defaults::{DATA_DIR, DEFAULT_DATABASE, LINKS_DIR};
pub use types::*;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing environment variables: {0:?}")]
    MissingEnvVars(Vec<String>),

    #[error("Invalid bounds for {pool} pool: min_threads={min}, max_threads={max}")]
    InvalidPoolBounds { pool: String, min: usize, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl JfsConfig {
    /// Parse a JFS configuration from a YAML string.
    /// Environment variables in the format `${VAR_NAME}` will be interpolated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = env::interpolate_env(yaml)?;
        let config: JfsConfig = serde_yaml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Load a JFS configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Render the configuration back to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_parse_minimal_config() {
        let config = JfsConfig::from_yaml("store: /srv/jfs\n").unwrap();
        assert_eq!(config.store, PathBuf::from("/srv/jfs"));
        assert_eq!(config.pools, PoolsConfig::default());
        assert!(config.cache.enabled);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.mount.fs_name, "jfs");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
store: /srv/jfs
database: meta/jfs.db
pools:
  read:
    min_threads: 2
    max_threads: 8
    linger: 500ms
  write:
    min_threads: 1
    max_threads: 1
cache:
  enabled: false
  capacity_hint: 64
log:
  level: debug
  file: jfs.log
mount:
  fs_name: meta
  allow_other: true
"#;

        let config = JfsConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.pools.read.min_threads, 2);
        assert_eq!(config.pools.read.max_threads, 8);
        assert_eq!(
            config.pools.read.linger.as_duration(),
            Duration::from_millis(500)
        );
        assert_eq!(config.pools.write.linger.as_duration(), Duration::from_secs(60));
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.capacity_hint, 64);
        assert!(config.mount.allow_other);
        assert!(config.mount.auto_unmount);

        let effective = config.effective();
        assert_eq!(effective.database, Some(PathBuf::from("/srv/jfs/meta/jfs.db")));
        assert_eq!(effective.log.file, Some(PathBuf::from("/srv/jfs/jfs.log")));
        assert!(effective.validate().is_empty());
    }

    #[test]
    fn test_parse_with_env_vars() {
        std::env::set_var("JFS_TEST_ROOT_PATH", "/tmp/jfs-test");

        let config = JfsConfig::from_yaml("store: ${JFS_TEST_ROOT_PATH}\n").unwrap();
        assert_eq!(config.store, PathBuf::from("/tmp/jfs-test"));
    }

    #[test]
    fn test_missing_store_is_an_error() {
        assert!(matches!(
            JfsConfig::from_yaml("cache:\n  enabled: true\n"),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_yaml_roundtrip_through_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("jfs.yaml");
        let config = JfsConfig::with_store(dir.path());
        std::fs::write(&path, config.to_yaml().unwrap()).unwrap();

        let loaded = JfsConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}

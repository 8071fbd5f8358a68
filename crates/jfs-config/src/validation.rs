use crate::types::{JfsConfig, PoolConfig};
use crate::ConfigError;

impl JfsConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.store.as_os_str().is_empty() {
            errors.push(ConfigError::InvalidConfig(
                "'store' must name the datastore root directory".to_string(),
            ));
        }

        check_pool("read", &self.pools.read, &mut errors);
        check_pool("write", &self.pools.write, &mut errors);

        // Mutations rely on a single writer instead of row or table locks.
        if self.pools.write.max_threads != 1 {
            errors.push(ConfigError::InvalidConfig(format!(
                "write pool must have exactly one thread, got max_threads={}",
                self.pools.write.max_threads
            )));
        }

        if self.mount.fs_name.trim().is_empty() {
            errors.push(ConfigError::InvalidConfig(
                "mount.fs_name must not be empty".to_string(),
            ));
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn check_pool(name: &str, pool: &PoolConfig, errors: &mut Vec<ConfigError>) {
    if pool.max_threads < 1 || pool.min_threads > pool.max_threads {
        errors.push(ConfigError::InvalidPoolBounds {
            pool: name.to_string(),
            min: pool.min_threads,
            max: pool.max_threads,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = JfsConfig::with_store("/srv/jfs");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_inverted_pool_bounds() {
        let mut config = JfsConfig::with_store("/srv/jfs");
        config.pools.read.min_threads = 300;
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ConfigError::InvalidPoolBounds { pool, min: 300, max: 256 } if pool == "read"
        ));
    }

    #[test]
    fn test_write_pool_must_be_single_threaded() {
        let mut config = JfsConfig::with_store("/srv/jfs");
        config.pools.write.max_threads = 4;
        let err = config.validate_or_err().unwrap_err();
        assert!(err.to_string().contains("exactly one thread"));
    }

    #[test]
    fn test_zero_max_threads() {
        let mut config = JfsConfig::with_store("/srv/jfs");
        config.pools.read.min_threads = 0;
        config.pools.read.max_threads = 0;
        assert!(config
            .validate()
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidPoolBounds { .. })));
    }

    #[test]
    fn test_empty_store() {
        let config = JfsConfig::with_store("");
        assert!(config.validate_or_err().is_err());
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Human-readable duration (e.g., "200ms", "60s", "1h").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanDuration(pub std::time::Duration);

impl Default for HumanDuration {
    fn default() -> Self {
        HumanDuration(std::time::Duration::from_secs(0))
    }
}

impl HumanDuration {
    pub fn from_secs(secs: u64) -> Self {
        HumanDuration(std::time::Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> std::time::Duration {
        self.0
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        let (num_str, unit) = if let Some(n) = s.strip_suffix("ms") {
            (n, "ms")
        } else if let Some(n) = s.strip_suffix('s') {
            (n, "s")
        } else if let Some(n) = s.strip_suffix('m') {
            (n, "m")
        } else if let Some(n) = s.strip_suffix('h') {
            (n, "h")
        } else {
            return Err(format!("Invalid duration format: {}", s));
        };

        let num: u64 = num_str
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", s))?;

        let duration = match unit {
            "ms" => std::time::Duration::from_millis(num),
            "s" => std::time::Duration::from_secs(num),
            "m" => std::time::Duration::from_secs(num * 60),
            "h" => std::time::Duration::from_secs(num * 3600),
            _ => return Err(format!("Unknown duration unit: {}", unit)),
        };

        Ok(HumanDuration(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();
        let secs = self.0.as_secs();

        if millis % 1000 != 0 {
            write!(f, "{}ms", millis)
        } else if secs % 3600 == 0 && secs > 0 {
            write!(f, "{}h", secs / 3600)
        } else if secs % 60 == 0 && secs > 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{}s", secs)
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HumanDuration::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Sizing and idle policy for one worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Workers kept alive even when idle.
    pub min_threads: usize,
    /// Upper bound on concurrently live workers.
    pub max_threads: usize,
    /// How long an idle worker above `min_threads` waits for work before exiting.
    #[serde(default = "default_linger")]
    pub linger: HumanDuration,
    /// Optional worker stack size in bytes.
    #[serde(default)]
    pub stack_size: Option<usize>,
}

fn default_linger() -> HumanDuration {
    HumanDuration::from_secs(60)
}

impl PoolConfig {
    pub fn new(min_threads: usize, max_threads: usize, linger: std::time::Duration) -> Self {
        PoolConfig {
            min_threads,
            max_threads,
            linger: HumanDuration(linger),
            stack_size: None,
        }
    }

    /// Read pool defaults: wide fan-out for concurrent lookups.
    pub fn read_default() -> Self {
        PoolConfig::new(12, 256, default_linger().0)
    }

    /// Write pool defaults: exactly one worker so all mutations are serialized.
    pub fn write_default() -> Self {
        PoolConfig::new(1, 1, default_linger().0)
    }
}

/// Read and write pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolsConfig {
    #[serde(default = "PoolConfig::read_default")]
    pub read: PoolConfig,
    #[serde(default = "PoolConfig::write_default")]
    pub write: PoolConfig,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        PoolsConfig {
            read: PoolConfig::read_default(),
            write: PoolConfig::write_default(),
        }
    }
}

/// Settings shared by the four lookup caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Initial table capacity for each cache.
    #[serde(default = "default_capacity_hint")]
    pub capacity_hint: usize,
}

fn default_true() -> bool {
    true
}

fn default_capacity_hint() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            capacity_hint: default_capacity_hint(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Append-only log file. Logs go to stderr when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            file: None,
        }
    }
}

/// FUSE mount options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountOptions {
    #[serde(default = "default_fs_name")]
    pub fs_name: String,
    #[serde(default)]
    pub allow_other: bool,
    #[serde(default = "default_true")]
    pub auto_unmount: bool,
}

fn default_fs_name() -> String {
    "jfs".to_string()
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions {
            fs_name: default_fs_name(),
            allow_other: false,
            auto_unmount: true,
        }
    }
}

/// Top-level JFS configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JfsConfig {
    /// Datastore root holding `links/`, `data/` and the database.
    pub store: PathBuf,
    /// Database file; relative paths are resolved against `store`.
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub pools: PoolsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub mount: MountOptions,
}

impl JfsConfig {
    /// A configuration with defaults for everything but the store root.
    pub fn with_store(store: impl Into<PathBuf>) -> Self {
        JfsConfig {
            store: store.into(),
            database: None,
            pools: PoolsConfig::default(),
            cache: CacheConfig::default(),
            log: LogConfig::default(),
            mount: MountOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration_parsing() {
        assert_eq!(
            HumanDuration::from_str("200ms").unwrap().as_duration(),
            std::time::Duration::from_millis(200)
        );
        assert_eq!(
            HumanDuration::from_str("60s").unwrap().as_duration(),
            std::time::Duration::from_secs(60)
        );
        assert_eq!(
            HumanDuration::from_str("5m").unwrap().as_duration(),
            std::time::Duration::from_secs(300)
        );
        assert_eq!(
            HumanDuration::from_str("1h").unwrap().as_duration(),
            std::time::Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_human_duration_rejects_garbage() {
        assert!(HumanDuration::from_str("soon").is_err());
        assert!(HumanDuration::from_str("10").is_err());
        assert!(HumanDuration::from_str("xs").is_err());
    }

    #[test]
    fn test_human_duration_display() {
        assert_eq!(HumanDuration::from_secs(60).to_string(), "1m");
        assert_eq!(HumanDuration::from_secs(90).to_string(), "90s");
        assert_eq!(
            HumanDuration(std::time::Duration::from_millis(1500)).to_string(),
            "1500ms"
        );
        assert_eq!(HumanDuration::from_secs(7200).to_string(), "2h");
    }

    #[test]
    fn test_pool_defaults() {
        let pools = PoolsConfig::default();
        assert_eq!(pools.read.min_threads, 12);
        assert_eq!(pools.read.max_threads, 256);
        assert_eq!(pools.write.min_threads, 1);
        assert_eq!(pools.write.max_threads, 1);
    }
}

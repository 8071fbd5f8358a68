use std::sync::Arc;

use jfs_config::CacheConfig;
use tracing::debug;

use super::{CacheStats, ShadowCache};

/// The data file a symlink points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataFile {
    /// Inode of the backing file under `data/`.
    pub inode: u64,
    /// Path of the backing file.
    pub path: String,
}

/// syminode -> data file.
pub type SymlinkCache = ShadowCache<u64, DataFile>;
/// key name -> key id.
pub type KeyCache = ShadowCache<String, i64>;
/// (inode, key id) -> value.
pub type MetaCache = ShadowCache<(u64, i64), String>;
/// jfs_id -> datapath.
pub type DatapathCache = ShadowCache<i64, String>;

/// The four caches of one mount.
#[derive(Debug)]
pub struct Caches {
    pub symlinks: SymlinkCache,
    pub keys: KeyCache,
    pub metadata: MetaCache,
    pub datapaths: DatapathCache,
}

pub type SharedCaches = Arc<Caches>;

impl Caches {
    pub fn new(config: &CacheConfig) -> Self {
        let hint = config.capacity_hint;
        Caches {
            symlinks: ShadowCache::new("symlinks", config.enabled, hint),
            keys: ShadowCache::new("keys", config.enabled, hint),
            metadata: ShadowCache::new("metadata", config.enabled, hint),
            datapaths: ShadowCache::new("datapaths", config.enabled, hint),
        }
    }

    /// Drop every metadata entry of `inode`.
    pub fn forget_inode(&self, inode: u64) -> usize {
        self.metadata.retain(|(entry_inode, _), _| *entry_inode != inode)
    }

    /// Empty all four caches; done at unmount.
    pub fn clear_all(&self) {
        debug!(
            symlinks = self.symlinks.len(),
            keys = self.keys.len(),
            metadata = self.metadata.len(),
            datapaths = self.datapaths.len(),
            "clearing caches"
        );
        self.symlinks.clear();
        self.keys.clear();
        self.metadata.clear();
        self.datapaths.clear();
    }

    /// Stats per cache, keyed by cache name.
    pub fn stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.symlinks.name(), self.symlinks.stats()),
            (self.keys.name(), self.keys.stats()),
            (self.metadata.name(), self.metadata.stats()),
            (self.datapaths.name(), self.datapaths.stats()),
        ]
    }
}

/// Build the cache bundle shared by every handler of one mount.
pub fn create_caches(config: &CacheConfig) -> SharedCaches {
    Arc::new(Caches::new(config))
}

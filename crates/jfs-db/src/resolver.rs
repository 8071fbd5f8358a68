use std::sync::Arc;

use jfs_core::{DataFile, SharedCaches};
use tracing::trace;

use crate::db::JfsDb;
use crate::error::DbError;
use crate::queries;

/// Cache-first lookups with a read-pool fallback.
///
/// Every lookup checks its cache, and on a miss runs one read operation,
/// waits for it, stores the answer, and returns it. The answer is stored only
/// if no writer touched that cache while the read was in flight, so a value
/// committed by the catalog is never replaced by an older row.
#[derive(Clone)]
pub struct Resolver {
    db: Arc<JfsDb>,
    caches: SharedCaches,
}

impl Resolver {
    pub fn new(db: Arc<JfsDb>, caches: SharedCaches) -> Self {
        Resolver { db, caches }
    }

    pub fn db(&self) -> &Arc<JfsDb> {
        &self.db
    }

    pub fn caches(&self) -> &SharedCaches {
        &self.caches
    }

    /// Link-tree path of a jfs_id.
    pub fn resolve_datapath(&self, jfs_id: i64) -> Result<String, DbError> {
        if let Some(path) = self.caches.datapaths.get(&jfs_id) {
            return Ok(path);
        }
        trace!(jfs_id, "datapath cache miss");
        let generation = self.caches.datapaths.generation();
        let path = self
            .db
            .execute_read(queries::datapath(jfs_id))?
            .into_datapath()?;
        self.caches.datapaths.fill(jfs_id, path.clone(), generation);
        Ok(path)
    }

    /// jfs_id of a link-tree path. Fills the datapath cache on success.
    pub fn resolve_jfs_id(&self, datapath: &str) -> Result<i64, DbError> {
        let generation = self.caches.datapaths.generation();
        let jfs_id = self
            .db
            .execute_read(queries::jfs_id(datapath))?
            .into_id()?;
        self.caches
            .datapaths
            .fill(jfs_id, datapath.to_string(), generation);
        Ok(jfs_id)
    }

    /// Data file behind a symlink inode.
    pub fn resolve_datafile(&self, syminode: u64) -> Result<DataFile, DbError> {
        if let Some(datafile) = self.caches.symlinks.get(&syminode) {
            return Ok(datafile);
        }
        trace!(syminode, "symlink cache miss");
        let generation = self.caches.symlinks.generation();
        let (inode, path) = self
            .db
            .execute_read(queries::datafile(syminode))?
            .into_datafile()?;
        let datafile = DataFile { inode, path };
        self.caches
            .symlinks
            .fill(syminode, datafile.clone(), generation);
        Ok(datafile)
    }

    /// Interned id of a metadata key name.
    pub fn resolve_keyid(&self, name: &str) -> Result<i64, DbError> {
        if let Some(id) = self.caches.keys.get(name) {
            return Ok(id);
        }
        trace!(key = name, "key cache miss");
        let generation = self.caches.keys.generation();
        let id = self.db.execute_read(queries::keyid(name))?.into_id()?;
        self.caches.keys.fill(name.to_string(), id, generation);
        Ok(id)
    }

    /// Value of one attribute.
    pub fn resolve_value(&self, inode: u64, keyid: i64) -> Result<String, DbError> {
        if let Some(value) = self.caches.metadata.get(&(inode, keyid)) {
            return Ok(value);
        }
        trace!(inode, keyid, "metadata cache miss");
        let generation = self.caches.metadata.generation();
        let value = self
            .db
            .execute_read(queries::value(inode, keyid))?
            .into_value()?;
        self.caches
            .metadata
            .fill((inode, keyid), value.clone(), generation);
        Ok(value)
    }
}

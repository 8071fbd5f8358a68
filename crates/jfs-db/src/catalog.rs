use std::sync::Arc;

use jfs_core::{DataFile, SharedCaches};
use tracing::debug;

use crate::db::JfsDb;
use crate::error::DbError;
use crate::op::KeyList;
use crate::queries;
use crate::resolver::Resolver;

/// How `set_attr` treats an existing attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    /// Create or overwrite.
    #[default]
    Upsert,
    /// Fail with `Constraint` if the attribute exists.
    Create,
    /// Fail with `NotFound` if the attribute does not exist.
    Replace,
}

/// Metadata and mutation layer over the catalog.
///
/// Every mutation is submitted to the write pool and waited on; caches are
/// updated only after the write has committed.
#[derive(Clone)]
pub struct Catalog {
    resolver: Resolver,
}

impl Catalog {
    pub fn new(db: Arc<JfsDb>, caches: SharedCaches) -> Self {
        Catalog {
            resolver: Resolver::new(db, caches),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn db(&self) -> &JfsDb {
        self.resolver.db()
    }

    fn caches(&self) -> &SharedCaches {
        self.resolver.caches()
    }

    /// Id of `name`, inserting the key on first use.
    fn intern_key(&self, name: &str) -> Result<i64, DbError> {
        match self.resolver.resolve_keyid(name) {
            Err(DbError::NotFound) => {}
            found => return found,
        }
        self.db().execute_write(queries::insert_key(name))?;
        self.resolver.resolve_keyid(name)
    }

    pub fn get_attr(&self, inode: u64, name: &str) -> Result<String, DbError> {
        let keyid = self.resolver.resolve_keyid(name)?;
        self.resolver.resolve_value(inode, keyid)
    }

    pub fn set_attr(
        &self,
        inode: u64,
        name: &str,
        value: &str,
        mode: SetMode,
    ) -> Result<(), DbError> {
        let keyid = self.intern_key(name)?;
        let op = match mode {
            SetMode::Upsert => queries::upsert_value(inode, keyid, value),
            SetMode::Create => queries::insert_value(inode, keyid, value),
            SetMode::Replace => queries::replace_value(inode, keyid, value),
        };

        let changes = self.db().execute_write(op)?.changes()?;
        if mode == SetMode::Replace && changes == 0 {
            return Err(DbError::NotFound);
        }

        self.caches().metadata.add((inode, keyid), value.to_string());
        debug!(inode, key = name, ?mode, "attribute set");
        Ok(())
    }

    pub fn list_attrs(&self, inode: u64) -> Result<KeyList, DbError> {
        self.db()
            .execute_read(queries::list_attrs(inode))?
            .into_list()
    }

    pub fn remove_attr(&self, inode: u64, name: &str) -> Result<(), DbError> {
        let keyid = self.resolver.resolve_keyid(name)?;
        let changes = self
            .db()
            .execute_write(queries::delete_value(inode, keyid))?
            .changes()?;
        self.caches().metadata.remove(&(inode, keyid));
        if changes == 0 {
            return Err(DbError::NotFound);
        }
        debug!(inode, key = name, "attribute removed");
        Ok(())
    }

    /// Drop every attribute of `inode`. Used when a directory goes away.
    pub fn clear_attrs(&self, inode: u64) -> Result<usize, DbError> {
        let changes = self
            .db()
            .execute_write(queries::delete_attrs(inode))?
            .changes()?;
        self.caches().forget_inode(inode);
        Ok(changes)
    }

    /// Rename a metadata key everywhere it is used.
    pub fn rename_key(&self, old: &str, new: &str) -> Result<(), DbError> {
        let changes = self
            .db()
            .execute_write(queries::rename_key(old, new))?
            .changes()?;
        if changes == 0 {
            self.caches().keys.remove(old);
            return Err(DbError::NotFound);
        }
        self.caches().keys.rekey(old, new.to_string());
        Ok(())
    }

    /// Record that symlink `syminode` points at `datafile`.
    pub fn register_file(&self, syminode: u64, datafile: &DataFile) -> Result<(), DbError> {
        self.db().execute_write(queries::register_file(
            syminode,
            datafile.inode,
            &datafile.path,
        ))?;
        self.caches().symlinks.add(syminode, datafile.clone());
        debug!(syminode, datainode = datafile.inode, "registered file");
        Ok(())
    }

    /// Give a link-tree path a jfs_id, or return the one it already has.
    pub fn register_path(&self, datapath: &str) -> Result<i64, DbError> {
        self.db().execute_write(queries::insert_path(datapath))?;
        self.resolver.resolve_jfs_id(datapath)
    }

    /// Forget a symlink. Returns the data file when no other symlink refers
    /// to it any more, so the caller can delete the backing file.
    pub fn unlink_file(&self, syminode: u64) -> Result<Option<DataFile>, DbError> {
        let datafile = match self.resolver.resolve_datafile(syminode) {
            Ok(datafile) => datafile,
            Err(DbError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        self.db()
            .execute_write(queries::unlink_file(syminode, datafile.inode))?;
        self.caches().symlinks.remove(&syminode);

        match self
            .db()
            .execute_read(queries::datafile_by_inode(datafile.inode))
        {
            Ok(_) => Ok(None),
            Err(DbError::NotFound) => {
                self.caches().forget_inode(datafile.inode);
                debug!(syminode, datainode = datafile.inode, "data file orphaned");
                Ok(Some(datafile))
            }
            Err(e) => Err(e),
        }
    }

    /// Drop a path and everything below it.
    pub fn remove_path(&self, datapath: &str) -> Result<(), DbError> {
        self.db().execute_write(queries::delete_subtree(datapath))?;
        self.caches()
            .datapaths
            .retain(|_, path| !in_subtree(path, datapath));
        Ok(())
    }

    /// Move a path and everything below it. jfs_ids follow the moved entries;
    /// whatever was at `to` is dropped.
    pub fn rename_path(&self, from: &str, to: &str) -> Result<(), DbError> {
        self.db().execute_write(queries::rename_subtree(from, to))?;
        self.caches()
            .datapaths
            .retain(|_, path| !in_subtree(path, from) && !in_subtree(path, to));
        debug!(from, to, "renamed path");
        Ok(())
    }

    /// Drop cached state for a symlink without touching the database.
    pub fn forget_file(&self, syminode: u64) {
        if let Some(datafile) = self.caches().symlinks.remove(&syminode) {
            self.caches().forget_inode(datafile.inode);
        }
    }
}

/// `path` is `root` or lies below it.
pub fn in_subtree(path: &str, root: &str) -> bool {
    if root == "/" {
        return true;
    }
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_subtree() {
        assert!(in_subtree("/a", "/a"));
        assert!(in_subtree("/a/b/c", "/a"));
        assert!(!in_subtree("/ab", "/a"));
        assert!(!in_subtree("/b", "/a"));
        assert!(in_subtree("/anything", "/"));
    }
}

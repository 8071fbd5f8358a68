use std::path::{Path, PathBuf};

use crate::types::JfsConfig;

/// Database file name used when `database` is not configured.
pub const DEFAULT_DATABASE: &str = "jfs.db";
/// Directory under the store holding the user-visible symlink tree.
pub const LINKS_DIR: &str = "links";
/// Directory under the store holding the backing data files.
pub const DATA_DIR: &str = "data";

impl JfsConfig {
    /// Apply default inference rules to the configuration in place.
    pub fn apply_defaults(&mut self) {
        let database = self
            .database
            .take()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
        self.database = Some(resolve_against(&self.store, database));

        if let Some(file) = self.log.file.take() {
            self.log.file = Some(resolve_against(&self.store, file));
        }
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self) -> JfsConfig {
        let mut config = self.clone();
        config.apply_defaults();
        config
    }

    /// Absolute location of the database file.
    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(db) => resolve_against(&self.store, db.clone()),
            None => self.store.join(DEFAULT_DATABASE),
        }
    }

    /// Root of the user-visible link tree.
    pub fn links_dir(&self) -> PathBuf {
        self.store.join(LINKS_DIR)
    }

    /// Root of the backing data files.
    pub fn data_dir(&self) -> PathBuf {
        self.store.join(DATA_DIR)
    }
}

fn resolve_against(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_defaults_under_store() {
        let config = JfsConfig::with_store("/srv/jfs");
        assert_eq!(config.database_path(), PathBuf::from("/srv/jfs/jfs.db"));

        let effective = config.effective();
        assert_eq!(effective.database, Some(PathBuf::from("/srv/jfs/jfs.db")));
    }

    #[test]
    fn test_absolute_database_kept() {
        let mut config = JfsConfig::with_store("/srv/jfs");
        config.database = Some(PathBuf::from("/var/db/meta.db"));
        assert_eq!(config.database_path(), PathBuf::from("/var/db/meta.db"));
    }

    #[test]
    fn test_store_layout() {
        let config = JfsConfig::with_store("/srv/jfs");
        assert_eq!(config.links_dir(), PathBuf::from("/srv/jfs/links"));
        assert_eq!(config.data_dir(), PathBuf::from("/srv/jfs/data"));
    }
}

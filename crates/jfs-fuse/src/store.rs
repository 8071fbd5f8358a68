//! On-disk datastore layout.

use std::fs;
use std::path::{Path, PathBuf};

use jfs_config::JfsConfig;
use jfs_core::JfsError;
use jfs_db::{init_schema, open_connection, ConnectionMode};
use tracing::info;

/// Locations of the pieces of one datastore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub root: PathBuf,
    /// User-visible tree; regular files are symlinks into `data`.
    pub links: PathBuf,
    /// Backing files, named by UUID.
    pub data: PathBuf,
    pub database: PathBuf,
}

impl StoreLayout {
    pub fn from_config(config: &JfsConfig) -> Self {
        StoreLayout {
            root: config.store.clone(),
            links: config.links_dir(),
            data: config.data_dir(),
            database: config.database_path(),
        }
    }

    /// Resolve every directory to an absolute path. Fails if the store has
    /// not been initialized.
    pub fn canonicalize(&self) -> Result<Self, JfsError> {
        Ok(StoreLayout {
            root: existing(&self.root)?,
            links: existing(&self.links)?,
            data: existing(&self.data)?,
            database: match self.database.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => {
                    let name = self.database.file_name().ok_or_else(|| {
                        JfsError::Config(format!(
                            "database path {} has no file name",
                            self.database.display()
                        ))
                    })?;
                    existing(dir)?.join(name)
                }
                _ => self.database.clone(),
            },
        })
    }
}

fn existing(path: &Path) -> Result<PathBuf, JfsError> {
    fs::canonicalize(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => JfsError::NotFound(format!(
            "{} (run `jfs init` first)",
            path.display()
        )),
        _ => JfsError::Io(e),
    })
}

/// Create the datastore directories and the catalog schema. Safe to run on
/// an existing store.
pub fn init_store(config: &JfsConfig) -> Result<StoreLayout, JfsError> {
    let layout = StoreLayout::from_config(config);
    fs::create_dir_all(&layout.links)?;
    fs::create_dir_all(&layout.data)?;
    if let Some(dir) = layout.database.parent() {
        fs::create_dir_all(dir)?;
    }

    let conn = open_connection(&layout.database, ConnectionMode::ReadWrite)?;
    init_schema(&conn)?;

    info!(
        store = %layout.root.display(),
        database = %layout.database.display(),
        "initialized datastore"
    );
    layout.canonicalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_store_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = JfsConfig::with_store(dir.path().join("store"));

        let layout = init_store(&config).unwrap();
        assert!(layout.links.is_dir());
        assert!(layout.data.is_dir());
        assert!(layout.database.is_file());
        assert!(layout.root.is_absolute());

        // Running it again leaves the store usable.
        assert_eq!(init_store(&config).unwrap(), layout);
    }

    #[test]
    fn test_canonicalize_requires_initialized_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = JfsConfig::with_store(dir.path().join("missing"));
        assert!(matches!(
            StoreLayout::from_config(&config).canonicalize(),
            Err(JfsError::NotFound(_))
        ));
    }
}

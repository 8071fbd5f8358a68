//! Filesystem operations over a JFS datastore, independent of the FUSE driver.
//!
//! Inode numbers handed to the kernel are jfs_ids from the `paths` table, so
//! the root directory (jfs_id 1) is also FUSE's root inode. A regular file is
//! a symlink in `links/` pointing at a UUID-named file in `data/`. Extended
//! attributes of a file are stored against the data file's inode, those of a
//! directory against the directory's own inode.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs::{self, DirBuilder, File, Metadata, OpenOptions, Permissions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jfs_config::{JfsConfig, MountOptions};
use jfs_core::{create_caches, DataFile, JfsError, SharedCaches};
use jfs_db::{path_text, Catalog, DbError, JfsDb, SetMode, ROOT_JFS_ID};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::StoreLayout;

/// Error type for filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum FsOpError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    Exists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("invalid argument")]
    InvalidArg,
    #[error("no such attribute")]
    NoData,
    #[error("is a directory")]
    IsDir,
    #[error("not a directory")]
    NotDir,
    #[error("permission denied")]
    PermissionDenied,
    #[error("bad file handle")]
    BadHandle,
    #[error("os error {0}")]
    Os(i32),
    #[error("I/O error: {0}")]
    Io(String),
}

#[cfg(target_os = "linux")]
const NO_ATTR: i32 = libc::ENODATA;
#[cfg(not(target_os = "linux"))]
const NO_ATTR: i32 = libc::ENOATTR;

impl FsOpError {
    /// errno reported to the kernel.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsOpError::NotFound => libc::ENOENT,
            FsOpError::Exists => libc::EEXIST,
            FsOpError::NotEmpty => libc::ENOTEMPTY,
            FsOpError::InvalidArg => libc::EINVAL,
            FsOpError::NoData => NO_ATTR,
            FsOpError::IsDir => libc::EISDIR,
            FsOpError::NotDir => libc::ENOTDIR,
            FsOpError::PermissionDenied => libc::EACCES,
            FsOpError::BadHandle => libc::EBADF,
            FsOpError::Os(code) => *code,
            FsOpError::Io(_) => libc::EIO,
        }
    }
}

impl From<io::Error> for FsOpError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsOpError::NotFound,
            io::ErrorKind::AlreadyExists => FsOpError::Exists,
            io::ErrorKind::PermissionDenied => FsOpError::PermissionDenied,
            _ => match e.raw_os_error() {
                Some(libc::ENOTEMPTY) => FsOpError::NotEmpty,
                Some(code) => FsOpError::Os(code),
                None => FsOpError::Io(e.to_string()),
            },
        }
    }
}

impl From<DbError> for FsOpError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => FsOpError::NotFound,
            DbError::Constraint { .. } => FsOpError::Exists,
            DbError::Encoding(_) => FsOpError::InvalidArg,
            other => FsOpError::Io(other.to_string()),
        }
    }
}

impl From<JfsError> for FsOpError {
    fn from(e: JfsError) -> Self {
        match e {
            JfsError::NotFound(_) => FsOpError::NotFound,
            JfsError::Exists(_) => FsOpError::Exists,
            JfsError::Io(e) => e.into(),
            other => FsOpError::Io(other.to_string()),
        }
    }
}

/// Attribute lookups report a missing row as a missing attribute.
fn attr_error(e: DbError) -> FsOpError {
    match e {
        DbError::NotFound => FsOpError::NoData,
        other => other.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// Attributes of one entry as presented to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAttr {
    pub ino: u64,
    pub kind: EntryKind,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

impl EntryAttr {
    /// How long the kernel may cache attributes and entries.
    pub fn ttl() -> Duration {
        Duration::from_secs(1)
    }

    pub fn from_metadata(ino: u64, kind: EntryKind, meta: &Metadata) -> Self {
        EntryAttr {
            ino,
            kind,
            size: meta.len(),
            blocks: meta.blocks(),
            atime: unix_time(meta.atime(), meta.atime_nsec()),
            mtime: unix_time(meta.mtime(), meta.mtime_nsec()),
            ctime: unix_time(meta.ctime(), meta.ctime_nsec()),
            perm: (meta.mode() & 0o7777) as u16,
            // Each link-tree path is reported as its own single link.
            nlink: if kind == EntryKind::File {
                1
            } else {
                meta.nlink() as u32
            },
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }
}

fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = nsecs.clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::new(0, nanos)
    }
}

/// Result from a readdir operation.
pub struct ReadDirResult {
    /// Inode of the directory being listed.
    pub ino: u64,
    /// Inode of the parent directory.
    pub parent_ino: u64,
    /// Entries sorted by name, so offsets stay stable between calls.
    pub entries: Vec<DirEntry>,
}

/// A single directory entry.
pub struct DirEntry {
    pub ino: u64,
    pub name: String,
    pub kind: EntryKind,
}

/// Filesystem statistics for `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

/// What a link-tree path turned out to be.
enum Entry {
    Dir(Metadata),
    /// Symlink into `data/`.
    File {
        data: Metadata,
        datafile: DataFile,
    },
    /// Symlink pointing anywhere else.
    Symlink(Metadata),
    /// Plain file placed directly in `links/`.
    Other(Metadata),
}

impl Entry {
    fn attr(&self, ino: u64) -> EntryAttr {
        match self {
            Entry::Dir(meta) => EntryAttr::from_metadata(ino, EntryKind::Directory, meta),
            Entry::File { data, .. } => EntryAttr::from_metadata(ino, EntryKind::File, data),
            Entry::Symlink(meta) => EntryAttr::from_metadata(ino, EntryKind::Symlink, meta),
            Entry::Other(meta) => EntryAttr::from_metadata(ino, EntryKind::File, meta),
        }
    }

    /// Inode that extended attributes are stored against.
    fn attr_inode(&self) -> u64 {
        match self {
            Entry::File { datafile, .. } => datafile.inode,
            Entry::Dir(meta) | Entry::Symlink(meta) | Entry::Other(meta) => meta.ino(),
        }
    }
}

/// Core filesystem shared by the FUSE driver and tests.
pub struct JfsCore {
    layout: StoreLayout,
    db: Arc<JfsDb>,
    caches: SharedCaches,
    catalog: Catalog,
    mount: MountOptions,
    handles: Mutex<HashMap<u64, Arc<File>>>,
    next_fh: AtomicU64,
}

impl JfsCore {
    /// Open an initialized datastore described by `config`.
    pub fn open(config: &JfsConfig) -> Result<Self, JfsError> {
        let layout = StoreLayout::from_config(config).canonicalize()?;
        let db = Arc::new(JfsDb::open(&layout.database, &config.pools)?);
        let caches = create_caches(&config.cache);
        Ok(Self::new(layout, db, caches, config.mount.clone()))
    }

    pub fn new(
        layout: StoreLayout,
        db: Arc<JfsDb>,
        caches: SharedCaches,
        mount: MountOptions,
    ) -> Self {
        let catalog = Catalog::new(Arc::clone(&db), Arc::clone(&caches));
        JfsCore {
            layout,
            db,
            caches,
            catalog,
            mount,
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn caches(&self) -> &SharedCaches {
        &self.caches
    }

    /// Build a child path from parent path and name.
    pub fn child_path(parent_path: &str, name: &str) -> String {
        if parent_path == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent_path, name)
        }
    }

    fn parent_path(path: &str) -> &str {
        match path.rfind('/') {
            Some(0) | None => "/",
            Some(i) => &path[..i],
        }
    }

    fn full_path(&self, datapath: &str) -> PathBuf {
        self.layout.links.join(datapath.trim_start_matches('/'))
    }

    fn path_of(&self, ino: u64) -> Result<String, FsOpError> {
        let jfs_id = i64::try_from(ino).map_err(|_| FsOpError::NotFound)?;
        Ok(self.catalog.resolver().resolve_datapath(jfs_id)?)
    }

    /// jfs_id of a link-tree path, allocating one on first sight.
    fn id_of(&self, datapath: &str) -> Result<u64, FsOpError> {
        let jfs_id = match self.catalog.resolver().resolve_jfs_id(datapath) {
            Ok(id) => id,
            Err(DbError::NotFound) => self.catalog.register_path(datapath)?,
            Err(e) => return Err(e.into()),
        };
        Ok(jfs_id as u64)
    }

    fn child_of(&self, parent: u64, name: &str) -> Result<(String, PathBuf), FsOpError> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(FsOpError::InvalidArg);
        }
        let path = Self::child_path(&self.path_of(parent)?, name);
        let full = self.full_path(&path);
        Ok((path, full))
    }

    /// Data file behind symlink `syminode`, registering links made outside
    /// the mount the first time they are seen.
    fn datafile_for(&self, syminode: u64, target: &Path) -> Result<DataFile, FsOpError> {
        match self.catalog.resolver().resolve_datafile(syminode) {
            Ok(datafile) => return Ok(datafile),
            Err(DbError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        let data = fs::metadata(target)?;
        let datafile = DataFile {
            inode: data.ino(),
            path: path_text(target)?.to_string(),
        };
        self.catalog.register_file(syminode, &datafile)?;
        debug!(syminode, path = %datafile.path, "registered existing link");
        Ok(datafile)
    }

    fn data_target(&self, full: &Path) -> Result<Option<PathBuf>, FsOpError> {
        let target = fs::read_link(full)?;
        Ok(target.starts_with(&self.layout.data).then_some(target))
    }

    fn inspect(&self, full: &Path) -> Result<Entry, FsOpError> {
        let link = fs::symlink_metadata(full)?;
        if link.is_dir() {
            return Ok(Entry::Dir(link));
        }
        if !link.file_type().is_symlink() {
            return Ok(Entry::Other(link));
        }
        match self.data_target(full)? {
            Some(target) => {
                let datafile = self.datafile_for(link.ino(), &target)?;
                let data = fs::metadata(&target)?;
                Ok(Entry::File { data, datafile })
            }
            None => Ok(Entry::Symlink(link)),
        }
    }

    /// Make sure a link about to disappear is known to the catalog, so its
    /// data file can be reclaimed.
    fn claim_link(&self, link: &Metadata, full: &Path) -> Result<(), FsOpError> {
        if !link.file_type().is_symlink() {
            return Ok(());
        }
        if let Some(target) = self.data_target(full)? {
            match self.datafile_for(link.ino(), &target) {
                Ok(_) | Err(FsOpError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn remove_data(&self, datafile: &DataFile) {
        match fs::remove_file(&datafile.path) {
            Ok(()) => debug!(path = %datafile.path, "removed data file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %datafile.path, error = %e, "failed to remove data file"),
        }
    }

    fn insert_handle(&self, file: File) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().insert(fh, Arc::new(file));
        fh
    }

    fn handle(&self, fh: u64) -> Result<Arc<File>, FsOpError> {
        self.handles
            .lock()
            .get(&fh)
            .cloned()
            .ok_or(FsOpError::BadHandle)
    }

    /// Perform a lookup operation.
    pub fn do_lookup(&self, parent: u64, name: &str) -> Result<EntryAttr, FsOpError> {
        let (path, full) = self.child_of(parent, name)?;
        let entry = self.inspect(&full)?;
        let ino = self.id_of(&path)?;
        Ok(entry.attr(ino))
    }

    pub fn do_getattr(&self, ino: u64) -> Result<EntryAttr, FsOpError> {
        let path = self.path_of(ino)?;
        let entry = self.inspect(&self.full_path(&path))?;
        Ok(entry.attr(ino))
    }

    pub fn do_readdir(&self, ino: u64) -> Result<ReadDirResult, FsOpError> {
        let path = self.path_of(ino)?;
        let full = self.full_path(&path);
        if !fs::symlink_metadata(&full)?.is_dir() {
            return Err(FsOpError::NotDir);
        }

        let parent_ino = if ino == ROOT_JFS_ID as u64 {
            ino
        } else {
            self.id_of(Self::parent_path(&path))?
        };

        let mut entries = Vec::new();
        for dirent in fs::read_dir(&full)? {
            let dirent = dirent?;
            let name = match dirent.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(name = ?raw, "skipping non-UTF-8 entry");
                    continue;
                }
            };
            let file_type = dirent.file_type()?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_symlink() && self.data_target(&dirent.path())?.is_none() {
                EntryKind::Symlink
            } else {
                EntryKind::File
            };
            let ino = self.id_of(&Self::child_path(&path, &name))?;
            entries.push(DirEntry { ino, name, kind });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ReadDirResult {
            ino,
            parent_ino,
            entries,
        })
    }

    pub fn do_readlink(&self, ino: u64) -> Result<Vec<u8>, FsOpError> {
        let path = self.path_of(ino)?;
        let target = fs::read_link(self.full_path(&path))?;
        Ok(target.as_os_str().as_bytes().to_vec())
    }

    pub fn do_mkdir(&self, parent: u64, name: &str, mode: u32) -> Result<EntryAttr, FsOpError> {
        let (path, full) = self.child_of(parent, name)?;
        DirBuilder::new().mode(mode & 0o7777).create(&full)?;
        let ino = self.id_of(&path)?;
        debug!(path = %path, ino, "created directory");
        Ok(EntryAttr::from_metadata(
            ino,
            EntryKind::Directory,
            &fs::symlink_metadata(&full)?,
        ))
    }

    pub fn do_rmdir(&self, parent: u64, name: &str) -> Result<(), FsOpError> {
        let (path, full) = self.child_of(parent, name)?;
        let meta = fs::symlink_metadata(&full)?;
        if !meta.is_dir() {
            return Err(FsOpError::NotDir);
        }
        fs::remove_dir(&full)?;
        self.catalog.clear_attrs(meta.ino())?;
        self.catalog.remove_path(&path)?;
        Ok(())
    }

    /// Create a file: a fresh data file plus the symlink naming it. Returns
    /// the new entry and an open handle.
    pub fn do_create(
        &self,
        parent: u64,
        name: &str,
        mode: u32,
        flags: i32,
    ) -> Result<(EntryAttr, u64), FsOpError> {
        let (path, full) = self.child_of(parent, name)?;
        if fs::symlink_metadata(&full).is_ok() {
            return Err(FsOpError::Exists);
        }

        let data_path = self.layout.data.join(Uuid::new_v4().to_string());
        let mut options = open_options(flags);
        options.write(true).create_new(true).mode(mode & 0o7777);
        let file = options.open(&data_path)?;

        if let Err(e) = std::os::unix::fs::symlink(&data_path, &full) {
            let _ = fs::remove_file(&data_path);
            return Err(e.into());
        }

        let link = fs::symlink_metadata(&full)?;
        let data = file.metadata()?;
        let datafile = DataFile {
            inode: data.ino(),
            path: path_text(&data_path)?.to_string(),
        };
        self.catalog.register_file(link.ino(), &datafile)?;
        let ino = self.id_of(&path)?;
        let fh = self.insert_handle(file);

        debug!(path = %path, ino, data = %datafile.path, "created file");
        Ok((EntryAttr::from_metadata(ino, EntryKind::File, &data), fh))
    }

    pub fn do_open(&self, ino: u64, flags: i32) -> Result<u64, FsOpError> {
        let path = self.path_of(ino)?;
        let full = self.full_path(&path);
        let file = match self.inspect(&full)? {
            Entry::File { datafile, .. } => open_options(flags).open(&datafile.path)?,
            Entry::Other(_) => open_options(flags).open(&full)?,
            Entry::Dir(_) => return Err(FsOpError::IsDir),
            Entry::Symlink(_) => return Err(FsOpError::InvalidArg),
        };
        Ok(self.insert_handle(file))
    }

    pub fn do_release(&self, fh: u64) -> Result<(), FsOpError> {
        self.handles.lock().remove(&fh);
        Ok(())
    }

    pub fn do_read(&self, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>, FsOpError> {
        let offset = u64::try_from(offset).map_err(|_| FsOpError::InvalidArg)?;
        let file = self.handle(fh)?;

        let mut buf = vec![0u8; size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    pub fn do_write(&self, fh: u64, offset: i64, data: &[u8]) -> Result<u32, FsOpError> {
        let offset = u64::try_from(offset).map_err(|_| FsOpError::InvalidArg)?;
        let file = self.handle(fh)?;
        file.write_all_at(data, offset)?;
        u32::try_from(data.len()).map_err(|_| FsOpError::InvalidArg)
    }

    /// Truncate and chmod. Ownership and timestamps are left to the backing
    /// filesystem.
    pub fn do_setattr(
        &self,
        ino: u64,
        mode: Option<u32>,
        size: Option<u64>,
        fh: Option<u64>,
    ) -> Result<EntryAttr, FsOpError> {
        let path = self.path_of(ino)?;
        let full = self.full_path(&path);
        let entry = self.inspect(&full)?;
        let target = match &entry {
            Entry::File { datafile, .. } => PathBuf::from(&datafile.path),
            _ => full,
        };

        if let Some(size) = size {
            if matches!(entry, Entry::Dir(_)) {
                return Err(FsOpError::IsDir);
            }
            match fh.map(|fh| self.handle(fh)).transpose()? {
                Some(file) => file.set_len(size)?,
                None => OpenOptions::new().write(true).open(&target)?.set_len(size)?,
            }
        }
        if let Some(mode) = mode {
            fs::set_permissions(&target, Permissions::from_mode(mode & 0o7777))?;
        }

        self.do_getattr(ino)
    }

    /// Remove a file. The data file goes too once no link refers to it.
    pub fn do_unlink(&self, parent: u64, name: &str) -> Result<(), FsOpError> {
        let (path, full) = self.child_of(parent, name)?;
        let link = fs::symlink_metadata(&full)?;
        if link.is_dir() {
            return Err(FsOpError::IsDir);
        }
        self.claim_link(&link, &full)?;

        fs::remove_file(&full)?;
        if let Some(datafile) = self.catalog.unlink_file(link.ino())? {
            self.remove_data(&datafile);
        }
        self.catalog.remove_path(&path)?;
        debug!(path = %path, "unlinked");
        Ok(())
    }

    pub fn do_rename(
        &self,
        parent: u64,
        name: &str,
        newparent: u64,
        newname: &str,
    ) -> Result<(), FsOpError> {
        let (from, full_from) = self.child_of(parent, name)?;
        let (to, full_to) = self.child_of(newparent, newname)?;

        let source = fs::symlink_metadata(&full_from)?;
        let replaced = match fs::symlink_metadata(&full_to) {
            Ok(meta) if meta.ino() == source.ino() => return Ok(()),
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(meta) = &replaced {
            self.claim_link(meta, &full_to)?;
        }

        fs::rename(&full_from, &full_to)?;

        if let Some(meta) = replaced {
            if meta.is_dir() {
                self.catalog.clear_attrs(meta.ino())?;
            } else if let Some(datafile) = self.catalog.unlink_file(meta.ino())? {
                self.remove_data(&datafile);
            }
        }
        self.catalog.rename_path(&from, &to)?;
        Ok(())
    }

    fn attr_inode(&self, ino: u64) -> Result<u64, FsOpError> {
        let path = self.path_of(ino)?;
        Ok(self.inspect(&self.full_path(&path))?.attr_inode())
    }

    pub fn do_getxattr(&self, ino: u64, name: &str) -> Result<Vec<u8>, FsOpError> {
        let inode = self.attr_inode(ino)?;
        let value = self.catalog.get_attr(inode, name).map_err(attr_error)?;
        Ok(value.into_bytes())
    }

    /// Set an attribute. `flags` carries `XATTR_CREATE` / `XATTR_REPLACE`;
    /// values must be UTF-8.
    pub fn do_setxattr(
        &self,
        ino: u64,
        name: &str,
        value: &[u8],
        flags: i32,
    ) -> Result<(), FsOpError> {
        let mode = set_mode(flags)?;
        let value = std::str::from_utf8(value).map_err(|_| FsOpError::InvalidArg)?;
        let inode = self.attr_inode(ino)?;
        self.catalog
            .set_attr(inode, name, value, mode)
            .map_err(attr_error)
    }

    /// NUL-separated attribute names.
    pub fn do_listxattr(&self, ino: u64) -> Result<Vec<u8>, FsOpError> {
        let inode = self.attr_inode(ino)?;
        Ok(self.catalog.list_attrs(inode)?.to_nul_separated())
    }

    pub fn do_removexattr(&self, ino: u64, name: &str) -> Result<(), FsOpError> {
        let inode = self.attr_inode(ino)?;
        self.catalog.remove_attr(inode, name).map_err(attr_error)
    }

    /// Statistics of the filesystem holding the data files.
    #[allow(clippy::unnecessary_cast)]
    pub fn do_statfs(&self) -> Result<StatFs, FsOpError> {
        let path = CString::new(self.layout.data.as_os_str().as_bytes())
            .map_err(|_| FsOpError::InvalidArg)?;
        // SAFETY: statvfs is plain old data.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: `path` is NUL-terminated and `stat` is a valid out-pointer.
        if unsafe { libc::statvfs(path.as_ptr(), &mut stat) } != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(StatFs {
            blocks: stat.f_blocks as u64,
            bfree: stat.f_bfree as u64,
            bavail: stat.f_bavail as u64,
            files: stat.f_files as u64,
            ffree: stat.f_ffree as u64,
            bsize: stat.f_bsize as u32,
            namelen: stat.f_namemax as u32,
            frsize: stat.f_frsize as u32,
        })
    }

    /// Close handles, stop the database pools and empty the caches.
    pub fn shutdown(&self) {
        self.handles.lock().clear();
        let (read, write) = (self.db.read_stats(), self.db.write_stats());
        debug!(
            read_threads = read.threads,
            read_queued = read.queued,
            write_threads = write.threads,
            write_queued = write.queued,
            "stopping database pools"
        );
        self.db.shutdown();
        self.caches.clear_all();
        info!(store = %self.layout.root.display(), "filesystem shut down");
    }

    /// Mount the filesystem. Blocks until it is unmounted.
    pub fn mount(self, mountpoint: &Path) -> Result<(), JfsError> {
        use crate::unix_fuse::UnixFuse;
        use fuser::MountOption;

        let mut options = vec![
            MountOption::FSName(self.mount.fs_name.clone()),
            MountOption::DefaultPermissions,
        ];
        if self.mount.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.mount.allow_other {
            options.push(MountOption::AllowOther);
        }

        info!(mountpoint = %mountpoint.display(), store = %self.layout.root.display(), "mounting JFS");
        fuser::mount2(UnixFuse(self), mountpoint, &options)?;
        info!(mountpoint = %mountpoint.display(), "JFS unmounted");

        Ok(())
    }
}

fn open_options(flags: i32) -> OpenOptions {
    let mut options = OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => {
            options.write(true);
        }
        libc::O_RDWR => {
            options.read(true).write(true);
        }
        _ => {
            options.read(true);
        }
    }
    if flags & libc::O_TRUNC != 0 && flags & libc::O_ACCMODE != libc::O_RDONLY {
        options.truncate(true);
    }
    options
}

fn set_mode(flags: i32) -> Result<SetMode, FsOpError> {
    let create = flags & libc::XATTR_CREATE != 0;
    let replace = flags & libc::XATTR_REPLACE != 0;
    match (create, replace) {
        (false, false) => Ok(SetMode::Upsert),
        (true, false) => Ok(SetMode::Create),
        (false, true) => Ok(SetMode::Replace),
        (true, true) => Err(FsOpError::InvalidArg),
    }
}

/// Convert an `EntryAttr` to the `fuser` representation.
pub fn entry_attr_to_file_attr(attr: &EntryAttr) -> fuser::FileAttr {
    use fuser::{FileAttr, FileType};

    let kind = match attr.kind {
        EntryKind::File => FileType::RegularFile,
        EntryKind::Directory => FileType::Directory,
        EntryKind::Symlink => FileType::Symlink,
    };

    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind,
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

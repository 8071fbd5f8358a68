//! FUSE filesystem for JFS.
//!
//! [`JfsCore`] implements every operation against the datastore and catalog;
//! [`UnixFuse`] adapts it to `fuser`. Tests drive `JfsCore` directly, without
//! a mount.

#[cfg(unix)]
mod common;
#[cfg(unix)]
mod store;
#[cfg(unix)]
mod unix_fuse;

#[cfg(unix)]
pub use common::{
    entry_attr_to_file_attr, DirEntry, EntryAttr, EntryKind, FsOpError, JfsCore, ReadDirResult,
    StatFs,
};
#[cfg(unix)]
pub use store::{init_store, StoreLayout};
#[cfg(unix)]
pub use unix_fuse::UnixFuse;

//! Unix FUSE implementation using the `fuser` crate.

use std::ffi::OsStr;
use std::time::SystemTime;

use fuser::{
    FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use tracing::{debug, error};

use crate::common::{entry_attr_to_file_attr, EntryAttr, EntryKind, FsOpError, JfsCore};

/// Unix FUSE filesystem wrapper around `JfsCore`.
pub struct UnixFuse(pub JfsCore);

impl UnixFuse {
    fn error_to_errno(e: &FsOpError) -> i32 {
        e.to_errno()
    }
}

/// Answer an xattr request: report the size when the caller asks with a
/// zero-length buffer, the bytes when they fit, ERANGE otherwise.
fn reply_xattr(reply: ReplyXattr, size: u32, bytes: &[u8]) {
    let len = bytes.len() as u32;
    if size == 0 {
        reply.size(len);
    } else if len > size {
        reply.error(libc::ERANGE);
    } else {
        reply.data(bytes);
    }
}

macro_rules! name_or_einval {
    ($name:expr, $reply:expr) => {
        match $name.to_str() {
            Some(n) => n,
            None => {
                $reply.error(libc::EINVAL);
                return;
            }
        }
    };
}

impl Filesystem for UnixFuse {
    fn destroy(&mut self) {
        self.0.shutdown();
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name_str = name_or_einval!(name, reply);
        debug!("lookup: parent={}, name={}", parent, name_str);

        match self.0.do_lookup(parent, name_str) {
            Ok(attr) => {
                reply.entry(&EntryAttr::ttl(), &entry_attr_to_file_attr(&attr), 0);
            }
            Err(e) => {
                debug!("lookup failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        debug!("getattr: ino={}", ino);

        match self.0.do_getattr(ino) {
            Ok(attr) => reply.attr(&EntryAttr::ttl(), &entry_attr_to_file_attr(&attr)),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("setattr: ino={}, mode={:?}, size={:?}", ino, mode, size);

        match self.0.do_setattr(ino, mode, size, fh) {
            Ok(attr) => reply.attr(&EntryAttr::ttl(), &entry_attr_to_file_attr(&attr)),
            Err(e) => {
                error!("setattr failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        debug!("readlink: ino={}", ino);

        match self.0.do_readlink(ino) {
            Ok(target) => reply.data(&target),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let name_str = name_or_einval!(name, reply);
        debug!("mkdir: parent={}, name={}", parent, name_str);

        match self.0.do_mkdir(parent, name_str, mode & !umask) {
            Ok(attr) => reply.entry(&EntryAttr::ttl(), &entry_attr_to_file_attr(&attr), 0),
            Err(e) => {
                error!("mkdir failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str = name_or_einval!(name, reply);
        debug!("unlink: parent={}, name={}", parent, name_str);

        match self.0.do_unlink(parent, name_str) {
            Ok(()) => reply.ok(),
            Err(e) => {
                error!("unlink failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str = name_or_einval!(name, reply);
        debug!("rmdir: parent={}, name={}", parent, name_str);

        match self.0.do_rmdir(parent, name_str) {
            Ok(()) => reply.ok(),
            Err(e) => {
                debug!("rmdir failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let name_str = name_or_einval!(name, reply);
        let newname_str = name_or_einval!(newname, reply);
        debug!(
            "rename: {}/{} -> {}/{}",
            parent, name_str, newparent, newname_str
        );

        match self.0.do_rename(parent, name_str, newparent, newname_str) {
            Ok(()) => reply.ok(),
            Err(e) => {
                error!("rename failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open: ino={}, flags={:#x}", ino, flags);

        match self.0.do_open(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read: ino={}, offset={}, size={}", ino, offset, size);

        match self.0.do_read(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                error!("read failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write: ino={}, offset={}, size={}", ino, offset, data.len());

        match self.0.do_write(fh, offset, data) {
            Ok(written) => reply.written(written),
            Err(e) => {
                error!("write failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release: ino={}, fh={}", ino, fh);

        match self.0.do_release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: ino={}, offset={}", ino, offset);

        match self.0.do_readdir(ino) {
            Ok(result) => {
                let mut i = offset.max(0) as usize;

                // Add . and ..
                if i == 0 {
                    if reply.add(result.ino, 1, FileType::Directory, ".") {
                        reply.ok();
                        return;
                    }
                    i += 1;
                }
                if i == 1 {
                    if reply.add(result.parent_ino, 2, FileType::Directory, "..") {
                        reply.ok();
                        return;
                    }
                    i += 1;
                }

                for entry in result.entries.iter().skip(i - 2) {
                    i += 1;
                    let ft = match entry.kind {
                        EntryKind::File => FileType::RegularFile,
                        EntryKind::Directory => FileType::Directory,
                        EntryKind::Symlink => FileType::Symlink,
                    };
                    if reply.add(entry.ino, i as i64, ft, &entry.name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(e) => {
                error!("readdir failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        match self.0.do_statfs() {
            Ok(st) => reply.statfs(
                st.blocks, st.bfree, st.bavail, st.files, st.ffree, st.bsize, st.namelen,
                st.frsize,
            ),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let name_str = name_or_einval!(name, reply);
        debug!("setxattr: ino={}, name={}, flags={}", ino, name_str, flags);

        match self.0.do_setxattr(ino, name_str, value, flags) {
            Ok(()) => reply.ok(),
            Err(e) => {
                debug!("setxattr failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let name_str = name_or_einval!(name, reply);
        debug!("getxattr: ino={}, name={}, size={}", ino, name_str, size);

        match self.0.do_getxattr(ino, name_str) {
            Ok(value) => reply_xattr(reply, size, &value),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        debug!("listxattr: ino={}, size={}", ino, size);

        match self.0.do_listxattr(ino) {
            Ok(names) => reply_xattr(reply, size, &names),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str = name_or_einval!(name, reply);
        debug!("removexattr: ino={}, name={}", ino, name_str);

        match self.0.do_removexattr(ino, name_str) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::error_to_errno(&e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let name_str = name_or_einval!(name, reply);
        debug!("create: parent={}, name={}", parent, name_str);

        match self.0.do_create(parent, name_str, mode & !umask, flags) {
            Ok((attr, fh)) => {
                reply.created(&EntryAttr::ttl(), &entry_attr_to_file_attr(&attr), 0, fh, 0);
            }
            Err(e) => {
                error!("create failed: {}", e);
                reply.error(Self::error_to_errno(&e));
            }
        }
    }
}

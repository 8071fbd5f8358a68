//! Print the extended attributes of a link-tree entry without mounting.

use jfs_config::JfsConfig;
use jfs_db::ROOT_JFS_ID;
use jfs_fuse::JfsCore;

pub fn run(config: &JfsConfig, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let core = JfsCore::open(config)?;
    let result = print_attrs(&core, path);
    core.shutdown();
    result
}

fn print_attrs(core: &JfsCore, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut ino = ROOT_JFS_ID as u64;
    for name in path.split('/').filter(|c| !c.is_empty()) {
        ino = core
            .do_lookup(ino, name)
            .map_err(|e| format!("{}: {}", path, e))?
            .ino;
    }

    let names = core.do_listxattr(ino)?;
    for name in names.split(|b| *b == 0).filter(|n| !n.is_empty()) {
        let name = String::from_utf8_lossy(name);
        let value = core.do_getxattr(ino, &name)?;
        println!("{}={}", name, String::from_utf8_lossy(&value));
    }

    Ok(())
}

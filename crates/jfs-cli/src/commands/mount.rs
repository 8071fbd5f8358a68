//! Mount command for the JFS FUSE filesystem.

use std::path::PathBuf;

use jfs_config::JfsConfig;
use jfs_fuse::JfsCore;

/// Mount arguments.
pub struct MountArgs {
    /// Mount point path.
    pub mountpoint: PathBuf,
    /// Log to stderr instead of the configured log file.
    pub foreground: bool,
}

/// Run the mount command. Blocks until the filesystem is unmounted.
pub fn run(config: &JfsConfig, args: MountArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Ensure mount point exists
    if !args.mountpoint.exists() {
        std::fs::create_dir_all(&args.mountpoint)?;
    }

    let core = JfsCore::open(config)?;
    if args.foreground {
        eprintln!(
            "Mounting {} at {} (Ctrl-C or fusermount -u to stop)",
            config.store.display(),
            args.mountpoint.display()
        );
    }
    core.mount(&args.mountpoint)?;

    Ok(())
}

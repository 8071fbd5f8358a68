use jfs_config::JfsConfig;
use jfs_fuse::init_store;

pub fn run(config: &JfsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let layout = init_store(config)?;

    println!("Initialized JFS datastore at {}", layout.root.display());
    println!("  links:    {}", layout.links.display());
    println!("  data:     {}", layout.data.display());
    println!("  database: {}", layout.database.display());

    Ok(())
}

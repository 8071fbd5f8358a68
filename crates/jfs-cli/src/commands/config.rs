use jfs_config::JfsConfig;

pub fn run(config: &JfsConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Print as YAML for readability
    println!("{}", config.to_yaml()?);
    Ok(())
}

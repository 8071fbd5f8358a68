use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use jfs_config::JfsConfig;
use jfs_fuse::JfsCore;
use tempfile::TempDir;

/// Run the `jfs` binary isolated from any ambient configuration.
fn jfs(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_jfs"))
        .args(args)
        .current_dir(cwd)
        .env_remove("JFS_CONFIG")
        .env_remove("RUST_LOG")
        .env("HOME", cwd)
        .output()
        .unwrap()
}

fn write_config(dir: &TempDir, extra: &str) -> String {
    let store = dir.path().join("store");
    let config_path = dir.path().join("jfs.yaml");
    fs::write(
        &config_path,
        format!("store: {}\n{}", store.display(), extra),
    )
    .unwrap();
    config_path.to_str().unwrap().to_string()
}

#[test]
fn test_init_with_store_flag_and_no_config() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("s");

    let output = jfs(dir.path(), &["init", "--store", store.to_str().unwrap()]);
    assert!(output.status.success(), "{:?}", output);
    assert!(store.join("links").is_dir());
    assert!(store.join("data").is_dir());
    assert!(store.join("jfs.db").is_file());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Initialized JFS datastore"));
}

#[test]
fn test_missing_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let output = jfs(dir.path(), &["config"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No configuration file found"));
}

#[test]
fn test_config_found_in_working_directory() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "");

    let output = jfs(dir.path(), &["config"]);
    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let expected = dir.path().join("store").join("jfs.db");
    assert!(stdout.contains(&expected.display().to_string()));
    assert!(stdout.contains("max_threads: 256"));
}

#[test]
fn test_validate() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "");
    let output = jfs(dir.path(), &["--config", &config, "validate"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Configuration is valid."));

    let bad = write_config(
        &dir,
        "pools:\n  write:\n    min_threads: 1\n    max_threads: 2\n",
    );
    let output = jfs(dir.path(), &["--config", &bad, "validate"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("write pool"));
}

#[test]
fn test_attrs_lists_catalog_entries() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, "");
    let output = jfs(dir.path(), &["--config", &config_path, "init"]);
    assert!(output.status.success(), "{:?}", output);

    {
        let config = JfsConfig::from_file(Path::new(&config_path))
            .unwrap()
            .effective();
        let core = JfsCore::open(&config).unwrap();
        let album = core.do_mkdir(1, "album", 0o755).unwrap();
        let (attr, fh) = core.do_create(album.ino, "t.flac", 0o644, 0).unwrap();
        core.do_release(fh).unwrap();
        core.do_setxattr(attr.ino, "user.year", b"1965", 0).unwrap();
        core.do_setxattr(attr.ino, "user.artist", b"Nina", 0).unwrap();
        core.shutdown();
    }

    let output = jfs(
        dir.path(),
        &["--config", &config_path, "attrs", "/album/t.flac"],
    );
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "user.artist=Nina\nuser.year=1965\n"
    );

    let output = jfs(dir.path(), &["--config", &config_path, "attrs", "/nope"]);
    assert!(!output.status.success());
}

#[test]
fn test_log_file_receives_events() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("logs").join("jfs.log");
    let config_path = write_config(&dir, &format!("log:\n  file: {}\n", log.display()));

    let output = jfs(dir.path(), &["--config", &config_path, "init"]);
    assert!(output.status.success(), "{:?}", output);
    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("initialized datastore"));
}

pub mod attrs;
pub mod config;
pub mod init;
pub mod mount;
pub mod validate;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::error::DbError;

/// How long a connection retries while another holds the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// jfs_id of the link-tree root.
pub const ROOT_JFS_ID: i64 = 1;

/// Access mode of a worker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    ReadOnly,
    ReadWrite,
}

/// Open one connection with the durability settings shared by every worker.
///
/// `synchronous=OFF` and a truncated rollback journal trade crash durability
/// of the last committed writes for throughput.
pub fn open_connection(path: &Path, mode: ConnectionMode) -> Result<Connection, DbError> {
    let flags = match mode {
        ConnectionMode::ReadOnly => {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        }
        ConnectionMode::ReadWrite => {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        }
    };

    let open_err = |source| DbError::Open {
        path: path.to_path_buf(),
        source,
    };

    let conn = Connection::open_with_flags(path, flags).map_err(open_err)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(open_err)?;
    conn.execute_batch("PRAGMA synchronous=OFF;")
        .map_err(open_err)?;
    if mode == ConnectionMode::ReadWrite {
        conn.execute_batch("PRAGMA journal_mode=TRUNCATE;")
            .map_err(open_err)?;
    }

    debug!(path = %path.display(), ?mode, "opened database connection");
    Ok(conn)
}

/// Create the catalog tables if missing and seed the root path.
pub fn init_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS datafiles (
            datainode INTEGER PRIMARY KEY,
            datapath TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS symlinks (
            syminode INTEGER PRIMARY KEY,
            datainode INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS keys (
            keyid INTEGER PRIMARY KEY AUTOINCREMENT,
            keyname TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS metadata (
            inode INTEGER NOT NULL,
            keyid INTEGER NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (inode, keyid)
        );

        CREATE TABLE IF NOT EXISTS paths (
            jfs_id INTEGER PRIMARY KEY AUTOINCREMENT,
            datapath TEXT NOT NULL UNIQUE
        );

        CREATE INDEX IF NOT EXISTS idx_symlinks_datainode ON symlinks(datainode);
        CREATE INDEX IF NOT EXISTS idx_metadata_keyid ON metadata(keyid);

        INSERT OR IGNORE INTO paths (jfs_id, datapath) VALUES (1, '/');",
    )
    .map_err(|e| DbError::Query {
        sql: "schema".to_string(),
        source: e,
    })?;
    Ok(())
}

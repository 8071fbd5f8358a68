use std::path::{Path, PathBuf};

use jfs_config::PoolsConfig;
use jfs_core::{PoolError, PoolStats, ThreadPool, WorkerAttrs};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::DbError;
use crate::execute::execute;
use crate::op::{Completion, DbOperation, OpOutput};
use crate::schema::{init_schema, open_connection, ConnectionMode};

/// Pooled access to the catalog database.
///
/// Reads run on a pool of read-only connections; writes run on a pool with a
/// single read-write connection, so mutations are applied one at a time in
/// submission order. There is no ordering between the two pools: callers
/// wait for a write before issuing reads that depend on it.
pub struct JfsDb {
    path: PathBuf,
    read_pool: ThreadPool<Connection>,
    write_pool: ThreadPool<Connection>,
}

impl JfsDb {
    /// Create the schema if needed and set up both pools. Connections are
    /// opened lazily, one per worker thread.
    pub fn open(path: &Path, pools: &PoolsConfig) -> Result<Self, DbError> {
        {
            let conn = open_connection(path, ConnectionMode::ReadWrite)?;
            init_schema(&conn)?;
        }

        let read_pool = ThreadPool::new(
            &pools.read,
            WorkerAttrs::from_config("jfs-read", &pools.read),
            worker_factory(path, ConnectionMode::ReadOnly),
        )?;
        let write_pool = ThreadPool::new(
            &pools.write,
            WorkerAttrs::from_config("jfs-write", &pools.write),
            worker_factory(path, ConnectionMode::ReadWrite),
        )?;

        info!(
            path = %path.display(),
            read_max = pools.read.max_threads,
            write_max = pools.write.max_threads,
            "opened catalog database"
        );

        Ok(JfsDb {
            path: path.to_path_buf(),
            read_pool,
            write_pool,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Submit a read-only operation.
    pub fn read(&self, op: DbOperation) -> Result<Completion, DbError> {
        submit(&self.read_pool, op)
    }

    /// Submit a modifying operation to the single writer.
    pub fn write(&self, op: DbOperation) -> Result<Completion, DbError> {
        submit(&self.write_pool, op)
    }

    pub fn execute_read(&self, op: DbOperation) -> Result<OpOutput, DbError> {
        self.read(op)?.wait()
    }

    pub fn execute_write(&self, op: DbOperation) -> Result<OpOutput, DbError> {
        self.write(op)?.wait()
    }

    /// Block until both pools are idle.
    pub fn wait_for_drain(&self) {
        self.write_pool.wait_for_drain();
        self.read_pool.wait_for_drain();
    }

    /// Stop both pools. Pending operations complete with `Discarded`.
    pub fn shutdown(&self) {
        self.write_pool.shutdown();
        self.read_pool.shutdown();
    }

    pub fn read_stats(&self) -> PoolStats {
        self.read_pool.stats()
    }

    pub fn write_stats(&self) -> PoolStats {
        self.write_pool.stats()
    }
}

fn worker_factory(
    path: &Path,
    mode: ConnectionMode,
) -> impl Fn() -> Result<Connection, PoolError> + Send + Sync + 'static {
    let path = path.to_path_buf();
    move || open_connection(&path, mode).map_err(|e| PoolError::WorkerInit(e.to_string()))
}

fn submit(pool: &ThreadPool<Connection>, op: DbOperation) -> Result<Completion, DbError> {
    let (tx, completion) = Completion::channel(op.kind());
    pool.submit(move |conn: &mut Connection| {
        let result = execute(conn, &op);
        if tx.send(result).is_err() {
            debug!(kind = %op.kind(), "operation result dropped by submitter");
        }
    })?;
    Ok(completion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries;
    use jfs_config::PoolConfig;
    use std::time::Duration;

    fn small_pools() -> PoolsConfig {
        PoolsConfig {
            read: PoolConfig::new(1, 4, Duration::from_secs(5)),
            write: PoolConfig::new(1, 1, Duration::from_secs(5)),
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let db = JfsDb::open(&dir.path().join("jfs.db"), &small_pools()).unwrap();

        db.execute_write(queries::insert_key("artist")).unwrap();
        let id = db
            .execute_read(queries::keyid("artist"))
            .unwrap()
            .into_id()
            .unwrap();
        assert!(id > 0);

        assert!(matches!(
            db.execute_read(queries::keyid("album")),
            Err(DbError::NotFound)
        ));
    }

    #[test]
    fn test_root_path_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let db = JfsDb::open(&dir.path().join("jfs.db"), &small_pools()).unwrap();
        let root = db
            .execute_read(queries::datapath(crate::schema::ROOT_JFS_ID))
            .unwrap()
            .into_datapath()
            .unwrap();
        assert_eq!(root, "/");
    }

    #[test]
    fn test_reads_fail_on_read_only_connection_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = JfsDb::open(&dir.path().join("jfs.db"), &small_pools()).unwrap();
        assert!(matches!(
            db.execute_read(queries::insert_key("artist")),
            Err(DbError::Query { .. })
        ));
    }

    #[test]
    fn test_submit_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let db = JfsDb::open(&dir.path().join("jfs.db"), &small_pools()).unwrap();
        db.shutdown();
        assert!(matches!(
            db.execute_read(queries::keyid("artist")),
            Err(DbError::Pool(PoolError::ShuttingDown(_)))
        ));
    }
}

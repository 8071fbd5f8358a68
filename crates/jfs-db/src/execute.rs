//! Runs a [`DbOperation`] against a worker's connection and decodes the rows.
//!
//! Every prepared statement is dropped (and so reset or finalized) before the
//! function returns, on success and on error alike.

use rusqlite::{params_from_iter, Connection, ErrorCode, Row, Transaction};
use tracing::{debug, trace, warn};

use crate::error::DbError;
use crate::op::{DbOperation, KeyList, OpKind, OpOutput, Statement};

/// Execute `op` on `conn`.
pub fn execute(conn: &mut Connection, op: &DbOperation) -> Result<OpOutput, DbError> {
    trace!(kind = %op.kind(), sql = op.sql(), "executing operation");

    match op.kind() {
        OpKind::MultiWrite => run_transaction(conn, op.statements()),
        OpKind::Write => {
            let changes = run_write(conn, single(op)?)?;
            Ok(OpOutput::Written {
                changes,
                last_insert_rowid: conn.last_insert_rowid(),
            })
        }
        OpKind::Id => first_row(conn, single(op)?, |row| row.get(0)).map(OpOutput::Id),
        OpKind::Value => first_row(conn, single(op)?, |row| row.get(0)).map(OpOutput::Value),
        OpKind::Datapath => {
            first_row(conn, single(op)?, |row| row.get(0)).map(OpOutput::Datapath)
        }
        OpKind::DataFile => first_row(conn, single(op)?, |row| {
            let inode: i64 = row.get(0)?;
            let path: String = row.get(1)?;
            Ok((inode as u64, path))
        })
        .map(|(inode, path)| OpOutput::DataFile { inode, path }),
        OpKind::List => list_rows(conn, single(op)?).map(OpOutput::List),
    }
}

fn single(op: &DbOperation) -> Result<&Statement, DbError> {
    op.statements().first().ok_or(DbError::UnexpectedOutput {
        expected: "one statement",
        actual: "none",
    })
}

fn run_write(conn: &Connection, stmt: &Statement) -> Result<usize, DbError> {
    let mut prepared = conn
        .prepare_cached(stmt.sql())
        .map_err(|e| classify(stmt.sql(), e))?;
    prepared
        .execute(params_from_iter(stmt.params()))
        .map_err(|e| classify(stmt.sql(), e))
}

/// Step once. Zero rows is `NotFound`; extra rows are ignored.
fn first_row<T, F>(conn: &Connection, stmt: &Statement, extract: F) -> Result<T, DbError>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut prepared = conn
        .prepare_cached(stmt.sql())
        .map_err(|e| classify(stmt.sql(), e))?;
    prepared
        .query_row(params_from_iter(stmt.params()), extract)
        .map_err(|e| classify(stmt.sql(), e))
}

fn list_rows(conn: &Connection, stmt: &Statement) -> Result<KeyList, DbError> {
    let mut prepared = conn
        .prepare_cached(stmt.sql())
        .map_err(|e| classify(stmt.sql(), e))?;
    let mut rows = prepared
        .query(params_from_iter(stmt.params()))
        .map_err(|e| classify(stmt.sql(), e))?;

    let mut list = KeyList::default();
    while let Some(row) = rows.next().map_err(|e| classify(stmt.sql(), e))? {
        let key: String = row.get(0).map_err(|e| classify(stmt.sql(), e))?;
        let value: String = row.get(1).map_err(|e| classify(stmt.sql(), e))?;
        list.push(key, value);
    }
    Ok(list)
}

/// All statements commit together or not at all.
fn run_transaction(conn: &mut Connection, statements: &[Statement]) -> Result<OpOutput, DbError> {
    let tx = conn.transaction().map_err(|e| classify("BEGIN", e))?;

    let mut changes = 0;
    for stmt in statements {
        match run_in_transaction(&tx, stmt) {
            Ok(n) => changes += n,
            Err(e) => {
                debug!(sql = stmt.sql(), "rolling back transaction");
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                return Err(e);
            }
        }
    }

    tx.commit().map_err(|e| classify("COMMIT", e))?;
    Ok(OpOutput::Committed { changes })
}

fn run_in_transaction(tx: &Transaction<'_>, stmt: &Statement) -> Result<usize, DbError> {
    let mut prepared = tx
        .prepare_cached(stmt.sql())
        .map_err(|e| classify(stmt.sql(), e))?;
    prepared
        .execute(params_from_iter(stmt.params()))
        .map_err(|e| classify(stmt.sql(), e))
}

/// Map a rusqlite error onto `DbError`, logging real failures with their SQL.
fn classify(sql: &str, e: rusqlite::Error) -> DbError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound,
        rusqlite::Error::SqliteFailure(err, message) if err.code == ErrorCode::ConstraintViolation => {
            let message = message.unwrap_or_else(|| err.to_string());
            debug!(sql, %message, "constraint violation");
            DbError::Constraint { message }
        }
        other => {
            warn!(sql, error = %other, "query failed");
            DbError::Query {
                sql: sql.to_string(),
                source: other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;
    use rusqlite::types::Value;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn write(conn: &mut Connection, sql: &str, params: Vec<Value>) -> OpOutput {
        execute(conn, &DbOperation::query(OpKind::Write, sql, params)).unwrap()
    }

    #[test]
    fn test_write_reports_rowid() {
        let mut conn = conn();
        let out = write(
            &mut conn,
            "INSERT INTO keys (keyname) VALUES (?1)",
            vec![Value::Text("artist".to_string())],
        );
        match out {
            OpOutput::Written {
                changes,
                last_insert_rowid,
            } => {
                assert_eq!(changes, 1);
                assert!(last_insert_rowid > 0);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_id_zero_rows_is_not_found() {
        let mut conn = conn();
        let op = DbOperation::query(
            OpKind::Id,
            "SELECT keyid FROM keys WHERE keyname = ?1",
            vec![Value::Text("missing".to_string())],
        );
        assert!(matches!(execute(&mut conn, &op), Err(DbError::NotFound)));
    }

    #[test]
    fn test_scalar_ignores_extra_rows() {
        let mut conn = conn();
        for name in ["a", "b", "c"] {
            write(
                &mut conn,
                "INSERT INTO keys (keyname) VALUES (?1)",
                vec![Value::Text(name.to_string())],
            );
        }
        let op = DbOperation::query(
            OpKind::Value,
            "SELECT keyname FROM keys ORDER BY keyname",
            vec![],
        );
        assert_eq!(execute(&mut conn, &op).unwrap(), OpOutput::Value("a".to_string()));
    }

    #[test]
    fn test_datafile_row() {
        let mut conn = conn();
        write(
            &mut conn,
            "INSERT INTO datafiles (datainode, datapath) VALUES (?1, ?2)",
            vec![Value::Integer(77), Value::Text("/store/data/x".to_string())],
        );
        let op = DbOperation::query(
            OpKind::DataFile,
            "SELECT datainode, datapath FROM datafiles WHERE datainode = ?1",
            vec![Value::Integer(77)],
        );
        assert_eq!(
            execute(&mut conn, &op).unwrap(),
            OpOutput::DataFile {
                inode: 77,
                path: "/store/data/x".to_string()
            }
        );
    }

    #[test]
    fn test_list_in_query_order_with_totals() {
        let mut conn = conn();
        for (i, name) in ["genre", "artist"].iter().enumerate() {
            write(
                &mut conn,
                "INSERT INTO keys (keyname) VALUES (?1)",
                vec![Value::Text(name.to_string())],
            );
            write(
                &mut conn,
                "INSERT INTO metadata (inode, keyid, value) VALUES (5, ?1, ?2)",
                vec![Value::Integer(i as i64 + 1), Value::Text(format!("v{}", i))],
            );
        }

        let op = DbOperation::query(
            OpKind::List,
            "SELECT k.keyname, m.value FROM metadata m JOIN keys k ON k.keyid = m.keyid \
             WHERE m.inode = ?1 ORDER BY k.keyname",
            vec![Value::Integer(5)],
        );
        let list = execute(&mut conn, &op).unwrap().into_list().unwrap();
        assert_eq!(
            list.entries,
            vec![
                ("artist".to_string(), "v1".to_string()),
                ("genre".to_string(), "v0".to_string()),
            ]
        );
        assert_eq!(list.count, 2);
        assert_eq!(list.total_len, "artist".len() + 1 + "genre".len() + 1);
    }

    #[test]
    fn test_empty_list() {
        let mut conn = conn();
        let op = DbOperation::query(
            OpKind::List,
            "SELECT keyname, keyname FROM keys",
            vec![],
        );
        let list = execute(&mut conn, &op).unwrap().into_list().unwrap();
        assert_eq!((list.count, list.total_len), (0, 0));
    }

    #[test]
    fn test_constraint_is_distinct() {
        let mut conn = conn();
        let insert = DbOperation::query(
            OpKind::Write,
            "INSERT INTO keys (keyname) VALUES (?1)",
            vec![Value::Text("dup".to_string())],
        );
        execute(&mut conn, &insert).unwrap();
        assert!(matches!(
            execute(&mut conn, &insert),
            Err(DbError::Constraint { .. })
        ));
    }

    #[test]
    fn test_bad_sql_is_query_error() {
        let mut conn = conn();
        let op = DbOperation::query(OpKind::Write, "INSERT INTO nowhere VALUES (1)", vec![]);
        match execute(&mut conn, &op) {
            Err(DbError::Query { sql, .. }) => assert_eq!(sql, "INSERT INTO nowhere VALUES (1)"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_transaction_rolls_back_on_failure() {
        let mut conn = conn();
        let op = DbOperation::transaction(vec![
            Statement::new("INSERT INTO keys (keyname) VALUES (?1)").bind("one".to_string()),
            Statement::new("INSERT INTO keys (keyname) VALUES (?1)").bind("two".to_string()),
            Statement::new("INSERT INTO keys (keyname) VALUES (?1)").bind("one".to_string()),
        ]);
        assert!(matches!(
            execute(&mut conn, &op),
            Err(DbError::Constraint { .. })
        ));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_transaction_commits_all() {
        let mut conn = conn();
        let op = DbOperation::transaction(vec![
            Statement::new("INSERT INTO keys (keyname) VALUES (?1)").bind("one".to_string()),
            Statement::new("INSERT INTO keys (keyname) VALUES (?1)").bind("two".to_string()),
        ]);
        assert_eq!(
            execute(&mut conn, &op).unwrap(),
            OpOutput::Committed { changes: 2 }
        );
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}

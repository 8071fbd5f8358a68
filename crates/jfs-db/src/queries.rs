//! SQL for every catalog request.

use rusqlite::types::Value;

use crate::op::{DbOperation, OpKind, Statement};

fn inode(value: u64) -> Value {
    Value::Integer(value as i64)
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

/// Matches `path` itself and everything below it.
const SUBTREE: &str = "(datapath = ?1 OR substr(datapath, 1, length(?1) + 1) = ?1 || '/')";

pub fn datapath(jfs_id: i64) -> DbOperation {
    DbOperation::query(
        OpKind::Datapath,
        "SELECT datapath FROM paths WHERE jfs_id = ?1",
        vec![Value::Integer(jfs_id)],
    )
}

pub fn jfs_id(datapath: &str) -> DbOperation {
    DbOperation::query(
        OpKind::Id,
        "SELECT jfs_id FROM paths WHERE datapath = ?1",
        vec![text(datapath)],
    )
}

pub fn insert_path(datapath: &str) -> DbOperation {
    DbOperation::query(
        OpKind::Write,
        "INSERT OR IGNORE INTO paths (datapath) VALUES (?1)",
        vec![text(datapath)],
    )
}

pub fn delete_subtree(datapath: &str) -> DbOperation {
    DbOperation::query(
        OpKind::Write,
        format!("DELETE FROM paths WHERE {}", SUBTREE),
        vec![text(datapath)],
    )
}

/// Move `from` and its descendants to `to`, replacing whatever was at `to`.
pub fn rename_subtree(from: &str, to: &str) -> DbOperation {
    DbOperation::transaction(vec![
        Statement::new(format!("DELETE FROM paths WHERE {}", SUBTREE)).bind(to.to_string()),
        Statement::new(format!(
            "UPDATE paths SET datapath = ?2 || substr(datapath, length(?1) + 1) WHERE {}",
            SUBTREE
        ))
        .bind(from.to_string())
        .bind(to.to_string()),
    ])
}

pub fn datafile(syminode: u64) -> DbOperation {
    DbOperation::query(
        OpKind::DataFile,
        "SELECT d.datainode, d.datapath FROM symlinks s \
         JOIN datafiles d ON d.datainode = s.datainode WHERE s.syminode = ?1",
        vec![inode(syminode)],
    )
}

pub fn datafile_by_inode(datainode: u64) -> DbOperation {
    DbOperation::query(
        OpKind::Datapath,
        "SELECT datapath FROM datafiles WHERE datainode = ?1",
        vec![inode(datainode)],
    )
}

pub fn register_file(syminode: u64, datainode: u64, datapath: &str) -> DbOperation {
    DbOperation::transaction(vec![
        Statement::new("INSERT OR REPLACE INTO datafiles (datainode, datapath) VALUES (?1, ?2)")
            .bind(inode(datainode))
            .bind(datapath.to_string()),
        Statement::new("INSERT OR REPLACE INTO symlinks (syminode, datainode) VALUES (?1, ?2)")
            .bind(inode(syminode))
            .bind(inode(datainode)),
    ])
}

/// Drop a symlink; the data file and its metadata go too once nothing links to it.
pub fn unlink_file(syminode: u64, datainode: u64) -> DbOperation {
    const ORPHAN: &str = "NOT EXISTS (SELECT 1 FROM symlinks WHERE datainode = ?1)";
    DbOperation::transaction(vec![
        Statement::new("DELETE FROM symlinks WHERE syminode = ?1").bind(inode(syminode)),
        Statement::new(format!("DELETE FROM metadata WHERE inode = ?1 AND {}", ORPHAN))
            .bind(inode(datainode)),
        Statement::new(format!("DELETE FROM datafiles WHERE datainode = ?1 AND {}", ORPHAN))
            .bind(inode(datainode)),
    ])
}

pub fn keyid(name: &str) -> DbOperation {
    DbOperation::query(
        OpKind::Id,
        "SELECT keyid FROM keys WHERE keyname = ?1",
        vec![text(name)],
    )
}

pub fn insert_key(name: &str) -> DbOperation {
    DbOperation::query(
        OpKind::Write,
        "INSERT OR IGNORE INTO keys (keyname) VALUES (?1)",
        vec![text(name)],
    )
}

pub fn rename_key(old: &str, new: &str) -> DbOperation {
    DbOperation::query(
        OpKind::Write,
        "UPDATE keys SET keyname = ?2 WHERE keyname = ?1",
        vec![text(old), text(new)],
    )
}

pub fn value(inode_id: u64, keyid: i64) -> DbOperation {
    DbOperation::query(
        OpKind::Value,
        "SELECT value FROM metadata WHERE inode = ?1 AND keyid = ?2",
        vec![inode(inode_id), Value::Integer(keyid)],
    )
}

pub fn upsert_value(inode_id: u64, keyid: i64, value: &str) -> DbOperation {
    DbOperation::query(
        OpKind::Write,
        "INSERT INTO metadata (inode, keyid, value) VALUES (?1, ?2, ?3) \
         ON CONFLICT (inode, keyid) DO UPDATE SET value = excluded.value",
        vec![inode(inode_id), Value::Integer(keyid), text(value)],
    )
}

/// Fails with a constraint violation when the attribute exists.
pub fn insert_value(inode_id: u64, keyid: i64, value: &str) -> DbOperation {
    DbOperation::query(
        OpKind::Write,
        "INSERT INTO metadata (inode, keyid, value) VALUES (?1, ?2, ?3)",
        vec![inode(inode_id), Value::Integer(keyid), text(value)],
    )
}

/// Changes nothing when the attribute does not exist.
pub fn replace_value(inode_id: u64, keyid: i64, value: &str) -> DbOperation {
    DbOperation::query(
        OpKind::Write,
        "UPDATE metadata SET value = ?3 WHERE inode = ?1 AND keyid = ?2",
        vec![inode(inode_id), Value::Integer(keyid), text(value)],
    )
}

pub fn delete_value(inode_id: u64, keyid: i64) -> DbOperation {
    DbOperation::query(
        OpKind::Write,
        "DELETE FROM metadata WHERE inode = ?1 AND keyid = ?2",
        vec![inode(inode_id), Value::Integer(keyid)],
    )
}

pub fn delete_attrs(inode_id: u64) -> DbOperation {
    DbOperation::query(
        OpKind::Write,
        "DELETE FROM metadata WHERE inode = ?1",
        vec![inode(inode_id)],
    )
}

pub fn list_attrs(inode_id: u64) -> DbOperation {
    DbOperation::query(
        OpKind::List,
        "SELECT k.keyname, m.value FROM metadata m JOIN keys k ON k.keyid = m.keyid \
         WHERE m.inode = ?1 ORDER BY k.keyname",
        vec![inode(inode_id)],
    )
}

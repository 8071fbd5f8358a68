//! The unit of work handed to a database worker.
//!
//! A [`DbOperation`] carries SQL and bound parameters; submitting it yields a
//! [`Completion`] that the submitter blocks on. The worker that runs the
//! operation publishes exactly one result through a one-shot channel.

use std::fmt;
use std::path::Path;

use rusqlite::types::Value;
use tokio::sync::oneshot;

use crate::error::DbError;

/// What an operation does and the shape of its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// One modifying statement.
    Write,
    /// Several modifying statements in one transaction.
    MultiWrite,
    /// First column of the first row as an integer id.
    Id,
    /// First column of the first row as an attribute value.
    Value,
    /// First column of the first row as a datapath.
    Datapath,
    /// `(datainode, datapath)` of the first row.
    DataFile,
    /// Every `(key, value)` row.
    List,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Write => "write",
            OpKind::MultiWrite => "multi_write",
            OpKind::Id => "id",
            OpKind::Value => "value",
            OpKind::Datapath => "datapath",
            OpKind::DataFile => "datafile",
            OpKind::List => "list",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL text with positionally bound parameters (`?1`, `?2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Statement {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Statement {
            sql: sql.into(),
            params,
        }
    }

    /// Append the next positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Convert an OS path into query text. Non-UTF-8 paths are rejected.
pub fn path_text(path: &Path) -> Result<&str, DbError> {
    path.to_str()
        .ok_or_else(|| DbError::Encoding(path.to_string_lossy().into_owned()))
}

#[derive(Debug, Clone, PartialEq)]
enum Body {
    Single(Statement),
    Batch(Vec<Statement>),
}

/// A database request: a kind plus one statement, or a batch for `MultiWrite`.
#[derive(Debug, Clone, PartialEq)]
pub struct DbOperation {
    kind: OpKind,
    body: Body,
}

impl DbOperation {
    /// Build a single-statement operation. A `MultiWrite` built this way is a
    /// transaction of one statement.
    pub fn new(kind: OpKind, statement: Statement) -> Self {
        let body = match kind {
            OpKind::MultiWrite => Body::Batch(vec![statement]),
            _ => Body::Single(statement),
        };
        DbOperation { kind, body }
    }

    pub fn query(kind: OpKind, sql: impl Into<String>, params: Vec<Value>) -> Self {
        DbOperation::new(kind, Statement::with_params(sql, params))
    }

    /// Run `statements` in order inside one transaction.
    pub fn transaction(statements: Vec<Statement>) -> Self {
        DbOperation {
            kind: OpKind::MultiWrite,
            body: Body::Batch(statements),
        }
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn statements(&self) -> &[Statement] {
        match &self.body {
            Body::Single(statement) => std::slice::from_ref(statement),
            Body::Batch(statements) => statements,
        }
    }

    /// Text of the first statement, for logs.
    pub fn sql(&self) -> &str {
        self.statements().first().map(Statement::sql).unwrap_or("")
    }
}

/// `(key, value)` rows from a `List` operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyList {
    pub entries: Vec<(String, String)>,
    /// Sum of `key.len() + 1` over all keys: the size of a NUL-separated key list.
    pub total_len: usize,
    /// Number of rows.
    pub count: usize,
}

impl KeyList {
    pub fn push(&mut self, key: String, value: String) {
        self.total_len += key.len() + 1;
        self.count += 1;
        self.entries.push((key, value));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Keys joined with trailing NULs, as returned by `listxattr`.
    pub fn to_nul_separated(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.total_len);
        for key in self.keys() {
            buf.extend_from_slice(key.as_bytes());
            buf.push(0);
        }
        buf
    }
}

/// Result payload, shaped by the operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutput {
    Written { changes: usize, last_insert_rowid: i64 },
    Committed { changes: usize },
    Id(i64),
    Value(String),
    Datapath(String),
    DataFile { inode: u64, path: String },
    List(KeyList),
}

impl OpOutput {
    fn shape(&self) -> &'static str {
        match self {
            OpOutput::Written { .. } => "written",
            OpOutput::Committed { .. } => "committed",
            OpOutput::Id(_) => "id",
            OpOutput::Value(_) => "value",
            OpOutput::Datapath(_) => "datapath",
            OpOutput::DataFile { .. } => "datafile",
            OpOutput::List(_) => "list",
        }
    }

    fn unexpected(self, expected: &'static str) -> DbError {
        DbError::UnexpectedOutput {
            expected,
            actual: self.shape(),
        }
    }

    /// Rows changed by a `Write` or `MultiWrite`.
    pub fn changes(&self) -> Result<usize, DbError> {
        match self {
            OpOutput::Written { changes, .. } | OpOutput::Committed { changes } => Ok(*changes),
            other => Err(other.clone().unexpected("written")),
        }
    }

    pub fn into_id(self) -> Result<i64, DbError> {
        match self {
            OpOutput::Id(id) => Ok(id),
            other => Err(other.unexpected("id")),
        }
    }

    pub fn into_value(self) -> Result<String, DbError> {
        match self {
            OpOutput::Value(value) => Ok(value),
            other => Err(other.unexpected("value")),
        }
    }

    pub fn into_datapath(self) -> Result<String, DbError> {
        match self {
            OpOutput::Datapath(path) => Ok(path),
            other => Err(other.unexpected("datapath")),
        }
    }

    pub fn into_datafile(self) -> Result<(u64, String), DbError> {
        match self {
            OpOutput::DataFile { inode, path } => Ok((inode, path)),
            other => Err(other.unexpected("datafile")),
        }
    }

    pub fn into_list(self) -> Result<KeyList, DbError> {
        match self {
            OpOutput::List(list) => Ok(list),
            other => Err(other.unexpected("list")),
        }
    }
}

pub(crate) type CompletionSender = oneshot::Sender<Result<OpOutput, DbError>>;

/// Handle to the result of a submitted operation.
#[derive(Debug)]
#[must_use = "an operation's result is only observed through wait()"]
pub struct Completion {
    kind: OpKind,
    rx: oneshot::Receiver<Result<OpOutput, DbError>>,
}

impl Completion {
    pub(crate) fn channel(kind: OpKind) -> (CompletionSender, Completion) {
        let (tx, rx) = oneshot::channel();
        (tx, Completion { kind, rx })
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Block until the worker publishes the result.
    ///
    /// Must not be called from within an async runtime.
    pub fn wait(self) -> Result<OpOutput, DbError> {
        match self.rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(DbError::Discarded),
        }
    }
}

//! SQLite catalog for JFS.
//!
//! Database access goes through two worker pools owned by [`JfsDb`]: a wide
//! read pool of read-only connections and a single-connection write pool.
//! [`Resolver`] answers lookups from the shared caches, falling back to the
//! read pool; [`Catalog`] performs mutations and keeps the caches in step.

mod catalog;
mod db;
mod error;
mod execute;
mod op;
mod queries;
mod resolver;
mod schema;

pub use catalog::{in_subtree, Catalog, SetMode};
pub use db::JfsDb;
pub use error::DbError;
pub use execute::execute;
pub use op::{path_text, Completion, DbOperation, KeyList, OpKind, OpOutput, Statement};
pub use resolver::Resolver;
pub use schema::{init_schema, open_connection, ConnectionMode, ROOT_JFS_ID};

mod cache;
mod error;
mod pool;

pub use cache::{
    create_caches, CacheStats, Caches, DataFile, DatapathCache, KeyCache, MetaCache,
    ShadowCache, SharedCaches, SymlinkCache,
};
pub use error::{JfsError, PoolError};
pub use pool::{Job, PoolStats, ThreadPool, WorkerAttrs, WorkerFactory};

pub mod dsn;
pub mod manager;
pub mod opener;
pub mod pool;

pub use dsn::{parse_dsn, redact_dsn};
pub use manager::DatabaseManager;
pub use opener::{apply_settings, open, open_with, ping_with_retry, PoolSettings, RetryPolicy};
pub use pool::{DatabaseHandle, DatabasePool, DatabaseType};
pub(crate) use pool::with_pool;

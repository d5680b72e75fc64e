use std::fmt;

use confstore_core::{StoreError, StoreResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;

use super::dsn::redact_dsn;
use super::opener::{apply_settings, PoolSettings};

/// Database type detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    /// 按驱动名(即连接串的 scheme)识别数据库类型，不在白名单内的一律拒绝
    pub fn from_driver(driver: &str) -> StoreResult<Self> {
        match driver {
            "postgres" | "postgresql" => Ok(DatabaseType::PostgreSQL),
            "sqlite" => Ok(DatabaseType::SQLite),
            other => Err(StoreError::Configuration(format!(
                "不支持的数据库类型: {other}"
            ))),
        }
    }

    pub fn driver_name(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "postgres",
            DatabaseType::SQLite => "sqlite",
        }
    }
}

/// Database connection pool enum
#[derive(Debug, Clone)]
pub enum DatabasePool {
    PostgreSQL(sqlx::PgPool),
    SQLite(sqlx::SqlitePool),
}

/// 在具体的连接池类型上执行同一段代码
macro_rules! with_pool {
    ($pool:expr, $bound:ident => $body:expr) => {
        match $pool {
            $crate::database::DatabasePool::PostgreSQL($bound) => $body,
            $crate::database::DatabasePool::SQLite($bound) => $body,
        }
    };
}
pub(crate) use with_pool;

impl DatabasePool {
    /// 创建连接池但不建立任何连接
    pub fn connect_lazy(
        db_type: DatabaseType,
        data_source: &str,
        settings: &PoolSettings,
    ) -> Result<Self, sqlx::Error> {
        match db_type {
            DatabaseType::PostgreSQL => {
                let pool = apply_settings(PgPoolOptions::new(), settings).connect_lazy(data_source)?;
                Ok(DatabasePool::PostgreSQL(pool))
            }
            DatabaseType::SQLite => {
                let pool =
                    apply_settings(SqlitePoolOptions::new(), settings).connect_lazy(data_source)?;
                Ok(DatabasePool::SQLite(pool))
            }
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::PostgreSQL(_) => DatabaseType::PostgreSQL,
            DatabasePool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        with_pool!(self, pool => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()))
    }

    pub async fn close(&self) {
        with_pool!(self, pool => pool.close().await)
    }

    pub fn is_closed(&self) -> bool {
        with_pool!(self, pool => pool.is_closed())
    }
}

/// 一个已确认可用的数据库连接，附带它的数据源
#[derive(Clone)]
pub struct DatabaseHandle {
    data_source: String,
    pool: DatabasePool,
}

impl DatabaseHandle {
    pub fn new(data_source: impl Into<String>, pool: DatabasePool) -> Self {
        Self {
            data_source: data_source.into(),
            pool,
        }
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.database_type()
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        self.pool.health_check().await
    }

    pub async fn close(&self) {
        self.pool.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

impl fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("data_source", &redact_dsn(&self.data_source))
            .field("database_type", &self.database_type())
            .finish()
    }
}

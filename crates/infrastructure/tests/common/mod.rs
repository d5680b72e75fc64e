#![allow(dead_code)]

use std::time::Duration;

use confstore_core::ConfigCodec;
use confstore_infrastructure::{RetryPolicy, StoreOptions, CONFIGURATION_ID_KEY};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// 基于临时目录的 SQLite 数据库，目录随测试结束一起删除
pub struct TestDatabase {
    _dir: TempDir,
    pub path: std::path::PathBuf,
    pub dsn: String,
}

impl TestDatabase {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.db");
        let dsn = format!("sqlite://{}?mode=rwc", path.display());
        Self {
            _dir: dir,
            path,
            dsn,
        }
    }

    /// 另一个 SQLite 文件的连接串，用来模拟副本
    pub fn sibling(&self, name: &str) -> String {
        let path = self.path.with_file_name(format!("{name}.db"));
        format!("sqlite://{}?mode=rwc", path.display())
    }

    /// 绕过存储直接访问数据库
    pub async fn pool(&self) -> SqlitePool {
        SqlitePool::connect(&self.dsn).await.unwrap()
    }
}

/// 只尝试一次的探活策略
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 1,
        ping_timeout: Duration::from_secs(5),
        backoff: Duration::ZERO,
    }
}

/// 不读取进程环境变量的存储参数
pub fn test_options() -> StoreOptions {
    options_with_env(Vec::<(String, String)>::new())
}

pub fn options_with_env<I, K, V>(vars: I) -> StoreOptions
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    StoreOptions {
        retry: fast_retry(),
        codec: ConfigCodec::with_vars("CONFSTORE", vars),
        ..StoreOptions::default()
    }
}

pub async fn count_configurations(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM Configurations")
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn active_configuration_id(pool: &SqlitePool) -> Option<String> {
    sqlx::query_scalar::<_, Option<String>>("SELECT Value FROM Systems WHERE Name = $1")
        .bind(CONFIGURATION_ID_KEY)
        .fetch_optional(pool)
        .await
        .unwrap()
        .flatten()
}

pub async fn point_to(pool: &SqlitePool, configuration_id: &str) {
    sqlx::query("UPDATE Systems SET Value = $1 WHERE Name = $2")
        .bind(configuration_id)
        .bind(CONFIGURATION_ID_KEY)
        .execute(pool)
        .await
        .unwrap();
}

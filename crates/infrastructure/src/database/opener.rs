//! 数据库连接的打开与探活
//!
//! [`open`] 先创建连接池(不产生网络往返)，再循环探活，最多 [`DB_PING_ATTEMPTS`] 次，
//! 每次最长 [`DB_PING_TIMEOUT`]，失败后等待同样的时长再试。持续失败时会阻塞调用方约三分钟，
//! 只应在启动阶段调用。

use std::future::Future;
use std::io;
use std::time::Duration;

use confstore_core::models::SqlSettings;
use confstore_core::{StoreError, StoreResult};
use metrics::counter;
use sqlx::pool::PoolOptions;
use tracing::{error, info};

use super::dsn::redact_dsn;
use super::{DatabaseHandle, DatabasePool, DatabaseType};

pub const DB_PING_ATTEMPTS: u32 = 18;
pub const DB_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// 探活重试策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub ping_timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DB_PING_ATTEMPTS,
            ping_timeout: DB_PING_TIMEOUT,
            backoff: DB_PING_TIMEOUT,
        }
    }
}

/// 连接池调优参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    /// `None` 表示连接不过期
    pub conn_max_lifetime: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle_conns: 2,
            max_open_conns: 10,
            conn_max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl From<&SqlSettings> for PoolSettings {
    fn from(settings: &SqlSettings) -> Self {
        let defaults = PoolSettings::default();
        Self {
            max_idle_conns: settings.max_idle_conns.unwrap_or(defaults.max_idle_conns),
            max_open_conns: settings.max_open_conns.unwrap_or(defaults.max_open_conns),
            conn_max_lifetime: match settings.conn_max_lifetime_milliseconds {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => defaults.conn_max_lifetime,
            },
        }
    }
}

/// 空闲连接的回收时间
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
/// 不保留空闲连接时的回收时间
const NO_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// 将调优参数应用到连接池选项上
///
/// sqlx 的连接池在创建时定型，因此参数作用于 `PoolOptions`。sqlx 没有空闲连接上限，
/// 池子不保留常驻连接，空闲连接按超时回收；上限为 0 时几乎立即回收。
pub fn apply_settings<DB: sqlx::Database>(
    options: PoolOptions<DB>,
    settings: &PoolSettings,
) -> PoolOptions<DB> {
    let idle_timeout = if settings.max_idle_conns == 0 {
        NO_IDLE_TIMEOUT
    } else {
        IDLE_TIMEOUT
    };
    options
        .max_connections(settings.max_open_conns.max(1))
        .min_connections(0)
        .idle_timeout(Some(idle_timeout))
        .max_lifetime(settings.conn_max_lifetime)
}

/// 以默认调优参数和默认重试策略打开数据库
pub async fn open(driver: &str, data_source: &str) -> StoreResult<DatabaseHandle> {
    open_with(
        driver,
        data_source,
        &PoolSettings::default(),
        &RetryPolicy::default(),
    )
    .await
}

pub async fn open_with(
    driver: &str,
    data_source: &str,
    settings: &PoolSettings,
    policy: &RetryPolicy,
) -> StoreResult<DatabaseHandle> {
    let db_type = DatabaseType::from_driver(driver)?;
    let pool = DatabasePool::connect_lazy(db_type, data_source, settings).map_err(|e| {
        StoreError::connectivity(format!("无法打开{}数据库", db_type.driver_name()), e)
    })?;

    if let Err(err) = ping_with_retry(policy, || pool.health_check()).await {
        pool.close().await;
        return Err(err);
    }

    info!(
        data_source = %redact_dsn(data_source),
        driver = db_type.driver_name(),
        "数据库连接已就绪"
    );
    Ok(DatabaseHandle::new(data_source, pool))
}

/// 按策略反复执行 `ping`，直到成功或用尽次数
pub async fn ping_with_retry<F, Fut>(policy: &RetryPolicy, mut ping: F) -> StoreResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), sqlx::Error>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        if attempt > 1 {
            info!(attempt, "Pinging database");
        }

        let outcome = match tokio::time::timeout(policy.ping_timeout, ping()).await {
            Ok(result) => result,
            Err(_) => Err(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "ping timed out",
            ))),
        };

        match outcome {
            Ok(()) => {
                counter!("confstore_db_ping_attempts_total", "result" => "success").increment(1);
                return Ok(());
            }
            Err(err) if attempt >= attempts => {
                counter!("confstore_db_ping_attempts_total", "result" => "failure").increment(1);
                return Err(StoreError::connectivity("failed to ping db", err));
            }
            Err(err) => {
                counter!("confstore_db_ping_attempts_total", "result" => "failure").increment(1);
                error!(
                    attempt,
                    wait_seconds = policy.backoff.as_secs(),
                    error = %err,
                    "Failed to ping DB; retrying"
                );
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
}

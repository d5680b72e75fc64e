use std::sync::atomic::{AtomicU64, Ordering};

use confstore_core::models::SqlSettings;
use confstore_core::{StoreError, StoreResult};
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::dsn::redact_dsn;
use super::opener::{open_with, PoolSettings, RetryPolicy};
use super::DatabaseHandle;

#[derive(Default)]
struct PoolShape {
    master: Option<DatabaseHandle>,
    replicas: Vec<DatabaseHandle>,
    search_replicas: Vec<DatabaseHandle>,
    locked_to_master: bool,
}

/// 管理主库、只读副本和搜索副本连接
///
/// 读请求在副本间轮询；锁定到主库后所有读请求都走主库，用于写后立即读的场景。
pub struct DatabaseManager {
    rr_counter: AtomicU64,
    sr_counter: AtomicU64,
    shape: RwLock<PoolShape>,
    retry: RetryPolicy,
}

impl DatabaseManager {
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        Self {
            rr_counter: AtomicU64::new(0),
            sr_counter: AtomicU64::new(0),
            shape: RwLock::new(PoolShape::default()),
            retry,
        }
    }

    /// 连接主库和配置的副本
    ///
    /// 可以重复调用：主库一旦连上就不会被替换；副本列表按配置对齐，数据源未变的连接保留，
    /// 新增的打开，移除的关闭。
    pub async fn connect(&self, settings: &SqlSettings) -> StoreResult<()> {
        let mut shape = self.shape.write().await;
        let driver = settings.driver();
        let pool_settings = PoolSettings::from(settings);

        if shape.master.is_none() {
            let data_source = settings
                .data_source
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| StoreError::Configuration("未配置主库连接串".to_string()))?;

            let master = open_with(driver, data_source, &pool_settings, &self.retry)
                .await
                .inspect_err(|e| error!("打开主库连接失败: {e}"))?;
            shape.master = Some(master);
        }

        let (replicas, retired_replicas) = self
            .reconcile(
                &shape.replicas,
                &settings.data_source_replicas,
                driver,
                &pool_settings,
            )
            .await?;
        let (search_replicas, retired_search) = match self
            .reconcile(
                &shape.search_replicas,
                &settings.data_source_search_replicas,
                driver,
                &pool_settings,
            )
            .await
        {
            Ok(reconciled) => reconciled,
            Err(err) => {
                // 上一步新开的副本连接不会被采用
                close_unadopted(&shape.replicas, &replicas).await;
                return Err(err);
            }
        };

        shape.replicas = replicas;
        shape.search_replicas = search_replicas;

        for handle in retired_replicas.iter().chain(retired_search.iter()) {
            debug!(data_source = %redact_dsn(handle.data_source()), "关闭已移除的副本连接");
            handle.close().await;
        }

        info!(
            replicas = shape.replicas.len(),
            search_replicas = shape.search_replicas.len(),
            "数据库连接已建立"
        );
        Ok(())
    }

    /// 返回 (新的副本列表, 需要关闭的旧连接)。打开失败时已新开的连接会被关闭，原列表不受影响。
    async fn reconcile(
        &self,
        current: &[DatabaseHandle],
        wanted: &[String],
        driver: &str,
        pool_settings: &PoolSettings,
    ) -> StoreResult<(Vec<DatabaseHandle>, Vec<DatabaseHandle>)> {
        let mut remaining: Vec<Option<DatabaseHandle>> = current.iter().cloned().map(Some).collect();
        let mut next = Vec::with_capacity(wanted.len());
        let mut opened = Vec::new();

        for data_source in wanted {
            let reused = remaining
                .iter_mut()
                .find(|slot| matches!(slot, Some(h) if h.data_source() == data_source.as_str()))
                .and_then(Option::take);

            match reused {
                Some(handle) => next.push(handle),
                None => match open_with(driver, data_source, pool_settings, &self.retry).await {
                    Ok(handle) => {
                        opened.push(handle.clone());
                        next.push(handle);
                    }
                    Err(err) => {
                        error!(
                            data_source = %redact_dsn(data_source),
                            "打开副本连接失败: {err}"
                        );
                        for handle in &opened {
                            handle.close().await;
                        }
                        return Err(err);
                    }
                },
            }
        }

        Ok((next, remaining.into_iter().flatten().collect()))
    }

    pub async fn get_master(&self) -> StoreResult<DatabaseHandle> {
        let shape = self.shape.read().await;
        Self::master_of(&shape)
    }

    /// 只读查询使用的连接
    pub async fn get_replica(&self) -> StoreResult<DatabaseHandle> {
        let shape = self.shape.read().await;
        self.replica_of(&shape)
    }

    /// 搜索查询使用的连接；没有搜索副本时退化为普通副本路由
    pub async fn get_search_replica(&self) -> StoreResult<DatabaseHandle> {
        let shape = self.shape.read().await;

        if shape.locked_to_master {
            return Self::master_of(&shape);
        }
        if shape.search_replicas.is_empty() {
            return self.replica_of(&shape);
        }

        let n = self.sr_counter.fetch_add(1, Ordering::Relaxed);
        let index = (n % shape.search_replicas.len() as u64) as usize;
        counter!("confstore_db_route_total", "target" => "search_replica").increment(1);
        Ok(shape.search_replicas[index].clone())
    }

    fn master_of(shape: &PoolShape) -> StoreResult<DatabaseHandle> {
        counter!("confstore_db_route_total", "target" => "master").increment(1);
        shape.master.clone().ok_or(StoreError::NotConnected)
    }

    fn replica_of(&self, shape: &PoolShape) -> StoreResult<DatabaseHandle> {
        if shape.replicas.is_empty() || shape.locked_to_master {
            return Self::master_of(shape);
        }

        // Simple load balancing across the replicas.
        let n = self.rr_counter.fetch_add(1, Ordering::Relaxed);
        let index = (n % shape.replicas.len() as u64) as usize;
        counter!("confstore_db_route_total", "target" => "replica").increment(1);
        Ok(shape.replicas[index].clone())
    }

    pub async fn lock_to_master(&self) {
        self.shape.write().await.locked_to_master = true;
    }

    pub async fn unlock_from_master(&self) {
        self.shape.write().await.locked_to_master = false;
    }

    pub async fn is_locked_to_master(&self) -> bool {
        self.shape.read().await.locked_to_master
    }

    pub async fn replica_count(&self) -> usize {
        self.shape.read().await.replicas.len()
    }

    pub async fn search_replica_count(&self) -> usize {
        self.shape.read().await.search_replicas.len()
    }

    /// 关闭所有连接并清空状态
    pub async fn close(&self) {
        let mut shape = self.shape.write().await;

        if let Some(master) = shape.master.take() {
            master.close().await;
            debug!("主库连接已关闭");
        }
        for (i, replica) in shape.replicas.drain(..).enumerate() {
            replica.close().await;
            debug!("副本连接 #{i} 已关闭");
        }
        for (i, replica) in shape.search_replicas.drain(..).enumerate() {
            replica.close().await;
            debug!("搜索副本连接 #{i} 已关闭");
        }

        *shape = PoolShape::default();
        info!("数据库连接已全部关闭");
    }
}

/// 关闭 `candidates` 中不属于 `current` 的连接，返回关闭的数量
async fn close_unadopted(current: &[DatabaseHandle], candidates: &[DatabaseHandle]) -> usize {
    let mut closed = 0;
    for handle in candidates {
        if !current.iter().any(|h| h.data_source() == handle.data_source()) {
            debug!(data_source = %redact_dsn(handle.data_source()), "关闭未采用的副本连接");
            handle.close().await;
            closed += 1;
        }
    }
    closed
}

impl Default for DatabaseManager {
    fn default() -> Self {
        Self::new()
    }
}

//! 基于数据库的配置存储
//!
//! 每次持久化都会在 `Configurations` 表中写入一条新记录，再把 `Systems` 表里
//! `ConfigurationId` 这一行指向它。历史记录保留在表中，当前生效的只有指针指向的那条。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use confstore_core::config::sanitize::is_missing;
use confstore_core::{
    desanitize, AppSettings, ConfigCodec, ConfigListener, ConfigModel, EnvironmentOverrides,
    ListenerId, ListenerRegistry, StoreError, StoreResult,
};
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::schema::{ensure_schema, CONFIGURATION_ID_KEY};
use super::store::ConfigStore;
use crate::database::{
    opener, parse_dsn, redact_dsn, with_pool, DatabaseHandle, PoolSettings, RetryPolicy,
};

/// 打开存储时使用的参数
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub retry: RetryPolicy,
    pub pool: PoolSettings,
    pub codec: ConfigCodec,
}

struct StoreState<C> {
    config: Arc<C>,
    environment_overrides: Arc<EnvironmentOverrides>,
}

/// 一次读取得到的配置，以及它是否需要回写
struct LoadedConfig<C> {
    config: C,
    environment_overrides: EnvironmentOverrides,
    needs_save: bool,
}

pub struct DatabaseStore<C: ConfigModel = AppSettings> {
    dsn: String,
    handle: DatabaseHandle,
    codec: ConfigCodec,
    state: RwLock<StoreState<C>>,
    listeners: ListenerRegistry<C>,
}

impl<C: ConfigModel> DatabaseStore<C> {
    /// 按连接串打开存储并完成首次加载
    pub async fn open(dsn: &str) -> StoreResult<Self> {
        Self::open_with(dsn, StoreOptions::default()).await
    }

    pub async fn open_with(dsn: &str, options: StoreOptions) -> StoreResult<Self> {
        let (db_type, data_source) = parse_dsn(dsn)?;
        let handle = opener::open_with(
            db_type.driver_name(),
            &data_source,
            &options.pool,
            &options.retry,
        )
        .await?;

        let store = Self {
            dsn: dsn.to_string(),
            handle,
            codec: options.codec,
            state: RwLock::new(StoreState {
                config: Arc::new(C::default()),
                environment_overrides: Arc::new(EnvironmentOverrides::new()),
            }),
            listeners: ListenerRegistry::new(),
        };

        if let Err(err) = store.initialize().await {
            error!(dsn = %redact_dsn(dsn), "配置存储初始化失败: {err}");
            store.handle.close().await;
            return Err(err);
        }

        info!(dsn = %redact_dsn(dsn), "配置存储已打开");
        Ok(store)
    }

    async fn initialize(&self) -> StoreResult<()> {
        ensure_schema(&self.handle).await?;
        self.load().await
    }

    /// 当前配置的快照，调用方持有期间不会被修改
    pub async fn get(&self) -> Arc<C> {
        Arc::clone(&self.state.read().await.config)
    }

    pub async fn get_environment_overrides(&self) -> Arc<EnvironmentOverrides> {
        Arc::clone(&self.state.read().await.environment_overrides)
    }

    /// 替换当前配置但不写入数据库，成功时返回旧配置
    ///
    /// 候选配置中仍为占位符的敏感字段会取旧配置里的真实值。校验失败时当前配置保持不变。
    pub async fn set(&self, candidate: &C) -> StoreResult<Arc<C>> {
        let mut state = self.state.write().await;
        let previous = Arc::clone(&state.config);

        let mut next = candidate.clone();
        next.set_defaults();
        desanitize(previous.as_ref(), &mut next)?;

        if let Err(err) = next.is_valid() {
            counter!("confstore_config_sets_total", "result" => "invalid").increment(1);
            warn!("拒绝无效的新配置: {err:#}");
            return Err(StoreError::Validation(format!("{err:#}")));
        }

        let next = Arc::new(next);
        state.config = Arc::clone(&next);
        drop(state);

        counter!("confstore_config_sets_total", "result" => "ok").increment(1);
        self.listeners.notify(&previous, &next).await;
        Ok(previous)
    }

    /// 从数据库重新加载当前生效的配置
    pub async fn load(&self) -> StoreResult<()> {
        let LoadedConfig {
            config,
            environment_overrides,
            needs_save,
        } = self.read_reconciled().await?;

        let mut state = self.state.write().await;
        if needs_save {
            self.persist(&config)
                .await
                .inspect_err(|e| error!("加载后回写配置失败: {e}"))?;
        }

        let previous = Arc::clone(&state.config);
        let next = Arc::new(config);
        state.config = Arc::clone(&next);
        state.environment_overrides = Arc::new(environment_overrides);
        drop(state);

        counter!("confstore_config_loads_total").increment(1);
        debug!(persisted = needs_save, "配置已加载");
        self.listeners.notify(&previous, &next).await;
        Ok(())
    }

    /// 将当前配置原样写入数据库
    pub async fn save(&self) -> StoreResult<()> {
        let state = self.state.read().await;
        self.persist(&state.config).await
    }

    pub async fn close(&self) -> StoreResult<()> {
        self.handle.close().await;
        info!(dsn = %redact_dsn(&self.dsn), "配置存储已关闭");
        Ok(())
    }

    pub async fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&C, &C) + Send + Sync + 'static,
    {
        self.listeners.add(listener).await
    }

    pub async fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id).await
    }

    /// 读取当前生效的配置记录，没有时返回 `None`
    async fn read_active(&self) -> StoreResult<Option<Vec<u8>>> {
        let pointer: Option<Option<String>> = with_pool!(self.handle.pool(), pool => {
            sqlx::query_scalar::<_, Option<String>>("SELECT Value FROM Systems WHERE Name = $1")
                .bind(CONFIGURATION_ID_KEY)
                .fetch_optional(pool)
                .await
        })
        .map_err(|e| StoreError::Load(format!("查询当前配置指针失败: {e}")))?;

        let Some(configuration_id) = pointer.flatten().filter(|id| !id.is_empty()) else {
            return Ok(None);
        };

        let record: Option<String> = with_pool!(self.handle.pool(), pool => {
            sqlx::query_scalar::<_, String>("SELECT Value FROM Configurations WHERE Id = $1")
                .bind(&configuration_id)
                .fetch_optional(pool)
                .await
        })
        .map_err(|e| StoreError::Load(format!("查询配置记录 {configuration_id} 失败: {e}")))?;

        match record {
            Some(value) if !value.is_empty() => Ok(Some(value.into_bytes())),
            _ => {
                warn!(
                    configuration_id = %configuration_id,
                    "找不到当前生效的配置记录，回退到默认配置"
                );
                Ok(None)
            }
        }
    }

    /// 读取、补全并校验配置，不修改内存中的状态
    async fn read_reconciled(&self) -> StoreResult<LoadedConfig<C>> {
        let (data, mut needs_save) = match self.read_active().await? {
            Some(data) => (data, false),
            None => {
                let mut defaults = C::default();
                defaults.set_defaults();
                // 空库启动时写入一次，之后指针就有了着落
                (self.codec.marshal(&defaults)?, true)
            }
        };

        let (mut config, environment_overrides) = self.codec.unmarshal::<C>(&data, true)?;

        // set_defaults 会生成缺失的密钥，生成前先记下是否需要回写
        let raw = serde_json::to_value(&config)?;
        if C::generated_fields().iter().any(|path| is_missing(&raw, path)) {
            needs_save = true;
        }

        config.set_defaults();
        config
            .is_valid()
            .map_err(|e| StoreError::Validation(format!("{e:#}")))?;

        if config.fix() {
            needs_save = true;
        }

        Ok(LoadedConfig {
            config,
            environment_overrides,
            needs_save,
        })
    }

    /// 写入新记录并切换指针，失败时整个事务回滚
    async fn persist(&self, config: &C) -> StoreResult<()> {
        let id = Uuid::new_v4().simple().to_string();
        let outcome = match self.encode(config) {
            Ok(value) => self.write_record(&id, &value).await,
            Err(err) => Err(err),
        };

        match &outcome {
            Ok(()) => {
                counter!("confstore_config_saves_total", "result" => "ok").increment(1);
                info!(configuration_id = %id, "配置已保存");
            }
            Err(err) => {
                counter!("confstore_config_saves_total", "result" => "error").increment(1);
                error!("保存配置失败: {err}");
            }
        }
        outcome
    }

    fn encode(&self, config: &C) -> StoreResult<String> {
        let bytes = self.codec.marshal(config)?;
        String::from_utf8(bytes)
            .map_err(|e| StoreError::Serialization(format!("配置不是合法的 UTF-8: {e}")))
    }

    async fn write_record(&self, id: &str, value: &str) -> StoreResult<()> {
        let create_at = Utc::now().timestamp_millis();

        with_pool!(self.handle.pool(), pool => {
            let mut tx = pool
                .begin()
                .await
                .map_err(|e| StoreError::connectivity("开启事务失败", e))?;

            let written: StoreResult<()> = async {
                sqlx::query("INSERT INTO Configurations (Id, Value, CreateAt) VALUES ($1, $2, $3)")
                    .bind(id)
                    .bind(value)
                    .bind(create_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::persistence("写入配置记录", e))?;

                let updated = sqlx::query("UPDATE Systems SET Value = $1 WHERE Name = $2")
                    .bind(id)
                    .bind(CONFIGURATION_ID_KEY)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::persistence("切换配置指针", e))?
                    .rows_affected();

                if updated == 0 {
                    sqlx::query("INSERT INTO Systems (Name, Value) VALUES ($1, $2)")
                        .bind(CONFIGURATION_ID_KEY)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| StoreError::persistence("写入初始配置指针", e))?;
                }
                Ok(())
            }
            .await;

            match written {
                Ok(()) => tx
                    .commit()
                    .await
                    .map_err(|e| StoreError::connectivity("提交事务失败", e)),
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        error!("回滚配置事务失败: {rollback_err}");
                    }
                    Err(err)
                }
            }
        })
    }
}

impl<C: ConfigModel> fmt::Display for DatabaseStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dsn)
    }
}

impl<C: ConfigModel> fmt::Debug for DatabaseStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseStore")
            .field("dsn", &redact_dsn(&self.dsn))
            .field("handle", &self.handle)
            .finish()
    }
}

#[async_trait]
impl<C: ConfigModel> ConfigStore<C> for DatabaseStore<C> {
    async fn get(&self) -> Arc<C> {
        DatabaseStore::get(self).await
    }

    async fn get_environment_overrides(&self) -> Arc<EnvironmentOverrides> {
        DatabaseStore::get_environment_overrides(self).await
    }

    async fn set(&self, candidate: &C) -> StoreResult<Arc<C>> {
        DatabaseStore::set(self, candidate).await
    }

    async fn load(&self) -> StoreResult<()> {
        DatabaseStore::load(self).await
    }

    async fn save(&self) -> StoreResult<()> {
        DatabaseStore::save(self).await
    }

    async fn close(&self) -> StoreResult<()> {
        DatabaseStore::close(self).await
    }

    async fn add_listener(&self, listener: ConfigListener<C>) -> ListenerId {
        self.listeners.register(listener).await
    }

    async fn remove_listener(&self, id: ListenerId) -> bool {
        DatabaseStore::remove_listener(self, id).await
    }
}

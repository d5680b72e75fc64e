use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use confstore_core::{ConfigListener, ConfigModel, EnvironmentOverrides, ListenerId, StoreResult};

/// 配置存储的统一接口
///
/// `set` 只替换内存中的配置并通知监听器，不会写入后端；需要持久化时必须再调用 `save`。
/// 这样调用方可以先校验并广播，再决定是否落盘。
#[async_trait]
pub trait ConfigStore<C: ConfigModel>: fmt::Display + Send + Sync {
    /// 当前配置的快照
    async fn get(&self) -> Arc<C>;

    /// 最近一次加载时由环境变量覆盖的字段
    async fn get_environment_overrides(&self) -> Arc<EnvironmentOverrides>;

    /// 替换当前配置，返回被替换的旧配置
    async fn set(&self, candidate: &C) -> StoreResult<Arc<C>>;

    /// 从后端重新加载
    async fn load(&self) -> StoreResult<()>;

    /// 将当前配置写入后端
    async fn save(&self) -> StoreResult<()>;

    async fn close(&self) -> StoreResult<()>;

    async fn add_listener(&self, listener: ConfigListener<C>) -> ListenerId;

    async fn remove_listener(&self, id: ListenerId) -> bool;
}

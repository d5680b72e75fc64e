use thiserror::Error;

/// 配置存储错误类型定义
#[derive(Debug, Error)]
pub enum StoreError {
    /// 连接串不合法或使用了不支持的数据库类型
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 建立连接、探活或事务开启/提交失败
    #[error("连接错误: {context}: {source}")]
    Connectivity {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("配置校验失败: {0}")]
    Validation(String),

    /// 持久化过程中的某一步失败
    #[error("持久化失败({step}): {source}")]
    Persistence {
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("加载配置失败: {0}")]
    Load(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("数据库尚未连接")]
    NotConnected,
}

impl StoreError {
    pub fn connectivity(context: impl Into<String>, source: sqlx::Error) -> Self {
        StoreError::Connectivity {
            context: context.into(),
            source,
        }
    }

    pub fn persistence(step: &'static str, source: sqlx::Error) -> Self {
        StoreError::Persistence { step, source }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, StoreError::Configuration(_))
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Connectivity { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, StoreError::Persistence { .. })
    }

    pub fn is_load(&self) -> bool {
        matches!(self, StoreError::Load(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type StoreResult<T> = std::result::Result<T, StoreError>;

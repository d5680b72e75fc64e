use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// 引导配置的环境变量前缀，例如 `CONFSTORE_BOOT__DSN`
pub const BOOT_ENV_PREFIX: &str = "CONFSTORE_BOOT";

/// 进程自身的引导配置
///
/// 只包含找到配置数据库所需的最少信息，业务配置全部存放在数据库里。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub dsn: String,
    pub log_level: String,
    pub log_format: String,
    /// Prometheus 指标监听地址，为空时不启动
    pub metrics_listen: Option<String>,
    /// 是否按配置中的数据库设置建立主库和副本连接
    pub connect_replicas: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            dsn: "sqlite://confstore.db?mode=rwc".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_listen: None,
            connect_replicas: false,
        }
    }
}

impl BootstrapConfig {
    /// 从可选的 TOML 文件和进程环境变量加载
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        Self::load_from(config_path, None)
    }

    /// 与 [`BootstrapConfig::load`] 相同，但可以指定环境变量来源
    pub fn load_from(
        config_path: Option<&str>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let defaults = BootstrapConfig::default();
        let mut builder = Config::builder()
            .set_default("dsn", defaults.dsn)?
            .set_default("log_level", defaults.log_level)?
            .set_default("log_format", defaults.log_format)?
            .set_default("connect_replicas", defaults.connect_replicas)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(BOOT_ENV_PREFIX)
                .prefix_separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: BootstrapConfig = builder
            .build()
            .context("构建引导配置失败")?
            .try_deserialize()
            .context("反序列化引导配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dsn.trim().is_empty() {
            return Err(anyhow::anyhow!("配置数据库连接串不能为空"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!("不支持的日志级别: {}", self.log_level));
        }

        if !["json", "pretty"].contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!("不支持的日志格式: {}", self.log_format));
        }

        if let Some(addr) = self.metrics_listen.as_deref() {
            addr.parse::<SocketAddr>()
                .with_context(|| format!("无效的指标监听地址: {addr}"))?;
        }

        Ok(())
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_listen.as_deref().and_then(|addr| addr.parse().ok())
    }
}

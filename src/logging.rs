use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 本项目的日志目标
const CRATE_TARGETS: [&str; 3] = ["confstore", "confstore_core", "confstore_infrastructure"];

/// 未设置 `RUST_LOG` 时使用的过滤规则
///
/// 本项目的模块按传入级别输出；其它依赖只输出警告，sqlx 每条语句的日志太多。
fn default_directives(log_level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        CRATE_TARGETS
            .iter()
            .map(|target| format!("{target}={log_level}")),
    );
    directives.join(",")
}

/// 初始化日志系统，`RUST_LOG` 优先于传入的级别
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(log_level))
            .with_context(|| format!("无效的日志级别: {log_level}"))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
            .context("初始化JSON日志失败")?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("初始化Pretty日志失败")?,
        other => return Err(anyhow::anyhow!("不支持的日志格式: {other}")),
    }

    Ok(())
}

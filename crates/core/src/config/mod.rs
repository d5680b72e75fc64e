//! 配置文档契约
//!
//! 配置存储并不关心文档的具体内容，只依赖 [`ConfigModel`] 描述的一组确定性操作：
//! 克隆、填充默认值、校验、结构修正，以及哪些字段是敏感字段、哪些字段由默认值生成。
//!
//! - **codec**: 文档与字节之间的转换，以及环境变量覆盖
//! - **sanitize**: 敏感字段的脱敏与反脱敏
//! - **listeners**: 配置变更监听器注册表

pub mod codec;
pub mod listeners;
pub mod sanitize;

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};

pub use codec::ConfigCodec;
pub use listeners::{ConfigListener, ListenerId, ListenerRegistry};
pub use sanitize::{desanitize, sanitize, FAKE_SETTING};

/// 环境变量覆盖表: 字段路径(以 `.` 分隔) -> 覆盖后的值
pub type EnvironmentOverrides = BTreeMap<String, serde_json::Value>;

/// 配置文档需要满足的契约
///
/// `Default` 即"空文档"，`PartialEq` 为结构相等。
pub trait ConfigModel:
    Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 就地填充未设置的字段；缺失的密钥只生成一次
    fn set_defaults(&mut self);

    /// 校验文档是否可用
    fn is_valid(&self) -> anyhow::Result<()>;

    /// 修正历史遗留的结构问题，返回是否有改动
    fn fix(&mut self) -> bool {
        false
    }

    /// 敏感字段路径，客户端看到的是占位符
    fn sensitive_fields() -> &'static [&'static str];

    /// 由 `set_defaults` 生成的安全字段路径，缺失时加载后需要回写
    fn generated_fields() -> &'static [&'static str];
}

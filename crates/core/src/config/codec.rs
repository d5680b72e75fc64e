//! 配置文档编解码
//!
//! 文档以 JSON 形式持久化。解码时先铺上空文档的完整结构，再合并存储的内容，
//! 最后按需叠加形如 `CONFSTORE__SQL_SETTINGS__DATA_SOURCE` 的环境变量。

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::{ConfigModel, EnvironmentOverrides};
use crate::errors::{StoreError, StoreResult};

/// 默认的环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "CONFSTORE";

const SEPARATOR: &str = "__";

#[derive(Debug, Clone)]
enum EnvSource {
    Process,
    Fixed(BTreeMap<String, String>),
}

/// 配置编解码器
#[derive(Debug, Clone)]
pub struct ConfigCodec {
    prefix: String,
    source: EnvSource,
}

impl ConfigCodec {
    /// 从进程环境变量读取覆盖值
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            source: EnvSource::Process,
        }
    }

    /// 使用固定的一组变量代替进程环境
    pub fn with_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            source: EnvSource::Fixed(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn marshal<C: ConfigModel>(&self, config: &C) -> StoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(config)
            .map_err(|e| StoreError::Serialization(format!("序列化配置失败: {e}")))
    }

    pub fn unmarshal<C: ConfigModel>(
        &self,
        data: &[u8],
        allow_environment_overrides: bool,
    ) -> StoreResult<(C, EnvironmentOverrides)> {
        let stored: Value = serde_json::from_slice(data)
            .map_err(|e| StoreError::Load(format!("解析配置失败: {e}")))?;

        let mut merged = serde_json::to_value(C::default())?;
        merge(&mut merged, stored);

        let overrides = if allow_environment_overrides {
            self.apply_environment(&mut merged)
        } else {
            EnvironmentOverrides::new()
        };

        let config = serde_json::from_value(merged)
            .map_err(|e| StoreError::Load(format!("反序列化配置失败: {e}")))?;
        Ok((config, overrides))
    }

    fn vars(&self) -> BTreeMap<String, String> {
        match &self.source {
            EnvSource::Process => std::env::vars().collect(),
            EnvSource::Fixed(vars) => vars.clone(),
        }
    }

    fn apply_environment(&self, document: &mut Value) -> EnvironmentOverrides {
        let mut overrides = EnvironmentOverrides::new();
        let key_prefix = format!("{}{}", self.prefix, SEPARATOR);

        for (name, raw) in self.vars() {
            let Some(rest) = name.strip_prefix(&key_prefix) else {
                continue;
            };
            let segments: Vec<String> = rest
                .split(SEPARATOR)
                .map(|s| s.to_ascii_lowercase())
                .collect();

            let Some(slot) = locate_mut(document, &segments) else {
                debug!("忽略未知的环境变量覆盖: {name}");
                continue;
            };
            let value = coerce(slot, &raw);
            *slot = value.clone();
            overrides.insert(segments.join("."), value);
        }

        overrides
    }
}

impl Default for ConfigCodec {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_PREFIX)
    }
}

/// 将 `incoming` 递归合并到 `base`，对象按键合并，其余类型直接替换
fn merge(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => merge_objects(base, incoming),
        (base, incoming) => *base = incoming,
    }
}

fn merge_objects(base: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match base.get_mut(&key) {
            Some(existing) => merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// 只定位文档中已经存在的叶子字段
fn locate_mut<'a>(document: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let slot = segments
        .iter()
        .try_fold(document, |current, segment| current.get_mut(segment.as_str()))?;
    if slot.is_object() {
        return None;
    }
    Some(slot)
}

/// 按已有字段的类型解释环境变量的字符串值
fn coerce(existing: &Value, raw: &str) -> Value {
    match existing {
        Value::String(_) => Value::String(raw.to_string()),
        Value::Array(_) => match serde_json::from_str::<Value>(raw) {
            Ok(list @ Value::Array(_)) => list,
            _ => Value::Array(
                raw.split_whitespace()
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            ),
        },
        _ => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppSettings;
    use serde_json::json;

    #[test]
    fn test_marshal_then_unmarshal_without_overrides() {
        let mut cfg = AppSettings::default();
        cfg.set_defaults();

        let codec = ConfigCodec::with_vars(
            "CONFSTORE",
            [("CONFSTORE__SQL_SETTINGS__MAX_OPEN_CONNS", "7")],
        );
        let bytes = codec.marshal(&cfg).unwrap();
        let (loaded, overrides): (AppSettings, _) = codec.unmarshal(&bytes, false).unwrap();

        assert_eq!(loaded, cfg);
        assert!(overrides.is_empty());
    }

    #[test]
    fn test_environment_overrides_are_typed_and_recorded() {
        let codec = ConfigCodec::with_vars(
            "CONFSTORE",
            [
                ("CONFSTORE__SQL_SETTINGS__MAX_OPEN_CONNS", "42"),
                ("CONFSTORE__SQL_SETTINGS__TRACE", "true"),
                ("CONFSTORE__SERVICE_SETTINGS__SITE_URL", "https://chat.example.com"),
                ("CONFSTORE__SQL_SETTINGS__DATA_SOURCE_REPLICAS", "sqlite://a sqlite://b"),
                ("CONFSTORE__NO_SUCH_SECTION__FIELD", "ignored"),
                ("OTHER__SQL_SETTINGS__TRACE", "false"),
            ],
        );

        let mut cfg = AppSettings::default();
        cfg.set_defaults();
        let bytes = codec.marshal(&cfg).unwrap();
        let (loaded, overrides): (AppSettings, _) = codec.unmarshal(&bytes, true).unwrap();

        assert_eq!(loaded.sql_settings.max_open_conns, Some(42));
        assert_eq!(loaded.sql_settings.trace, Some(true));
        assert_eq!(
            loaded.service_settings.site_url.as_deref(),
            Some("https://chat.example.com")
        );
        assert_eq!(
            loaded.sql_settings.data_source_replicas,
            vec!["sqlite://a".to_string(), "sqlite://b".to_string()]
        );

        assert_eq!(overrides.len(), 4);
        assert_eq!(overrides.get("sql_settings.max_open_conns"), Some(&json!(42)));
        assert!(!overrides.contains_key("no_such_section.field"));
    }

    #[test]
    fn test_unmarshal_fills_missing_sections() {
        let codec = ConfigCodec::with_vars("CONFSTORE", Vec::<(String, String)>::new());
        let partial = br#"{"service_settings": {"site_url": "http://localhost:8065"}}"#;

        let (loaded, _): (AppSettings, _) = codec.unmarshal(partial, true).unwrap();
        assert_eq!(
            loaded.service_settings.site_url.as_deref(),
            Some("http://localhost:8065")
        );
        assert_eq!(loaded.sql_settings, AppSettings::default().sql_settings);
    }

    #[test]
    fn test_unmarshal_rejects_garbage() {
        let codec = ConfigCodec::default();
        let err = codec.unmarshal::<AppSettings>(b"not json", true).unwrap_err();
        assert!(err.is_load());
    }
}

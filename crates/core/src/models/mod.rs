pub mod database;
pub mod settings;

use anyhow::Context;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ConfigModel;

pub use database::{SqlSettings, DRIVER_POSTGRES, DRIVER_SQLITE};
pub use settings::{EmailSettings, FileSettings, PluginSettings, PluginState, ServiceSettings};

/// 生成指定长度的随机字母数字串，用于密钥和盐值
pub fn new_random_string(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// 服务器进程的完整配置文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub service_settings: ServiceSettings,
    #[serde(default)]
    pub sql_settings: SqlSettings,
    #[serde(default)]
    pub file_settings: FileSettings,
    #[serde(default)]
    pub email_settings: EmailSettings,
    #[serde(default)]
    pub plugin_settings: PluginSettings,
}

impl ConfigModel for AppSettings {
    fn set_defaults(&mut self) {
        self.service_settings.set_defaults();
        self.sql_settings.set_defaults();
        self.file_settings.set_defaults();
        self.email_settings.set_defaults();
        self.plugin_settings.set_defaults();
    }

    fn is_valid(&self) -> anyhow::Result<()> {
        self.service_settings
            .validate()
            .context("服务配置验证失败")?;
        self.sql_settings.validate().context("数据库配置验证失败")?;
        self.file_settings.validate().context("文件配置验证失败")?;
        self.email_settings.validate().context("邮件配置验证失败")?;
        Ok(())
    }

    /// 去掉站点URL末尾多余的 `/`
    fn fix(&mut self) -> bool {
        match self.service_settings.site_url.as_mut() {
            Some(url) if url.len() > 1 && url.ends_with('/') => {
                let trimmed = url.trim_end_matches('/').to_string();
                *url = trimmed;
                true
            }
            _ => false,
        }
    }

    fn sensitive_fields() -> &'static [&'static str] {
        &[
            "sql_settings.data_source",
            "sql_settings.data_source_replicas",
            "sql_settings.data_source_search_replicas",
            "sql_settings.at_rest_encrypt_key",
            "file_settings.public_link_salt",
            "email_settings.smtp_password",
            "email_settings.invite_salt",
        ]
    }

    fn generated_fields() -> &'static [&'static str] {
        &[
            "sql_settings.at_rest_encrypt_key",
            "file_settings.public_link_salt",
            "email_settings.invite_salt",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_with_defaults_is_valid() {
        let mut cfg = AppSettings::default();
        assert!(cfg.is_valid().is_err());

        cfg.set_defaults();
        assert!(cfg.is_valid().is_ok());
    }

    #[test]
    fn test_set_defaults_generates_secrets_once() {
        let mut cfg = AppSettings::default();
        cfg.set_defaults();
        let generated = cfg.clone();

        cfg.set_defaults();
        assert_eq!(cfg, generated);
        assert_ne!(
            cfg.file_settings.public_link_salt,
            cfg.email_settings.invite_salt
        );
    }

    #[test]
    fn test_fix_trims_site_url() {
        let mut cfg = AppSettings::default();
        cfg.set_defaults();
        cfg.service_settings.site_url = Some("https://chat.example.com//".to_string());

        assert!(cfg.fix());
        assert_eq!(
            cfg.service_settings.site_url.as_deref(),
            Some("https://chat.example.com")
        );
        assert!(!cfg.fix());
    }

    #[test]
    fn test_invalid_site_url() {
        let mut cfg = AppSettings::default();
        cfg.set_defaults();
        cfg.service_settings.site_url = Some("ftp://example.com".to_string());
        assert!(cfg.is_valid().is_err());
    }

    #[test]
    fn test_random_string() {
        let s = new_random_string(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

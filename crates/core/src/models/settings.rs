use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::new_random_string;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub site_url: Option<String>,
    pub listen_address: Option<String>,
    pub enable_developer: Option<bool>,
}

impl ServiceSettings {
    pub fn set_defaults(&mut self) {
        self.site_url.get_or_insert_with(String::new);
        self.listen_address.get_or_insert_with(|| ":8065".to_string());
        self.enable_developer.get_or_insert(false);
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(url) = self.site_url.as_deref().filter(|u| !u.is_empty()) {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(anyhow::anyhow!("站点URL必须以http://或https://开头: {url}"));
            }
        }

        if self.listen_address.as_deref().map_or(true, str::is_empty) {
            return Err(anyhow::anyhow!("监听地址不能为空"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSettings {
    pub driver_name: Option<String>,
    pub directory: Option<String>,
    pub enable_public_link: Option<bool>,
    pub public_link_salt: Option<String>,
}

impl FileSettings {
    pub fn set_defaults(&mut self) {
        self.driver_name.get_or_insert_with(|| "local".to_string());
        self.directory.get_or_insert_with(|| "./data/".to_string());
        self.enable_public_link.get_or_insert(false);

        if self.public_link_salt.as_deref().map_or(true, str::is_empty) {
            self.public_link_salt = Some(new_random_string(32));
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.public_link_salt.as_deref().map_or(0, str::len) < 32 {
            return Err(anyhow::anyhow!("公开链接盐值长度不能少于32"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailSettings {
    pub enable_sign_up_with_email: Option<bool>,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub invite_salt: Option<String>,
}

impl EmailSettings {
    pub fn set_defaults(&mut self) {
        self.enable_sign_up_with_email.get_or_insert(true);
        self.smtp_server.get_or_insert_with(|| "dockerhost".to_string());
        self.smtp_port.get_or_insert_with(|| "2500".to_string());
        self.smtp_username.get_or_insert_with(String::new);
        self.smtp_password.get_or_insert_with(String::new);

        if self.invite_salt.as_deref().map_or(true, str::is_empty) {
            self.invite_salt = Some(new_random_string(32));
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.invite_salt.as_deref().map_or(0, str::len) < 32 {
            return Err(anyhow::anyhow!("邀请盐值长度不能少于32"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginState {
    pub enable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    pub enable: Option<bool>,
    pub enable_uploads: Option<bool>,
    pub directory: Option<String>,
    pub client_directory: Option<String>,
    #[serde(default)]
    pub plugin_states: BTreeMap<String, PluginState>,
}

impl PluginSettings {
    pub fn set_defaults(&mut self) {
        self.enable.get_or_insert(true);
        self.enable_uploads.get_or_insert(false);
        self.directory.get_or_insert_with(|| "./plugins".to_string());
        self.client_directory
            .get_or_insert_with(|| "./client/plugins".to_string());
    }
}

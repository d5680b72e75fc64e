pub mod config;
pub mod errors;
pub mod models;

pub use config::{
    desanitize, sanitize, ConfigCodec, ConfigListener, ConfigModel, EnvironmentOverrides,
    ListenerId, ListenerRegistry, FAKE_SETTING,
};
pub use errors::*;
pub use models::AppSettings;

//! # confstore
//!
//! 数据库持久化的运行时配置存储，以及主库/副本连接管理。
//!
//! - [`confstore_core`]: 配置文档契约、编解码、脱敏和监听器
//! - [`confstore_infrastructure`]: 数据库连接、连接管理器和配置存储

pub mod bootstrap;
pub mod logging;

pub use bootstrap::BootstrapConfig;
pub use logging::init_logging;

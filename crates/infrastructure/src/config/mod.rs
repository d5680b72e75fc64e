//! # 配置存储
//!
//! - **store**: 配置存储的统一接口
//! - **database_store**: 基于数据库的实现
//! - **schema**: 存储依赖的表结构

pub mod database_store;
pub mod schema;
pub mod store;

pub use database_store::{DatabaseStore, StoreOptions};
pub use schema::CONFIGURATION_ID_KEY;
pub use store::ConfigStore;

use confstore_core::{StoreError, StoreResult};

use crate::database::{with_pool, DatabaseHandle};

/// `Systems` 表中指向当前生效配置的键
pub const CONFIGURATION_ID_KEY: &str = "ConfigurationId";

const CREATE_CONFIGURATIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS Configurations (
        Id VARCHAR(64) PRIMARY KEY,
        Value TEXT NOT NULL,
        CreateAt BIGINT NOT NULL
    )
"#;

const CREATE_SYSTEMS: &str = r#"
    CREATE TABLE IF NOT EXISTS Systems (
        Name VARCHAR(64) PRIMARY KEY,
        Value VARCHAR(1024)
    )
"#;

/// 建立配置存储依赖的两张表，已存在时不做任何改动
pub(crate) async fn ensure_schema(handle: &DatabaseHandle) -> StoreResult<()> {
    for statement in [CREATE_CONFIGURATIONS, CREATE_SYSTEMS] {
        with_pool!(handle.pool(), pool => sqlx::query(statement).execute(pool).await.map(|_| ()))
            .map_err(|e| StoreError::persistence("创建配置表", e))?;
    }
    Ok(())
}

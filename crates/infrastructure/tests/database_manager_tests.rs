mod common;

use common::{fast_retry, TestDatabase};
use confstore_core::models::{SqlSettings, DRIVER_SQLITE};
use confstore_infrastructure::DatabaseManager;

fn sqlite_settings(db: &TestDatabase, replicas: &[&str], search_replicas: &[&str]) -> SqlSettings {
    let mut settings = SqlSettings {
        driver_name: Some(DRIVER_SQLITE.to_string()),
        data_source: Some(db.dsn.clone()),
        data_source_replicas: replicas.iter().map(|name| db.sibling(name)).collect(),
        data_source_search_replicas: search_replicas.iter().map(|name| db.sibling(name)).collect(),
        max_idle_conns: Some(1),
        max_open_conns: Some(2),
        ..SqlSettings::default()
    };
    settings.set_defaults();
    settings
}

async fn connected(settings: &SqlSettings) -> DatabaseManager {
    let manager = DatabaseManager::with_retry_policy(fast_retry());
    manager.connect(settings).await.unwrap();
    manager
}

#[tokio::test]
async fn test_replicas_are_used_round_robin() {
    let db = TestDatabase::new();
    let settings = sqlite_settings(&db, &["r0", "r1", "r2"], &[]);
    let manager = connected(&settings).await;
    assert_eq!(manager.replica_count().await, 3);

    let mut order = Vec::new();
    for _ in 0..4 {
        order.push(manager.get_replica().await.unwrap().data_source().to_string());
    }

    assert_eq!(
        order,
        vec![
            db.sibling("r0"),
            db.sibling("r1"),
            db.sibling("r2"),
            db.sibling("r0"),
        ]
    );
    manager.close().await;
}

#[tokio::test]
async fn test_no_replicas_routes_to_master() {
    let db = TestDatabase::new();
    let manager = connected(&sqlite_settings(&db, &[], &[])).await;

    let replica = manager.get_replica().await.unwrap();
    assert_eq!(replica.data_source(), db.dsn);

    let search = manager.get_search_replica().await.unwrap();
    assert_eq!(search.data_source(), db.dsn);
    manager.close().await;
}

#[tokio::test]
async fn test_lock_to_master_pins_every_read() {
    let db = TestDatabase::new();
    let manager = connected(&sqlite_settings(&db, &["r0", "r1"], &["s0"])).await;

    manager.lock_to_master().await;
    assert!(manager.is_locked_to_master().await);
    for _ in 0..3 {
        assert_eq!(manager.get_replica().await.unwrap().data_source(), db.dsn);
        assert_eq!(manager.get_search_replica().await.unwrap().data_source(), db.dsn);
    }

    manager.unlock_from_master().await;
    assert!(!manager.is_locked_to_master().await);
    assert_ne!(manager.get_replica().await.unwrap().data_source(), db.dsn);
    assert_eq!(
        manager.get_search_replica().await.unwrap().data_source(),
        db.sibling("s0")
    );
    manager.close().await;
}

#[tokio::test]
async fn test_search_replicas_have_their_own_rotation() {
    let db = TestDatabase::new();
    let manager = connected(&sqlite_settings(&db, &["r0", "r1"], &["s0", "s1"])).await;

    assert_eq!(manager.get_replica().await.unwrap().data_source(), db.sibling("r0"));
    assert_eq!(
        manager.get_search_replica().await.unwrap().data_source(),
        db.sibling("s0")
    );
    assert_eq!(
        manager.get_search_replica().await.unwrap().data_source(),
        db.sibling("s1")
    );
    // 搜索路由不推进普通副本的计数
    assert_eq!(manager.get_replica().await.unwrap().data_source(), db.sibling("r1"));
    manager.close().await;
}

#[tokio::test]
async fn test_search_falls_back_to_replicas() {
    let db = TestDatabase::new();
    let manager = connected(&sqlite_settings(&db, &["r0", "r1"], &[])).await;

    assert_eq!(
        manager.get_search_replica().await.unwrap().data_source(),
        db.sibling("r0")
    );
    assert_eq!(manager.get_replica().await.unwrap().data_source(), db.sibling("r1"));
    manager.close().await;
}

#[tokio::test]
async fn test_connect_keeps_existing_master() {
    let db = TestDatabase::new();
    let manager = connected(&sqlite_settings(&db, &[], &[])).await;
    let master = manager.get_master().await.unwrap();

    // 主库连接串变化也不会替换已经打开的主库
    let mut changed = sqlite_settings(&db, &[], &[]);
    changed.data_source = Some(db.sibling("other-master"));
    manager.connect(&changed).await.unwrap();

    let again = manager.get_master().await.unwrap();
    assert_eq!(again.data_source(), master.data_source());
    assert!(!master.is_closed());
    manager.close().await;
}

#[tokio::test]
async fn test_connect_reconciles_replicas() {
    let db = TestDatabase::new();
    let manager = connected(&sqlite_settings(&db, &["r0", "r1"], &[])).await;

    let r0 = manager.get_replica().await.unwrap();
    let r1 = manager.get_replica().await.unwrap();
    assert_eq!(r1.data_source(), db.sibling("r1"));

    manager
        .connect(&sqlite_settings(&db, &["r0", "r2"], &["s0"]))
        .await
        .unwrap();

    assert_eq!(manager.replica_count().await, 2);
    assert_eq!(manager.search_replica_count().await, 1);
    assert!(!r0.is_closed());
    assert!(r1.is_closed());

    let mut sources = Vec::new();
    for _ in 0..2 {
        sources.push(manager.get_replica().await.unwrap().data_source().to_string());
    }
    sources.sort();
    assert_eq!(sources, vec![db.sibling("r0"), db.sibling("r2")]);
    manager.close().await;
}

#[tokio::test]
async fn test_failed_replica_keeps_previous_list() {
    let db = TestDatabase::new();
    let manager = connected(&sqlite_settings(&db, &["r0"], &[])).await;

    let mut broken = sqlite_settings(&db, &["r0"], &[]);
    let missing = db.path.with_file_name("missing.db");
    broken
        .data_source_replicas
        .push(format!("sqlite://{}?mode=ro", missing.display()));

    let err = manager.connect(&broken).await.unwrap_err();
    assert!(err.is_connectivity());
    assert_eq!(manager.replica_count().await, 1);
    assert_eq!(manager.get_replica().await.unwrap().data_source(), db.sibling("r0"));
    manager.close().await;
}

#[tokio::test]
async fn test_failed_search_replica_keeps_both_lists() {
    let db = TestDatabase::new();
    let manager = connected(&sqlite_settings(&db, &["r0"], &[])).await;

    // 普通副本新增 r1 成功，但搜索副本打开失败
    let mut broken = sqlite_settings(&db, &["r0", "r1"], &[]);
    let missing = db.path.with_file_name("missing-search.db");
    broken
        .data_source_search_replicas
        .push(format!("sqlite://{}?mode=ro", missing.display()));

    let err = manager.connect(&broken).await.unwrap_err();
    assert!(err.is_connectivity());
    assert_eq!(manager.replica_count().await, 1);
    assert_eq!(manager.search_replica_count().await, 0);
    for _ in 0..2 {
        assert_eq!(manager.get_replica().await.unwrap().data_source(), db.sibling("r0"));
    }
    manager.close().await;
}

#[tokio::test]
async fn test_close_resets_everything() {
    let db = TestDatabase::new();
    let manager = connected(&sqlite_settings(&db, &["r0"], &["s0"])).await;
    let master = manager.get_master().await.unwrap();
    manager.lock_to_master().await;

    manager.close().await;

    assert!(master.is_closed());
    assert!(!manager.is_locked_to_master().await);
    assert_eq!(manager.replica_count().await, 0);
    assert_eq!(manager.search_replica_count().await, 0);
    assert!(matches!(
        manager.get_master().await,
        Err(confstore_core::StoreError::NotConnected)
    ));
    assert!(manager.get_replica().await.is_err());
}

#[tokio::test]
async fn test_connect_requires_master_data_source() {
    let db = TestDatabase::new();
    let mut settings = sqlite_settings(&db, &[], &[]);
    settings.data_source = Some(String::new());

    let manager = DatabaseManager::with_retry_policy(fast_retry());
    let err = manager.connect(&settings).await.unwrap_err();
    assert!(err.is_configuration());
}

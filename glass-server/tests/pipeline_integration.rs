use chrono::{Duration, TimeZone, Utc};
use glass_core::{db, lookup, ClientServerMessage, DhcpOption, GlassConfig, MessageType, RelayMessage, TransactionBundle};
use glass_server::{LookingGlassHandler, Pipeline, PipelineState, ShutdownOutcome, Stage};
use sqlx::{SqliteConnection, SqlitePool};
use std::net::Ipv6Addr;
use std::time::Instant;

// ============================================================================
// Helpers
// ============================================================================

const DUID: [u8; 10] = [0x00, 0x03, 0x00, 0x01, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

fn config(dir: &tempfile::TempDir) -> GlassConfig {
    let path = dir.path().join("looking-glass.sqlite");
    let mut config = GlassConfig::for_store(path.to_str().unwrap());
    config.pipeline.server_name = Some("dhcp-test".to_string());
    config.retention.max_transactions = 0;
    config.retention.max_age_secs = 0;
    config
}

fn relayed_bundle(xid: u8, interface_id: &[u8]) -> TransactionBundle {
    let request = ClientServerMessage::new(MessageType::Solicit, [0, 0, xid])
        .with_option(DhcpOption::client_id(DUID.to_vec()))
        .with_option(DhcpOption::new(6, vec![0, 23]));
    let relay = RelayMessage::forward(
        0,
        "2001:db8::1".parse().unwrap(),
        "fe80::211:22ff:fe33:4455".parse::<Ipv6Addr>().unwrap(),
    )
    .with_option(DhcpOption::interface_id(interface_id.to_vec()))
    .with_option(DhcpOption::remote_id(9, b"Gi0/1"));

    let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    TransactionBundle::new("dhcp-test", request, vec![relay])
        .received_at(base + Duration::seconds(i64::from(xid)))
}

/// Create the store up front so readers can open it before the writer does.
async fn prepared_store(config: &GlassConfig) -> SqlitePool {
    let mut conn = db::connect_writer(&config.store.path).await.unwrap();
    db::ensure_schema(&mut conn).await.unwrap();
    db::create_read_pool(&config.store.path, 1).await.unwrap()
}

/// Second connection holding the write lock until dropped.
async fn lock_store(config: &GlassConfig) -> SqliteConnection {
    let mut conn = db::connect_writer(&config.store.path).await.unwrap();
    sqlx::query("BEGIN EXCLUSIVE").execute(&mut conn).await.unwrap();
    conn
}

async fn transaction_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Poll until `count` transactions are visible or five seconds pass.
async fn wait_for_transactions(pool: &SqlitePool, count: i64) -> i64 {
    let deadline = Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let seen = transaction_count(pool).await;
        if seen >= count || Instant::now() > deadline {
            return seen;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_events_enqueued_before_shutdown_are_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let mut pipeline = Pipeline::start(&config).unwrap();

    for xid in 1..=25 {
        assert!(pipeline.enqueue(Stage::Pre, relayed_bundle(xid, b"eth0")));
    }
    assert_eq!(pipeline.shutdown().await, ShutdownOutcome::Clean);
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    let pool = db::create_read_pool(&config.store.path, 1).await.unwrap();
    let rows = lookup::transactions_for_duid(&pool, "0x00030001001122334455", 100)
        .await
        .unwrap();
    assert_eq!(rows.len(), 25);
    assert_eq!(rows[0].request_ts, relayed_bundle(25, b"eth0").received_at);
    assert!(rows.iter().all(|r| r.server_name == "dhcp-test"));
}

#[tokio::test]
async fn test_enqueue_after_shutdown_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::start(&config(&dir)).unwrap();

    assert_eq!(pipeline.shutdown().await, ShutdownOutcome::Clean);
    assert_eq!(pipeline.shutdown().await, ShutdownOutcome::NotRunning);

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(!pipeline.enqueue(Stage::Pre, relayed_bundle(1, b"eth0")));
}

#[tokio::test]
async fn test_shutdown_gives_up_on_a_blocked_writer() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir);
    config.pipeline.shutdown_timeout_secs = 1;
    let _pool = prepared_store(&config).await;
    let _lock = lock_store(&config).await;

    let mut pipeline = Pipeline::start(&config).unwrap();
    assert!(pipeline.enqueue(Stage::Pre, relayed_bundle(1, b"eth0")));

    let started = Instant::now();
    let outcome = pipeline.shutdown().await;
    let waited = started.elapsed();

    assert_eq!(outcome, ShutdownOutcome::TimedOut);
    assert!(waited >= std::time::Duration::from_millis(900), "{:?}", waited);
    assert!(waited < std::time::Duration::from_secs(3), "{:?}", waited);
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    // still waiting on the lock, not killed
    assert!(pipeline.worker_alive());
}

#[tokio::test]
async fn test_full_queue_at_shutdown_is_reported_as_not_signalled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir);
    config.pipeline.queue_capacity = 1;
    config.pipeline.shutdown_timeout_secs = 1;
    let pool = prepared_store(&config).await;

    let mut pipeline = Pipeline::start(&config).unwrap();
    let events = pipeline.sender();

    // writer is open and idle once the first event is visible
    assert!(pipeline.enqueue(Stage::Pre, relayed_bundle(1, b"eth0")));
    assert_eq!(wait_for_transactions(&pool, 1).await, 1);

    let _lock = lock_store(&config).await;
    assert!(pipeline.enqueue(Stage::Pre, relayed_bundle(2, b"eth0")));
    let deadline = Instant::now() + std::time::Duration::from_secs(3);
    while events.available() == 0 && Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    // writer holds event 2 and waits on the lock; event 3 fills the queue
    assert_eq!(events.available(), 1);
    assert!(pipeline.enqueue(Stage::Pre, relayed_bundle(3, b"eth0")));
    assert_eq!(events.available(), 0);

    assert_eq!(pipeline.shutdown().await, ShutdownOutcome::NotSignalled);
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(pipeline.worker_alive());
}

#[tokio::test]
async fn test_dropped_pipeline_still_persists_queued_events() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let pool = prepared_store(&config).await;

    let pipeline = Pipeline::start(&config).unwrap();
    for xid in 1..=10 {
        assert!(pipeline.enqueue(Stage::Pre, relayed_bundle(xid, b"eth0")));
    }
    drop(pipeline);

    assert_eq!(wait_for_transactions(&pool, 10).await, 10);
}

// ============================================================================
// Handler
// ============================================================================

#[tokio::test]
async fn test_pre_then_post_produces_one_answered_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let mut handler = LookingGlassHandler::from_config(&config).unwrap();

    let mut bundle = relayed_bundle(7, b"eth0");
    assert!(handler.pre(&bundle));
    bundle.response = Some(
        ClientServerMessage::new(MessageType::Advertise, [0, 0, 7])
            .with_option(DhcpOption::client_id(DUID.to_vec()))
            .with_option(DhcpOption::new(3, vec![0, 0, 0, 1])),
    );
    assert!(handler.post(&bundle));
    handler.shutdown().await;

    let pool = db::create_read_pool(&config.store.path, 1).await.unwrap();
    let clients = lookup::list_clients(&pool).await.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].transactions, 1);
    assert_eq!(clients[0].client.interface_id, "eth0");
    assert_eq!(clients[0].client.remote_id, "9:Gi0/1");
    assert_eq!(clients[0].client.duid_ll, "00:11:22:33:44:55");

    let rows = lookup::transactions_for_client(&pool, &clients[0].client, 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.request_type.as_deref(), Some("solicit"));
    assert_eq!(row.response_type.as_deref(), Some("advertise"));
    assert!(row.is_answered());
    assert_eq!(row.request_ll.as_deref(), Some("fe80::211:22ff:fe33:4455"));
    assert_eq!(
        row.request_ll_mac().map(|m| m.to_string()).as_deref(),
        Some("00:11:22:33:44:55")
    );

    let servers = lookup::list_servers(&pool).await.unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].name, "dhcp-test");
}

#[tokio::test]
async fn test_same_duid_on_two_interfaces_is_two_clients() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let mut handler = LookingGlassHandler::from_config(&config).unwrap();

    assert!(handler.pre(&relayed_bundle(1, b"eth0")));
    assert!(handler.pre(&relayed_bundle(2, b"eth0")));
    assert!(handler.pre(&relayed_bundle(3, &[0xde, 0xad, 0xbe, 0xef])));
    handler.shutdown().await;

    let pool = db::create_read_pool(&config.store.path, 1).await.unwrap();
    let clients = lookup::find_clients_by_duid(&pool, "0x00030001001122334455")
        .await
        .unwrap();
    let interfaces: Vec<_> = clients.iter().map(|c| c.interface_id.as_str()).collect();
    assert_eq!(interfaces, vec!["0xdeadbeef", "eth0"]);
}

#[tokio::test]
async fn test_handler_tolerates_messages_without_client_id() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let mut handler = LookingGlassHandler::from_config(&config).unwrap();

    let anonymous = TransactionBundle::new(
        "dhcp-test",
        ClientServerMessage::new(MessageType::InformationRequest, [1, 1, 1]),
        vec![],
    );
    assert!(handler.pre(&anonymous));
    assert!(handler.pre(&relayed_bundle(1, b"eth0")));
    handler.shutdown().await;

    let pool = db::create_read_pool(&config.store.path, 1).await.unwrap();
    let clients = lookup::list_clients(&pool).await.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].transactions, 1);
}

//! Store connection and schema
//!
//! The writer owns a single `SqliteConnection`; readers (the CLI, the admin
//! side) use a read-only pool. WAL journaling lets both run side by side.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{ConnectOptions, Connection};
use std::time::Duration;

/// Bumped whenever `SCHEMA` changes shape.
pub const SCHEMA_VERSION: i64 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS servers (
        id   INTEGER NOT NULL PRIMARY KEY,
        name TEXT    NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clients (
        duid         TEXT NOT NULL,
        duid_ll      TEXT NOT NULL DEFAULT '',
        interface_id TEXT NOT NULL,
        remote_id    TEXT NOT NULL,
        PRIMARY KEY (duid, interface_id, remote_id)
    ) WITHOUT ROWID
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id                  INTEGER NOT NULL PRIMARY KEY,
        server_id           INTEGER NOT NULL REFERENCES servers (id),
        client_duid         TEXT    NOT NULL,
        client_interface_id TEXT    NOT NULL,
        client_remote_id    TEXT    NOT NULL,

        request_type        TEXT,
        request             TEXT,
        request_ll          TEXT,
        request_ts          DATETIME NOT NULL,

        response_type       TEXT,
        response            TEXT,
        response_ts         DATETIME,

        FOREIGN KEY (client_duid, client_interface_id, client_remote_id)
            REFERENCES clients (duid, interface_id, remote_id),
        UNIQUE (client_duid, client_interface_id, client_remote_id, server_id, request_ts)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transactions_request_ts
        ON transactions (request_ts DESC)
    "#,
];

fn options(path: &str) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
}

/// Open (creating if needed) the single writer connection.
pub async fn connect_writer(path: &str) -> Result<SqliteConnection, sqlx::Error> {
    options(path)
        .journal_mode(SqliteJournalMode::Wal)
        .create_if_missing(true)
        .connect()
        .await
}

/// Read-only pool for lookups. The journal mode is whatever the writer set.
pub async fn create_read_pool(path: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options(path).read_only(true))
        .await
}

/// Create tables if necessary and stamp `user_version`. Idempotent.
pub async fn ensure_schema(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let mut tx = conn.begin().await?;

    for ddl in SCHEMA {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *tx)
        .await?;
    if version < SCHEMA_VERSION {
        // PRAGMA does not take bind parameters
        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .execute(&mut *tx)
            .await?;
        tracing::info!(from = version, to = SCHEMA_VERSION, "Looking glass schema created");
    }

    tx.commit().await
}

/// SQLite library version and schema version, for `init` / health output.
pub async fn health_check(conn: &mut SqliteConnection) -> Result<(String, i64), sqlx::Error> {
    let sqlite: String = sqlx::query_scalar("SELECT sqlite_version()")
        .fetch_one(&mut *conn)
        .await?;
    let schema: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await?;
    Ok((sqlite, schema))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory() -> SqliteConnection {
        SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true)
            .connect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let mut conn = memory().await;
        ensure_schema(&mut conn).await.unwrap();
        ensure_schema(&mut conn).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&mut conn)
        .await
        .unwrap();
        assert_eq!(tables, vec!["clients", "servers", "transactions"]);

        let (_, schema) = health_check(&mut conn).await.unwrap();
        assert_eq!(schema, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_transaction_requires_known_client() {
        let mut conn = memory().await;
        ensure_schema(&mut conn).await.unwrap();
        sqlx::query("INSERT INTO servers (name) VALUES ('dhcp-1')")
            .execute(&mut conn)
            .await
            .unwrap();

        let orphan = sqlx::query(
            "INSERT INTO transactions (server_id, client_duid, client_interface_id, client_remote_id, request_ts) \
             VALUES (1, '0x01', '', '', '2024-01-01T00:00:00+00:00')",
        )
        .execute(&mut conn)
        .await;
        assert!(orphan.is_err());
    }
}

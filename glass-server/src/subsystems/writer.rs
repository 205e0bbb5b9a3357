//! Looking glass writer: the only component that writes to the store
//!
//! Per event, inside one store transaction:
//!   1. extract the client identifiers (failure: warn and skip)
//!   2. insert-if-absent the server and client rows
//!   3. upsert the transaction keyed by (client, server, request_ts)
//!   4. prune that pair's history per the retention policy
//!
//! Any store error rolls the whole unit back; the next event is processed as
//! if nothing happened.

use chrono::{DateTime, Utc};
use glass_core::{
    db, extract, ClientIdentifiers, ClientServerMessage, GlassConfig, GlassError, OptionFilter,
    TransactionBundle,
};
use sqlx::{Connection, SqliteConnection};

use super::channel::{EventReceiver, Stage};
use super::retention::{apply_retention, RetentionPolicy};

/// What the writer keeps and for how long.
#[derive(Debug, Clone, Default)]
pub struct WriterSettings {
    pub request_filter: Option<OptionFilter>,
    pub response_filter: Option<OptionFilter>,
    pub retention: RetentionPolicy,
}

impl WriterSettings {
    pub fn from_config(config: &GlassConfig) -> Result<Self, GlassError> {
        Ok(Self {
            request_filter: config.logging.request_filter()?,
            response_filter: config.logging.response_filter()?,
            retention: RetentionPolicy::from(&config.retention),
        })
    }
}

/// Outcome of one committed unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub new_server: bool,
    pub new_client: bool,
    pub pruned: u64,
}

pub struct TransactionWriter {
    conn: SqliteConnection,
    settings: WriterSettings,
}

impl TransactionWriter {
    /// Open the store file (creating it if needed) and ensure the schema.
    pub async fn open(path: &str, settings: WriterSettings) -> Result<Self, GlassError> {
        let conn = db::connect_writer(path).await?;
        Self::with_connection(conn, settings).await
    }

    pub async fn with_connection(
        mut conn: SqliteConnection,
        settings: WriterSettings,
    ) -> Result<Self, GlassError> {
        db::ensure_schema(&mut conn).await?;
        Ok(Self { conn, settings })
    }

    /// Direct access for lookups on the writer's own connection.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Process one event. Never fails: problems are logged and the event is dropped.
    ///
    /// Returns `true` when the event was committed.
    pub async fn handle(&mut self, stage: Stage, bundle: &TransactionBundle) -> bool {
        let ids = match extract(bundle) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(
                    stage = %stage,
                    server = %bundle.server_name,
                    error = %e,
                    "Not logging transaction in looking glass: cannot identify client"
                );
                return false;
            }
        };

        match self.write(stage, bundle, &ids).await {
            Ok(report) => {
                if report.new_server {
                    tracing::info!(server = %bundle.server_name, "Discovered new server");
                }
                if report.new_client {
                    tracing::info!(
                        duid = %ids.duid,
                        interface_id = %ids.interface_id,
                        remote_id = %ids.remote_id,
                        "Discovered new client"
                    );
                }
                if report.pruned > 0 {
                    tracing::debug!(duid = %ids.duid, pruned = report.pruned, "Deleted old transactions");
                }
                true
            }
            Err(e) => {
                tracing::error!(
                    stage = %stage,
                    duid = %ids.duid,
                    error = %e,
                    "Looking glass write failed, rolled back"
                );
                false
            }
        }
    }

    /// One atomic unit of work. Dropping `tx` on an early return rolls back.
    async fn write(
        &mut self,
        stage: Stage,
        bundle: &TransactionBundle,
        ids: &ClientIdentifiers,
    ) -> Result<WriteReport, GlassError> {
        let mut report = WriteReport::default();
        let request_ts = bundle.received_at;

        let mut tx = self.conn.begin().await?;

        let (server_id, new_server) = upsert_server(&mut tx, &bundle.server_name).await?;
        report.new_server = new_server;
        report.new_client = upsert_client(&mut tx, ids).await?;

        let request_type = bundle.request.message_type.name();
        let request = payload(&bundle.request, self.settings.request_filter.as_ref())?;
        let request_ll = ids.peer_address.map(|a| a.to_string());

        match stage {
            Stage::Pre => {
                sqlx::query(
                    r#"
                    INSERT INTO transactions
                        (server_id, client_duid, client_interface_id, client_remote_id,
                         request_type, request, request_ll, request_ts)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT (client_duid, client_interface_id, client_remote_id, server_id, request_ts)
                    DO UPDATE SET
                        request_type = excluded.request_type,
                        request = excluded.request,
                        request_ll = excluded.request_ll
                    "#,
                )
                .bind(server_id)
                .bind(&ids.duid)
                .bind(&ids.interface_id)
                .bind(&ids.remote_id)
                .bind(&request_type)
                .bind(&request)
                .bind(&request_ll)
                .bind(request_ts)
                .execute(&mut *tx)
                .await?;
            }
            Stage::Post => {
                let response_type = bundle.response.as_ref().map(|r| r.message_type.name());
                let response = bundle
                    .response
                    .as_ref()
                    .map(|r| payload(r, self.settings.response_filter.as_ref()))
                    .transpose()?;
                // NULL unless there is a response to stamp
                let response_ts: Option<DateTime<Utc>> = bundle
                    .response
                    .as_ref()
                    .map(|_| bundle.responded_at.unwrap_or_else(Utc::now));

                sqlx::query(
                    r#"
                    INSERT INTO transactions
                        (server_id, client_duid, client_interface_id, client_remote_id,
                         request_type, request, request_ll, request_ts,
                         response_type, response, response_ts)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT (client_duid, client_interface_id, client_remote_id, server_id, request_ts)
                    DO UPDATE SET
                        response_type = excluded.response_type,
                        response = excluded.response,
                        response_ts = excluded.response_ts
                    "#,
                )
                .bind(server_id)
                .bind(&ids.duid)
                .bind(&ids.interface_id)
                .bind(&ids.remote_id)
                .bind(&request_type)
                .bind(&request)
                .bind(&request_ll)
                .bind(request_ts)
                .bind(&response_type)
                .bind(&response)
                .bind(response_ts)
                .execute(&mut *tx)
                .await?;
            }
        }

        report.pruned =
            apply_retention(&mut tx, &self.settings.retention, server_id, ids, request_ts).await?;

        tx.commit().await?;
        Ok(report)
    }

    pub async fn close(self) -> Result<(), sqlx::Error> {
        self.conn.close().await
    }
}

/// Returns the server id and whether the row was just created.
async fn upsert_server(conn: &mut SqliteConnection, name: &str) -> Result<(i64, bool), sqlx::Error> {
    let inserted = sqlx::query("INSERT INTO servers (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let id: i64 = sqlx::query_scalar("SELECT id FROM servers WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

    Ok((id, inserted > 0))
}

/// Insert-if-absent; an existing identity row is never rewritten.
async fn upsert_client(conn: &mut SqliteConnection, ids: &ClientIdentifiers) -> Result<bool, sqlx::Error> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO clients (duid, duid_ll, interface_id, remote_id)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (duid, interface_id, remote_id) DO NOTHING
        "#,
    )
    .bind(&ids.duid)
    .bind(&ids.duid_ll)
    .bind(&ids.interface_id)
    .bind(&ids.remote_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(inserted > 0)
}

fn payload(message: &ClientServerMessage, filter: Option<&OptionFilter>) -> Result<String, GlassError> {
    let json = match filter {
        Some(filter) => serde_json::to_string(&message.filtered(|code| filter.contains(code)))?,
        None => serde_json::to_string(message)?,
    };
    Ok(json)
}

/// Writer loop. Runs until the sentinel arrives or every sender is dropped.
///
/// If the store cannot be opened the loop still drains the channel so that
/// producers see the same behavior as with a healthy store.
pub async fn run_writer(mut events: EventReceiver, store_path: String, settings: WriterSettings) {
    let mut writer = match TransactionWriter::open(&store_path, settings).await {
        Ok(writer) => {
            tracing::info!(path = %store_path, "Looking glass writer started");
            Some(writer)
        }
        Err(e) => {
            tracing::error!(
                path = %store_path,
                error = %e,
                "Cannot open looking glass store, transactions will not be logged"
            );
            None
        }
    };

    let mut written = 0u64;
    let mut dropped = 0u64;

    while let Some((stage, bundle)) = events.next().await {
        let committed = match writer.as_mut() {
            Some(writer) => writer.handle(stage, &bundle).await,
            None => false,
        };
        if committed {
            written += 1;
        } else {
            dropped += 1;
        }
    }

    if let Some(writer) = writer {
        if let Err(e) = writer.close().await {
            tracing::warn!(error = %e, "Failed to close looking glass store cleanly");
        }
    }

    tracing::info!(written, dropped, "Looking glass writer stopped");
}

// ============================================================================
// TESTS
// ============================================================================

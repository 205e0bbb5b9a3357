//! Read-only lookups over the looking glass store

use sqlx::{Executor, Sqlite};

use crate::models::{ClientRow, ClientSummary, ServerRow, TransactionRow};

pub async fn list_servers<'e, E>(executor: E) -> Result<Vec<ServerRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ServerRow>("SELECT id, name FROM servers ORDER BY name")
        .fetch_all(executor)
        .await
}

/// All clients with their retained transaction counts.
pub async fn list_clients<'e, E>(executor: E) -> Result<Vec<ClientSummary>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ClientSummary>(
        r#"
        SELECT c.duid, c.duid_ll, c.interface_id, c.remote_id,
               COUNT(t.id) AS transactions
        FROM clients c
        LEFT JOIN transactions t
            ON t.client_duid = c.duid
           AND t.client_interface_id = c.interface_id
           AND t.client_remote_id = c.remote_id
        GROUP BY c.duid, c.interface_id, c.remote_id
        ORDER BY c.remote_id, c.interface_id, c.duid
        "#,
    )
    .fetch_all(executor)
    .await
}

/// Every identifier tuple seen for a DUID, e.g. a client moving between relays.
pub async fn find_clients_by_duid<'e, E>(
    executor: E,
    duid: &str,
) -> Result<Vec<ClientRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ClientRow>(
        r#"
        SELECT duid, duid_ll, interface_id, remote_id
        FROM clients
        WHERE duid = ?
        ORDER BY remote_id, interface_id
        "#,
    )
    .bind(duid)
    .fetch_all(executor)
    .await
}

/// Transactions for one client, newest first.
pub async fn transactions_for_client<'e, E>(
    executor: E,
    client: &ClientRow,
    limit: u32,
) -> Result<Vec<TransactionRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT t.id, s.name AS server_name,
               t.client_duid, t.client_interface_id, t.client_remote_id,
               t.request_type, t.request, t.request_ll, t.request_ts,
               t.response_type, t.response, t.response_ts
        FROM transactions t
        JOIN servers s ON s.id = t.server_id
        WHERE t.client_duid = ?
          AND t.client_interface_id = ?
          AND t.client_remote_id = ?
        ORDER BY t.request_ts DESC
        LIMIT ?
        "#,
    )
    .bind(&client.duid)
    .bind(&client.interface_id)
    .bind(&client.remote_id)
    .bind(i64::from(limit))
    .fetch_all(executor)
    .await
}

/// Transactions for every identifier tuple of a DUID, newest first.
pub async fn transactions_for_duid<'e, E>(
    executor: E,
    duid: &str,
    limit: u32,
) -> Result<Vec<TransactionRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT t.id, s.name AS server_name,
               t.client_duid, t.client_interface_id, t.client_remote_id,
               t.request_type, t.request, t.request_ll, t.request_ts,
               t.response_type, t.response, t.response_ts
        FROM transactions t
        JOIN servers s ON s.id = t.server_id
        WHERE t.client_duid = ?
        ORDER BY t.request_ts DESC
        LIMIT ?
        "#,
    )
    .bind(duid)
    .bind(i64::from(limit))
    .fetch_all(executor)
    .await
}

//! Transaction retention per client/server pair
//!
//! Two optional limits, applied as successive filters after every write:
//!   1. age:   keep rows with `request_ts >= reference - max_age`
//!   2. count: of those, keep the `max_count` most recent by `request_ts`
//!
//! Everything else for the same `(client, server)` pair is deleted. Other
//! pairs are never touched.

use chrono::{DateTime, Duration, Utc};
use glass_core::config::RetentionConfig;
use glass_core::ClientIdentifiers;
use sqlx::SqliteConnection;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_count: Option<u32>,
    pub max_age: Option<Duration>,
}

impl RetentionPolicy {
    pub fn is_disabled(&self) -> bool {
        self.max_count.is_none() && self.max_age.is_none()
    }

    /// Oldest `request_ts` that survives the age filter.
    pub fn cutoff(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.max_age
            .and_then(|age| reference.checked_sub_signed(age))
    }

    /// SQLite `LIMIT` for the count filter; -1 means unlimited.
    fn limit(&self) -> i64 {
        self.max_count.map_or(-1, i64::from)
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            max_count: (config.max_transactions > 0).then_some(config.max_transactions),
            max_age: i64::try_from(config.max_age_secs)
                .ok()
                .filter(|secs| *secs > 0)
                .and_then(Duration::try_seconds),
        }
    }
}

/// Delete transactions of one pair that fall outside the policy.
///
/// Runs inside the caller's unit of work. Returns the number of rows deleted.
pub async fn apply_retention(
    conn: &mut SqliteConnection,
    policy: &RetentionPolicy,
    server_id: i64,
    client: &ClientIdentifiers,
    reference: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if policy.is_disabled() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        DELETE FROM transactions
        WHERE server_id = ?1
          AND client_duid = ?2
          AND client_interface_id = ?3
          AND client_remote_id = ?4
          AND id NOT IN (
              SELECT id FROM transactions
              WHERE server_id = ?1
                AND client_duid = ?2
                AND client_interface_id = ?3
                AND client_remote_id = ?4
                AND (?5 IS NULL OR request_ts >= ?5)
              ORDER BY request_ts DESC
              LIMIT ?6
          )
        "#,
    )
    .bind(server_id)
    .bind(&client.duid)
    .bind(&client.interface_id)
    .bind(&client.remote_id)
    .bind(policy.cutoff(reference))
    .bind(policy.limit())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

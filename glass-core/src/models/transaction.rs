use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;

use crate::derive::{mac_from_link_local, MacAddress};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub server_name: String,
    pub client_duid: String,
    pub client_interface_id: String,
    pub client_remote_id: String,

    pub request_type: Option<String>,
    pub request: Option<String>,
    pub request_ll: Option<String>,
    pub request_ts: DateTime<Utc>,

    pub response_type: Option<String>,
    pub response: Option<String>,
    pub response_ts: Option<DateTime<Utc>>,
}

impl TransactionRow {
    /// MAC address embedded in the client's link-local address, if any.
    pub fn request_ll_mac(&self) -> Option<MacAddress> {
        let address: Ipv6Addr = self.request_ll.as_deref()?.parse().ok()?;
        mac_from_link_local(address)
    }

    pub fn is_answered(&self) -> bool {
        self.response_ts.is_some()
    }
}

impl fmt::Display for TransactionRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} @ {}",
            self.client_duid,
            self.server_name,
            self.request_ts.format("%Y-%m-%d %H:%M:%S%.6f")
        )
    }
}

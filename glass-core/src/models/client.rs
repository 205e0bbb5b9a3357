use serde::{Deserialize, Serialize};
use std::fmt;

use crate::derive::{mac_from_duid, MacAddress};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClientRow {
    pub duid: String,
    pub duid_ll: String,
    pub interface_id: String,
    pub remote_id: String,
}

impl ClientRow {
    /// Ethernet address embedded in the DUID, if any.
    pub fn mac(&self) -> Option<MacAddress> {
        mac_from_duid(&self.duid)
    }
}

impl fmt::Display for ClientRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.remote_id.is_empty(), self.interface_id.is_empty()) {
            (false, false) => write!(f, "{} - {} - {}", self.remote_id, self.interface_id, self.duid),
            (false, true) => write!(f, "{} - {}", self.remote_id, self.duid),
            (true, false) => write!(f, "{} - {}", self.interface_id, self.duid),
            (true, true) => f.write_str(&self.duid),
        }
    }
}

/// A client with the number of transactions currently retained for it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClientSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub client: ClientRow,
    pub transactions: i64,
}

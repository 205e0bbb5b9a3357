pub mod config;
pub mod db;
pub mod derive;
pub mod dhcp;
pub mod error;
pub mod identifiers;
pub mod lookup;
pub mod models;
pub mod options;

pub use config::GlassConfig;
pub use dhcp::{ClientServerMessage, DhcpOption, MessageType, RelayMessage, TransactionBundle};
pub use error::{ExtractError, GlassError};
pub use identifiers::{extract, ClientIdentifiers};
pub use options::{OptionFilter, OptionSpec};

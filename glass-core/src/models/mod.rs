pub mod client;
pub mod server;
pub mod transaction;

pub use client::{ClientRow, ClientSummary};
pub use server::ServerRow;
pub use transaction::TransactionRow;

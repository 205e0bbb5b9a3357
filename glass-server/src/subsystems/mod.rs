pub mod channel;
pub mod retention;
pub mod writer;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GlassError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Unknown DHCPv6 option name: {0}")]
    UnknownOption(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Why an event could not be attributed to a client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("request has no client-id option")]
    MissingClientId,

    #[error("client-id option is empty")]
    EmptyClientId,
}

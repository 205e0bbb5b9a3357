use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::GlassError;
use crate::options::{OptionFilter, OptionSpec};

#[derive(Debug, Deserialize, Clone)]
pub struct GlassConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub shutdown_timeout_secs: u64,
    pub server_name: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            shutdown_timeout_secs: 5,
            server_name: None,
        }
    }
}

impl PipelineConfig {
    /// Configured server name, else `$HOSTNAME`, else `localhost`.
    pub fn server_name(&self) -> String {
        self.server_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "localhost".to_string())
    }
}

/// Which options end up in the stored request/response payloads.
/// An empty list stores the whole message.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_request_options: Vec<OptionSpec>,
    pub log_response_options: Vec<OptionSpec>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_request_options: vec!["option-request".into(), "iana".into(), "iapd".into()],
            log_response_options: vec!["iana".into(), "iapd".into()],
        }
    }
}

impl LoggingConfig {
    pub fn request_filter(&self) -> Result<Option<OptionFilter>, GlassError> {
        build_filter(&self.log_request_options)
    }

    pub fn response_filter(&self) -> Result<Option<OptionFilter>, GlassError> {
        build_filter(&self.log_response_options)
    }
}

fn build_filter(specs: &[OptionSpec]) -> Result<Option<OptionFilter>, GlassError> {
    if specs.is_empty() {
        return Ok(None);
    }
    OptionFilter::from_specs(specs).map(Some)
}

/// Per client/server retention. Zero disables a limit.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_transactions: u32,
    pub max_age_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_transactions: 20,
            max_age_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl GlassConfig {
    pub fn load(path: &str) -> Result<Self, GlassError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("GLASS").separator("__"))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Config for a store at `path` with every other section defaulted.
    pub fn for_store(path: impl Into<String>) -> Self {
        Self {
            service: ServiceConfig::default(),
            store: StoreConfig { path: path.into() },
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
            retention: RetentionConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), GlassError> {
        self.logging.request_filter()?;
        self.logging.response_filter()?;
        if self.pipeline.queue_capacity == 0 {
            return Err(GlassError::Other(
                "pipeline.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

//! Producer-facing hooks for the DHCP request path.

use chrono::Utc;
use glass_core::{GlassConfig, GlassError, TransactionBundle};

use crate::pipeline::{Pipeline, PipelineState, ShutdownOutcome};
use crate::subsystems::channel::{EventSender, Stage};

/// Call `pre` once a request is received and `post` once its response is
/// computed. Neither blocks and neither fails towards the caller; events
/// that cannot be queued are dropped with a warning.
pub struct LookingGlassHandler {
    pipeline: Pipeline,
    server_name: String,
}

impl LookingGlassHandler {
    pub fn from_config(config: &GlassConfig) -> Result<Self, GlassError> {
        let pipeline = Pipeline::start(config)?;
        let server_name = config.pipeline.server_name();
        tracing::info!(
            path = %config.store.path,
            server = %server_name,
            "Looking glass enabled"
        );
        Ok(Self {
            pipeline,
            server_name,
        })
    }

    pub fn pre(&self, bundle: &TransactionBundle) -> bool {
        self.pipeline.enqueue(Stage::Pre, self.stamped(bundle))
    }

    pub fn post(&self, bundle: &TransactionBundle) -> bool {
        let mut bundle = self.stamped(bundle);
        if bundle.response.is_some() && bundle.responded_at.is_none() {
            bundle.responded_at = Some(Utc::now());
        }
        self.pipeline.enqueue(Stage::Post, bundle)
    }

    /// Name stored for bundles that do not carry one.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    fn stamped(&self, bundle: &TransactionBundle) -> TransactionBundle {
        let mut bundle = bundle.clone();
        if bundle.server_name.is_empty() {
            bundle.server_name.clone_from(&self.server_name);
        }
        bundle
    }

    pub fn sender(&self) -> EventSender {
        self.pipeline.sender()
    }

    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        self.pipeline.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glass_core::{ClientServerMessage, MessageType};

    #[tokio::test]
    async fn test_empty_server_name_is_filled_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GlassConfig::for_store(dir.path().join("glass.sqlite").to_str().unwrap());
        config.pipeline.server_name = Some("dhcp-7".to_string());
        let mut handler = LookingGlassHandler::from_config(&config).unwrap();

        let bundle = TransactionBundle::new("", ClientServerMessage::new(MessageType::Solicit, [1, 2, 3]), vec![]);
        assert_eq!(handler.stamped(&bundle).server_name, "dhcp-7");
        let named = TransactionBundle::new("dhcp-1", ClientServerMessage::new(MessageType::Solicit, [1, 2, 3]), vec![]);
        assert_eq!(handler.stamped(&named).server_name, "dhcp-1");

        handler.shutdown().await;
    }

    #[tokio::test]
    async fn test_hooks_never_fail_without_client_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glass.sqlite");
        let mut handler = LookingGlassHandler::from_config(&GlassConfig::for_store(path.to_str().unwrap())).unwrap();

        let mut bundle = TransactionBundle::new(
            "dhcp-1",
            ClientServerMessage::new(MessageType::InformationRequest, [9, 9, 9]),
            vec![],
        );
        assert!(handler.pre(&bundle));
        bundle.response = Some(ClientServerMessage::new(MessageType::Reply, [9, 9, 9]));
        assert!(handler.post(&bundle));

        handler.shutdown().await;
        assert_eq!(handler.state(), PipelineState::Stopped);
        assert!(!handler.pre(&bundle));
    }
}

//! Event notification seam.
//!
//! The publisher is an optional dependency injected at startup; absence
//! is a normal, checked state rather than a null scattered through call
//! sites. Publish failures are logged by the service and never fail the
//! originating workflow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Events emitted after successful workflow steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayEvent {
    ProjectCreated {
        gateway_id: String,
        project_id: String,
    },
    ProjectDeleted {
        gateway_id: String,
        project_id: String,
    },
    ExperimentCreated {
        gateway_id: String,
        experiment_id: String,
    },
    ExperimentDeleted {
        gateway_id: String,
        experiment_id: String,
    },
    CredentialRegistered {
        gateway_id: String,
        token_id: String,
    },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publish failed: {0}")]
    Failed(String),
}

/// A sink for gateway events (message broker, audit log, ...).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &GatewayEvent) -> Result<(), PublishError>;
}

/// A publisher that emits events to the tracing log. Useful as a default
/// when no broker is configured.
pub struct LoggingEventPublisher;

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: &GatewayEvent) -> Result<(), PublishError> {
        let payload =
            serde_json::to_string(event).map_err(|e| PublishError::Failed(e.to_string()))?;
        tracing::info!("Gateway event: {}", payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = GatewayEvent::ProjectCreated {
            gateway_id: "gw1".to_string(),
            project_id: "proj-1".to_string(),
        };
        let payload = serde_json::to_string(&event).unwrap();
        assert!(payload.contains("ProjectCreated"));
        assert!(payload.contains("proj-1"));
    }

    #[tokio::test]
    async fn test_logging_publisher_accepts_events() {
        let publisher = LoggingEventPublisher;
        publisher
            .publish(&GatewayEvent::ExperimentDeleted {
                gateway_id: "gw1".to_string(),
                experiment_id: "exp-1".to_string(),
            })
            .await
            .unwrap();
    }
}

//! Domain event publishing. Publishing is best effort: the state change has already been
//! committed, so callers log failures and carry on.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

use crate::domain::events::DomainEvent;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;
}

/// Publishes JSON events on `<prefix>.<aggregate>.<event>` subjects.
pub struct NatsPublisher {
    client: async_nats::Client,
    prefix: String,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    pub fn subject_for(&self, event: &DomainEvent) -> String {
        format!("{}.{}", self.prefix, event.subject())
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(self.subject_for(event), payload.into())
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))
    }
}

/// Used when no broker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: &DomainEvent) -> Result<(), PublishError> { Ok(()) }
}

/// Keeps every event in memory for assertions.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self { Self::default() }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn subjects(&self) -> Vec<&'static str> {
        self.events().iter().map(DomainEvent::subject).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}

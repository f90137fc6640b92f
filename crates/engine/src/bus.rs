//! Message bus abstraction
//!
//! The engine publishes JSON envelopes to subjects and receives its own
//! inbound traffic through [`crate::Engine::handle_message`]; how bytes
//! travel between the two is the deployment's concern (NATS, in-process
//! loopback in tests, …).

use crate::error::EngineError;
use async_trait::async_trait;

/// Fire-and-forget publisher onto the peer message bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload to a subject.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), EngineError>;
}

//! Messaging-transport boundary.
//!
//! The engines only ever see the [`MessageTransport`] capability trait;
//! the concrete HTTP gateway client lives in [`gateway`].

pub mod gateway;

use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::TransportError;

pub use gateway::GatewayTransport;

/// Inbound conversation event delivered by the transport.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Text(InboundMessage),
    Document(InboundDocument),
}

impl InboundEvent {
    /// Session key of the conversation that produced the event.
    pub fn from(&self) -> &str {
        match self {
            Self::Text(m) => &m.from,
            Self::Document(d) => &d.from,
        }
    }
}

/// A plain text message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
}

/// A document attachment (recipient lists arrive this way).
#[derive(Debug, Clone)]
pub struct InboundDocument {
    pub from: String,
    pub file_name: String,
    pub mime_type: String,
    pub media_url: String,
}

/// Options for an outbound message.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Optional media reference delivered alongside the body.
    pub media_url: Option<String>,
}

/// Stream of inbound events produced by a started transport.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// Capability interface over the messaging platform.
///
/// The existence check is an optional sub-capability: implementations
/// without it keep the default `None`, and callers fail open
/// deterministically instead of probing for support at runtime.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Start listening for inbound events.
    async fn start(&self) -> Result<EventStream, TransportError>;

    async fn send_message(
        &self,
        to: &str,
        body: &str,
        options: &SendOptions,
    ) -> Result<(), TransportError>;

    /// Optional reachability check. `None` means the capability is absent;
    /// `Some(Ok(false))` is a definitive "not reachable".
    async fn check_exists(&self, _to: &str) -> Option<Result<bool, TransportError>> {
        None
    }

    /// Save an inbound document attachment under `dest_dir`, returning the
    /// saved path.
    async fn save_document(
        &self,
        doc: &InboundDocument,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransportError>;

    async fn blacklist_add(&self, number: &str) -> Result<(), TransportError>;

    async fn blacklist_remove(&self, number: &str) -> Result<(), TransportError>;

    async fn blacklist_list(&self) -> Result<Vec<String>, TransportError>;

    async fn health_check(&self) -> Result<(), TransportError>;
}

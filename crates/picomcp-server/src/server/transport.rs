//! The abstract transport contract.
//!
//! Transports deliver a JSON-RPC payload together with the session and
//! caller identification they extracted from their own framing (the
//! `Mcp-Session-Id` and `Authorization` headers over HTTP, their
//! equivalents elsewhere), receive zero or one response payload, and drain
//! or accept pushed server-initiated messages on their own cadence.

use async_trait::async_trait;

/// An inbound message as handed over by a transport.
#[derive(Debug, Clone, Default)]
pub struct RequestEnvelope {
    /// The session id the client presented, if any.
    pub session_id: Option<String>,
    /// The API key the client presented, if any.
    pub api_key: Option<String>,
    /// A transport-level client identifier (connection id, peer address).
    pub client_id: Option<String>,
    /// The raw JSON-RPC payload.
    pub payload: String,
}

impl RequestEnvelope {
    /// Wrap a payload with no identification.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Attach the presented session id.
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach the presented API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Attach the transport-level client identifier.
    pub fn client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Outbound side of the transport contract: deliver a server-initiated
/// payload to a session. No back-pressure is surfaced to the core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a payload to the given session.
    async fn push(&self, session_id: &str, payload: String);
}

//! Crate-wide error taxonomy.
//!
//! Every public, fallible operation returns `Result<T, RtError>`.

use thiserror::Error;

/// Errors surfaced by the voice-agent core.
#[derive(Debug, Error)]
pub enum RtError {
    /// Missing or rejected credential. Fatal; no retry.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure (TCP/TLS/WebSocket). Retryable before
    /// `started`, fatal afterwards.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// Malformed frame or unexpected discriminator ordering. Fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote service reported a fatal error. Session closes.
    #[error("server error: {0}")]
    Server(String),

    /// `send_audio` could not be accepted; the outbound queue is full.
    #[error("send_audio rejected: outbound queue full")]
    Backpressure,

    /// Configuration failed pre-connect validation.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The smart-turn classifier capability is not registered. Non-fatal;
    /// callers see this only via a `Warning` event, never as an `Err`.
    #[error("smart-turn classifier unavailable, falling back to adaptive")]
    CapabilityAbsent,

    /// The session is not in a state that permits the requested operation.
    #[error("session is not in a valid state for this operation: {0}")]
    InvalidState(String),

    /// A suspending operation timed out.
    #[error("operation timed out: {0}")]
    Timeout(String),
}

/// Convenience alias used throughout the crate's public surface.
pub type RtResult<T> = Result<T, RtError>;

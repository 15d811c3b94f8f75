use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;

#[derive(Debug, Error)]
pub enum RobolinkError {
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("connection failed for `{address}`: {reason}")]
    Connection { address: String, reason: String },

    #[error("handshake with `{address}` failed: {reason}")]
    Handshake { address: String, reason: String },

    #[error("failed to launch `{path}`: {reason}")]
    Launch { path: String, reason: String },

    #[error("`{path}` did not report ready within {timeout:?}")]
    LaunchTimeout { path: String, timeout: Duration },

    #[error("cannot establish session with `{address}` after launching `{path}`: {reason}")]
    SessionUnavailable {
        address: String,
        path: String,
        reason: String,
    },

    #[error("transport send failed: {reason}")]
    TransportSend { reason: String },

    #[error("transport receive failed: {reason}")]
    TransportReceive { reason: String },

    #[error("read timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("remote closed the connection")]
    Disconnected,

    #[error("stream framing lost: {reason}")]
    Framing { reason: String },

    #[error("invalid or stale item handle")]
    InvalidHandle,

    #[error("remote error (status {code}): {message}")]
    Application { code: i32, message: String },

    #[error("remote reported an invalid license")]
    InvalidLicense,

    #[error("unknown status `{code}`: {message}")]
    UnknownStatus { code: i32, message: String },

    #[error("argument mismatch for `{command}`: {reason}")]
    ArgumentMismatch { command: String, reason: String },

    #[error("a previous request has not been fully drained")]
    RequestInFlight,

    #[error("session was discarded after a fatal error; reconnect first")]
    SessionPoisoned,

    #[error("item still busy after {timeout:?}")]
    WaitTimeout { timeout: Duration },

    #[error("client worker is unavailable")]
    TransportClosed,

    #[error("runtime task join failed: {0}")]
    RuntimeJoin(String),
}

impl RobolinkError {
    /// Whether the session's byte stream can no longer be trusted.
    ///
    /// Session-fatal errors require discarding the socket and reconnecting;
    /// every other error leaves the session usable for the next call.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::TransportSend { .. }
                | Self::TransportReceive { .. }
                | Self::Timeout { .. }
                | Self::Disconnected
                | Self::Framing { .. }
                | Self::InvalidLicense
                | Self::RequestInFlight
                | Self::SessionPoisoned
        )
    }

    /// Whether reconnecting (and possibly relaunching) may cure the error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Handshake { .. }
                | Self::Timeout { .. }
                | Self::Disconnected
                | Self::Framing { .. }
                | Self::SessionPoisoned
                | Self::TransportClosed
        )
    }
}

impl From<CodecError> for RobolinkError {
    fn from(err: CodecError) -> Self {
        Self::Framing {
            reason: err.to_string(),
        }
    }
}

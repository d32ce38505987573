//! Domain-specific error types for the session core.
//!
//! All fallible operations return `Result<T, SessionError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

use crate::channels::ChannelId;

/// The canonical error type for the session core.
#[derive(Debug, Error)]
pub enum SessionError {
    // ── Configuration Errors ─────────────────────────────────────
    /// A configuration value failed local validation. Never surfaced
    /// to the network.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operation is not permitted in the current lifecycle state.
    #[error("{operation} is not valid while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    // ── Connect Errors ───────────────────────────────────────────
    /// A hard-dependency channel failed to initialize. Aborts connect.
    #[error("channel '{channel}' failed to load: {reason}")]
    ChannelLoad { channel: ChannelId, reason: String },

    /// The transport / security handshake failed. Carries the protocol
    /// error code, its symbolic name, and the category reported by the
    /// engine.
    #[error("handshake failed: {message} ({name}, code {code:#010x})")]
    Handshake {
        code: u32,
        name: String,
        category: String,
        message: String,
    },

    /// The server rejected the offered credentials. A specialization of
    /// a handshake failure, kept distinct so callers can prompt for new
    /// credentials instead of treating it as a network problem.
    #[error("authentication failed: {message} (code {code:#010x})")]
    Authentication { code: u32, message: String },

    // ── Runtime Errors ───────────────────────────────────────────
    /// A soft-dependency channel misbehaved. The channel is disabled
    /// and the session continues.
    #[error("channel runtime error: {0}")]
    ChannelRuntime(String),

    /// The event pump failed, distinct from a clean remote disconnect.
    #[error("event loop failure: {0}")]
    EventLoop(String),

    /// A peer event violated protocol rules (e.g. a damage rectangle
    /// outside the negotiated surface).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The operation requires an established session.
    #[error("not connected")]
    NotConnected,

    // ── Clipboard Errors ─────────────────────────────────────────
    /// The clipboard exchange protocol reported an error.
    #[error("clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),
}

impl SessionError {
    /// Whether this error represents a credential rejection.
    pub fn is_authentication(&self) -> bool {
        matches!(self, SessionError::Authentication { .. })
    }
}

// ── ClipboardError ───────────────────────────────────────────────

/// Typed error for the clipboard format-exchange protocol.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClipboardError {
    /// A unicode-text payload was not valid UTF-16.
    #[error("clipboard data is not valid UTF-16")]
    InvalidUnicode,

    /// A format data response arrived with no request outstanding, so
    /// there is no format id to decode it with.
    #[error("clipboard data response with no outstanding request")]
    UnsolicitedResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = SessionError::Handshake {
            code: 0x0002_0009,
            name: "ERRCONNECT_LOGON_FAILURE".into(),
            category: "connect".into(),
            message: "logon failure".into(),
        };
        assert!(e.to_string().contains("0x00020009"));
        assert!(e.to_string().contains("ERRCONNECT_LOGON_FAILURE"));

        let e = SessionError::ChannelLoad {
            channel: ChannelId::Graphics,
            reason: "addin missing".into(),
        };
        assert!(e.to_string().contains("rdpgfx"));
    }

    #[test]
    fn authentication_is_distinguished() {
        let auth = SessionError::Authentication {
            code: 0x0002_000c,
            message: "bad password".into(),
        };
        assert!(auth.is_authentication());

        let other = SessionError::NotConnected;
        assert!(!other.is_authentication());
    }

    #[test]
    fn from_clipboard_error() {
        let e: SessionError = ClipboardError::InvalidUnicode.into();
        assert!(matches!(e, SessionError::Clipboard(_)));
        assert!(e.to_string().contains("UTF-16"));
    }
}

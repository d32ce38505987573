//! Session lifecycle state machine.
//!
//! Models the full lifecycle of one connection attempt, with validated
//! transitions that return `Result` instead of panicking:
//!
//! ```text
//!  Idle ──► Connecting ──► Connected ──► Disconnected
//!   ▲            │              │              │
//!   │            ▼              ▼              │
//!   │          Failed ◄─────────┘              │
//!   │            │                             │
//!   └────────────┴─────────────────────────────┘  (reusable)
//! ```
//!
//! `Failed` and `Disconnected` are terminal per attempt; a session in
//! either state may be reconfigured and reconnected.

use std::time::{Duration, Instant};

use crate::error::SessionError;

// ── StateCode ────────────────────────────────────────────────────

/// Numeric state code delivered with every state-change notification.
///
/// The values are part of the host-facing contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StateCode {
    Disconnected = 0,
    Connecting = 1,
    Connected = 3,
    Error = 5,
}

// ── ConnectionState ──────────────────────────────────────────────

/// The current lifecycle state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Created but never connected. Initial state.
    #[default]
    Idle,

    /// A connect attempt is in flight (transport + security handshake).
    Connecting,

    /// Handshake complete; the session is live.
    Connected {
        /// When the session entered the `Connected` state.
        since: Instant,
    },

    /// The connect attempt or event pump failed. Resources released.
    Failed,

    /// Cleanly disconnected. Resources released, reusable.
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ConnectionState {
    /// Short state name, used in log output and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected { .. } => "Connected",
            Self::Failed => "Failed",
            Self::Disconnected => "Disconnected",
        }
    }

    /// The numeric code reported to the host for this state.
    pub fn code(&self) -> StateCode {
        match self {
            Self::Idle | Self::Disconnected => StateCode::Disconnected,
            Self::Connecting => StateCode::Connecting,
            Self::Connected { .. } => StateCode::Connected,
            Self::Failed => StateCode::Error,
        }
    }

    /// Returns `true` when the session is fully established.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` when this attempt has ended (cleanly or not).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Disconnected)
    }

    /// Whether configuration setters may run in this state.
    pub fn is_configurable(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed | Self::Disconnected)
    }

    /// How long the session has been in the `Connected` state.
    ///
    /// Returns `None` for any other state.
    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Idle`, `Failed`, `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Idle | Self::Failed | Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            other => Err(SessionError::InvalidState {
                operation: "connect",
                state: other.name(),
            }),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            other => Err(SessionError::InvalidState {
                operation: "complete connect",
                state: other.name(),
            }),
        }
    }

    /// Transition to `Disconnected`.
    ///
    /// Valid from: `Connecting`, `Connected`, `Failed`.
    pub fn finish_disconnect(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Connecting | Self::Connected { .. } | Self::Failed => {
                *self = Self::Disconnected;
                Ok(())
            }
            other => Err(SessionError::InvalidState {
                operation: "disconnect",
                state: other.name(),
            }),
        }
    }

    /// Force the state to `Failed` regardless of the current state.
    ///
    /// Used for handshake failures and unrecoverable pump errors.
    pub fn fail(&mut self) {
        *self = Self::Failed;
    }
}

// ── Tests ────────────────────────────────────────────────────────

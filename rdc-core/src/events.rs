//! Host-facing event hooks.
//!
//! The host passes one [`SessionEvents`] implementation per session;
//! every hook has a default so hosts implement only what they observe.
//! The two handshake hooks return `Option<bool>`: `None` means no hook
//! is installed and the session applies its built-in policy instead.

use crate::config::Credentials;
use crate::engine::{CertificateInfo, CertificateSnapshot};
use crate::error::SessionError;
use crate::framebuffer::Rect;
use crate::state::{ConnectionState, StateCode};

/// Per-session host callbacks. All hooks run on the session's task,
/// synchronously, between pump calls.
pub trait SessionEvents: Send {
    /// The lifecycle state changed. `code` is the stable numeric code;
    /// `state` carries the full detail.
    fn on_state_changed(&mut self, _code: StateCode, _state: &ConnectionState) {}

    /// A region of the framebuffer was repainted. The new pixels are
    /// already in the session's framebuffer when this fires.
    fn on_frame_update(&mut self, _rect: Rect) {}

    /// The remote desktop was resized. The framebuffer has already been
    /// reallocated to the new geometry when this fires.
    fn on_desktop_resize(&mut self, _width: u32, _height: u32) {}

    /// New remote clipboard text arrived.
    fn on_clipboard_text(&mut self, _text: &str) {}

    /// Complete or veto credentials mid-handshake. `Some(false)` aborts
    /// the connect; `None` falls back to the configured credentials.
    fn on_authenticate(&mut self, _pending: &mut Credentials) -> Option<bool> {
        None
    }

    /// Decide certificate trust mid-handshake. `previous` is set when a
    /// different certificate was trusted for this host before. `None`
    /// falls back to the session's built-in policy.
    fn on_verify_certificate(
        &mut self,
        _certificate: &CertificateInfo,
        _previous: Option<&CertificateSnapshot>,
    ) -> Option<bool> {
        None
    }

    /// A non-fatal error was recorded on the session.
    fn on_error(&mut self, _error: &SessionError) {}
}

/// No-op hooks, for hosts that only poll.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl SessionEvents for NullEvents {}

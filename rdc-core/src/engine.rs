//! The protocol engine seam.
//!
//! Everything that touches the wire sits behind [`ProtocolEngine`]; the
//! session owns one engine and drives it through this trait. The
//! handshake may need host decisions (credentials, certificate trust)
//! before it can proceed, so `connect` takes a [`HandshakeHooks`] that
//! the engine calls synchronously mid-handshake.
//!
//! After connect, the engine is a pull source: `poll_event` is the
//! single suspension point, yielding at most one event per call.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::channels::ChannelId;
use crate::clipboard::ClipboardPdu;
use crate::config::{
    Credentials, DisplayConfig, Endpoint, GatewayConfig, PerformanceFlags, SecurityPolicy,
};
use crate::error::SessionError;
use crate::framebuffer::Rect;
use crate::input::InputEvent;

// ── Handshake types ──────────────────────────────────────────────

/// Everything the engine needs for one connect attempt. Snapshotted
/// from the session configuration at connect time.
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
    pub display: DisplayConfig,
    pub security: SecurityPolicy,
    pub gateway: Option<GatewayConfig>,
    pub performance: PerformanceFlags,
}

/// The server certificate presented during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub host: String,
    pub port: u16,
    pub common_name: String,
    pub subject: String,
    pub issuer: String,
    pub fingerprint: String,
    /// Engine-reported verification flags (expired, name mismatch, ...).
    pub flags: u32,
}

/// The previously trusted values for a host whose certificate changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateSnapshot {
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub fingerprint: Option<String>,
}

/// Host decision points the engine hits mid-handshake. The engine
/// blocks on these; they must not suspend.
pub trait HandshakeHooks: Send {
    /// Complete or veto the credential set before authentication runs.
    /// Returning `false` aborts the handshake.
    fn authenticate(&mut self, pending: &mut Credentials) -> bool;

    /// Decide whether to trust the presented certificate. `previous` is
    /// set when a different certificate was trusted for this host
    /// before. Returning `false` aborts the handshake.
    fn verify_certificate(
        &mut self,
        certificate: &CertificateInfo,
        previous: Option<&CertificateSnapshot>,
    ) -> bool;
}

// ── Runtime types ────────────────────────────────────────────────

/// Geometry of the rendering surface the engine negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
}

/// One event pulled from the engine after connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A requested channel finished its own negotiation.
    ChannelConnected { channel: ChannelId, capabilities: u64 },
    /// A channel went away mid-session.
    ChannelDisconnected { channel: ChannelId },
    /// An inbound message on the clipboard channel.
    Clipboard(ClipboardPdu),
    /// The remote desktop changed size.
    DesktopResized { width: u32, height: u32 },
    /// A batch of updates finished; `pixels` holds the damaged region
    /// in row-major order.
    PaintComplete { rect: Rect, pixels: Bytes },
    /// The peer or transport ended the session.
    Disconnected { reason: Option<String> },
}

/// Transport-level statistics. The byte counters are best-effort;
/// frame rate and round-trip stay absent unless the engine actually
/// measures them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransportStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub frame_rate: Option<f64>,
    pub round_trip: Option<Duration>,
}

// ── ProtocolEngine ───────────────────────────────────────────────

/// Capability surface of a wire-protocol implementation.
#[async_trait]
pub trait ProtocolEngine: Send {
    /// Prepare a channel before connect. Called once per planned
    /// channel, in load order.
    fn load_channel(&mut self, channel: ChannelId) -> Result<(), SessionError>;

    /// Run the transport and security handshake. On success the
    /// rendering surface is up and events may be polled.
    async fn connect(
        &mut self,
        settings: ConnectSettings,
        hooks: &mut dyn HandshakeHooks,
    ) -> Result<SurfaceInfo, SessionError>;

    /// Wait up to `timeout` for the next event. `Ok(None)` means the
    /// timeout elapsed with nothing to deliver.
    async fn poll_event(&mut self, timeout: Duration)
    -> Result<Option<EngineEvent>, SessionError>;

    /// Inject one input event into the session.
    fn send_input(&mut self, event: InputEvent) -> Result<(), SessionError>;

    /// Send one message on the clipboard channel.
    fn send_clipboard(&mut self, pdu: ClipboardPdu) -> Result<(), SessionError>;

    /// Tear the connection down. Must be safe to call in any state.
    async fn disconnect(&mut self) -> Result<(), SessionError>;

    /// Current transport statistics, if the engine tracks any.
    fn transport_stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

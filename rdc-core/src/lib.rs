//! # rdc-core
//!
//! Client-side core for remote-desktop sessions.
//!
//! This crate contains:
//! - **Session**: `Session` — lifecycle orchestration over a protocol engine
//! - **State**: `ConnectionState` — validated lifecycle state machine
//! - **Config**: endpoint, credentials, display, security, gateway, flags
//! - **Engine**: `ProtocolEngine` — the capability trait a wire
//!   implementation plugs into
//! - **Events**: `SessionEvents` — per-session host hooks
//! - **Channels**: negotiation plan and registry for the side channels
//! - **Clipboard**: `ClipboardExchange` — text format-exchange protocol
//! - **Framebuffer**: session-owned pixel mirror with damage blits
//! - **Input**: pointer/keyboard translation to wire events
//! - **Error**: `SessionError` — typed, `thiserror`-based error hierarchy

pub mod channels;
pub mod clipboard;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod framebuffer;
pub mod input;
pub mod session;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use channels::{ChannelId, ChannelPlan, ChannelRegistration, ChannelRegistry};
pub use clipboard::{
    CF_TEXT, CF_UNICODETEXT, ClipboardCaps, ClipboardExchange, ClipboardPdu, ClipboardReply,
};
pub use config::{
    Credentials, DEFAULT_PORT, DisplayConfig, Endpoint, FeatureFlags, GatewayConfig,
    PerformanceFlags, SecurityPolicy, SessionConfig,
};
pub use engine::{
    CertificateInfo, CertificateSnapshot, ConnectSettings, EngineEvent, HandshakeHooks,
    ProtocolEngine, SurfaceInfo, TransportStats,
};
pub use error::{ClipboardError, SessionError};
pub use events::{NullEvents, SessionEvents};
pub use framebuffer::{Framebuffer, Rect};
pub use input::{InputEvent, KeyboardFlags, MouseButton, PointerFlags, SpecialKey};
pub use session::{Session, SessionStatistics};
pub use state::{ConnectionState, StateCode};

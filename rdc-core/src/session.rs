//! Session orchestration.
//!
//! One [`Session`] owns one protocol engine, one host hook set, and all
//! per-attempt state: the lifecycle machine, the channel registry, the
//! clipboard exchange, and the framebuffer. Nothing here is global; two
//! sessions in one process never share state.
//!
//! The session is single-task: configure it, `connect`, then drive it
//! by calling `pump_events` in a loop until it returns `Ok(false)` or
//! an error. Input and clipboard operations interleave with pumping on
//! the same task.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::channels::{ChannelId, ChannelPlan, ChannelRegistry};
use crate::clipboard::{ClipboardExchange, ClipboardPdu};
use crate::config::{
    Credentials, DisplayConfig, Endpoint, FeatureFlags, GatewayConfig, PerformanceFlags,
    SecurityPolicy, SessionConfig,
};
use crate::engine::{
    CertificateInfo, CertificateSnapshot, ConnectSettings, EngineEvent, HandshakeHooks,
    ProtocolEngine,
};
use crate::error::SessionError;
use crate::events::SessionEvents;
use crate::framebuffer::Framebuffer;
use crate::input::{self, InputEvent, MouseButton, SpecialKey};
use crate::state::ConnectionState;

// ── Statistics ───────────────────────────────────────────────────

/// Point-in-time session statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionStatistics {
    /// How long the session has been established. `None` unless
    /// connected.
    pub connection_duration: Option<Duration>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Frames per second, when the engine tracks it. Never fabricated.
    pub frame_rate: Option<f64>,
    /// Transport round-trip time, when the engine tracks it.
    pub round_trip: Option<Duration>,
}

// ── Session ──────────────────────────────────────────────────────

/// A client-side remote-desktop session.
pub struct Session<E, H> {
    engine: E,
    events: H,
    config: SessionConfig,
    state: ConnectionState,
    registry: ChannelRegistry,
    clipboard: ClipboardExchange,
    framebuffer: Framebuffer,
    last_error: Option<String>,
}

impl<E: ProtocolEngine, H: SessionEvents> Session<E, H> {
    pub fn new(engine: E, events: H) -> Self {
        Self {
            engine,
            events,
            config: SessionConfig::default(),
            state: ConnectionState::default(),
            registry: ChannelRegistry::default(),
            clipboard: ClipboardExchange::new(),
            framebuffer: Framebuffer::new(),
            last_error: None,
        }
    }

    // ── Configuration ────────────────────────────────────────────
    //
    // Setters are only valid before connect (or after the previous
    // attempt ended). Each validates its input and leaves the previous
    // value untouched on rejection.

    pub fn set_endpoint(
        &mut self,
        host: impl Into<String>,
        port: u16,
    ) -> Result<(), SessionError> {
        self.ensure_configurable("set endpoint")?;
        let host = host.into();
        if host.is_empty() {
            return Err(SessionError::InvalidArgument("host must not be empty"));
        }
        self.config.endpoint = Some(Endpoint::new(host, port));
        Ok(())
    }

    pub fn set_credentials(&mut self, credentials: Credentials) -> Result<(), SessionError> {
        self.ensure_configurable("set credentials")?;
        self.config.credentials = credentials;
        Ok(())
    }

    pub fn set_display(
        &mut self,
        width: u32,
        height: u32,
        color_depth: u32,
    ) -> Result<(), SessionError> {
        self.ensure_configurable("set display")?;
        self.config.display = DisplayConfig::new(width, height, color_depth)?;
        // Reported geometry tracks the configuration until a surface is
        // attached.
        self.framebuffer.configure(&self.config.display);
        Ok(())
    }

    pub fn set_security(&mut self, policy: SecurityPolicy) -> Result<(), SessionError> {
        self.ensure_configurable("set security")?;
        self.config.security = policy.normalized();
        Ok(())
    }

    pub fn set_gateway(&mut self, gateway: Option<GatewayConfig>) -> Result<(), SessionError> {
        self.ensure_configurable("set gateway")?;
        if let Some(gw) = &gateway
            && gw.host.is_empty()
        {
            return Err(SessionError::InvalidArgument(
                "gateway host must not be empty",
            ));
        }
        self.config.gateway = gateway;
        Ok(())
    }

    pub fn set_performance_flags(
        &mut self,
        flags: PerformanceFlags,
    ) -> Result<(), SessionError> {
        self.ensure_configurable("set performance flags")?;
        self.config.performance = flags;
        Ok(())
    }

    pub fn set_features(&mut self, features: FeatureFlags) -> Result<(), SessionError> {
        self.ensure_configurable("set features")?;
        self.config.features = features;
        Ok(())
    }

    fn ensure_configurable(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.state.is_configurable() {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state.name(),
            })
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Run the full connect sequence: load channels, handshake, attach
    /// the rendering surface. On failure the session ends up `Failed`
    /// with all per-attempt resources released.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        let endpoint = self
            .config
            .endpoint
            .clone()
            .ok_or(SessionError::InvalidArgument("no endpoint configured"))?;

        self.state.begin_connect()?;
        self.last_error = None;
        self.framebuffer.configure(&self.config.display);
        self.emit_state();
        info!(host = %endpoint.host, port = endpoint.port, "connecting");

        match self.connect_inner(endpoint).await {
            Ok(()) => {
                self.state.complete_connect()?;
                self.emit_state();
                info!("session established");
                Ok(())
            }
            Err(err) => {
                self.fail_session(&err);
                Err(err)
            }
        }
    }

    async fn connect_inner(&mut self, endpoint: Endpoint) -> Result<(), SessionError> {
        let plan = ChannelPlan::from_features(self.config.features);
        debug!(channels = ?plan.requested(), "channel plan");
        self.registry = plan.load(|channel| self.engine.load_channel(channel))?;

        let security = self.config.security.normalized();
        debug!(
            mutual_auth = security.use_mutual_auth,
            encryption = security.use_transport_encryption,
            ignore_cert_errors = security.ignore_certificate_errors,
            gateway = self.config.gateway.is_some(),
            "handshake security settings"
        );
        let settings = ConnectSettings {
            endpoint,
            credentials: self.config.credentials.clone(),
            display: self.config.display,
            security,
            gateway: self.config.gateway.clone(),
            performance: self.config.performance,
        };

        let mut hooks = HostHooks {
            events: &mut self.events,
            configured: self.config.credentials.clone(),
            security,
        };
        let surface = self.engine.connect(settings, &mut hooks).await?;
        self.framebuffer.attach(surface);
        Ok(())
    }

    /// Tear the session down. Idempotent: calling it on a session that
    /// never connected, or twice, is a no-op.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Disconnected) {
            return Ok(());
        }
        if let Err(err) = self.engine.disconnect().await {
            warn!(error = %err, "engine disconnect reported an error");
        }
        self.teardown();
        self.state.finish_disconnect()?;
        self.emit_state();
        info!("session disconnected");
        Ok(())
    }

    /// Pull and dispatch at most one engine event, waiting up to
    /// `timeout`. Returns `Ok(false)` once the session has ended;
    /// `Ok(true)` means keep pumping. An error fails the session.
    pub async fn pump_events(&mut self, timeout: Duration) -> Result<bool, SessionError> {
        if !self.state.is_connected() {
            return Ok(false);
        }

        let outcome = match self.engine.poll_event(timeout).await {
            Ok(Some(event)) => self.dispatch(event),
            Ok(None) => Ok(true),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(live) => Ok(live),
            Err(err) => {
                self.fail_session(&err);
                Err(err)
            }
        }
    }

    fn dispatch(&mut self, event: EngineEvent) -> Result<bool, SessionError> {
        match event {
            EngineEvent::ChannelConnected {
                channel,
                capabilities,
            } => {
                if self.registry.activate(channel, capabilities) {
                    info!(%channel, capabilities, "channel active");
                } else {
                    warn!(%channel, "connected event for a channel that was never requested");
                }
                Ok(true)
            }

            EngineEvent::ChannelDisconnected { channel } => {
                info!(%channel, "channel disconnected");
                self.registry.deactivate(channel);
                if channel == ChannelId::Clipboard {
                    self.clipboard.reset();
                }
                Ok(true)
            }

            EngineEvent::Clipboard(pdu) => {
                self.handle_clipboard(pdu);
                Ok(true)
            }

            EngineEvent::DesktopResized { width, height } => {
                // Reallocate first so the hook observes the new
                // geometry.
                self.framebuffer.resize(width, height)?;
                self.events.on_desktop_resize(width, height);
                Ok(true)
            }

            EngineEvent::PaintComplete { rect, pixels } => {
                if rect.is_empty() {
                    return Ok(true);
                }
                self.framebuffer.blit(rect, &pixels)?;
                self.events.on_frame_update(rect);
                Ok(true)
            }

            EngineEvent::Disconnected { reason } => {
                match reason.as_deref() {
                    Some(reason) => info!(reason, "remote ended the session"),
                    None => info!("remote ended the session"),
                }
                self.teardown();
                self.state.finish_disconnect()?;
                self.emit_state();
                Ok(false)
            }
        }
    }

    /// Clipboard errors are soft: they disable the channel for the rest
    /// of the session instead of failing it.
    fn handle_clipboard(&mut self, pdu: ClipboardPdu) {
        if !self.registry.is_active(ChannelId::Clipboard) {
            warn!("clipboard message before channel activation; dropped");
            return;
        }

        let reply = match self.clipboard.handle(pdu) {
            Ok(reply) => reply,
            Err(err) => {
                let err = SessionError::from(err);
                warn!(error = %err, "clipboard protocol error; disabling clipboard");
                self.record_soft_error(err);
                self.disable_clipboard();
                return;
            }
        };

        if let Some(declined) = reply.declined_request {
            let err = SessionError::ChannelRuntime(format!(
                "clipboard data request for format {declined} declined; one already outstanding"
            ));
            self.record_soft_error(err);
        }

        for pdu in reply.pdus {
            if let Err(err) = self.engine.send_clipboard(pdu) {
                warn!(error = %err, "clipboard send failed; disabling clipboard");
                self.record_soft_error(err);
                self.disable_clipboard();
                return;
            }
        }

        if let Some(text) = reply.remote_text {
            self.events.on_clipboard_text(&text);
        }
    }

    fn disable_clipboard(&mut self) {
        self.registry.deactivate(ChannelId::Clipboard);
        self.clipboard.reset();
    }

    fn record_soft_error(&mut self, err: SessionError) {
        self.last_error = Some(err.to_string());
        self.events.on_error(&err);
    }

    fn fail_session(&mut self, err: &SessionError) {
        if err.is_authentication() {
            // Log the username only; credentials never reach the log.
            warn!(
                username = self.config.credentials.username.as_deref().unwrap_or(""),
                "authentication rejected"
            );
        }
        error!(error = %err, "session failed");
        self.last_error = Some(err.to_string());
        self.events.on_error(err);
        self.teardown();
        self.state.fail();
        self.emit_state();
    }

    fn teardown(&mut self) {
        self.registry.deactivate_all();
        self.clipboard.reset();
        self.framebuffer.clear();
    }

    fn emit_state(&mut self) {
        self.events.on_state_changed(self.state.code(), &self.state);
    }

    // ── Clipboard ────────────────────────────────────────────────

    /// Offer local text to the remote. The text is announced, not
    /// pushed; the remote requests the data when it wants it.
    pub fn set_clipboard_text(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_connected()?;
        if !self.registry.is_active(ChannelId::Clipboard) {
            return Err(SessionError::ChannelRuntime(
                "clipboard channel is not active".into(),
            ));
        }
        for pdu in self.clipboard.publish_local(text.into()) {
            self.engine.send_clipboard(pdu)?;
        }
        Ok(())
    }

    /// The most recently received remote clipboard text.
    pub fn clipboard_text(&self) -> Option<&str> {
        self.clipboard.remote_text()
    }

    // ── Input ────────────────────────────────────────────────────

    pub fn send_mouse_move(&mut self, x: u16, y: u16) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.engine.send_input(input::mouse_move(x, y))
    }

    pub fn send_mouse_button(
        &mut self,
        button: MouseButton,
        pressed: bool,
        x: u16,
        y: u16,
    ) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.engine
            .send_input(input::mouse_button(button, pressed, x, y))
    }

    /// Press and release in one call.
    pub fn send_mouse_click(
        &mut self,
        button: MouseButton,
        x: u16,
        y: u16,
    ) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.engine
            .send_input(input::mouse_button(button, true, x, y))?;
        self.engine
            .send_input(input::mouse_button(button, false, x, y))
    }

    pub fn send_mouse_wheel(&mut self, delta: i32, horizontal: bool) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.engine
            .send_input(input::mouse_wheel(delta, horizontal))
    }

    pub fn send_key(
        &mut self,
        scan_code: u16,
        pressed: bool,
        extended: bool,
    ) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.engine
            .send_input(input::key(scan_code, pressed, extended))
    }

    /// Inject one unicode code point as a down/up pair.
    pub fn send_unicode(&mut self, code_point: u16) -> Result<(), SessionError> {
        self.ensure_connected()?;
        for event in input::unicode_pair(code_point) {
            self.engine.send_input(event)?;
        }
        Ok(())
    }

    /// Type a string via unicode injection. Characters outside the
    /// basic multilingual plane cannot be carried and are skipped.
    pub fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        for ch in text.chars() {
            let code = ch as u32;
            if code > u32::from(u16::MAX) {
                warn!(%ch, "character outside the basic multilingual plane; skipped");
                continue;
            }
            for event in input::unicode_pair(code as u16) {
                self.engine.send_input(event)?;
            }
        }
        Ok(())
    }

    /// Send a well-known chord: presses in order, releases in reverse.
    pub fn send_special_key(&mut self, special: SpecialKey) -> Result<(), SessionError> {
        self.ensure_connected()?;
        for event in input::special_key_events(special) {
            self.engine.send_input(event)?;
        }
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    // ── Introspection ────────────────────────────────────────────

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Message of the most recent failure or soft error, kept until the
    /// next connect attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a channel is currently connected and active.
    pub fn is_channel_active(&self, channel: ChannelId) -> bool {
        self.registry.is_active(channel)
    }

    /// Borrowed view of the framebuffer. The borrow cannot outlive the
    /// next pump call, so a remote resize can never invalidate it.
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Current frame geometry as `(width, height)`.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.framebuffer.width(), self.framebuffer.height())
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.framebuffer.bytes_per_pixel()
    }

    /// Borrow the underlying engine.
    pub fn engine_ref(&self) -> &E {
        &self.engine
    }

    /// Borrow the host hook set.
    pub fn events_ref(&self) -> &H {
        &self.events
    }

    pub fn statistics(&self) -> SessionStatistics {
        let transport = self.engine.transport_stats();
        SessionStatistics {
            connection_duration: self.state.connected_duration(),
            bytes_sent: transport.bytes_sent,
            bytes_received: transport.bytes_received,
            frame_rate: transport.frame_rate,
            round_trip: transport.round_trip,
        }
    }
}

// ── Handshake policy ─────────────────────────────────────────────

/// Bridges the engine's mid-handshake decision points to the host's
/// hooks, applying the built-in policy where no hook is installed.
struct HostHooks<'a, H> {
    events: &'a mut H,
    configured: Credentials,
    security: SecurityPolicy,
}

impl<H: SessionEvents> HandshakeHooks for HostHooks<'_, H> {
    fn authenticate(&mut self, pending: &mut Credentials) -> bool {
        pending.fill_missing_from(&self.configured);

        if let Some(verdict) = self.events.on_authenticate(pending) {
            if !verdict {
                info!("host declined the authentication request");
            }
            return verdict;
        }

        if pending.is_incomplete() {
            warn!("credentials incomplete at handshake time; continuing");
        }
        true
    }

    fn verify_certificate(
        &mut self,
        certificate: &CertificateInfo,
        previous: Option<&CertificateSnapshot>,
    ) -> bool {
        if self.security.ignore_certificate_errors {
            debug!(host = %certificate.host, "certificate check bypassed by policy");
            return true;
        }

        if let Some(verdict) = self.events.on_verify_certificate(certificate, previous) {
            if !verdict {
                info!(host = %certificate.host, "host rejected the server certificate");
            }
            return verdict;
        }

        warn!(
            host = %certificate.host,
            fingerprint = %certificate.fingerprint,
            changed = previous.is_some(),
            "no certificate hook installed; accepting (development fallback)"
        );
        true
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::clipboard::{CF_UNICODETEXT, encode_text};
    use crate::engine::{SurfaceInfo, TransportStats};
    use crate::framebuffer::Rect;
    use crate::state::StateCode;

    #[derive(Default)]
    struct MockEngine {
        script: VecDeque<EngineEvent>,
        loaded: Vec<ChannelId>,
        inputs: Vec<InputEvent>,
        sent_clipboard: Vec<ClipboardPdu>,
        fail_channel: Option<ChannelId>,
        connect_error: Option<SessionError>,
        disconnects: usize,
    }

    impl MockEngine {
        fn scripted(events: impl IntoIterator<Item = EngineEvent>) -> Self {
            Self {
                script: events.into_iter().collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ProtocolEngine for MockEngine {
        fn load_channel(&mut self, channel: ChannelId) -> Result<(), SessionError> {
            if self.fail_channel == Some(channel) {
                return Err(SessionError::EventLoop("addin missing".into()));
            }
            self.loaded.push(channel);
            Ok(())
        }

        async fn connect(
            &mut self,
            settings: ConnectSettings,
            hooks: &mut dyn HandshakeHooks,
        ) -> Result<SurfaceInfo, SessionError> {
            if let Some(err) = self.connect_error.take() {
                return Err(err);
            }
            let mut pending = Credentials::default();
            if !hooks.authenticate(&mut pending) {
                return Err(SessionError::Authentication {
                    code: 0x0002_000c,
                    message: "aborted by host".into(),
                });
            }
            let cert = CertificateInfo {
                host: settings.endpoint.host.clone(),
                port: settings.endpoint.port,
                common_name: "test".into(),
                subject: "CN=test".into(),
                issuer: "CN=test-ca".into(),
                fingerprint: "ab:cd".into(),
                flags: 0,
            };
            if !hooks.verify_certificate(&cert, None) {
                return Err(SessionError::Handshake {
                    code: 0x0002_000d,
                    name: "ERRCONNECT_TLS_CONNECT_FAILED".into(),
                    category: "connect".into(),
                    message: "certificate rejected".into(),
                });
            }
            Ok(SurfaceInfo {
                width: settings.display.width,
                height: settings.display.height,
                bytes_per_pixel: settings.display.bytes_per_pixel(),
            })
        }

        async fn poll_event(
            &mut self,
            _timeout: Duration,
        ) -> Result<Option<EngineEvent>, SessionError> {
            Ok(self.script.pop_front())
        }

        fn send_input(&mut self, event: InputEvent) -> Result<(), SessionError> {
            self.inputs.push(event);
            Ok(())
        }

        fn send_clipboard(&mut self, pdu: ClipboardPdu) -> Result<(), SessionError> {
            self.sent_clipboard.push(pdu);
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), SessionError> {
            self.disconnects += 1;
            Ok(())
        }

        fn transport_stats(&self) -> TransportStats {
            TransportStats {
                bytes_sent: 100,
                bytes_received: 2000,
                frame_rate: Some(30.0),
                round_trip: Some(Duration::from_millis(12)),
            }
        }
    }

    #[derive(Default)]
    struct RecordingEvents {
        states: Vec<StateCode>,
        frames: Vec<Rect>,
        resizes: Vec<(u32, u32)>,
        clipboard_texts: Vec<String>,
        errors: Vec<String>,
        auth_verdict: Option<bool>,
        cert_verdict: Option<bool>,
    }

    impl SessionEvents for RecordingEvents {
        fn on_state_changed(&mut self, code: StateCode, _state: &ConnectionState) {
            self.states.push(code);
        }
        fn on_frame_update(&mut self, rect: Rect) {
            self.frames.push(rect);
        }
        fn on_desktop_resize(&mut self, width: u32, height: u32) {
            self.resizes.push((width, height));
        }
        fn on_clipboard_text(&mut self, text: &str) {
            self.clipboard_texts.push(text.to_owned());
        }
        fn on_authenticate(&mut self, pending: &mut Credentials) -> Option<bool> {
            pending.username = Some("hook-user".into());
            self.auth_verdict
        }
        fn on_verify_certificate(
            &mut self,
            _certificate: &CertificateInfo,
            _previous: Option<&CertificateSnapshot>,
        ) -> Option<bool> {
            self.cert_verdict
        }
        fn on_error(&mut self, error: &SessionError) {
            self.errors.push(error.to_string());
        }
    }

    fn configured(engine: MockEngine) -> Session<MockEngine, RecordingEvents> {
        let mut session = Session::new(engine, RecordingEvents::default());
        session.set_endpoint("host.example", 3389).unwrap();
        session
            .set_credentials(Credentials {
                username: Some("alice".into()),
                password: Some("hunter2".into()),
                domain: None,
            })
            .unwrap();
        session
    }

    async fn connected(engine: MockEngine) -> Session<MockEngine, RecordingEvents> {
        let mut session = configured(engine);
        session.connect().await.unwrap();
        session
    }

    #[tokio::test]
    async fn connect_loads_channels_and_attaches_surface() {
        let mut session = connected(MockEngine::default()).await;

        assert!(session.is_connected());
        assert_eq!(
            session.engine.loaded,
            [
                ChannelId::DynamicTransport,
                ChannelId::Graphics,
                ChannelId::DisplayControl,
                ChannelId::Clipboard,
            ]
        );
        assert_eq!(session.frame_size(), (1920, 1080));
        assert!(session.framebuffer().is_attached());
        assert_eq!(
            session.events.states,
            [StateCode::Connecting, StateCode::Connected]
        );
    }

    #[tokio::test]
    async fn connect_without_endpoint_is_rejected() {
        let mut session = Session::new(MockEngine::default(), RecordingEvents::default());
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        // The state machine was never started.
        assert_eq!(*session.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn hard_channel_failure_fails_the_connect() {
        let engine = MockEngine {
            fail_channel: Some(ChannelId::Graphics),
            ..MockEngine::default()
        };
        let mut session = configured(engine);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::ChannelLoad { .. }));
        assert_eq!(*session.state(), ConnectionState::Failed);
        assert!(session.last_error().is_some());
        assert_eq!(
            session.events.states,
            [StateCode::Connecting, StateCode::Error]
        );
    }

    #[tokio::test]
    async fn handshake_failure_releases_resources() {
        let engine = MockEngine {
            connect_error: Some(SessionError::Authentication {
                code: 0x0002_000c,
                message: "bad password".into(),
            }),
            ..MockEngine::default()
        };
        let mut session = configured(engine);

        let err = session.connect().await.unwrap_err();
        assert!(err.is_authentication());
        assert!(!session.framebuffer().is_attached());
        assert!(session.last_error().unwrap().contains("bad password"));

        // A failed session can be reconfigured and reconnected.
        session.set_display(1024, 768, 16).unwrap();
        session.connect().await.unwrap();
        assert_eq!(session.frame_size(), (1024, 768));
    }

    #[tokio::test]
    async fn host_hook_can_abort_authentication() {
        let mut session = configured(MockEngine::default());
        session.events.auth_verdict = Some(false);

        let err = session.connect().await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn host_hook_can_reject_certificate() {
        let mut session = configured(MockEngine::default());
        session.events.cert_verdict = Some(false);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Handshake { .. }));
    }

    #[tokio::test]
    async fn certificate_bypass_skips_the_hook() {
        let mut session = configured(MockEngine::default());
        session
            .set_security(SecurityPolicy {
                ignore_certificate_errors: true,
                ..SecurityPolicy::default()
            })
            .unwrap();
        // The hook would reject, but the policy wins.
        session.events.cert_verdict = Some(false);

        session.connect().await.unwrap();
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn setters_are_rejected_while_connected() {
        let mut session = connected(MockEngine::default()).await;
        let err = session.set_display(800, 600, 32).unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn channel_activation_and_paint_flow() {
        let rect = Rect::new(0, 0, 2, 1);
        let engine = MockEngine::scripted([
            EngineEvent::ChannelConnected {
                channel: ChannelId::Graphics,
                capabilities: 0x1,
            },
            EngineEvent::PaintComplete {
                rect,
                pixels: Bytes::from(vec![0xEE; 2 * 4]),
            },
        ]);
        let mut session = connected(engine).await;

        assert!(session.pump_events(Duration::ZERO).await.unwrap());
        assert!(session.is_channel_active(ChannelId::Graphics));

        assert!(session.pump_events(Duration::ZERO).await.unwrap());
        assert_eq!(session.events.frames, [rect]);
        assert_eq!(&session.framebuffer().data()[..8], &[0xEE; 8]);
    }

    #[tokio::test]
    async fn empty_paint_rect_is_skipped() {
        let engine = MockEngine::scripted([EngineEvent::PaintComplete {
            rect: Rect::new(0, 0, 0, 0),
            pixels: Bytes::new(),
        }]);
        let mut session = connected(engine).await;

        assert!(session.pump_events(Duration::ZERO).await.unwrap());
        assert!(session.events.frames.is_empty());
    }

    #[tokio::test]
    async fn resize_reallocates_before_the_hook_fires() {
        let engine = MockEngine::scripted([EngineEvent::DesktopResized {
            width: 2560,
            height: 1440,
        }]);
        let mut session = connected(engine).await;

        assert!(session.pump_events(Duration::ZERO).await.unwrap());
        assert_eq!(session.events.resizes, [(2560, 1440)]);
        assert_eq!(session.frame_size(), (2560, 1440));
    }

    #[tokio::test]
    async fn out_of_bounds_paint_fails_the_session() {
        let engine = MockEngine::scripted([EngineEvent::PaintComplete {
            rect: Rect::new(1919, 0, 2, 1),
            pixels: Bytes::from(vec![0; 2 * 4]),
        }]);
        let mut session = connected(engine).await;

        let err = session.pump_events(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation(_)));
        assert_eq!(*session.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn remote_disconnect_ends_the_pump() {
        let engine = MockEngine::scripted([EngineEvent::Disconnected { reason: None }]);
        let mut session = connected(engine).await;

        assert!(!session.pump_events(Duration::ZERO).await.unwrap());
        assert_eq!(*session.state(), ConnectionState::Disconnected);
        assert!(!session.framebuffer().is_attached());
    }

    #[tokio::test]
    async fn clipboard_monitor_ready_round_trip() {
        let engine = MockEngine::scripted([
            EngineEvent::ChannelConnected {
                channel: ChannelId::Clipboard,
                capabilities: 0x2,
            },
            EngineEvent::Clipboard(ClipboardPdu::MonitorReady),
            EngineEvent::Clipboard(ClipboardPdu::FormatList {
                formats: vec![CF_UNICODETEXT],
            }),
            EngineEvent::Clipboard(ClipboardPdu::FormatDataResponse {
                ok: true,
                data: encode_text(CF_UNICODETEXT, "from remote").unwrap(),
            }),
        ]);
        let mut session = connected(engine).await;

        for _ in 0..4 {
            assert!(session.pump_events(Duration::ZERO).await.unwrap());
        }

        // Caps + formats, then list ack + data request.
        assert_eq!(session.engine.sent_clipboard.len(), 4);
        assert_eq!(
            session.events.clipboard_texts,
            ["from remote".to_owned()]
        );
        assert_eq!(session.clipboard_text(), Some("from remote"));
    }

    #[tokio::test]
    async fn clipboard_before_activation_is_dropped() {
        let engine = MockEngine::scripted([EngineEvent::Clipboard(ClipboardPdu::MonitorReady)]);
        let mut session = connected(engine).await;

        assert!(session.pump_events(Duration::ZERO).await.unwrap());
        assert!(session.engine.sent_clipboard.is_empty());
    }

    #[tokio::test]
    async fn unsolicited_clipboard_response_disables_the_channel() {
        let engine = MockEngine::scripted([
            EngineEvent::ChannelConnected {
                channel: ChannelId::Clipboard,
                capabilities: 0,
            },
            EngineEvent::Clipboard(ClipboardPdu::FormatDataResponse {
                ok: true,
                data: Bytes::from_static(b"x\0"),
            }),
        ]);
        let mut session = connected(engine).await;

        assert!(session.pump_events(Duration::ZERO).await.unwrap());
        assert!(session.pump_events(Duration::ZERO).await.unwrap());

        // Soft failure: session stays up, channel goes down.
        assert!(session.is_connected());
        assert!(!session.is_channel_active(ChannelId::Clipboard));
        assert_eq!(session.events.errors.len(), 1);
        assert!(session.last_error().is_some());
    }

    #[tokio::test]
    async fn set_clipboard_text_announces_formats() {
        let engine = MockEngine::scripted([EngineEvent::ChannelConnected {
            channel: ChannelId::Clipboard,
            capabilities: 0,
        }]);
        let mut session = connected(engine).await;
        session.pump_events(Duration::ZERO).await.unwrap();

        session.set_clipboard_text("local text").unwrap();
        assert!(matches!(
            session.engine.sent_clipboard[0],
            ClipboardPdu::FormatList { .. }
        ));
    }

    #[tokio::test]
    async fn clipboard_text_requires_active_channel() {
        let mut session = connected(MockEngine::default()).await;
        let err = session.set_clipboard_text("x").unwrap_err();
        assert!(matches!(err, SessionError::ChannelRuntime(_)));
    }

    #[tokio::test]
    async fn input_requires_connection() {
        let mut session = configured(MockEngine::default());
        assert!(matches!(
            session.send_mouse_move(1, 2),
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            session.send_text("x"),
            Err(SessionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn click_sends_press_then_release() {
        let mut session = connected(MockEngine::default()).await;
        session
            .send_mouse_click(MouseButton::Left, 10, 20)
            .unwrap();
        assert_eq!(
            session.engine.inputs,
            [
                input::mouse_button(MouseButton::Left, true, 10, 20),
                input::mouse_button(MouseButton::Left, false, 10, 20),
            ]
        );
    }

    #[tokio::test]
    async fn send_text_skips_non_bmp_characters() {
        let mut session = connected(MockEngine::default()).await;
        session.send_text("a🎉b").unwrap();

        // Two BMP characters, two events each.
        assert_eq!(session.engine.inputs.len(), 4);
        assert_eq!(session.engine.inputs[0], input::unicode_pair('a' as u16)[0]);
        assert_eq!(session.engine.inputs[2], input::unicode_pair('b' as u16)[0]);
    }

    #[tokio::test]
    async fn special_key_sends_full_chord() {
        let mut session = connected(MockEngine::default()).await;
        session.send_special_key(SpecialKey::CtrlAltDel).unwrap();
        assert_eq!(session.engine.inputs.len(), 6);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut session = connected(MockEngine::default()).await;
        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.engine.disconnects, 1);
        assert_eq!(*session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_before_connect_is_a_no_op() {
        let mut session = configured(MockEngine::default());
        session.disconnect().await.unwrap();
        assert_eq!(session.engine.disconnects, 0);
        assert_eq!(*session.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn statistics_reflect_engine_and_state() {
        let mut session = configured(MockEngine::default());
        assert_eq!(session.statistics().connection_duration, None);

        session.connect().await.unwrap();
        let stats = session.statistics();
        assert!(stats.connection_duration.is_some());
        assert_eq!((stats.bytes_sent, stats.bytes_received), (100, 2000));
        assert_eq!(stats.frame_rate, Some(30.0));
        assert_eq!(stats.round_trip, Some(Duration::from_millis(12)));
    }

    #[tokio::test]
    async fn display_configuration_is_reported_before_connect() {
        let mut session = configured(MockEngine::default());
        session.set_display(1280, 720, 24).unwrap();
        assert_eq!(session.frame_size(), (1280, 720));
        assert_eq!(session.bytes_per_pixel(), 3);

        // A rejected setter leaves the previous geometry untouched.
        assert!(session.set_display(0, 720, 24).is_err());
        assert_eq!(session.frame_size(), (1280, 720));
    }

    #[tokio::test]
    async fn pump_on_an_unconnected_session_just_stops() {
        let mut session = configured(MockEngine::default());
        assert!(!session.pump_events(Duration::ZERO).await.unwrap());
    }
}

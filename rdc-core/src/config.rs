//! Session configuration: endpoint, credentials, display geometry,
//! security policy, gateway relay, and feature/performance flags.
//!
//! All values are validated at set time; a rejected setter leaves the
//! previous configuration untouched. Every setter is independent and
//! idempotent, and must complete before `connect`.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

// ── Endpoint ─────────────────────────────────────────────────────

/// Default server port for the remote-desktop protocol.
pub const DEFAULT_PORT: u16 = 3389;

/// Network endpoint of the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

// ── Credentials ──────────────────────────────────────────────────

/// Credential set for the session. All fields are optional at creation;
/// empty slots may be filled by the host's authentication hook or from
/// the configured values during the handshake.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
}

/// The password value never reaches log output, only its presence.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("domain", &self.domain)
            .finish()
    }
}

impl Credentials {
    /// Fill any empty slot from `other`, leaving populated slots alone.
    pub fn fill_missing_from(&mut self, other: &Credentials) {
        if self.username.is_none() {
            self.username.clone_from(&other.username);
        }
        if self.password.is_none() {
            self.password.clone_from(&other.password);
        }
        if self.domain.is_none() {
            self.domain.clone_from(&other.domain);
        }
    }

    /// Whether username or password is missing or empty.
    pub fn is_incomplete(&self) -> bool {
        fn blank(slot: &Option<String>) -> bool {
            slot.as_deref().is_none_or(str::is_empty)
        }
        blank(&self.username) || blank(&self.password)
    }
}

// ── DisplayConfig ────────────────────────────────────────────────

/// Requested display geometry and color depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            color_depth: 32,
        }
    }
}

impl DisplayConfig {
    /// Validate and construct a display configuration.
    ///
    /// Width and height must be positive; color depth must be one of
    /// 16, 24 or 32 bits.
    pub fn new(width: u32, height: u32, color_depth: u32) -> Result<Self, SessionError> {
        if width == 0 || height == 0 {
            return Err(SessionError::InvalidArgument(
                "display width and height must be positive",
            ));
        }
        if !matches!(color_depth, 16 | 24 | 32) {
            return Err(SessionError::InvalidArgument(
                "color depth must be 16, 24 or 32",
            ));
        }
        Ok(Self {
            width,
            height,
            color_depth,
        })
    }

    /// Bytes per pixel implied by the color depth.
    pub const fn bytes_per_pixel(&self) -> u32 {
        match self.color_depth {
            16 => 2,
            24 => 3,
            _ => 4,
        }
    }
}

// ── SecurityPolicy ───────────────────────────────────────────────

/// Transport security policy for the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Require mutual (network-level) authentication.
    pub use_mutual_auth: bool,
    /// Require an encrypted transport.
    pub use_transport_encryption: bool,
    /// Accept any server certificate without consulting the host.
    pub ignore_certificate_errors: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            use_mutual_auth: true,
            use_transport_encryption: true,
            ignore_certificate_errors: false,
        }
    }
}

impl SecurityPolicy {
    /// Mutual auth requires an encrypted transport; force it on.
    pub fn normalized(mut self) -> Self {
        if self.use_mutual_auth {
            self.use_transport_encryption = true;
        }
        self
    }
}

// ── GatewayConfig ────────────────────────────────────────────────

/// Optional relay endpoint the connection is tunnelled through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Relay credentials, independent from the session credentials.
    pub credentials: Credentials,
}

impl GatewayConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: Credentials::default(),
        }
    }
}

// ── Flags ────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Desktop experience features requested from the remote host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PerformanceFlags: u32 {
        const WALLPAPER        = 1 << 0;
        const FULL_WINDOW_DRAG = 1 << 1;
        const MENU_ANIMATIONS  = 1 << 2;
        const THEMES           = 1 << 3;
        const FONT_SMOOTHING   = 1 << 4;
        const COMPRESSION      = 1 << 5;
    }
}

impl Default for PerformanceFlags {
    fn default() -> Self {
        Self::THEMES | Self::FONT_SMOOTHING | Self::COMPRESSION
    }
}

bitflags::bitflags! {
    /// Optional protocol subsystems that drive channel negotiation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct FeatureFlags: u32 {
        /// Accelerated graphics pipeline channel.
        const GRAPHICS_PIPELINE = 1 << 0;
        /// Display-resize notification channel.
        const DISPLAY_CONTROL   = 1 << 1;
        /// Clipboard redirection channel.
        const CLIPBOARD         = 1 << 2;
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::all()
    }
}

// ── SessionConfig ────────────────────────────────────────────────

/// Aggregated configuration for one session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub endpoint: Option<Endpoint>,
    pub credentials: Credentials,
    pub display: DisplayConfig,
    pub security: SecurityPolicy,
    pub gateway: Option<GatewayConfig>,
    pub performance: PerformanceFlags,
    pub features: FeatureFlags,
}

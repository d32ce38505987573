//! Side-channel negotiation and registry.
//!
//! Before connecting, the negotiator turns the configured feature flags
//! into a [`ChannelPlan`] — the set of channels to request from the
//! engine. Dynamic channels (graphics, display control) are carried by
//! a shared transport channel, which is requested automatically whenever
//! any dynamic channel is; that dependency is not separately
//! configurable.
//!
//! Graphics and display control are hard dependencies: a load failure
//! aborts the connect. Clipboard is soft: a load failure only disables
//! clipboard redirection.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::FeatureFlags;
use crate::error::SessionError;

// ── ChannelId ────────────────────────────────────────────────────

/// Identifier of a logical sub-stream multiplexed over the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    /// Accelerated graphics pipeline (dynamic).
    Graphics,
    /// Display-resize notifications (dynamic).
    DisplayControl,
    /// Static transport carrying all dynamic channels.
    DynamicTransport,
    /// Clipboard redirection (static).
    Clipboard,
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ChannelId {
    /// Protocol-level channel name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Graphics => "rdpgfx",
            Self::DisplayControl => "disp",
            Self::DynamicTransport => "drdynvc",
            Self::Clipboard => "cliprdr",
        }
    }

    /// Whether this channel rides on the dynamic transport.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Graphics | Self::DisplayControl)
    }

    /// Hard dependencies abort the connect when they fail to load;
    /// soft dependencies are disabled with a warning.
    pub fn is_hard_dependency(&self) -> bool {
        !matches!(self, Self::Clipboard)
    }
}

// ── ChannelPlan ──────────────────────────────────────────────────

/// The set of channels to request for a connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPlan {
    requested: Vec<ChannelId>,
}

impl ChannelPlan {
    /// Derive the plan from the configured feature flags.
    ///
    /// The dynamic transport channel is added automatically when any
    /// dynamic channel is requested, and is listed first so it is
    /// loaded before the channels it carries.
    pub fn from_features(features: FeatureFlags) -> Self {
        let mut requested = Vec::new();

        if features.contains(FeatureFlags::GRAPHICS_PIPELINE) {
            requested.push(ChannelId::Graphics);
        }
        if features.contains(FeatureFlags::DISPLAY_CONTROL) {
            requested.push(ChannelId::DisplayControl);
        }
        if requested.iter().any(ChannelId::is_dynamic) {
            requested.insert(0, ChannelId::DynamicTransport);
        }
        if features.contains(FeatureFlags::CLIPBOARD) {
            requested.push(ChannelId::Clipboard);
        }

        Self { requested }
    }

    /// Channels in load order.
    pub fn requested(&self) -> &[ChannelId] {
        &self.requested
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.requested.contains(&channel)
    }

    /// Load every planned channel through `load`, applying the
    /// hard/soft dependency policy, and build the registry of channels
    /// that were actually requested.
    pub fn load(
        &self,
        mut load: impl FnMut(ChannelId) -> Result<(), SessionError>,
    ) -> Result<ChannelRegistry, SessionError> {
        let mut registry = ChannelRegistry::default();

        for &channel in &self.requested {
            match load(channel) {
                Ok(()) => {
                    info!(%channel, "channel loaded");
                    registry.register(channel);
                }
                Err(err) if channel.is_hard_dependency() => {
                    return Err(SessionError::ChannelLoad {
                        channel,
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    warn!(%channel, error = %err, "optional channel failed to load; disabled");
                }
            }
        }

        Ok(registry)
    }
}

// ── ChannelRegistry ──────────────────────────────────────────────

/// Per-channel negotiation state for one connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRegistration {
    pub channel: ChannelId,
    /// Set on the channel-connected event, cleared on disconnect.
    pub active: bool,
    /// Capability flags negotiated when the channel connected.
    pub capabilities: u64,
}

/// Registry of requested channels and their activation state.
///
/// Activation happens synchronously inside the channel-connected event,
/// before any data for that channel is dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRegistry {
    entries: Vec<ChannelRegistration>,
}

impl ChannelRegistry {
    fn register(&mut self, channel: ChannelId) {
        if self.get(channel).is_none() {
            self.entries.push(ChannelRegistration {
                channel,
                active: false,
                capabilities: 0,
            });
        }
    }

    pub fn get(&self, channel: ChannelId) -> Option<&ChannelRegistration> {
        self.entries.iter().find(|e| e.channel == channel)
    }

    /// Whether the channel was requested for this attempt.
    pub fn is_requested(&self, channel: ChannelId) -> bool {
        self.get(channel).is_some()
    }

    /// Whether the channel is connected and its sub-handler activated.
    pub fn is_active(&self, channel: ChannelId) -> bool {
        self.get(channel).is_some_and(|e| e.active)
    }

    /// Mark a channel active and record its negotiated capabilities.
    ///
    /// Returns `false` for channels that were never requested.
    pub fn activate(&mut self, channel: ChannelId, capabilities: u64) -> bool {
        match self.entries.iter_mut().find(|e| e.channel == channel) {
            Some(entry) => {
                entry.active = true;
                entry.capabilities = capabilities;
                true
            }
            None => false,
        }
    }

    /// Deactivate a channel and drop its negotiated capabilities.
    pub fn deactivate(&mut self, channel: ChannelId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.channel == channel) {
            entry.active = false;
            entry.capabilities = 0;
        }
    }

    /// Deactivate everything (session teardown).
    pub fn deactivate_all(&mut self) {
        for entry in &mut self.entries {
            entry.active = false;
            entry.capabilities = 0;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Clipboard format-exchange protocol.
//!
//! A two-role negotiation over the clipboard channel, modeled as
//! independent request/response pairs in each direction:
//!
//! ```text
//! Remote ──[MonitorReady]────────────────────► Client
//! Client ──[Capabilities]────────────────────► Remote
//! Client ──[FormatList: unicode, legacy]─────► Remote
//!
//! Remote ──[FormatList]──────────────────────► Client
//! Client ──[FormatListResponse OK]───────────► Remote   (always)
//! Client ──[FormatDataRequest <format>]──────► Remote   (text found)
//! Remote ──[FormatDataResponse <bytes>]──────► Client
//! ```
//!
//! The response does not echo the format id, so the client keeps the id
//! of the single outstanding request and decodes the next response with
//! it. At most one request may be outstanding; a colliding request is
//! declined and surfaced rather than silently overwriting the slot.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ClipboardError;

// ── Format ids ───────────────────────────────────────────────────

/// Legacy 8-bit text, NUL-terminated.
pub const CF_TEXT: u32 = 1;
/// UTF-16LE text, NUL-terminated.
pub const CF_UNICODETEXT: u32 = 13;

/// Formats announced to the remote, in preference order.
pub const CLIENT_FORMATS: [u32; 2] = [CF_UNICODETEXT, CF_TEXT];

/// Capability version announced in the capabilities message.
pub const CAPS_VERSION: u32 = 2;

/// Upper bound on accepted legacy-text payloads.
const MAX_LEGACY_TEXT: usize = 4 * 1024 * 1024;

bitflags::bitflags! {
    /// General capability flags exchanged on the clipboard channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct ClipboardCaps: u32 {
        const USE_LONG_FORMAT_NAMES = 0x0002;
        const STREAM_FILECLIP       = 0x0004;
        const FILECLIP_NO_FILE_PATHS = 0x0008;
        const CAN_LOCK_CLIPDATA     = 0x0010;
    }
}

// ── ClipboardPdu ─────────────────────────────────────────────────

/// Messages carried on the clipboard channel, both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipboardPdu {
    /// Remote is ready for the client's announce sequence.
    MonitorReady,
    /// General capability flags of the sender.
    Capabilities { version: u32, flags: ClipboardCaps },
    /// The formats the sender currently offers.
    FormatList { formats: Vec<u32> },
    /// Acknowledgement of a format list. Always sent.
    FormatListResponse { ok: bool },
    /// Request for the data behind one announced format.
    FormatDataRequest { format_id: u32 },
    /// Data for the most recent request. `ok == false` carries no data.
    FormatDataResponse { ok: bool, data: Bytes },
    /// Accepted as a no-op; clipboard access is not serialized here.
    LockClipboardData { clip_data_id: u32 },
    /// Accepted as a no-op.
    UnlockClipboardData { clip_data_id: u32 },
}

// ── ClipboardReply ───────────────────────────────────────────────

/// Outcome of handling one inbound clipboard message.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ClipboardReply {
    /// Messages to send back on the channel, in order.
    pub pdus: Vec<ClipboardPdu>,
    /// New remote clipboard text to hand to the host, if any.
    pub remote_text: Option<String>,
    /// A data request that was declined because one is already
    /// outstanding. Surfaced to the caller instead of overwriting the
    /// correlation slot.
    pub declined_request: Option<u32>,
}

impl ClipboardReply {
    fn with_pdus(pdus: Vec<ClipboardPdu>) -> Self {
        Self {
            pdus,
            ..Self::default()
        }
    }
}

// ── ClipboardExchange ────────────────────────────────────────────

/// Client-side state of the clipboard exchange.
#[derive(Debug, Default)]
pub struct ClipboardExchange {
    /// Local text offered to the remote on request.
    local_text: Option<String>,
    /// Cache of the most recently received remote text.
    remote_text: Option<String>,
    /// Capability flags reported by the remote.
    server_caps: ClipboardCaps,
    /// Format id of the single outstanding data request, used to decode
    /// the next data response. The protocol does not echo the id.
    outstanding_request: Option<u32>,
}

impl ClipboardExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release all exchange state (channel disconnected or session
    /// teardown).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Cached remote clipboard text.
    pub fn remote_text(&self) -> Option<&str> {
        self.remote_text.as_deref()
    }

    /// Capability flags the remote reported.
    pub fn server_caps(&self) -> ClipboardCaps {
        self.server_caps
    }

    /// Format id awaiting a data response, if any.
    pub fn outstanding_request(&self) -> Option<u32> {
        self.outstanding_request
    }

    /// Cache new local text and produce the announce message that
    /// triggers the remote to re-request data. No separate push
    /// primitive exists in the protocol.
    pub fn publish_local(&mut self, text: String) -> Vec<ClipboardPdu> {
        self.local_text = Some(text);
        vec![ClipboardPdu::FormatList {
            formats: CLIENT_FORMATS.to_vec(),
        }]
    }

    /// Handle one inbound message and produce the mandatory replies.
    pub fn handle(&mut self, pdu: ClipboardPdu) -> Result<ClipboardReply, ClipboardError> {
        match pdu {
            ClipboardPdu::MonitorReady => {
                debug!("clipboard monitor ready; announcing capabilities and formats");
                Ok(ClipboardReply::with_pdus(vec![
                    ClipboardPdu::Capabilities {
                        version: CAPS_VERSION,
                        flags: ClipboardCaps::USE_LONG_FORMAT_NAMES,
                    },
                    ClipboardPdu::FormatList {
                        formats: CLIENT_FORMATS.to_vec(),
                    },
                ]))
            }

            ClipboardPdu::Capabilities { version, flags } => {
                debug!(version, ?flags, "remote clipboard capabilities");
                self.server_caps = flags;
                Ok(ClipboardReply::default())
            }

            ClipboardPdu::FormatList { formats } => Ok(self.handle_format_list(&formats)),

            ClipboardPdu::FormatListResponse { ok } => {
                if !ok {
                    warn!("remote rejected our format list");
                }
                Ok(ClipboardReply::default())
            }

            ClipboardPdu::FormatDataRequest { format_id } => {
                Ok(ClipboardReply::with_pdus(vec![
                    self.answer_data_request(format_id),
                ]))
            }

            ClipboardPdu::FormatDataResponse { ok, data } => self.handle_data_response(ok, &data),

            ClipboardPdu::LockClipboardData { clip_data_id }
            | ClipboardPdu::UnlockClipboardData { clip_data_id } => {
                debug!(clip_data_id, "clipboard lock message ignored");
                Ok(ClipboardReply::default())
            }
        }
    }

    /// Acknowledge the remote's format list, then request the preferred
    /// text format if one is offered. The acknowledgement is mandatory
    /// and independent of whether anything is requested.
    fn handle_format_list(&mut self, formats: &[u32]) -> ClipboardReply {
        let mut reply =
            ClipboardReply::with_pdus(vec![ClipboardPdu::FormatListResponse { ok: true }]);

        let Some(wanted) = preferred_text_format(formats) else {
            debug!("remote format list offers no text format");
            return reply;
        };

        if let Some(pending) = self.outstanding_request {
            warn!(
                pending,
                declined = wanted,
                "data request already outstanding; declining new request"
            );
            reply.declined_request = Some(wanted);
            return reply;
        }

        debug!(format = wanted, "requesting remote clipboard data");
        self.outstanding_request = Some(wanted);
        reply.pdus.push(ClipboardPdu::FormatDataRequest {
            format_id: wanted,
        });
        reply
    }

    /// Answer a data request from the remote. A request is never left
    /// unanswered: missing text or an unsupported format yields an
    /// explicit failure response.
    fn answer_data_request(&self, format_id: u32) -> ClipboardPdu {
        let encoded = self
            .local_text
            .as_deref()
            .and_then(|text| encode_text(format_id, text));

        match encoded {
            Some(data) => ClipboardPdu::FormatDataResponse { ok: true, data },
            None => {
                debug!(format_id, "no local data for requested format");
                ClipboardPdu::FormatDataResponse {
                    ok: false,
                    data: Bytes::new(),
                }
            }
        }
    }

    fn handle_data_response(
        &mut self,
        ok: bool,
        data: &[u8],
    ) -> Result<ClipboardReply, ClipboardError> {
        let Some(format_id) = self.outstanding_request.take() else {
            return Err(ClipboardError::UnsolicitedResponse);
        };

        if !ok {
            info!(format_id, "remote declined to provide clipboard data");
            return Ok(ClipboardReply::default());
        }
        if data.is_empty() {
            return Ok(ClipboardReply::default());
        }

        let text = decode_text(format_id, data)?;
        info!(bytes = text.len(), "remote clipboard text updated");
        self.remote_text = Some(text.clone());

        Ok(ClipboardReply {
            remote_text: Some(text),
            ..ClipboardReply::default()
        })
    }
}

// ── Text codec ───────────────────────────────────────────────────

/// Pick the text format to request from an offered list, preferring
/// unicode text over legacy text.
pub fn preferred_text_format(formats: &[u32]) -> Option<u32> {
    if formats.contains(&CF_UNICODETEXT) {
        Some(CF_UNICODETEXT)
    } else if formats.contains(&CF_TEXT) {
        Some(CF_TEXT)
    } else {
        None
    }
}

/// Encode local text in the requested wire format.
///
/// Returns `None` for formats this client does not serve.
pub fn encode_text(format_id: u32, text: &str) -> Option<Bytes> {
    match format_id {
        CF_UNICODETEXT => {
            let mut out = Vec::with_capacity(text.len() * 2 + 2);
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out.extend_from_slice(&[0, 0]);
            Some(Bytes::from(out))
        }
        CF_TEXT => {
            let mut out = Vec::with_capacity(text.len() + 1);
            out.extend_from_slice(text.as_bytes());
            out.push(0);
            Some(Bytes::from(out))
        }
        _ => None,
    }
}

/// Decode a data response using the format id recorded at request time.
pub fn decode_text(format_id: u32, data: &[u8]) -> Result<String, ClipboardError> {
    match format_id {
        CF_UNICODETEXT => {
            let units: Vec<u16> = data
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .take_while(|&unit| unit != 0)
                .collect();
            String::from_utf16(&units).map_err(|_| ClipboardError::InvalidUnicode)
        }
        _ => {
            // Legacy text: raw copy up to the terminator, length-capped.
            let end = data
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(data.len())
                .min(MAX_LEGACY_TEXT);
            Ok(String::from_utf8_lossy(&data[..end]).into_owned())
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

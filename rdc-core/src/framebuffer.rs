//! Local framebuffer mirroring the remote desktop.
//!
//! The buffer is owned by the session and mutated only in response to
//! engine paint/resize events. The host reads it as a borrowed view;
//! the borrow checker guarantees the view cannot outlive the next
//! mutable pump call, so a resize can never invalidate a live read.
//!
//! Geometry is configured before connect (reporting the requested
//! width/height and the bytes-per-pixel implied by the color depth);
//! pixel storage is allocated when the engine's rendering surface comes
//! up on post-connect, reallocated on every remote resize, and released
//! on disconnect.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DisplayConfig;
use crate::engine::SurfaceInfo;
use crate::error::SessionError;

// ── Rect ─────────────────────────────────────────────────────────

/// A damage rectangle: a screen region whose pixel content changed
/// since the last paint notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ── Framebuffer ──────────────────────────────────────────────────

/// Pixel mirror of the remote desktop.
///
/// Holds `width * height * bytes_per_pixel` bytes while attached; the
/// buffer is empty before connect and after disconnect.
#[derive(Debug, Default)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    data: Vec<u8>,
}

impl Framebuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the requested geometry before connect. No allocation
    /// happens until the rendering surface is attached.
    pub fn configure(&mut self, display: &DisplayConfig) {
        self.width = display.width;
        self.height = display.height;
        self.bytes_per_pixel = display.bytes_per_pixel();
    }

    /// Allocate pixel storage for the negotiated rendering surface.
    pub fn attach(&mut self, surface: SurfaceInfo) {
        debug!(
            width = surface.width,
            height = surface.height,
            bpp = surface.bytes_per_pixel,
            "framebuffer attached"
        );
        self.width = surface.width;
        self.height = surface.height;
        self.bytes_per_pixel = surface.bytes_per_pixel;
        self.data = vec![0; self.byte_len()];
    }

    /// Reallocate for a new remote desktop size, discarding old pixels.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SessionError> {
        if !self.is_attached() {
            return Err(SessionError::ProtocolViolation(
                "desktop resize before the rendering surface was initialized".into(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(SessionError::ProtocolViolation(format!(
                "desktop resize to degenerate geometry {width}x{height}"
            )));
        }
        debug!(width, height, "framebuffer resized");
        self.width = width;
        self.height = height;
        self.data = vec![0; self.byte_len()];
        Ok(())
    }

    /// Copy a damaged region's pixel rows into the buffer.
    ///
    /// `pixels` must hold exactly `rect.width * rect.height` pixels in
    /// row-major order.
    pub fn blit(&mut self, rect: Rect, pixels: &[u8]) -> Result<(), SessionError> {
        if !self.is_attached() {
            return Err(SessionError::ProtocolViolation(
                "paint before the rendering surface was initialized".into(),
            ));
        }

        let bpp = self.bytes_per_pixel as usize;
        let right = rect.x.checked_add(rect.width);
        let bottom = rect.y.checked_add(rect.height);
        if right.is_none_or(|r| r > self.width) || bottom.is_none_or(|b| b > self.height) {
            return Err(SessionError::ProtocolViolation(format!(
                "damage rectangle {rect:?} outside {}x{} surface",
                self.width, self.height
            )));
        }

        let row_bytes = rect.width as usize * bpp;
        let expected = row_bytes * rect.height as usize;
        if pixels.len() != expected {
            return Err(SessionError::ProtocolViolation(format!(
                "paint payload of {} bytes for a {} byte region",
                pixels.len(),
                expected
            )));
        }

        let stride = self.width as usize * bpp;
        for row in 0..rect.height as usize {
            let src = &pixels[row * row_bytes..(row + 1) * row_bytes];
            let dst_start = (rect.y as usize + row) * stride + rect.x as usize * bpp;
            self.data[dst_start..dst_start + row_bytes].copy_from_slice(src);
        }
        Ok(())
    }

    /// Release pixel storage. The configured geometry is kept so the
    /// session can still report the last known frame size.
    pub fn clear(&mut self) {
        self.data = Vec::new();
    }

    /// Whether pixel storage is currently allocated.
    pub fn is_attached(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.bytes_per_pixel
    }

    /// Raw pixel bytes, row-major, `width * bytes_per_pixel` stride.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel as usize
    }
}

// ── Tests ────────────────────────────────────────────────────────

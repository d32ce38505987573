//! Translation of local pointer/keyboard events into protocol input
//! events.
//!
//! Stateless pass-through with fixed resolution semantics: button
//! indices 0/1/2 map to left/right/middle, wheel deltas are split into
//! a direction flag plus a magnitude clamped to 255, scan codes carry
//! pressed/extended flag bits directly, and unicode injection is a
//! down event immediately followed by an up event.

use serde::{Deserialize, Serialize};

// ── Wire flag bits ───────────────────────────────────────────────

bitflags::bitflags! {
    /// Pointer event flag bits. The low 9 bits of a wheel event carry
    /// the rotation magnitude and sign.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PointerFlags: u16 {
        const WHEEL_NEGATIVE = 0x0100;
        const WHEEL          = 0x0200;
        const HWHEEL         = 0x0400;
        const MOVE           = 0x0800;
        const BUTTON1        = 0x1000;
        const BUTTON2        = 0x2000;
        const BUTTON3        = 0x4000;
        const DOWN           = 0x8000;
    }
}

bitflags::bitflags! {
    /// Keyboard event flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct KeyboardFlags: u16 {
        const EXTENDED = 0x0100;
        const RELEASE  = 0x8000;
    }
}

/// Largest wheel magnitude expressible on the wire.
pub const WHEEL_MAX_MAGNITUDE: i32 = 0xFF;

// ── MouseButton ──────────────────────────────────────────────────

/// The three pointer buttons the protocol carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Map a host button index (0/1/2) to a button.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            2 => Some(Self::Middle),
            _ => None,
        }
    }

    fn flag(self) -> PointerFlags {
        match self {
            Self::Left => PointerFlags::BUTTON1,
            Self::Right => PointerFlags::BUTTON2,
            Self::Middle => PointerFlags::BUTTON3,
        }
    }
}

// ── InputEvent ───────────────────────────────────────────────────

/// A protocol-level input event, ready for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Pointer move, button, or wheel event. For wheel events the low
    /// bits of `flags` carry the clamped magnitude.
    Pointer { flags: u16, x: u16, y: u16 },
    /// Keyboard scan-code event.
    Scancode { flags: KeyboardFlags, code: u16 },
    /// Direct unicode code-point injection.
    Unicode { flags: KeyboardFlags, code_point: u16 },
}

/// Pointer move to absolute coordinates.
pub fn mouse_move(x: u16, y: u16) -> InputEvent {
    InputEvent::Pointer {
        flags: PointerFlags::MOVE.bits(),
        x,
        y,
    }
}

/// Button press or release at the given coordinates.
pub fn mouse_button(button: MouseButton, pressed: bool, x: u16, y: u16) -> InputEvent {
    let mut flags = button.flag();
    if pressed {
        flags |= PointerFlags::DOWN;
    }
    InputEvent::Pointer {
        flags: flags.bits(),
        x,
        y,
    }
}

/// Wheel rotation. The delta's sign becomes a direction flag and its
/// magnitude is clamped to [`WHEEL_MAX_MAGNITUDE`], never wrapped.
pub fn mouse_wheel(delta: i32, horizontal: bool) -> InputEvent {
    let mut flags = if horizontal {
        PointerFlags::HWHEEL
    } else {
        PointerFlags::WHEEL
    };
    if delta < 0 {
        flags |= PointerFlags::WHEEL_NEGATIVE;
    }
    let magnitude = delta.unsigned_abs().min(WHEEL_MAX_MAGNITUDE as u32) as u16;
    InputEvent::Pointer {
        flags: flags.bits() | magnitude,
        x: 0,
        y: 0,
    }
}

/// Keyboard scan-code event with pressed/extended flags.
pub fn key(scan_code: u16, pressed: bool, extended: bool) -> InputEvent {
    let mut flags = KeyboardFlags::empty();
    if !pressed {
        flags |= KeyboardFlags::RELEASE;
    }
    if extended {
        flags |= KeyboardFlags::EXTENDED;
    }
    InputEvent::Scancode {
        flags,
        code: scan_code,
    }
}

/// Unicode key injection: a down event immediately followed by the
/// matching up event. No separate hold semantics exist.
pub fn unicode_pair(code_point: u16) -> [InputEvent; 2] {
    [
        InputEvent::Unicode {
            flags: KeyboardFlags::empty(),
            code_point,
        },
        InputEvent::Unicode {
            flags: KeyboardFlags::RELEASE,
            code_point,
        },
    ]
}

// ── SpecialKey ───────────────────────────────────────────────────

/// Well-known key chords, expressed as scan-code sequences. Keys are
/// pressed in order and released in reverse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKey {
    CtrlAltDel,
    AltTab,
    AltF4,
    WindowsKey,
    Escape,
    PrintScreen,
    CtrlC,
    CtrlV,
    CtrlA,
    CtrlZ,
}

impl SpecialKey {
    /// The chord as `(scan_code, extended)` pairs in press order.
    pub fn chord(self) -> &'static [(u16, bool)] {
        match self {
            Self::CtrlAltDel => &[(0x1D, false), (0x38, false), (0x53, true)],
            Self::AltTab => &[(0x38, false), (0x0F, false)],
            Self::AltF4 => &[(0x38, false), (0x3E, false)],
            Self::WindowsKey => &[(0x5B, true)],
            Self::Escape => &[(0x01, false)],
            Self::PrintScreen => &[(0x37, true)],
            Self::CtrlC => &[(0x1D, false), (0x2E, false)],
            Self::CtrlV => &[(0x1D, false), (0x2F, false)],
            Self::CtrlA => &[(0x1D, false), (0x1E, false)],
            Self::CtrlZ => &[(0x1D, false), (0x2C, false)],
        }
    }
}

/// Expand a chord into press events in order followed by release
/// events in reverse order.
pub fn special_key_events(special: SpecialKey) -> Vec<InputEvent> {
    let chord = special.chord();
    let mut events = Vec::with_capacity(chord.len() * 2);
    for &(code, extended) in chord {
        events.push(key(code, true, extended));
    }
    for &(code, extended) in chord.iter().rev() {
        events.push(key(code, false, extended));
    }
    events
}

// ── Tests ────────────────────────────────────────────────────────

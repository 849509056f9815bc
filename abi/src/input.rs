//! Input event types shared by the server, the device feeder threads, and
//! clients receiving routed events.

use bitflags::bitflags;

bitflags! {
    /// Pointer button / scroll flag mask.
    ///
    /// Scroll wheel motion rides in the same mask as the buttons; the server
    /// forwards it untouched to whichever window receives the event.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Buttons: u8 {
        const LEFT        = 0x01;
        const RIGHT       = 0x02;
        const MIDDLE      = 0x04;
        const SCROLL_UP   = 0x10;
        const SCROLL_DOWN = 0x20;
    }
}

bitflags! {
    /// Keyboard modifier mask, as reported by the keyboard driver.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct KeyMods: u32 {
        const LEFT_CTRL   = 0x01;
        const LEFT_SHIFT  = 0x02;
        const LEFT_ALT    = 0x04;
        const LEFT_SUPER  = 0x08;
        const RIGHT_CTRL  = 0x10;
        const RIGHT_SHIFT = 0x20;
        const RIGHT_ALT   = 0x40;
        const RIGHT_SUPER = 0x80;
    }
}

impl KeyMods {
    #[inline]
    pub fn alt(self) -> bool {
        self.intersects(Self::LEFT_ALT | Self::RIGHT_ALT)
    }

    #[inline]
    pub fn ctrl(self) -> bool {
        self.intersects(Self::LEFT_CTRL | Self::RIGHT_CTRL)
    }

    #[inline]
    pub fn shift(self) -> bool {
        self.intersects(Self::LEFT_SHIFT | Self::RIGHT_SHIFT)
    }

    #[inline]
    pub fn super_key(self) -> bool {
        self.intersects(Self::LEFT_SUPER | Self::RIGHT_SUPER)
    }
}

/// Keycodes below this value are the character they produce.
pub const KEY_NORMAL_MAX: u32 = 256;

pub const KEY_NONE: u32 = 0;
pub const KEY_ESCAPE: u32 = 27;
pub const KEY_ARROW_UP: u32 = 257;
pub const KEY_ARROW_DOWN: u32 = 258;
pub const KEY_ARROW_RIGHT: u32 = 259;
pub const KEY_ARROW_LEFT: u32 = 260;
pub const KEY_F1: u32 = 261;
pub const KEY_F2: u32 = 262;
pub const KEY_F3: u32 = 263;
pub const KEY_F4: u32 = 264;
pub const KEY_F5: u32 = 265;
pub const KEY_F6: u32 = 266;
pub const KEY_F7: u32 = 267;
pub const KEY_F8: u32 = 268;
pub const KEY_F9: u32 = 269;
pub const KEY_F10: u32 = 270;
pub const KEY_F11: u32 = 271;
pub const KEY_F12: u32 = 272;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyAction {
    Down = 0,
    Up = 1,
}

impl KeyAction {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Down),
            1 => Some(Self::Up),
            _ => None,
        }
    }
}

/// A translated keyboard event, as produced by the keyboard driver.
///
/// `key` is the derived character for printable keys (already shifted), or 0
/// for keys with no character representation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub keycode: u32,
    pub modifiers: KeyMods,
    pub action: KeyAction,
    pub key: u8,
}

impl KeyEvent {
    #[inline]
    pub fn pressed(keycode: u32, modifiers: KeyMods) -> Self {
        let key = if keycode < KEY_NORMAL_MAX { keycode as u8 } else { 0 };
        Self {
            keycode,
            modifiers,
            action: KeyAction::Down,
            key,
        }
    }

    #[inline]
    pub fn released(keycode: u32, modifiers: KeyMods) -> Self {
        Self {
            action: KeyAction::Up,
            ..Self::pressed(keycode, modifiers)
        }
    }
}

/// Raw pointer motion from the pointer driver.
///
/// For relative packets `dx`/`dy` are deltas (device y axis points up); for
/// absolute packets they carry the position in screen pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PointerPacket {
    pub dx: i32,
    pub dy: i32,
    pub buttons: Buttons,
}

/// Sentinel leading every packet on the raw pointer device stream.
pub const POINTER_DEVICE_MAGIC: u32 = 0xFEED_1234;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PointerEventKind {
    Relative = 0,
    Absolute = 1,
}

impl PointerEventKind {
    #[inline]
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Relative),
            1 => Some(Self::Absolute),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn either_alt_counts() {
        assert!(KeyMods::LEFT_ALT.alt());
        assert!(KeyMods::RIGHT_ALT.alt());
        assert!(!KeyMods::LEFT_CTRL.alt());
    }

    #[test]
    fn derived_key_for_printable() {
        let e = KeyEvent::pressed(b'q' as u32, KeyMods::empty());
        assert_eq!(e.key, b'q');
        let f = KeyEvent::pressed(KEY_F10, KeyMods::empty());
        assert_eq!(f.key, 0);
    }

    #[test]
    fn scroll_flags_share_the_button_mask() {
        let b = Buttons::LEFT | Buttons::SCROLL_DOWN;
        assert!(b.contains(Buttons::LEFT));
        assert!(b.contains(Buttons::SCROLL_DOWN));
        assert_eq!(b.bits(), 0x21);
    }
}

//! Window-facing constant tables: stacking slots, cursor preferences,
//! shape thresholds, resize directions, advertisement layout.

use bitflags::bitflags;

/// Window identifier, unique for the server's lifetime.
pub type Wid = u32;

/// Stacking key. 0 and 0xFFFF are the single-occupancy bottom and top
/// slots; anything else lands in the ordered middle stack.
pub const ZORDER_BOTTOM: u32 = 0x0000;
pub const ZORDER_TOP: u32 = 0xFFFF;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ZSlot {
    Bottom,
    Middle,
    Top,
}

impl ZSlot {
    #[inline]
    pub fn from_z(z: u32) -> Self {
        match z {
            ZORDER_BOTTOM => Self::Bottom,
            ZORDER_TOP => Self::Top,
            _ => Self::Middle,
        }
    }
}

/// Cursor preference values carried by WINDOW_SHOW_MOUSE.
///
/// `CURSOR_RESET` restores the window's last explicitly-set preference, so a
/// decorator can flip to a resize cursor and back without knowing whether
/// the window normally hides the pointer.
pub const CURSOR_RESET: i32 = -1;
pub const CURSOR_HIDE: i32 = 0;
pub const CURSOR_ARROW: i32 = 1;
pub const CURSOR_DRAG: i32 = 2;
pub const CURSOR_RESIZE_VERTICAL: i32 = 3;
pub const CURSOR_RESIZE_HORIZONTAL: i32 = 4;
pub const CURSOR_RESIZE_DOWN_RIGHT: i32 = 5;
pub const CURSOR_RESIZE_DOWN_LEFT: i32 = 6;

/// Shape thresholds for WINDOW_UPDATE_SHAPE. A pixel is solid to
/// hit-testing iff its alpha byte is >= the threshold, so 0 makes the whole
/// window solid and 256 (one past any possible alpha) makes every click
/// fall through.
pub const SHAPE_SOLID: u32 = 0;
pub const SHAPE_CLEAR: u32 = 1;
pub const SHAPE_HALF: u32 = 127;
pub const SHAPE_OPAQUE_ONLY: u32 = 255;
pub const SHAPE_PASSTHROUGH: u32 = 256;

/// Anchor direction for an interactive resize.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ResizeDirection {
    /// Pick a direction from the pointer's position inside the window.
    Auto = 0,
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
    UpLeft = 5,
    UpRight = 6,
    DownLeft = 7,
    DownRight = 8,
}

impl ResizeDirection {
    #[inline]
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Auto),
            1 => Some(Self::Up),
            2 => Some(Self::Down),
            3 => Some(Self::Left),
            4 => Some(Self::Right),
            5 => Some(Self::UpLeft),
            6 => Some(Self::UpRight),
            7 => Some(Self::DownLeft),
            8 => Some(Self::DownRight),
            _ => None,
        }
    }

    #[inline]
    pub fn anchors_left(self) -> bool {
        matches!(self, Self::Left | Self::UpLeft | Self::DownLeft)
    }

    #[inline]
    pub fn anchors_up(self) -> bool {
        matches!(self, Self::Up | Self::UpLeft | Self::UpRight)
    }

    #[inline]
    pub fn horizontal_only(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }

    #[inline]
    pub fn vertical_only(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }
}

/// Keybinding response mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum BindResponse {
    /// The event also continues to the focused window.
    Passthrough = 0,
    /// Dispatch stops at the binding owner.
    Steal = 1,
}

impl BindResponse {
    #[inline]
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Passthrough),
            1 => Some(Self::Steal),
            _ => None,
        }
    }
}

/// Action code of a WINDOW_MOUSE_EVENT.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WindowMouseAction {
    /// Press and release without motion in between.
    Click = 0,
    /// Motion while a button is held.
    Drag = 1,
    /// Button released after motion.
    Raise = 2,
    Down = 3,
    Move = 4,
    Leave = 5,
    Enter = 6,
}

impl WindowMouseAction {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Click),
            1 => Some(Self::Drag),
            2 => Some(Self::Raise),
            3 => Some(Self::Down),
            4 => Some(Self::Move),
            5 => Some(Self::Leave),
            6 => Some(Self::Enter),
            _ => None,
        }
    }
}

/// Number of string-offset slots in an advertisement (name, icon, three
/// reserved).
pub const AD_OFFSET_SLOTS: usize = 5;

bitflags! {
    /// Advertisement flags. The server sets FOCUSED when reporting; the
    /// remaining bits belong to the client.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct AdFlags: u32 {
        const FOCUSED = 0x01;
    }
}

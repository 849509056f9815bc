//! Message framing and typed bodies.
//!
//! Every message is a 12-byte header (magic, type code, total size
//! including the header) followed by a fixed-layout little-endian body.
//! Decoding is tolerant by construction: a bad magic, a truncated body, or
//! an unknown type code produces a [`DecodeError`] the server logs and
//! skips, never a dropped connection.

use alloc::vec::Vec;
use core::fmt;

use crate::input::{Buttons, KeyAction, KeyEvent, KeyMods, PointerEventKind, PointerPacket};
use crate::window::{
    AD_OFFSET_SLOTS, AdFlags, BindResponse, ResizeDirection, Wid, WindowMouseAction,
};

/// Sentinel value leading every message.
pub const MESSAGE_MAGIC: u32 = 0xC0DE_CA51;

/// Header length in bytes (magic, type, size).
pub const HEADER_LEN: usize = 12;

/// Upper bound on a whole encoded message. Advertisement strings are the
/// only variable-length payload and are clamped well below this.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Longest advertisement string block a client may submit.
pub const MAX_AD_STRINGS: usize = 1024;

/// Wire type codes.
pub mod code {
    pub const HELLO: u32 = 0x0001;
    pub const WINDOW_NEW: u32 = 0x0002;
    pub const FLIP: u32 = 0x0003;
    pub const FLIP_REGION: u32 = 0x0004;
    pub const WINDOW_MOVE: u32 = 0x0005;
    pub const WINDOW_CLOSE: u32 = 0x0006;
    pub const WINDOW_STACK: u32 = 0x0007;
    pub const WINDOW_FOCUS: u32 = 0x0008;
    pub const WINDOW_DRAG_START: u32 = 0x0009;
    pub const WINDOW_RESIZE_START: u32 = 0x000A;
    pub const WINDOW_UPDATE_SHAPE: u32 = 0x000B;
    pub const WINDOW_WARP_MOUSE: u32 = 0x000C;
    pub const WINDOW_SHOW_MOUSE: u32 = 0x000D;

    pub const RESIZE_REQUEST: u32 = 0x0010;
    pub const RESIZE_OFFER: u32 = 0x0011;
    pub const RESIZE_ACCEPT: u32 = 0x0012;
    pub const RESIZE_BUFID: u32 = 0x0013;
    pub const RESIZE_DONE: u32 = 0x0014;

    pub const WINDOW_ADVERTISE: u32 = 0x0020;
    pub const SUBSCRIBE: u32 = 0x0021;
    pub const UNSUBSCRIBE: u32 = 0x0022;
    pub const QUERY_WINDOWS: u32 = 0x0023;
    pub const KEY_BIND: u32 = 0x0024;
    pub const SESSION_END: u32 = 0x0025;

    pub const KEY_EVENT: u32 = 0x0030;
    pub const MOUSE_EVENT: u32 = 0x0031;

    pub const WELCOME: u32 = 0x0001_0001;
    pub const WINDOW_INIT: u32 = 0x0001_0002;
    pub const WINDOW_FOCUS_CHANGE: u32 = 0x0001_0003;
    pub const WINDOW_MOUSE_EVENT: u32 = 0x0001_0004;
    pub const NOTIFY: u32 = 0x0001_0005;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    BadMagic(u32),
    UnknownType(u32),
    /// The buffer is shorter than the header-declared size, or the declared
    /// size cannot hold the body this type requires.
    Truncated {
        expected: usize,
        got: usize,
    },
    Oversized(usize),
    /// A field held a value outside its domain.
    BadField(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic(m) => write!(f, "bad message magic {:#010x}", m),
            Self::UnknownType(t) => write!(f, "unknown message type {:#010x}", t),
            Self::Truncated { expected, got } => {
                write!(f, "truncated message: need {} bytes, have {}", expected, got)
            }
            Self::Oversized(n) => write!(f, "message of {} bytes exceeds the size cap", n),
            Self::BadField(name) => write!(f, "field '{}' out of range", name),
        }
    }
}

/// A client advertisement: name/icon offsets into a string block, shown by
/// listers such as task strips and window switchers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub wid: Wid,
    pub flags: AdFlags,
    pub offsets: [u16; AD_OFFSET_SLOTS],
    pub strings: Vec<u8>,
}

/// A decoded message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Hello,
    Welcome {
        width: u32,
        height: u32,
    },
    WindowNew {
        width: u32,
        height: u32,
    },
    WindowInit {
        wid: Wid,
        width: u32,
        height: u32,
        bufid: u32,
    },
    Flip {
        wid: Wid,
    },
    FlipRegion {
        wid: Wid,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    WindowMove {
        wid: Wid,
        x: i32,
        y: i32,
    },
    WindowClose {
        wid: Wid,
    },
    WindowStack {
        wid: Wid,
        z: u32,
    },
    WindowFocus {
        wid: Wid,
    },
    WindowFocusChange {
        wid: Wid,
        focused: bool,
    },
    WindowDragStart {
        wid: Wid,
    },
    WindowResizeStart {
        wid: Wid,
        direction: ResizeDirection,
    },
    WindowUpdateShape {
        wid: Wid,
        threshold: u32,
    },
    WindowWarpMouse {
        wid: Wid,
        x: i32,
        y: i32,
    },
    WindowShowMouse {
        wid: Wid,
        mode: i32,
    },
    ResizeRequest {
        wid: Wid,
        width: u32,
        height: u32,
    },
    ResizeOffer {
        wid: Wid,
        width: u32,
        height: u32,
    },
    ResizeAccept {
        wid: Wid,
        width: u32,
        height: u32,
    },
    ResizeBufid {
        wid: Wid,
        width: u32,
        height: u32,
        bufid: u32,
    },
    ResizeDone {
        wid: Wid,
        width: u32,
        height: u32,
        bufid: u32,
    },
    KeyEvent {
        wid: Wid,
        event: KeyEvent,
        shadow: KeyMods,
    },
    MouseEvent {
        wid: Wid,
        packet: PointerPacket,
        kind: PointerEventKind,
    },
    WindowMouseEvent {
        wid: Wid,
        new_x: i32,
        new_y: i32,
        old_x: i32,
        old_y: i32,
        buttons: Buttons,
        action: WindowMouseAction,
    },
    WindowAdvertise(Advertisement),
    Subscribe,
    Unsubscribe,
    Notify,
    QueryWindows,
    SessionEnd,
    KeyBind {
        key: u32,
        modifiers: KeyMods,
        response: BindResponse,
    },
}

impl Message {
    pub fn type_code(&self) -> u32 {
        match self {
            Self::Hello => code::HELLO,
            Self::Welcome { .. } => code::WELCOME,
            Self::WindowNew { .. } => code::WINDOW_NEW,
            Self::WindowInit { .. } => code::WINDOW_INIT,
            Self::Flip { .. } => code::FLIP,
            Self::FlipRegion { .. } => code::FLIP_REGION,
            Self::WindowMove { .. } => code::WINDOW_MOVE,
            Self::WindowClose { .. } => code::WINDOW_CLOSE,
            Self::WindowStack { .. } => code::WINDOW_STACK,
            Self::WindowFocus { .. } => code::WINDOW_FOCUS,
            Self::WindowFocusChange { .. } => code::WINDOW_FOCUS_CHANGE,
            Self::WindowDragStart { .. } => code::WINDOW_DRAG_START,
            Self::WindowResizeStart { .. } => code::WINDOW_RESIZE_START,
            Self::WindowUpdateShape { .. } => code::WINDOW_UPDATE_SHAPE,
            Self::WindowWarpMouse { .. } => code::WINDOW_WARP_MOUSE,
            Self::WindowShowMouse { .. } => code::WINDOW_SHOW_MOUSE,
            Self::ResizeRequest { .. } => code::RESIZE_REQUEST,
            Self::ResizeOffer { .. } => code::RESIZE_OFFER,
            Self::ResizeAccept { .. } => code::RESIZE_ACCEPT,
            Self::ResizeBufid { .. } => code::RESIZE_BUFID,
            Self::ResizeDone { .. } => code::RESIZE_DONE,
            Self::KeyEvent { .. } => code::KEY_EVENT,
            Self::MouseEvent { .. } => code::MOUSE_EVENT,
            Self::WindowMouseEvent { .. } => code::WINDOW_MOUSE_EVENT,
            Self::WindowAdvertise(_) => code::WINDOW_ADVERTISE,
            Self::Subscribe => code::SUBSCRIBE,
            Self::Unsubscribe => code::UNSUBSCRIBE,
            Self::Notify => code::NOTIFY,
            Self::QueryWindows => code::QUERY_WINDOWS,
            Self::SessionEnd => code::SESSION_END,
            Self::KeyBind { .. } => code::KEY_BIND,
        }
    }

    /// Serialise to the full wire form, header included.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(self.type_code());
        match self {
            Self::Hello
            | Self::Subscribe
            | Self::Unsubscribe
            | Self::Notify
            | Self::QueryWindows
            | Self::SessionEnd => {}
            Self::Welcome { width, height } | Self::WindowNew { width, height } => {
                w.u32(*width);
                w.u32(*height);
            }
            Self::WindowInit {
                wid,
                width,
                height,
                bufid,
            } => {
                w.u32(*wid);
                w.u32(*width);
                w.u32(*height);
                w.u32(*bufid);
            }
            Self::Flip { wid }
            | Self::WindowClose { wid }
            | Self::WindowFocus { wid }
            | Self::WindowDragStart { wid } => {
                w.u32(*wid);
            }
            Self::FlipRegion {
                wid,
                x,
                y,
                width,
                height,
            } => {
                w.u32(*wid);
                w.i32(*x);
                w.i32(*y);
                w.i32(*width);
                w.i32(*height);
            }
            Self::WindowMove { wid, x, y } | Self::WindowWarpMouse { wid, x, y } => {
                w.u32(*wid);
                w.i32(*x);
                w.i32(*y);
            }
            Self::WindowStack { wid, z } => {
                w.u32(*wid);
                w.u32(*z);
            }
            Self::WindowFocusChange { wid, focused } => {
                w.u32(*wid);
                w.u32(*focused as u32);
            }
            Self::WindowResizeStart { wid, direction } => {
                w.u32(*wid);
                w.u32(*direction as u32);
            }
            Self::WindowUpdateShape { wid, threshold } => {
                w.u32(*wid);
                w.u32(*threshold);
            }
            Self::WindowShowMouse { wid, mode } => {
                w.u32(*wid);
                w.i32(*mode);
            }
            Self::ResizeRequest { wid, width, height }
            | Self::ResizeOffer { wid, width, height }
            | Self::ResizeAccept { wid, width, height } => {
                w.u32(*wid);
                w.u32(*width);
                w.u32(*height);
                w.u32(0);
            }
            Self::ResizeBufid {
                wid,
                width,
                height,
                bufid,
            }
            | Self::ResizeDone {
                wid,
                width,
                height,
                bufid,
            } => {
                w.u32(*wid);
                w.u32(*width);
                w.u32(*height);
                w.u32(*bufid);
            }
            Self::KeyEvent { wid, event, shadow } => {
                w.u32(*wid);
                w.u32(event.keycode);
                w.u32(event.modifiers.bits());
                w.u8(event.action as u8);
                w.u8(event.key);
                w.u16(0);
                w.u32(shadow.bits());
            }
            Self::MouseEvent { wid, packet, kind } => {
                w.u32(*wid);
                w.i32(packet.dx);
                w.i32(packet.dy);
                w.u8(packet.buttons.bits());
                w.u8(0);
                w.u16(0);
                w.u32(*kind as u32);
            }
            Self::WindowMouseEvent {
                wid,
                new_x,
                new_y,
                old_x,
                old_y,
                buttons,
                action,
            } => {
                w.u32(*wid);
                w.i32(*new_x);
                w.i32(*new_y);
                w.i32(*old_x);
                w.i32(*old_y);
                w.u8(buttons.bits());
                w.u8(*action as u8);
                w.u16(0);
            }
            Self::WindowAdvertise(ad) => {
                w.u32(ad.wid);
                w.u32(ad.flags.bits());
                for off in ad.offsets {
                    w.u16(off);
                }
                w.u16(0);
                w.u32(ad.strings.len() as u32);
                w.bytes(&ad.strings);
            }
            Self::KeyBind {
                key,
                modifiers,
                response,
            } => {
                w.u32(*key);
                w.u32(modifiers.bits());
                w.u32(*response as u32);
            }
        }
        w.finish()
    }

    /// Parse one full message (header plus body) from `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: HEADER_LEN,
                got: buf.len(),
            });
        }
        let mut r = Reader::new(buf);
        let magic = r.u32()?;
        if magic != MESSAGE_MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }
        let ty = r.u32()?;
        let size = r.u32()? as usize;
        if size > MAX_MESSAGE_LEN {
            return Err(DecodeError::Oversized(size));
        }
        if size < HEADER_LEN || buf.len() < size {
            return Err(DecodeError::Truncated {
                expected: size.max(HEADER_LEN),
                got: buf.len(),
            });
        }

        let msg = match ty {
            code::HELLO => Self::Hello,
            code::SUBSCRIBE => Self::Subscribe,
            code::UNSUBSCRIBE => Self::Unsubscribe,
            code::NOTIFY => Self::Notify,
            code::QUERY_WINDOWS => Self::QueryWindows,
            code::SESSION_END => Self::SessionEnd,
            code::WELCOME => Self::Welcome {
                width: r.u32()?,
                height: r.u32()?,
            },
            code::WINDOW_NEW => Self::WindowNew {
                width: r.u32()?,
                height: r.u32()?,
            },
            code::WINDOW_INIT => Self::WindowInit {
                wid: r.u32()?,
                width: r.u32()?,
                height: r.u32()?,
                bufid: r.u32()?,
            },
            code::FLIP => Self::Flip { wid: r.u32()? },
            code::FLIP_REGION => Self::FlipRegion {
                wid: r.u32()?,
                x: r.i32()?,
                y: r.i32()?,
                width: r.i32()?,
                height: r.i32()?,
            },
            code::WINDOW_MOVE => Self::WindowMove {
                wid: r.u32()?,
                x: r.i32()?,
                y: r.i32()?,
            },
            code::WINDOW_CLOSE => Self::WindowClose { wid: r.u32()? },
            code::WINDOW_STACK => Self::WindowStack {
                wid: r.u32()?,
                z: r.u32()?,
            },
            code::WINDOW_FOCUS => Self::WindowFocus { wid: r.u32()? },
            code::WINDOW_FOCUS_CHANGE => Self::WindowFocusChange {
                wid: r.u32()?,
                focused: r.u32()? != 0,
            },
            code::WINDOW_DRAG_START => Self::WindowDragStart { wid: r.u32()? },
            code::WINDOW_RESIZE_START => Self::WindowResizeStart {
                wid: r.u32()?,
                direction: ResizeDirection::from_u32(r.u32()?)
                    .ok_or(DecodeError::BadField("direction"))?,
            },
            code::WINDOW_UPDATE_SHAPE => Self::WindowUpdateShape {
                wid: r.u32()?,
                threshold: r.u32()?,
            },
            code::WINDOW_WARP_MOUSE => Self::WindowWarpMouse {
                wid: r.u32()?,
                x: r.i32()?,
                y: r.i32()?,
            },
            code::WINDOW_SHOW_MOUSE => Self::WindowShowMouse {
                wid: r.u32()?,
                mode: r.i32()?,
            },
            code::RESIZE_REQUEST => {
                let (wid, width, height, _) = r.resize_body()?;
                Self::ResizeRequest { wid, width, height }
            }
            code::RESIZE_OFFER => {
                let (wid, width, height, _) = r.resize_body()?;
                Self::ResizeOffer { wid, width, height }
            }
            code::RESIZE_ACCEPT => {
                let (wid, width, height, _) = r.resize_body()?;
                Self::ResizeAccept { wid, width, height }
            }
            code::RESIZE_BUFID => {
                let (wid, width, height, bufid) = r.resize_body()?;
                Self::ResizeBufid {
                    wid,
                    width,
                    height,
                    bufid,
                }
            }
            code::RESIZE_DONE => {
                let (wid, width, height, bufid) = r.resize_body()?;
                Self::ResizeDone {
                    wid,
                    width,
                    height,
                    bufid,
                }
            }
            code::KEY_EVENT => {
                let wid = r.u32()?;
                let keycode = r.u32()?;
                let modifiers = KeyMods::from_bits_truncate(r.u32()?);
                let action = KeyAction::from_u8(r.u8()?).ok_or(DecodeError::BadField("action"))?;
                let key = r.u8()?;
                r.u16()?;
                let shadow = KeyMods::from_bits_truncate(r.u32()?);
                Self::KeyEvent {
                    wid,
                    event: KeyEvent {
                        keycode,
                        modifiers,
                        action,
                        key,
                    },
                    shadow,
                }
            }
            code::MOUSE_EVENT => {
                let wid = r.u32()?;
                let dx = r.i32()?;
                let dy = r.i32()?;
                let buttons = Buttons::from_bits_truncate(r.u8()?);
                r.u8()?;
                r.u16()?;
                let kind =
                    PointerEventKind::from_u32(r.u32()?).ok_or(DecodeError::BadField("kind"))?;
                Self::MouseEvent {
                    wid,
                    packet: PointerPacket { dx, dy, buttons },
                    kind,
                }
            }
            code::WINDOW_MOUSE_EVENT => {
                let wid = r.u32()?;
                let new_x = r.i32()?;
                let new_y = r.i32()?;
                let old_x = r.i32()?;
                let old_y = r.i32()?;
                let buttons = Buttons::from_bits_truncate(r.u8()?);
                let action =
                    WindowMouseAction::from_u8(r.u8()?).ok_or(DecodeError::BadField("action"))?;
                r.u16()?;
                Self::WindowMouseEvent {
                    wid,
                    new_x,
                    new_y,
                    old_x,
                    old_y,
                    buttons,
                    action,
                }
            }
            code::WINDOW_ADVERTISE => {
                let wid = r.u32()?;
                let flags = AdFlags::from_bits_truncate(r.u32()?);
                let mut offsets = [0u16; AD_OFFSET_SLOTS];
                for slot in offsets.iter_mut() {
                    *slot = r.u16()?;
                }
                r.u16()?;
                let len = r.u32()? as usize;
                if len > MAX_AD_STRINGS {
                    return Err(DecodeError::BadField("strings"));
                }
                let strings = r.bytes(len)?.to_vec();
                Self::WindowAdvertise(Advertisement {
                    wid,
                    flags,
                    offsets,
                    strings,
                })
            }
            code::KEY_BIND => Self::KeyBind {
                key: r.u32()?,
                modifiers: KeyMods::from_bits_truncate(r.u32()?),
                response: BindResponse::from_u32(r.u32()?)
                    .ok_or(DecodeError::BadField("response"))?,
            },
            other => return Err(DecodeError::UnknownType(other)),
        };
        Ok(msg)
    }
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(type_code: u32) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&MESSAGE_MAGIC.to_le_bytes());
        buf.extend_from_slice(&type_code.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // patched in finish()
        Self { buf }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    fn finish(mut self) -> Vec<u8> {
        let size = self.buf.len() as u32;
        self.buf[8..12].copy_from_slice(&size.to_le_bytes());
        self.buf
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated {
            expected: usize::MAX,
            got: self.buf.len(),
        })?;
        if end > self.buf.len() {
            return Err(DecodeError::Truncated {
                expected: end,
                got: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.u32()? as i32)
    }

    fn resize_body(&mut self) -> Result<(Wid, u32, u32, u32), DecodeError> {
        Ok((self.u32()?, self.u32()?, self.u32()?, self.u32()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn header_carries_total_size() {
        let bytes = Message::Welcome {
            width: 1024,
            height: 768,
        }
        .encode();
        assert_eq!(bytes.len(), HEADER_LEN + 8);
        let size = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        assert_eq!(size as usize, bytes.len());
    }

    #[test]
    fn welcome_round_trip() {
        let m = Message::Welcome {
            width: 1024,
            height: 768,
        };
        assert_eq!(Message::decode(&m.encode()).unwrap(), m);
    }

    #[test]
    fn key_event_round_trip() {
        let m = Message::KeyEvent {
            wid: 3,
            event: KeyEvent::pressed(b'\t' as u32, KeyMods::LEFT_ALT),
            shadow: KeyMods::LEFT_ALT | KeyMods::LEFT_SHIFT,
        };
        assert_eq!(Message::decode(&m.encode()).unwrap(), m);
    }

    #[test]
    fn advertise_round_trip() {
        let m = Message::WindowAdvertise(Advertisement {
            wid: 9,
            flags: AdFlags::empty(),
            offsets: [0, 5, 0, 0, 0],
            strings: b"name\0icon\0".to_vec(),
        });
        assert_eq!(Message::decode(&m.encode()).unwrap(), m);
    }

    #[test]
    fn bad_magic_is_rejected_not_panicked() {
        let mut bytes = Message::Hello.encode();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            Message::decode(&bytes),
            Err(DecodeError::BadMagic(_))
        ));
    }

    #[test]
    fn truncated_body_is_rejected() {
        let bytes = Message::WindowNew {
            width: 10,
            height: 10,
        }
        .encode();
        assert!(matches!(
            Message::decode(&bytes[..bytes.len() - 3]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_type_is_reported() {
        let mut bytes = Message::Hello.encode();
        bytes[4..8].copy_from_slice(&0xDEAD_0000u32.to_le_bytes());
        assert_eq!(
            Message::decode(&bytes),
            Err(DecodeError::UnknownType(0xDEAD_0000))
        );
    }

    #[test]
    fn oversized_advertisement_is_rejected() {
        let m = Message::WindowAdvertise(Advertisement {
            wid: 1,
            flags: AdFlags::empty(),
            offsets: [0; AD_OFFSET_SLOTS],
            strings: vec![b'x'; 64],
        });
        let mut bytes = m.encode();
        // Lie about the string-block length.
        let len_off = HEADER_LEN + 4 + 4 + 12;
        bytes[len_off..len_off + 4].copy_from_slice(&(MAX_AD_STRINGS as u32 + 1).to_le_bytes());
        assert_eq!(Message::decode(&bytes), Err(DecodeError::BadField("strings")));
    }
}

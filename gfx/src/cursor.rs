//! Procedural cursor sprites.
//!
//! Sprites are drawn from primitives straight into the back buffer, so no
//! image assets are needed. Every sprite fits in a `CURSOR_WIDTH` x
//! `CURSOR_HEIGHT` box anchored at its hotspot; damage for cursor motion is
//! that box at the old and new positions.

use mullion_abi::damage::DamageRect;
use mullion_abi::window::{
    CURSOR_DRAG, CURSOR_RESIZE_DOWN_LEFT, CURSOR_RESIZE_DOWN_RIGHT, CURSOR_RESIZE_HORIZONTAL,
    CURSOR_RESIZE_VERTICAL,
};

use crate::draw_buffer::DrawBuffer;

pub const CURSOR_WIDTH: i32 = 24;
pub const CURSOR_HEIGHT: i32 = 24;

const OUTLINE: u32 = 0xFF10_1010;
const FILL: u32 = 0xFFF4_F4F4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CursorSprite {
    Arrow,
    Drag,
    ResizeVertical,
    ResizeHorizontal,
    /// Pointing up-left / down-right.
    ResizeDiagonal,
    /// Pointing down-left / up-right.
    ResizeAntiDiagonal,
}

impl CursorSprite {
    /// Map a window's cursor preference to a sprite. `CURSOR_HIDE` is
    /// handled by the caller (nothing is drawn); anything unrecognised
    /// falls back to the arrow.
    pub fn from_preference(mode: i32) -> Self {
        match mode {
            CURSOR_DRAG => Self::Drag,
            CURSOR_RESIZE_VERTICAL => Self::ResizeVertical,
            CURSOR_RESIZE_HORIZONTAL => Self::ResizeHorizontal,
            CURSOR_RESIZE_DOWN_RIGHT => Self::ResizeDiagonal,
            CURSOR_RESIZE_DOWN_LEFT => Self::ResizeAntiDiagonal,
            _ => Self::Arrow,
        }
    }

    /// Hotspot offset from the sprite's top-left corner.
    fn hotspot(self) -> (i32, i32) {
        match self {
            Self::Arrow => (0, 0),
            _ => (CURSOR_WIDTH / 2, CURSOR_HEIGHT / 2),
        }
    }

    /// Screen box occupied by the sprite when the pointer is at (x, y).
    pub fn bounds_at(self, x: i32, y: i32) -> DamageRect {
        let (hx, hy) = self.hotspot();
        DamageRect::from_xywh(x - hx, y - hy, CURSOR_WIDTH, CURSOR_HEIGHT)
    }
}

/// Largest box any sprite can occupy around the pointer; used for damage
/// when the sprite kind is not known (or is about to change).
pub fn cursor_damage_at(x: i32, y: i32) -> DamageRect {
    DamageRect::from_xywh(
        x - CURSOR_WIDTH / 2,
        y - CURSOR_HEIGHT / 2,
        CURSOR_WIDTH,
        CURSOR_HEIGHT,
    )
}

/// Draw `sprite` with its hotspot at (x, y), restricted to `clip`.
pub fn draw_cursor(buf: &mut DrawBuffer, sprite: CursorSprite, x: i32, y: i32, clip: &DamageRect) {
    let b = sprite.bounds_at(x, y);
    let (ox, oy) = (b.x0, b.y0);
    match sprite {
        CursorSprite::Arrow => draw_arrow(buf, ox, oy, clip),
        CursorSprite::Drag => {
            draw_shaft(buf, ox, oy, clip, false);
            draw_shaft(buf, ox, oy, clip, true);
        }
        CursorSprite::ResizeVertical => draw_shaft(buf, ox, oy, clip, true),
        CursorSprite::ResizeHorizontal => draw_shaft(buf, ox, oy, clip, false),
        CursorSprite::ResizeDiagonal => draw_diagonal(buf, ox, oy, clip, false),
        CursorSprite::ResizeAntiDiagonal => draw_diagonal(buf, ox, oy, clip, true),
    }
}

/// Classic pointer: a left-edge triangle with a one-pixel outline.
fn draw_arrow(buf: &mut DrawBuffer, ox: i32, oy: i32, clip: &DamageRect) {
    let h = 16;
    for row in 0..h {
        // Triangle edge advances two pixels every three rows.
        let span = (row * 2) / 3 + 1;
        let rect = DamageRect::from_xywh(ox, oy + row, span.min(11), 1);
        buf.fill_rect(&rect, clip, FILL);
        buf.fill_rect(&DamageRect::from_xywh(ox, oy + row, 1, 1), clip, OUTLINE);
        let edge = rect.x1;
        buf.fill_rect(&DamageRect::from_xywh(edge, oy + row, 1, 1), clip, OUTLINE);
    }
    buf.fill_rect(&DamageRect::from_xywh(ox, oy + h, 11, 1), clip, OUTLINE);
}

/// Double-headed arrow along one axis (vertical when `vertical`).
fn draw_shaft(buf: &mut DrawBuffer, ox: i32, oy: i32, clip: &DamageRect, vertical: bool) {
    let mid = CURSOR_WIDTH / 2;
    let len = CURSOR_WIDTH - 4;
    if vertical {
        buf.fill_rect(&DamageRect::from_xywh(ox + mid - 1, oy + 2, 3, len), clip, OUTLINE);
        buf.fill_rect(&DamageRect::from_xywh(ox + mid, oy + 3, 1, len - 2), clip, FILL);
        for i in 0..4 {
            let w = 1 + 2 * i;
            buf.fill_rect(
                &DamageRect::from_xywh(ox + mid - i, oy + 2 + i, w, 1),
                clip,
                OUTLINE,
            );
            buf.fill_rect(
                &DamageRect::from_xywh(ox + mid - i, oy + 1 + len - i, w, 1),
                clip,
                OUTLINE,
            );
        }
    } else {
        buf.fill_rect(&DamageRect::from_xywh(ox + 2, oy + mid - 1, len, 3), clip, OUTLINE);
        buf.fill_rect(&DamageRect::from_xywh(ox + 3, oy + mid, len - 2, 1), clip, FILL);
        for i in 0..4 {
            let h = 1 + 2 * i;
            buf.fill_rect(
                &DamageRect::from_xywh(ox + 2 + i, oy + mid - i, 1, h),
                clip,
                OUTLINE,
            );
            buf.fill_rect(
                &DamageRect::from_xywh(ox + 1 + len - i, oy + mid - i, 1, h),
                clip,
                OUTLINE,
            );
        }
    }
}

/// Diagonal double-headed arrow; `anti` flips it to the '/' orientation.
fn draw_diagonal(buf: &mut DrawBuffer, ox: i32, oy: i32, clip: &DamageRect, anti: bool) {
    let len = CURSOR_WIDTH - 6;
    for i in 0..len {
        let (x, y) = if anti {
            (ox + 3 + i, oy + 2 + len - i)
        } else {
            (ox + 3 + i, oy + 3 + i)
        };
        buf.fill_rect(&DamageRect::from_xywh(x, y, 2, 2), clip, OUTLINE);
    }
    // Arrowheads as small solid squares at each end.
    let (hx0, hy0, hx1, hy1) = if anti {
        (ox + 2, oy + len + 1, ox + len, oy + 2)
    } else {
        (ox + 2, oy + 2, ox + len, oy + len)
    };
    buf.fill_rect(&DamageRect::from_xywh(hx0, hy0, 4, 4), clip, FILL);
    buf.fill_rect(&DamageRect::from_xywh(hx1, hy1, 4, 4), clip, FILL);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_hotspot_is_the_tip() {
        let b = CursorSprite::Arrow.bounds_at(100, 50);
        assert_eq!((b.x0, b.y0), (100, 50));
    }

    #[test]
    fn resize_sprites_centre_on_the_pointer() {
        let b = CursorSprite::ResizeVertical.bounds_at(100, 50);
        assert_eq!((b.x0, b.y0), (88, 38));
        assert_eq!(b.width(), CURSOR_WIDTH);
    }

    #[test]
    fn drawing_is_confined_to_the_clip() {
        let mut buf = DrawBuffer::new(64, 64);
        let clip = DamageRect::from_xywh(0, 0, 10, 10);
        draw_cursor(&mut buf, CursorSprite::Arrow, 20, 20, &clip);
        assert!(buf.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn every_sprite_touches_its_own_box() {
        let sprites = [
            CursorSprite::Arrow,
            CursorSprite::Drag,
            CursorSprite::ResizeVertical,
            CursorSprite::ResizeHorizontal,
            CursorSprite::ResizeDiagonal,
            CursorSprite::ResizeAntiDiagonal,
        ];
        for sprite in sprites {
            let mut buf = DrawBuffer::new(64, 64);
            let bounds = buf.bounds();
            draw_cursor(&mut buf, sprite, 32, 32, &bounds);
            let touched = buf.pixels().iter().filter(|&&p| p != 0).count();
            assert!(touched > 0, "{:?} drew nothing", sprite);
            let b = sprite.bounds_at(32, 32);
            for y in 0..64 {
                for x in 0..64 {
                    if buf.pixel(x, y) != 0 {
                        assert!(b.contains(x, y), "{:?} escaped its box at {},{}", sprite, x, y);
                    }
                }
            }
        }
    }
}

//! The server-side window record.

use std::sync::Arc;

use mullion_abi::damage::DamageRect;
use mullion_abi::message::Advertisement;
use mullion_abi::window::{CURSOR_ARROW, Wid, ZORDER_BOTTOM, ZORDER_TOP, ZSlot};
use mullion_gfx::transform::WindowGeometry;
use mullion_gfx::{SurfaceTransform, rotated_bounds};
use mullion_ipc::{ConnId, SharedBuffer};

/// Animation effects. Durations are wall-clock; a stretched frame interval
/// only skips intermediate states, never stalls the animation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    FadeIn,
    FadeOut,
}

impl Effect {
    pub fn duration_ms(self) -> u64 {
        match self {
            Effect::FadeIn => 200,
            Effect::FadeOut => 200,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Animation {
    pub effect: Effect,
    pub start_ms: u64,
}

/// What an animation looks like on a given frame.
pub enum AnimationFrame {
    /// Still playing: scale about the centre plus an opacity, both derived
    /// from elapsed time.
    Playing { scale: f64, opacity: u32 },
    /// A fade-in that has run its course; the window draws plainly now.
    Settled,
    /// A fade-out that has run its course; the window may be freed.
    Expired,
}

impl Animation {
    pub fn frame(&self, now_ms: u64) -> AnimationFrame {
        let len = self.effect.duration_ms();
        let elapsed = now_ms.saturating_sub(self.start_ms);
        if elapsed >= len {
            return match self.effect {
                Effect::FadeIn => AnimationFrame::Settled,
                Effect::FadeOut => AnimationFrame::Expired,
            };
        }
        // Fade-out plays the fade-in curve backwards.
        let t = match self.effect {
            Effect::FadeIn => elapsed as f64 / len as f64,
            Effect::FadeOut => (len - elapsed) as f64 / len as f64,
        };
        AnimationFrame::Playing {
            scale: 0.75 + t * 0.25,
            opacity: (t * 256.0) as u32,
        }
    }
}

/// A resize the client has accepted but not yet painted.
pub struct PendingResize {
    pub bufid: u32,
    pub buffer: Option<Arc<SharedBuffer>>,
}

pub struct ServerWindow {
    pub wid: Wid,
    pub owner: ConnId,

    pub x: i32,
    pub y: i32,
    pub z: u32,
    pub width: i32,
    pub height: i32,

    pub bufid: u32,
    /// `None` when the shared buffer could not be acquired; the window then
    /// renders and hit-tests as fully transparent.
    pub buffer: Option<Arc<SharedBuffer>>,
    pub pending: Option<PendingResize>,

    /// Degrees about the centre; only meaningful for middle-stack windows.
    pub rotation: i32,
    /// 0..=256; pixels with alpha below this are transparent to hit-testing.
    pub alpha_threshold: u32,

    pub show_mouse: i32,
    pub default_mouse: i32,

    pub anim: Option<Animation>,

    pub tiled: bool,
    pub untiled_width: i32,
    pub untiled_height: i32,

    pub advertisement: Option<Advertisement>,
}

impl ServerWindow {
    pub fn new(wid: Wid, owner: ConnId, width: i32, height: i32, now_ms: u64) -> Self {
        Self {
            wid,
            owner,
            x: 0,
            y: 0,
            z: 1,
            width,
            height,
            bufid: 0,
            buffer: None,
            pending: None,
            rotation: 0,
            alpha_threshold: 0,
            show_mouse: CURSOR_ARROW,
            default_mouse: CURSOR_ARROW,
            anim: Some(Animation {
                effect: Effect::FadeIn,
                start_ms: now_ms,
            }),
            tiled: false,
            untiled_width: 0,
            untiled_height: 0,
            advertisement: None,
        }
    }

    #[inline]
    pub fn slot(&self) -> ZSlot {
        ZSlot::from_z(self.z)
    }

    #[inline]
    pub fn is_middle(&self) -> bool {
        self.slot() == ZSlot::Middle
    }

    #[inline]
    pub fn geometry(&self) -> WindowGeometry {
        WindowGeometry {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            // Top and bottom windows never rotate.
            rotation: if self.is_middle() { self.rotation } else { 0 },
        }
    }

    /// Screen-space bounding box, rotation included.
    #[inline]
    pub fn screen_bounds(&self) -> DamageRect {
        let geo = self.geometry();
        rotated_bounds(&geo, 0, 0, self.width, self.height)
    }

    /// Transform for the current frame, or `None` once a fade-out has
    /// finished and the window should be reaped instead of drawn.
    pub fn frame_transform(&self, now_ms: u64) -> Option<SurfaceTransform> {
        let geo = self.geometry();
        let mut t = SurfaceTransform::plain(geo);
        match self.anim {
            None => Some(t),
            Some(anim) => match anim.frame(now_ms) {
                AnimationFrame::Settled => Some(t),
                AnimationFrame::Expired => None,
                AnimationFrame::Playing { scale, opacity } => {
                    if self.is_middle() {
                        t.scale = scale;
                    }
                    t.opacity = opacity;
                    Some(t)
                }
            },
        }
    }

    /// Alpha of the buffer pixel at window-local coordinates; 0 when the
    /// buffer is missing or the point is out of bounds.
    pub fn alpha_at(&self, lx: i32, ly: i32) -> u32 {
        if lx < 0 || ly < 0 || lx >= self.width || ly >= self.height {
            return 0;
        }
        let Some(buffer) = &self.buffer else {
            return 0;
        };
        let idx = (ly as usize) * (self.width as usize) + lx as usize;
        buffer.pixels().get(idx).map_or(0, |px| mullion_gfx::alpha_of(*px))
    }

    /// True if a click at window-local coordinates lands on this window.
    pub fn solid_at(&self, lx: i32, ly: i32) -> bool {
        if lx < 0 || ly < 0 || lx >= self.width || ly >= self.height {
            return false;
        }
        self.alpha_at(lx, ly) >= self.alpha_threshold
    }
}

/// Helper for the z-field of windows evicted into the middle stack.
pub fn middle_z() -> u32 {
    debug_assert!(ZSlot::from_z(1) == ZSlot::Middle);
    1
}

const _: () = {
    assert!(ZORDER_BOTTOM == 0);
    assert!(ZORDER_TOP == 0xFFFF);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_in_progresses_and_settles() {
        let anim = Animation {
            effect: Effect::FadeIn,
            start_ms: 1000,
        };
        match anim.frame(1000) {
            AnimationFrame::Playing { scale, opacity } => {
                assert!((scale - 0.75).abs() < 1e-9);
                assert_eq!(opacity, 0);
            }
            _ => panic!("expected playing"),
        }
        match anim.frame(1100) {
            AnimationFrame::Playing { scale, opacity } => {
                assert!((scale - 0.875).abs() < 1e-9);
                assert_eq!(opacity, 128);
            }
            _ => panic!("expected playing"),
        }
        assert!(matches!(anim.frame(1200), AnimationFrame::Settled));
    }

    #[test]
    fn fade_out_plays_backwards_then_expires() {
        let anim = Animation {
            effect: Effect::FadeOut,
            start_ms: 0,
        };
        match anim.frame(0) {
            AnimationFrame::Playing { scale, opacity } => {
                assert!((scale - 1.0).abs() < 1e-9);
                assert_eq!(opacity, 256);
            }
            _ => panic!("expected playing"),
        }
        assert!(matches!(anim.frame(200), AnimationFrame::Expired));
        assert!(matches!(anim.frame(5000), AnimationFrame::Expired));
    }

    #[test]
    fn solidity_follows_the_threshold() {
        let mut w = ServerWindow::new(1, 1, 4, 4, 0);
        // No buffer: alpha reads 0, so only threshold 0 is solid.
        assert!(w.solid_at(1, 1));
        w.alpha_threshold = 1;
        assert!(!w.solid_at(1, 1));
        // Out of bounds is never solid.
        w.alpha_threshold = 0;
        assert!(!w.solid_at(-1, 0));
        assert!(!w.solid_at(4, 0));
    }

    #[test]
    fn top_and_bottom_never_report_rotation() {
        let mut w = ServerWindow::new(1, 1, 10, 10, 0);
        w.rotation = 45;
        w.z = mullion_abi::window::ZORDER_TOP;
        assert_eq!(w.geometry().rotation, 0);
        w.z = 5;
        assert_eq!(w.geometry().rotation, 45);
    }
}

//! Compositing a client surface into the back buffer.

use mullion_abi::damage::DamageRect;

use crate::blend_px;
use crate::draw_buffer::{DrawBuffer, Surface};
use crate::transform::{WindowGeometry, device_to_window, rotated_bounds};

/// Everything the blitter needs to place one window: its screen geometry
/// (with rotation) plus the animation transform of the current frame.
#[derive(Copy, Clone, Debug)]
pub struct SurfaceTransform {
    pub geo: WindowGeometry,
    /// Animation scale about the window centre; 1.0 when not animating.
    pub scale: f64,
    /// Animation opacity, 0..=256.
    pub opacity: u32,
}

impl SurfaceTransform {
    pub fn plain(geo: WindowGeometry) -> Self {
        Self {
            geo,
            scale: 1.0,
            opacity: 256,
        }
    }

    #[inline]
    fn is_identity(&self) -> bool {
        self.geo.rotation == 0 && self.scale == 1.0
    }

    /// Screen-space bounding box of the transformed surface.
    pub fn screen_bounds(&self) -> DamageRect {
        rotated_bounds(&self.geo, 0, 0, self.geo.width, self.geo.height)
    }
}

/// Draw `surf` into `buf` restricted to `clip`, applying translation,
/// rotation and the animation transform in that order.
pub fn blit_surface(
    buf: &mut DrawBuffer,
    surf: &Surface<'_>,
    transform: &SurfaceTransform,
    clip: &DamageRect,
) {
    if transform.opacity == 0 {
        return;
    }

    let Some(area) = transform
        .screen_bounds()
        .intersection(clip)
        .map(|r| r.clip(buf.width(), buf.height()))
        .filter(DamageRect::is_valid)
    else {
        return;
    };

    if transform.is_identity() && transform.opacity == 256 {
        blit_rows(buf, surf, &transform.geo, &area);
    } else {
        blit_mapped(buf, surf, transform, &area);
    }
}

/// Fast path: pure translation, row-wise source-over.
fn blit_rows(buf: &mut DrawBuffer, surf: &Surface<'_>, geo: &WindowGeometry, area: &DamageRect) {
    let sx0 = area.x0 - geo.x;
    let sx1 = area.x1 - geo.x;
    if sx0 < 0 || sx1 >= surf.width() {
        // Window narrower than its declared geometry (missing buffer).
        blit_mapped(
            buf,
            surf,
            &SurfaceTransform::plain(*geo),
            area,
        );
        return;
    }

    let width = buf.width() as usize;
    for y in area.y0..=area.y1 {
        let sy = y - geo.y;
        if sy < 0 || sy >= surf.height() {
            continue;
        }
        let src_row = surf.row(sy, sx0, sx1 + 1);
        let base = (y as usize) * width + area.x0 as usize;
        let dst_row = &mut buf.pixels_mut()[base..base + src_row.len()];
        for (dst, &src) in dst_row.iter_mut().zip(src_row) {
            if src >= 0xFF00_0000 {
                *dst = src;
            } else {
                *dst = blend_px(*dst, src, 256);
            }
        }
    }
}

/// General path: per-pixel inverse mapping through rotation and scale.
fn blit_mapped(
    buf: &mut DrawBuffer,
    surf: &Surface<'_>,
    transform: &SurfaceTransform,
    area: &DamageRect,
) {
    let geo = &transform.geo;
    let cx = (geo.width / 2) as f64;
    let cy = (geo.height / 2) as f64;
    let inv_scale = if transform.scale != 0.0 {
        1.0 / transform.scale
    } else {
        return;
    };

    for y in area.y0..=area.y1 {
        for x in area.x0..=area.x1 {
            let (wx, wy) = device_to_window(geo, x, y);
            let (sx, sy) = if transform.scale == 1.0 {
                (wx, wy)
            } else {
                (
                    (cx + (wx as f64 - cx) * inv_scale) as i32,
                    (cy + (wy as f64 - cy) * inv_scale) as i32,
                )
            };
            if sx < 0 || sy < 0 || sx >= surf.width() || sy >= surf.height() {
                continue;
            }
            let src = surf.pixel(sx, sy);
            let blended = blend_px(buf.pixel(x, y), src, transform.opacity);
            buf.put_pixel(x, y, blended);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_surface(px: &mut Vec<u32>, w: i32, h: i32, color: u32) -> Surface<'_> {
        px.clear();
        px.resize((w * h) as usize, color);
        Surface::new(px, w, h).unwrap()
    }

    fn geo(x: i32, y: i32, w: i32, h: i32) -> WindowGeometry {
        WindowGeometry {
            x,
            y,
            width: w,
            height: h,
            rotation: 0,
        }
    }

    #[test]
    fn opaque_blit_lands_at_position() {
        let mut buf = DrawBuffer::new(16, 16);
        let mut px = Vec::new();
        let surf = solid_surface(&mut px, 4, 4, 0xFFFF_0000);
        let t = SurfaceTransform::plain(geo(5, 6, 4, 4));
        let bounds = buf.bounds();
        blit_surface(&mut buf, &surf, &t, &bounds);
        assert_eq!(buf.pixel(5, 6), 0xFFFF_0000);
        assert_eq!(buf.pixel(8, 9), 0xFFFF_0000);
        assert_eq!(buf.pixel(4, 6), 0);
        assert_eq!(buf.pixel(9, 6), 0);
    }

    #[test]
    fn clip_limits_the_write() {
        let mut buf = DrawBuffer::new(16, 16);
        let mut px = Vec::new();
        let surf = solid_surface(&mut px, 8, 8, 0xFF00_FF00);
        let t = SurfaceTransform::plain(geo(0, 0, 8, 8));
        let clip = DamageRect::from_xywh(2, 2, 2, 2);
        blit_surface(&mut buf, &surf, &t, &clip);
        assert_eq!(buf.pixel(2, 2), 0xFF00_FF00);
        assert_eq!(buf.pixel(1, 1), 0);
        assert_eq!(buf.pixel(4, 4), 0);
    }

    #[test]
    fn negative_origin_clips_to_screen() {
        let mut buf = DrawBuffer::new(8, 8);
        let mut px = Vec::new();
        let surf = solid_surface(&mut px, 4, 4, 0xFF12_3456);
        let t = SurfaceTransform::plain(geo(-2, -2, 4, 4));
        let bounds = buf.bounds();
        blit_surface(&mut buf, &surf, &t, &bounds);
        assert_eq!(buf.pixel(0, 0), 0xFF12_3456);
        assert_eq!(buf.pixel(1, 1), 0xFF12_3456);
        assert_eq!(buf.pixel(2, 2), 0);
    }

    #[test]
    fn zero_opacity_draws_nothing() {
        let mut buf = DrawBuffer::new(8, 8);
        let mut px = Vec::new();
        let surf = solid_surface(&mut px, 4, 4, 0xFFFF_FFFF);
        let mut t = SurfaceTransform::plain(geo(0, 0, 4, 4));
        t.opacity = 0;
        let bounds = buf.bounds();
        blit_surface(&mut buf, &surf, &t, &bounds);
        assert_eq!(buf.pixel(0, 0), 0);
    }

    #[test]
    fn rotated_blit_stays_inside_rotated_bounds() {
        let mut buf = DrawBuffer::new(32, 32);
        let mut px = Vec::new();
        let surf = solid_surface(&mut px, 8, 8, 0xFFAA_BBCC);
        let mut g = geo(12, 12, 8, 8);
        g.rotation = 45;
        let t = SurfaceTransform::plain(g);
        let bounds = buf.bounds();
        blit_surface(&mut buf, &surf, &t, &bounds);
        // Centre pixel is covered regardless of rotation.
        assert_eq!(buf.pixel(16, 16), 0xFFAA_BBCC);
        // Far corner outside the rotated diamond stays untouched.
        assert_eq!(buf.pixel(31, 31), 0);
    }
}

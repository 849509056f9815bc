//! Window-space / screen-space coordinate transforms.
//!
//! Middle-stack windows may be rotated about their centre; everything that
//! touches their pixels (hit-testing, damage, blitting) routes through
//! these helpers so the two spaces stay consistent.

use mullion_abi::damage::DamageRect;

#[derive(Copy, Clone, Debug)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Degrees, counter-clockwise, about the window centre.
    pub rotation: i32,
}

impl WindowGeometry {
    #[inline]
    pub fn bounds(&self) -> DamageRect {
        DamageRect::from_xywh(self.x, self.y, self.width, self.height)
    }
}

/// Screen coordinates -> window-local coordinates (inverse rotation).
pub fn device_to_window(geo: &WindowGeometry, x: i32, y: i32) -> (i32, i32) {
    let lx = x - geo.x;
    let ly = y - geo.y;
    if geo.rotation == 0 {
        return (lx, ly);
    }

    let cx = (geo.width / 2) as f64;
    let cy = (geo.height / 2) as f64;
    let (s, c) = (-(geo.rotation as f64)).to_radians().sin_cos();

    let tx = lx as f64 - cx;
    let ty = ly as f64 - cy;
    ((tx * c - ty * s + cx) as i32, (tx * s + ty * c + cy) as i32)
}

/// Window-local coordinates -> screen coordinates.
pub fn window_to_device(geo: &WindowGeometry, x: i32, y: i32) -> (i32, i32) {
    if geo.rotation == 0 {
        return (geo.x + x, geo.y + y);
    }

    let cx = (geo.width / 2) as f64;
    let cy = (geo.height / 2) as f64;
    let (s, c) = (geo.rotation as f64).to_radians().sin_cos();

    let tx = x as f64 - cx;
    let ty = y as f64 - cy;
    (
        (tx * c - ty * s + cx) as i32 + geo.x,
        (tx * s + ty * c + cy) as i32 + geo.y,
    )
}

/// Screen-space bounding box of a window-local rectangle: the axis-aligned
/// hull of its four transformed corners.
pub fn rotated_bounds(geo: &WindowGeometry, x: i32, y: i32, w: i32, h: i32) -> DamageRect {
    if geo.rotation == 0 {
        return DamageRect::from_xywh(geo.x + x, geo.y + y, w, h);
    }

    let corners = [
        window_to_device(geo, x, y),
        window_to_device(geo, x + w, y),
        window_to_device(geo, x, y + h),
        window_to_device(geo, x + w, y + h),
    ];

    let mut r = DamageRect {
        x0: corners[0].0,
        y0: corners[0].1,
        x1: corners[0].0,
        y1: corners[0].1,
    };
    for (cx, cy) in &corners[1..] {
        r.x0 = r.x0.min(*cx);
        r.y0 = r.y0.min(*cy);
        r.x1 = r.x1.max(*cx);
        r.y1 = r.y1.max(*cy);
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo(rotation: i32) -> WindowGeometry {
        WindowGeometry {
            x: 100,
            y: 50,
            width: 40,
            height: 20,
            rotation,
        }
    }

    #[test]
    fn unrotated_is_a_translation() {
        let g = geo(0);
        assert_eq!(device_to_window(&g, 110, 55), (10, 5));
        assert_eq!(window_to_device(&g, 10, 5), (110, 55));
    }

    #[test]
    fn round_trip_survives_rotation() {
        let g = geo(30);
        let (sx, sy) = window_to_device(&g, 7, 3);
        let (wx, wy) = device_to_window(&g, sx, sy);
        assert!((wx - 7).abs() <= 1, "wx = {}", wx);
        assert!((wy - 3).abs() <= 1, "wy = {}", wy);
    }

    #[test]
    fn quarter_turn_swaps_extents() {
        let g = geo(90);
        let b = rotated_bounds(&g, 0, 0, g.width, g.height);
        // A 40x20 window rotated a quarter turn spans ~20x40.
        assert!((b.width() - 21).abs() <= 2, "width {}", b.width());
        assert!((b.height() - 41).abs() <= 2, "height {}", b.height());
    }

    #[test]
    fn unrotated_bounds_match_geometry() {
        let g = geo(0);
        assert_eq!(
            rotated_bounds(&g, 0, 0, g.width, g.height),
            DamageRect::from_xywh(100, 50, 40, 20)
        );
    }
}

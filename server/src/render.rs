//! The render thread.
//!
//! One pass per frame interval: snapshot the damage queue, add the cursor
//! and every animating window to the clip set, walk the z-order into the
//! back buffer, draw the resize outline and the cursor, push the clipped
//! regions to the display, and only then physically remove windows whose
//! fade-out has finished.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use mullion_abi::damage::DamageRect;
use mullion_abi::message::Message;
use mullion_abi::window::{CURSOR_ARROW, CURSOR_HIDE, ResizeDirection, Wid};
use mullion_gfx::cursor::{CursorSprite, cursor_damage_at, draw_cursor};
use mullion_gfx::transform::WindowGeometry;
use mullion_gfx::{DrawBuffer, Surface, SurfaceTransform, blit_surface, window_to_device};
use mullion_ipc::SharedBuffer;

use crate::input::{Interaction, ResizeGrab};
use crate::state::{SCREENSHOT_FULL, SCREENSHOT_NONE, SCREENSHOT_WINDOW, Server};
use crate::window::AnimationFrame;
use crate::output::Output;

/// Target frame interval (~60 Hz).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

const BACKGROUND: u32 = 0xFF00_0000;
const OUTLINE_FILL: u32 = 0x8054_8CFF;
const OUTLINE_EDGE: u32 = 0xFF00_66E5;

struct BlitItem {
    transform: SurfaceTransform,
    buffer: Option<Arc<SharedBuffer>>,
    width: i32,
    height: i32,
}

/// Run the compositor loop until the server stops.
pub fn run(srv: Arc<Server>, mut output: Output) {
    let mut back = DrawBuffer::new(srv.width, srv.height);
    let mut last_cursor = srv.pointer.lock().screen_pos();
    info!("render thread up, {}x{}", srv.width, srv.height);
    while srv.is_running() {
        thread::sleep(FRAME_INTERVAL);
        render_pass(&srv, &mut back, &mut output, &mut last_cursor);
    }
    debug!("render thread down");
}

/// One render pass. Public so the integration tests can drive frames
/// deterministically.
pub fn render_pass(
    srv: &Server,
    back: &mut DrawBuffer,
    output: &mut Output,
    last_cursor: &mut (i32, i32),
) {
    let now = srv.now_ms();

    let mut clip = srv.damage.lock().take();

    let (cx, cy, interaction, resize_grab) = {
        let ptr = srv.pointer.lock();
        let (x, y) = ptr.screen_pos();
        (x, y, ptr.state, ptr.resize)
    };
    if (cx, cy) != *last_cursor {
        clip.add(cursor_damage_at(last_cursor.0, last_cursor.1));
        clip.add(cursor_damage_at(cx, cy));
        *last_cursor = (cx, cy);
    }

    let screenshot = srv.screenshot.swap(SCREENSHOT_NONE, Ordering::Relaxed);

    let mut blits: Vec<BlitItem> = Vec::new();
    let mut removals: Vec<Wid> = Vec::new();
    let mut outline: Option<(WindowGeometry, ResizeGrab)> = None;
    let cursor_sprite;
    let mut window_shot: Option<(Arc<SharedBuffer>, i32, i32)> = None;

    {
        let mut reg = srv.registry.lock();

        // Time-based animations re-damage themselves every frame.
        for wid in reg.z_order() {
            if let Some(win) = reg.get(wid) {
                if win.anim.is_some() {
                    clip.add(win.screen_bounds());
                }
            }
        }

        if clip.is_empty() && screenshot == SCREENSHOT_NONE {
            return;
        }

        for wid in reg.z_order() {
            let Some(win) = reg.get_mut(wid) else { continue };
            match win.frame_transform(now) {
                None => removals.push(wid),
                Some(transform) => {
                    if matches!(
                        win.anim.map(|a| a.frame(now)),
                        Some(AnimationFrame::Settled)
                    ) {
                        win.anim = None;
                    }
                    blits.push(BlitItem {
                        transform,
                        buffer: win.buffer.clone(),
                        width: win.width,
                        height: win.height,
                    });
                }
            }
        }

        if interaction == Interaction::Resizing {
            if let Some(grab) = resize_grab {
                if let Some(win) = reg.get(grab.wid) {
                    outline = Some((win.geometry(), grab));
                }
            }
        }

        // Cursor sprite: interaction state wins, then the hovered window's
        // preference, then the plain arrow.
        let preference = reg
            .top_at(cx, cy)
            .and_then(|wid| reg.get(wid))
            .map_or(CURSOR_ARROW, |w| w.show_mouse);
        cursor_sprite = match interaction {
            _ if preference == CURSOR_HIDE => None,
            Interaction::Resizing => resize_grab.map(|g| sprite_for(g.direction)),
            Interaction::Moving => Some(CursorSprite::Drag),
            _ => Some(CursorSprite::from_preference(preference)),
        };

        if screenshot == SCREENSHOT_WINDOW {
            window_shot = reg
                .focused()
                .and_then(|wid| reg.get(wid))
                .and_then(|w| w.buffer.clone().map(|b| (b, w.width, w.height)));
        }
    }

    // Pixel work happens off the registry lock; the Arc clones keep every
    // buffer alive even if a resize commits mid-pass.
    clip.coalesce();
    let screen = back.bounds();
    let regions: Vec<DamageRect> = if clip.is_full_damage() {
        vec![screen]
    } else {
        clip.regions().to_vec()
    };

    for region in &regions {
        back.fill_rect(region, region, BACKGROUND);
    }
    for item in &blits {
        let surface = item
            .buffer
            .as_deref()
            .and_then(|buf| Surface::new(buf.pixels(), item.width, item.height))
            .unwrap_or(Surface::empty());
        for region in &regions {
            blit_surface(back, &surface, &item.transform, region);
        }
    }

    if let Some((geo, grab)) = outline {
        for region in &regions {
            draw_resize_outline(back, &geo, &grab, region);
        }
    }

    if let Some(sprite) = cursor_sprite {
        for region in &regions {
            draw_cursor(back, sprite, cx, cy, region);
        }
    }

    output.present(back, &regions);

    if !removals.is_empty() {
        let mut reg = srv.registry.lock();
        for wid in removals {
            if let Some(gone) = reg.destroy(wid) {
                srv.post_damage(gone.bounds);
                if gone.was_focused {
                    srv.send_to(gone.owner, &Message::WindowFocusChange { wid, focused: false });
                }
            }
        }
        drop(reg);
        srv.notify_subscribers();
    }

    match screenshot {
        SCREENSHOT_FULL => {
            write_screenshot(back.pixels(), back.width(), back.height());
        }
        SCREENSHOT_WINDOW => {
            if let Some((buffer, w, h)) = window_shot {
                write_screenshot(buffer.pixels(), w, h);
            }
        }
        _ => {}
    }
}

fn sprite_for(direction: ResizeDirection) -> CursorSprite {
    match direction {
        ResizeDirection::Up | ResizeDirection::Down => CursorSprite::ResizeVertical,
        ResizeDirection::Left | ResizeDirection::Right => CursorSprite::ResizeHorizontal,
        ResizeDirection::UpLeft | ResizeDirection::DownRight | ResizeDirection::Auto => {
            CursorSprite::ResizeDiagonal
        }
        ResizeDirection::UpRight | ResizeDirection::DownLeft => CursorSprite::ResizeAntiDiagonal,
    }
}

/// Translucent box over the pending resize extent, edged in solid blue.
fn draw_resize_outline(
    buf: &mut DrawBuffer,
    geo: &WindowGeometry,
    grab: &ResizeGrab,
    clip: &DamageRect,
) {
    let corners = [
        window_to_device(geo, grab.offset_x, grab.offset_y),
        window_to_device(geo, grab.offset_x + grab.width, grab.offset_y),
        window_to_device(geo, grab.offset_x, grab.offset_y + grab.height),
        window_to_device(geo, grab.offset_x + grab.width, grab.offset_y + grab.height),
    ];
    let mut r = DamageRect {
        x0: corners[0].0,
        y0: corners[0].1,
        x1: corners[0].0,
        y1: corners[0].1,
    };
    for (x, y) in &corners[1..] {
        r.x0 = r.x0.min(*x);
        r.y0 = r.y0.min(*y);
        r.x1 = r.x1.max(*x);
        r.y1 = r.y1.max(*y);
    }
    if !r.is_valid() {
        return;
    }

    buf.blend_rect(&r, clip, OUTLINE_FILL);
    let w = r.width();
    let h = r.height();
    buf.fill_rect(&DamageRect::from_xywh(r.x0, r.y0, w, 2), clip, OUTLINE_EDGE);
    buf.fill_rect(&DamageRect::from_xywh(r.x0, r.y1 - 1, w, 2), clip, OUTLINE_EDGE);
    buf.fill_rect(&DamageRect::from_xywh(r.x0, r.y0, 2, h), clip, OUTLINE_EDGE);
    buf.fill_rect(&DamageRect::from_xywh(r.x1 - 1, r.y0, 2, h), clip, OUTLINE_EDGE);
}

/// Dump pixels as a binary PPM under the temp directory.
fn write_screenshot(pixels: &[u32], width: i32, height: i32) {
    let path = std::env::temp_dir().join("screenshot.ppm");
    let result = std::fs::File::create(&path).and_then(|mut f| {
        write!(f, "P6\n{} {}\n255\n", width, height)?;
        let mut row = Vec::with_capacity(width as usize * 3);
        for y in 0..height as usize {
            row.clear();
            for x in 0..width as usize {
                let px = pixels[y * width as usize + x];
                row.extend_from_slice(&[(px >> 16) as u8, (px >> 8) as u8, px as u8]);
            }
            f.write_all(&row)?;
        }
        Ok(())
    });
    match result {
        Ok(()) => info!("screenshot written to {}", path.display()),
        Err(e) => debug!("screenshot failed: {}", e),
    }
}

//! The input dispatcher: pointer state machine, hover/focus routing, and
//! the keyboard precedence chain (reserved chords, then client keybindings,
//! then the focused window).

use log::trace;

use mullion_abi::input::{
    Buttons, KEY_F4, KEY_F10, KEY_ARROW_DOWN, KEY_ARROW_LEFT, KEY_ARROW_RIGHT, KEY_ARROW_UP,
    KeyAction, KeyEvent, KeyMods, PointerEventKind, PointerPacket,
};
use mullion_abi::message::Message;
use mullion_abi::window::{ResizeDirection, Wid, WindowMouseAction};
use mullion_gfx::cursor::cursor_damage_at;
use mullion_gfx::device_to_window;
use mullion_ipc::ConnId;

use crate::registry::Registry;
use crate::state::{SCREENSHOT_FULL, SCREENSHOT_WINDOW, Server};

/// Internal pointer units per screen pixel. The oversampling keeps
/// high-resolution mice precise on coarse displays.
pub const MOUSE_SCALE: i32 = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Interaction {
    Normal,
    Moving,
    Dragging,
    Resizing,
}

/// An interactive resize in flight.
#[derive(Copy, Clone, Debug)]
pub struct ResizeGrab {
    pub wid: Wid,
    pub direction: ResizeDirection,
    pub width: i32,
    pub height: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub button: Buttons,
}

pub struct PointerState {
    /// Oversampled position, clamped to [0, display * MOUSE_SCALE].
    pub x: i32,
    pub y: i32,
    max_x: i32,
    max_y: i32,

    pub state: Interaction,
    pub grab: Option<Wid>,
    pub resize: Option<ResizeGrab>,
    pub hover: Option<Wid>,
    /// Modifier shadow from the last keyboard event.
    pub shadow: KeyMods,

    anchor_x: i32,
    anchor_y: i32,
    win_x: i32,
    win_y: i32,
    drag_button: Buttons,
    moved: bool,
    click_x: i32,
    click_y: i32,
}

impl PointerState {
    pub fn new(width: u32, height: u32) -> Self {
        let max_x = width as i32 * MOUSE_SCALE;
        let max_y = height as i32 * MOUSE_SCALE;
        Self {
            x: max_x / 2,
            y: max_y / 2,
            max_x,
            max_y,
            state: Interaction::Normal,
            grab: None,
            resize: None,
            hover: None,
            shadow: KeyMods::empty(),
            anchor_x: 0,
            anchor_y: 0,
            win_x: 0,
            win_y: 0,
            drag_button: Buttons::LEFT,
            moved: false,
            click_x: -1,
            click_y: -1,
        }
    }

    #[inline]
    pub fn screen_pos(&self) -> (i32, i32) {
        (self.x / MOUSE_SCALE, self.y / MOUSE_SCALE)
    }

    fn reset_to_normal(&mut self) {
        self.state = Interaction::Normal;
        self.grab = None;
        self.resize = None;
    }
}

/// Entry point for pointer packets (device feeders and WARP_MOUSE).
pub fn handle_pointer(srv: &Server, packet: PointerPacket, kind: PointerEventKind) {
    let mut ptr = srv.pointer.lock();
    match kind {
        PointerEventKind::Relative => {
            ptr.x += packet.dx * MOUSE_SCALE;
            // Device y axis points up; screen y points down.
            ptr.y -= packet.dy * MOUSE_SCALE;
        }
        PointerEventKind::Absolute => {
            ptr.x = packet.dx * MOUSE_SCALE;
            ptr.y = packet.dy * MOUSE_SCALE;
        }
    }
    ptr.x = ptr.x.clamp(0, ptr.max_x);
    ptr.y = ptr.y.clamp(0, ptr.max_y);

    match ptr.state {
        Interaction::Normal => normal_state(srv, &mut ptr, packet.buttons),
        Interaction::Moving => moving_state(srv, &mut ptr, packet.buttons),
        Interaction::Dragging => dragging_state(srv, &mut ptr, packet.buttons),
        Interaction::Resizing => resizing_state(srv, &mut ptr, packet.buttons),
    }
}

fn normal_state(srv: &Server, ptr: &mut PointerState, buttons: Buttons) {
    let alt = ptr.shadow.alt();
    if buttons.contains(Buttons::LEFT) && alt {
        start_move(srv, ptr);
    } else if buttons.contains(Buttons::MIDDLE) && alt {
        start_resize(srv, ptr, ResizeDirection::Auto, Buttons::MIDDLE);
    } else if buttons.contains(Buttons::LEFT) {
        begin_drag(srv, ptr, buttons);
    } else {
        route_motion(srv, ptr, buttons);
    }
}

fn begin_drag(srv: &Server, ptr: &mut PointerState, buttons: Buttons) {
    let (sx, sy) = ptr.screen_pos();
    let mut reg = srv.registry.lock();
    let hit = reg.top_at(sx, sy);
    srv.apply_focus(&mut reg, hit);

    // Press routing goes by the hit test; stored focus only covers the
    // nothing-under-the-pointer case (wallpaper).
    let Some(wid) = hit.or(reg.effective_focus()) else {
        return;
    };
    let Some(win) = reg.get(wid) else { return };
    let (lx, ly) = device_to_window(&win.geometry(), sx, sy);
    let owner = win.owner;
    drop(reg);

    ptr.state = Interaction::Dragging;
    ptr.grab = Some(wid);
    ptr.drag_button = Buttons::LEFT;
    ptr.moved = false;
    ptr.click_x = lx;
    ptr.click_y = ly;

    send_window_mouse(srv, owner, wid, (lx, ly), (-1, -1), buttons, WindowMouseAction::Down);
}

fn route_motion(srv: &Server, ptr: &mut PointerState, buttons: Buttons) {
    let (sx, sy) = ptr.screen_pos();
    let mut sends: Vec<(ConnId, Message)> = Vec::new();

    {
        let reg = srv.registry.lock();
        let focused = reg.effective_focus();
        let hit = reg.top_at(sx, sy);

        if let Some(fwid) = focused {
            push_window_mouse(&reg, &mut sends, fwid, sx, sy, buttons, WindowMouseAction::Move);
        }

        if hit != ptr.hover {
            if let Some(h) = hit {
                push_window_mouse(&reg, &mut sends, h, sx, sy, buttons, WindowMouseAction::Enter);
            }
            if let Some(old) = ptr.hover {
                push_window_mouse(&reg, &mut sends, old, sx, sy, buttons, WindowMouseAction::Leave);
            }
            ptr.hover = hit;
        }

        if hit != focused {
            if let Some(h) = hit {
                push_window_mouse(&reg, &mut sends, h, sx, sy, buttons, WindowMouseAction::Move);
            }
        }
    }

    for (conn, msg) in sends {
        srv.send_to(conn, &msg);
    }
}

fn moving_state(srv: &Server, ptr: &mut PointerState, buttons: Buttons) {
    let Some(wid) = ptr.grab else {
        ptr.reset_to_normal();
        return;
    };

    if !buttons.contains(Buttons::LEFT) {
        let (sx, sy) = ptr.screen_pos();
        ptr.reset_to_normal();
        srv.post_damage(cursor_damage_at(sx, sy));
        return;
    }

    let (_, sy) = ptr.screen_pos();
    let mut reg = srv.registry.lock();
    if sy < 2 {
        // Dropped at the top edge: snap-tile to the whole usable area.
        srv.tile_window(&mut reg, wid, 1, 1, 0, 0);
        drop(reg);
        ptr.reset_to_normal();
        return;
    }

    let x = ptr.win_x + (ptr.x - ptr.anchor_x) / MOUSE_SCALE;
    let y = ptr.win_y + (ptr.y - ptr.anchor_y) / MOUSE_SCALE;
    srv.move_window(&mut reg, wid, x, y);
}

fn dragging_state(srv: &Server, ptr: &mut PointerState, buttons: Buttons) {
    let Some(wid) = ptr.grab else {
        ptr.reset_to_normal();
        return;
    };
    let (sx, sy) = ptr.screen_pos();

    let reg = srv.registry.lock();
    let Some(win) = reg.get(wid) else {
        // The window closed mid-drag.
        drop(reg);
        ptr.reset_to_normal();
        return;
    };
    let (lx, ly) = device_to_window(&win.geometry(), sx, sy);
    let owner = win.owner;
    drop(reg);

    if !buttons.contains(ptr.drag_button) {
        let (old_x, old_y) = (ptr.click_x, ptr.click_y);
        ptr.click_x = lx;
        ptr.click_y = ly;
        let moved = ptr.moved;
        ptr.reset_to_normal();
        if moved {
            send_window_mouse(srv, owner, wid, (lx, ly), (old_x, old_y), buttons, WindowMouseAction::Raise);
        } else {
            send_window_mouse(srv, owner, wid, (lx, ly), (-1, -1), buttons, WindowMouseAction::Click);
        }
    } else if lx != ptr.click_x || ly != ptr.click_y {
        let (old_x, old_y) = (ptr.click_x, ptr.click_y);
        ptr.click_x = lx;
        ptr.click_y = ly;
        ptr.moved = true;
        send_window_mouse(srv, owner, wid, (lx, ly), (old_x, old_y), buttons, WindowMouseAction::Drag);
    }
}

fn resizing_state(srv: &Server, ptr: &mut PointerState, buttons: Buttons) {
    let Some(mut grab) = ptr.resize else {
        ptr.reset_to_normal();
        return;
    };

    let dx = (ptr.x - ptr.anchor_x) / MOUSE_SCALE;
    let dy = (ptr.y - ptr.anchor_y) / MOUSE_SCALE;

    let mut reg = srv.registry.lock();
    let Some(win) = reg.get(grab.wid) else {
        drop(reg);
        ptr.reset_to_normal();
        return;
    };
    let geo = win.geometry();
    let (base_w, base_h) = (win.width, win.height);
    let owner = win.owner;

    // Outline damage before and after, with slack for the border strokes.
    srv.post_damage(mullion_gfx::rotated_bounds(
        &geo,
        grab.offset_x - 2,
        grab.offset_y - 2,
        grab.width + 10,
        grab.height + 10,
    ));
    apply_resize_delta(&mut grab, base_w, base_h, dx, dy);
    srv.post_damage(mullion_gfx::rotated_bounds(
        &geo,
        grab.offset_x - 2,
        grab.offset_y - 2,
        grab.width + 10,
        grab.height + 10,
    ));

    if !buttons.contains(grab.button) {
        trace!(
            "resize of {} settles at {}x{}",
            grab.wid, grab.width, grab.height
        );
        let (nx, ny) = (geo.x + grab.offset_x, geo.y + grab.offset_y);
        srv.move_window(&mut reg, grab.wid, nx, ny);
        drop(reg);
        srv.send_to(
            owner,
            &Message::ResizeOffer {
                wid: grab.wid,
                width: grab.width as u32,
                height: grab.height as u32,
            },
        );
        ptr.reset_to_normal();
    } else {
        drop(reg);
        ptr.resize = Some(grab);
    }
}

/// Pure resize arithmetic: constrain the pointer delta by the anchor
/// direction, keep dimensions non-negative, and bound the positional
/// offset by the window size.
pub fn apply_resize_delta(grab: &mut ResizeGrab, base_w: i32, base_h: i32, dx: i32, dy: i32) {
    let dir = grab.direction;
    let mut dx = dx;
    let mut dy = dy;

    if dir.vertical_only() {
        dx = 0;
        grab.offset_x = 0;
    }
    if dir.horizontal_only() {
        dy = 0;
        grab.offset_y = 0;
    }

    if dir.anchors_left() {
        grab.offset_x = dx;
        dx = -dx;
    } else if !dir.vertical_only() {
        grab.offset_x = 0;
    }

    if dir.anchors_up() {
        grab.offset_y = dy;
        dy = -dy;
    } else if !dir.horizontal_only() {
        grab.offset_y = 0;
    }

    grab.width = (base_w + dx).max(0);
    grab.height = (base_h + dy).max(0);
    grab.offset_x = grab.offset_x.min(base_w);
    grab.offset_y = grab.offset_y.min(base_h);
}

/// The 3x3 cell heuristic for `ResizeDirection::Auto`: the pointer's cell
/// inside the window picks the direction; dead centre resizes down-right.
pub fn auto_direction(lx: i32, ly: i32, width: i32, height: i32) -> ResizeDirection {
    let h = if lx <= width / 3 {
        -1
    } else if lx >= width * 2 / 3 {
        1
    } else {
        0
    };
    let v = if ly <= height / 3 {
        -1
    } else if ly >= height * 2 / 3 {
        1
    } else {
        0
    };
    match (h, v) {
        (-1, -1) => ResizeDirection::UpLeft,
        (0, -1) => ResizeDirection::Up,
        (1, -1) => ResizeDirection::UpRight,
        (-1, 0) => ResizeDirection::Left,
        (1, 0) => ResizeDirection::Right,
        (-1, 1) => ResizeDirection::DownLeft,
        (0, 1) => ResizeDirection::Down,
        _ => ResizeDirection::DownRight,
    }
}

/// Begin an ALT-move (or WINDOW_DRAG_START) on the middle window under the
/// pointer. Untiles the window first, offering back its pre-tile size.
pub fn start_move(srv: &Server, ptr: &mut PointerState) {
    let (sx, sy) = ptr.screen_pos();
    let mut reg = srv.registry.lock();
    let hit = reg.top_at(sx, sy);
    srv.apply_focus(&mut reg, hit);

    let Some(wid) = hit else { return };
    let Some(win) = reg.get_mut(wid) else { return };
    if !win.is_middle() {
        return;
    }

    if win.tiled {
        win.tiled = false;
        let offer = Message::ResizeOffer {
            wid,
            width: win.untiled_width as u32,
            height: win.untiled_height as u32,
        };
        let owner = win.owner;
        srv.send_to(owner, &offer);
    }

    let win = reg.get(wid).expect("window looked up above");
    ptr.state = Interaction::Moving;
    ptr.grab = Some(wid);
    ptr.anchor_x = ptr.x;
    ptr.anchor_y = ptr.y;
    ptr.win_x = win.x;
    ptr.win_y = win.y;
    reg.raise(wid);
    drop(reg);
    srv.post_damage(cursor_damage_at(sx, sy));
}

/// Begin an interactive resize on the middle window under the pointer.
pub fn start_resize(
    srv: &Server,
    ptr: &mut PointerState,
    direction: ResizeDirection,
    button: Buttons,
) {
    let (sx, sy) = ptr.screen_pos();
    let mut reg = srv.registry.lock();
    let hit = reg.top_at(sx, sy);
    srv.apply_focus(&mut reg, hit);

    let Some(wid) = hit else { return };
    let Some(win) = reg.get(wid) else { return };
    if !win.is_middle() {
        return;
    }

    let direction = if direction == ResizeDirection::Auto {
        let (lx, ly) = device_to_window(&win.geometry(), sx, sy);
        auto_direction(lx, ly, win.width, win.height)
    } else {
        direction
    };

    ptr.state = Interaction::Resizing;
    ptr.grab = Some(wid);
    ptr.anchor_x = ptr.x;
    ptr.anchor_y = ptr.y;
    ptr.win_x = win.x;
    ptr.win_y = win.y;
    ptr.resize = Some(ResizeGrab {
        wid,
        direction,
        width: win.width,
        height: win.height,
        offset_x: 0,
        offset_y: 0,
        button,
    });

    let bounds = win.screen_bounds();
    reg.raise(wid);
    drop(reg);
    srv.post_damage(bounds);
}

/// Keyboard entry point. Reserved chords first, then keybindings, then the
/// focused window.
pub fn handle_key(srv: &Server, event: KeyEvent) {
    srv.pointer.lock().shadow = event.modifiers;

    let down = event.action == KeyAction::Down;
    let mods = event.modifiers;
    let key = lowercase(event.keycode);

    let mut reg = srv.registry.lock();
    let focused = reg.effective_focus();

    if down {
        if let Some(fwid) = focused {
            if mods.ctrl() && mods.shift() {
                match key {
                    k if k == b'z' as u32 => return rotate(srv, &mut reg, fwid, Some(-5)),
                    k if k == b'x' as u32 => return rotate(srv, &mut reg, fwid, Some(5)),
                    k if k == b'c' as u32 => return rotate(srv, &mut reg, fwid, None),
                    _ => {}
                }
            }
            if mods.alt() && event.keycode == KEY_F10 && is_middle(&reg, fwid) {
                srv.tile_window(&mut reg, fwid, 1, 1, 0, 0);
                return;
            }
            if mods.alt() && event.keycode == KEY_F4 && is_middle(&reg, fwid) {
                if let Some(owner) = reg.owner_of(fwid) {
                    srv.send_to(owner, &Message::SessionEnd);
                }
                return;
            }
            if mods.super_key() && is_middle(&reg, fwid) {
                // Quadrant and half tiling, grid-style.
                let cell = match (mods.shift(), mods.ctrl(), event.keycode) {
                    (true, _, KEY_ARROW_LEFT) => Some((2, 2, 0, 0)),
                    (true, _, KEY_ARROW_RIGHT) => Some((2, 2, 1, 0)),
                    (_, true, KEY_ARROW_LEFT) => Some((2, 2, 0, 1)),
                    (_, true, KEY_ARROW_RIGHT) => Some((2, 2, 1, 1)),
                    (false, false, KEY_ARROW_LEFT) => Some((2, 1, 0, 0)),
                    (false, false, KEY_ARROW_RIGHT) => Some((2, 1, 1, 0)),
                    (false, false, KEY_ARROW_UP) => Some((1, 2, 0, 0)),
                    (false, false, KEY_ARROW_DOWN) => Some((1, 2, 0, 1)),
                    _ => None,
                };
                if let Some((wd, hd, cx, cy)) = cell {
                    srv.tile_window(&mut reg, fwid, wd, hd, cx, cy);
                    return;
                }
            }
            if mods.super_key() && mods.ctrl() {
                if key == b's' as u32 {
                    srv.screenshot
                        .store(SCREENSHOT_FULL, core::sync::atomic::Ordering::Relaxed);
                    return;
                }
                if key == b'w' as u32 {
                    srv.screenshot
                        .store(SCREENSHOT_WINDOW, core::sync::atomic::Ordering::Relaxed);
                    return;
                }
            }
        }
    }
    drop(reg);

    let focus_wid = focused.unwrap_or(0);
    if let Some(bind) = srv.lookup_bind(event.keycode, mods) {
        srv.send_to(
            bind.owner,
            &Message::KeyEvent {
                wid: focus_wid,
                event,
                shadow: mods,
            },
        );
        if bind.response == mullion_abi::window::BindResponse::Steal {
            return;
        }
    }

    if let Some(fwid) = focused {
        let owner = srv.registry.lock().owner_of(fwid);
        if let Some(owner) = owner {
            srv.send_to(
                owner,
                &Message::KeyEvent {
                    wid: fwid,
                    event,
                    shadow: mods,
                },
            );
        }
    }
}

fn rotate(srv: &Server, reg: &mut Registry, wid: Wid, delta: Option<i32>) {
    let Some(win) = reg.get_mut(wid) else { return };
    if !win.is_middle() {
        return;
    }
    let before = win.screen_bounds();
    match delta {
        Some(d) => win.rotation += d,
        None => win.rotation = 0,
    }
    let after = win.screen_bounds();
    srv.post_damage(before);
    srv.post_damage(after);
}

fn is_middle(reg: &Registry, wid: Wid) -> bool {
    reg.get(wid).is_some_and(|w| w.is_middle())
}

fn lowercase(keycode: u32) -> u32 {
    if (b'A' as u32..=b'Z' as u32).contains(&keycode) {
        keycode + 32
    } else {
        keycode
    }
}

fn push_window_mouse(
    reg: &Registry,
    sends: &mut Vec<(ConnId, Message)>,
    wid: Wid,
    sx: i32,
    sy: i32,
    buttons: Buttons,
    action: WindowMouseAction,
) {
    let Some(win) = reg.get(wid) else { return };
    let (lx, ly) = device_to_window(&win.geometry(), sx, sy);
    sends.push((
        win.owner,
        Message::WindowMouseEvent {
            wid,
            new_x: lx,
            new_y: ly,
            old_x: -1,
            old_y: -1,
            buttons,
            action,
        },
    ));
}

fn send_window_mouse(
    srv: &Server,
    owner: ConnId,
    wid: Wid,
    new: (i32, i32),
    old: (i32, i32),
    buttons: Buttons,
    action: WindowMouseAction,
) {
    srv.send_to(
        owner,
        &Message::WindowMouseEvent {
            wid,
            new_x: new.0,
            new_y: new.1,
            old_x: old.0,
            old_y: old.1,
            buttons,
            action,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_direction_by_cell() {
        // 90x90 window: thirds at 30 and 60.
        assert_eq!(auto_direction(10, 10, 90, 90), ResizeDirection::UpLeft);
        assert_eq!(auto_direction(45, 10, 90, 90), ResizeDirection::Up);
        assert_eq!(auto_direction(80, 45, 90, 90), ResizeDirection::Right);
        assert_eq!(auto_direction(10, 80, 90, 90), ResizeDirection::DownLeft);
        assert_eq!(auto_direction(45, 45, 90, 90), ResizeDirection::DownRight);
        assert_eq!(auto_direction(80, 80, 90, 90), ResizeDirection::DownRight);
    }

    fn grab(direction: ResizeDirection) -> ResizeGrab {
        ResizeGrab {
            wid: 1,
            direction,
            width: 100,
            height: 80,
            offset_x: 0,
            offset_y: 0,
            button: Buttons::MIDDLE,
        }
    }

    #[test]
    fn down_right_grows_without_offset() {
        let mut g = grab(ResizeDirection::DownRight);
        apply_resize_delta(&mut g, 100, 80, 30, 20);
        assert_eq!((g.width, g.height), (130, 100));
        assert_eq!((g.offset_x, g.offset_y), (0, 0));
    }

    #[test]
    fn left_anchors_the_right_edge() {
        let mut g = grab(ResizeDirection::Left);
        apply_resize_delta(&mut g, 100, 80, -30, 999);
        // Vertical delta is ignored; moving left grows the window and
        // shifts its origin.
        assert_eq!((g.width, g.height), (130, 80));
        assert_eq!((g.offset_x, g.offset_y), (-30, 0));
    }

    #[test]
    fn up_zeroes_horizontal_and_offsets_vertically() {
        let mut g = grab(ResizeDirection::Up);
        apply_resize_delta(&mut g, 100, 80, 50, -25);
        assert_eq!((g.width, g.height), (100, 105));
        assert_eq!((g.offset_x, g.offset_y), (0, -25));
    }

    #[test]
    fn dimensions_never_go_negative() {
        let mut g = grab(ResizeDirection::DownRight);
        apply_resize_delta(&mut g, 100, 80, -500, -500);
        assert_eq!((g.width, g.height), (0, 0));
    }

    #[test]
    fn offsets_are_bounded_by_the_window() {
        let mut g = grab(ResizeDirection::UpLeft);
        apply_resize_delta(&mut g, 100, 80, 500, 500);
        assert_eq!((g.offset_x, g.offset_y), (100, 80));
        assert_eq!((g.width, g.height), (0, 0));
    }
}

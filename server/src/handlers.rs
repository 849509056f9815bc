//! The service loop: decode each packet, then one match over the message.
//!
//! Handlers are tolerant across the board. A malformed message is logged
//! and skipped, an unknown wid is silently ignored, and no handler ever
//! terminates the connection — a misbehaving client costs itself, not the
//! session.

use std::sync::Arc;

use log::{debug, info, warn};

use mullion_abi::input::{Buttons, PointerEventKind, PointerPacket};
use mullion_abi::message::{Advertisement, Message};
use mullion_abi::window::AdFlags;
use mullion_gfx::cursor::cursor_damage_at;
use mullion_gfx::{rotated_bounds, window_to_device};
use mullion_ipc::ConnId;

use crate::input;
use crate::state::Server;

/// Dequeue and handle messages until the server stops or the endpoint
/// drains dry.
pub fn service_loop(srv: Arc<Server>) {
    info!("service loop up on '{}'", srv.ident);
    while srv.is_running() {
        let packet = match srv.endpoint.recv() {
            Ok(p) => p,
            Err(_) => break,
        };
        if packet.data.is_empty() {
            handle_disconnect(&srv, packet.source);
            continue;
        }
        match Message::decode(&packet.data) {
            Ok(msg) => dispatch(&srv, packet.source, msg),
            Err(e) => warn!("client {:#x}: dropped message: {}", packet.source, e),
        }
    }
    debug!("service loop down");
}

/// A peer vanished: fade out everything it owned and forget its
/// registrations.
fn handle_disconnect(srv: &Server, conn: ConnId) {
    let now = srv.now_ms();
    let closed = srv.registry.lock().drop_owner(conn, now);
    srv.drop_binds_of(conn);
    srv.subscribers.lock().retain(|c| *c != conn);
    srv.endpoint.drop_connection(conn);
    info!("connection {:#x} closed, {} window(s) marked", conn, closed);
}

fn dispatch(srv: &Server, source: ConnId, msg: Message) {
    match msg {
        Message::Hello => {
            srv.send_to(
                source,
                &Message::Welcome {
                    width: srv.width,
                    height: srv.height,
                },
            );
        }

        Message::WindowNew { width, height } => {
            let now = srv.now_ms();
            let (wid, bufid) = {
                let mut reg = srv.registry.lock();
                let wid = reg.create(source, width as i32, height as i32, now);
                (wid, reg.get(wid).map_or(0, |w| w.bufid))
            };
            debug!("client {:#x}: new {}x{} window {}", source, width, height, wid);
            srv.send_to(
                source,
                &Message::WindowInit {
                    wid,
                    width,
                    height,
                    bufid,
                },
            );
            srv.notify_subscribers();
        }

        Message::Flip { wid } => {
            let bounds = srv.registry.lock().get(wid).map(|w| w.screen_bounds());
            if let Some(bounds) = bounds {
                srv.post_damage(bounds);
            }
        }

        Message::FlipRegion {
            wid,
            x,
            y,
            width,
            height,
        } => {
            let bounds = srv
                .registry
                .lock()
                .get(wid)
                .map(|w| rotated_bounds(&w.geometry(), x, y, width, height));
            if let Some(bounds) = bounds {
                srv.post_damage(bounds);
            }
        }

        Message::KeyEvent { event, .. } => input::handle_key(srv, event),

        Message::MouseEvent { packet, kind, .. } => input::handle_pointer(srv, packet, kind),

        Message::WindowMove { wid, x, y } => {
            let mut reg = srv.registry.lock();
            srv.move_window(&mut reg, wid, x, y);
        }

        Message::WindowClose { wid } => {
            let now = srv.now_ms();
            srv.registry.lock().mark_for_close(wid, now);
        }

        Message::WindowStack { wid, z } => {
            let mut reg = srv.registry.lock();
            if reg.get(wid).is_some() {
                reg.reorder(wid, z);
                if let Some(win) = reg.get(wid) {
                    srv.post_damage(win.screen_bounds());
                }
            }
        }

        Message::WindowFocus { wid } => {
            let mut reg = srv.registry.lock();
            if reg.get(wid).is_some() {
                srv.apply_focus(&mut reg, Some(wid));
            }
        }

        Message::WindowDragStart { wid: _ } => {
            let mut ptr = srv.pointer.lock();
            input::start_move(srv, &mut ptr);
        }

        Message::WindowResizeStart { wid, direction } => {
            let focused = srv.registry.lock().focused() == Some(wid);
            let idle = srv.pointer.lock().resize.is_none();
            if focused && idle {
                let mut ptr = srv.pointer.lock();
                input::start_resize(srv, &mut ptr, direction, Buttons::LEFT);
            }
        }

        Message::WindowUpdateShape { wid, threshold } => {
            if let Some(win) = srv.registry.lock().get_mut(wid) {
                win.alpha_threshold = threshold;
            }
        }

        Message::WindowWarpMouse { wid, x, y } => {
            let target = {
                let reg = srv.registry.lock();
                (reg.focused() == Some(wid))
                    .then(|| reg.get(wid).map(|w| window_to_device(&w.geometry(), x, y)))
                    .flatten()
            };
            if let Some((dx, dy)) = target {
                let packet = PointerPacket {
                    dx,
                    dy,
                    buttons: Buttons::empty(),
                };
                input::handle_pointer(srv, packet, PointerEventKind::Absolute);
            }
        }

        Message::WindowShowMouse { wid, mode } => {
            let focused = {
                let mut reg = srv.registry.lock();
                let Some(win) = reg.get_mut(wid) else { return };
                if mode == mullion_abi::window::CURSOR_RESET {
                    win.show_mouse = win.default_mouse;
                } else if mode < mullion_abi::window::CURSOR_DRAG {
                    // Hide and arrow are sticky preferences; the transient
                    // drag/resize shapes are not.
                    win.default_mouse = mode;
                    win.show_mouse = mode;
                } else {
                    win.show_mouse = mode;
                }
                reg.focused() == Some(wid)
            };
            if focused {
                let (sx, sy) = srv.pointer.lock().screen_pos();
                srv.post_damage(cursor_damage_at(sx, sy));
            }
        }

        Message::ResizeRequest { wid, width, height } | Message::ResizeOffer { wid, width, height } => {
            if srv.registry.lock().get(wid).is_some() {
                srv.send_to(source, &Message::ResizeOffer { wid, width, height });
            }
        }

        Message::ResizeAccept { wid, width, height } => {
            let bufid = srv
                .registry
                .lock()
                .begin_resize(wid, width as i32, height as i32);
            if let Some(bufid) = bufid {
                srv.send_to(
                    source,
                    &Message::ResizeBufid {
                        wid,
                        width,
                        height,
                        bufid,
                    },
                );
            }
        }

        Message::ResizeDone {
            wid,
            width,
            height,
            ..
        } => {
            let commit = srv
                .registry
                .lock()
                .commit_resize(wid, width as i32, height as i32);
            if let Some((old, new)) = commit {
                srv.post_damage(old);
                srv.post_damage(new);
            }
        }

        Message::WindowAdvertise(ad) => {
            if srv.registry.lock().update_advertisement(ad) {
                srv.notify_subscribers();
            }
        }

        Message::QueryWindows => {
            let ads: Vec<Message> = {
                let reg = srv.registry.lock();
                reg.z_order()
                    .iter()
                    .filter_map(|wid| reg.get(*wid))
                    .filter_map(|win| {
                        let mut ad = win.advertisement.clone()?;
                        if ad.strings.is_empty() {
                            return None;
                        }
                        if reg.focused() == Some(win.wid) {
                            ad.flags |= AdFlags::FOCUSED;
                        }
                        Some(Message::WindowAdvertise(ad))
                    })
                    .collect()
            };
            for ad in &ads {
                srv.send_to(source, ad);
            }
            // Zero advertisement terminates the listing.
            srv.send_to(source, &Message::WindowAdvertise(Advertisement::default()));
        }

        Message::Subscribe => {
            let mut subs = srv.subscribers.lock();
            if !subs.contains(&source) {
                subs.push(source);
            }
        }

        Message::Unsubscribe => {
            srv.subscribers.lock().retain(|c| *c != source);
        }

        Message::SessionEnd => {
            info!("session end requested by {:#x}", source);
            srv.broadcast(&Message::SessionEnd);
        }

        Message::KeyBind {
            key,
            modifiers,
            response,
        } => {
            srv.bind_key(key, modifiers, source, response);
        }

        // Server-to-client traffic arriving inbound is a confused client.
        Message::Welcome { .. }
        | Message::WindowInit { .. }
        | Message::WindowFocusChange { .. }
        | Message::WindowMouseEvent { .. }
        | Message::ResizeBufid { .. }
        | Message::Notify => {
            debug!("client {:#x}: ignoring server-only message", source);
        }
    }
}

//! Shared server state and the cross-thread plumbing around it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use log::debug;
use spin::Mutex;

use mullion_abi::damage::DamageRect;
use mullion_abi::input::KeyMods;
use mullion_abi::message::Message;
use mullion_abi::window::{BindResponse, Wid};
use mullion_gfx::DamageTracker;
use mullion_ipc::{ConnId, Endpoint};

use crate::input::PointerState;
use crate::registry::Registry;

pub const SCREENSHOT_NONE: u32 = 0;
pub const SCREENSHOT_FULL: u32 = 1;
pub const SCREENSHOT_WINDOW: u32 = 2;

#[derive(Copy, Clone, Debug)]
pub struct KeyBinding {
    pub owner: ConnId,
    pub response: BindResponse,
}

/// Everything the service, render, and input threads share.
///
/// Lock order, outermost first: `pointer`, `registry`, then leaf locks
/// (`damage`, `keybinds`, `subscribers`) which are never held across
/// another acquisition. The registry lock doubles as the render lock.
pub struct Server {
    pub ident: String,
    pub width: u32,
    pub height: u32,

    pub endpoint: Endpoint,
    pub registry: Mutex<Registry>,
    pub damage: Mutex<DamageTracker>,
    pub pointer: Mutex<PointerState>,
    pub keybinds: Mutex<HashMap<(u32, u32), KeyBinding>>,
    pub subscribers: Mutex<Vec<ConnId>>,

    pub screenshot: AtomicU32,
    running: AtomicBool,
    epoch: Instant,
}

impl Server {
    pub fn new(ident: String, width: u32, height: u32, endpoint: Endpoint) -> Self {
        let registry = Registry::new(ident.clone());
        Self {
            ident,
            width,
            height,
            endpoint,
            registry: Mutex::new(registry),
            damage: Mutex::new(DamageTracker::new()),
            pointer: Mutex::new(PointerState::new(width, height)),
            keybinds: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            screenshot: AtomicU32::new(SCREENSHOT_NONE),
            running: AtomicBool::new(true),
            epoch: Instant::now(),
        }
    }

    /// Milliseconds since the server started; the clock every animation
    /// compares against.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Send a message, logging instead of failing: a peer that vanished
    /// mid-send is routine, not an error.
    pub fn send_to(&self, conn: ConnId, msg: &Message) {
        if let Err(e) = self.endpoint.send(conn, &msg.encode()) {
            debug!("send to {:#x} failed: {}", conn, e);
        }
    }

    pub fn broadcast(&self, msg: &Message) {
        self.endpoint.broadcast(&msg.encode());
    }

    /// Queue a screen rectangle for the next render pass.
    pub fn post_damage(&self, rect: DamageRect) {
        if rect.is_valid() {
            self.damage.lock().add(rect);
        }
    }

    /// Tell every subscriber the window list changed.
    pub fn notify_subscribers(&self) {
        let subs = self.subscribers.lock().clone();
        let msg = Message::Notify.encode();
        for conn in subs {
            if let Err(e) = self.endpoint.send(conn, &msg) {
                debug!("notify to {:#x} failed: {}", conn, e);
            }
        }
    }

    /// Record or replace a keybinding. Last registration wins.
    pub fn bind_key(&self, key: u32, modifiers: KeyMods, owner: ConnId, response: BindResponse) {
        self.keybinds
            .lock()
            .insert((key, modifiers.bits()), KeyBinding { owner, response });
    }

    pub fn lookup_bind(&self, key: u32, modifiers: KeyMods) -> Option<KeyBinding> {
        self.keybinds.lock().get(&(key, modifiers.bits())).copied()
    }

    /// Drop every keybinding a connection registered.
    pub fn drop_binds_of(&self, owner: ConnId) {
        self.keybinds.lock().retain(|_, b| b.owner != owner);
    }

    /// Apply a focus change and emit the FOCUS_CHANGE pair. Callers hold
    /// the registry lock already.
    pub fn apply_focus(&self, reg: &mut Registry, target: Option<Wid>) {
        let Some((previous, current)) = reg.set_focus(target) else {
            return;
        };
        for (wid, focused) in [(previous, false), (current, true)] {
            let Some(wid) = wid else { continue };
            if let Some(win) = reg.get(wid) {
                self.post_damage(win.screen_bounds());
                self.send_to(win.owner, &Message::WindowFocusChange { wid, focused });
            }
        }
        self.notify_subscribers();
    }

    /// Move a window: damage both extents and confirm to the owner.
    pub fn move_window(&self, reg: &mut Registry, wid: Wid, x: i32, y: i32) {
        let Some(win) = reg.get_mut(wid) else { return };
        self.post_damage(win.screen_bounds());
        win.x = x;
        win.y = y;
        self.post_damage(win.screen_bounds());
        let owner = win.owner;
        self.send_to(owner, &Message::WindowMove { wid, x, y });
    }

    /// Snap a window to a `width_div` x `height_div` grid cell. Saves the
    /// pre-tile size, moves the window, and offers the cell size; the
    /// resize itself still runs through the normal handshake.
    pub fn tile_window(
        &self,
        reg: &mut Registry,
        wid: Wid,
        width_div: i32,
        height_div: i32,
        cell_x: i32,
        cell_y: i32,
    ) {
        let usable_h = reg.usable_height(self.height as i32);
        let panel_h = self.height as i32 - usable_h;
        let Some(win) = reg.get_mut(wid) else { return };
        if !win.is_middle() {
            return;
        }
        if !win.tiled {
            win.untiled_width = win.width;
            win.untiled_height = win.height;
            win.tiled = true;
        }
        let owner = win.owner;

        let w = self.width as i32 / width_div;
        let h = usable_h / height_div;
        self.move_window(reg, wid, w * cell_x, panel_h + h * cell_y);
        self.send_to(
            owner,
            &Message::ResizeOffer {
                wid,
                width: w as u32,
                height: h as u32,
            },
        );
    }
}

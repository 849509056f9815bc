//! The window registry: identity, indexes, stacking, focus, resize state.
//!
//! The registry lives behind the render lock. The service thread mutates it
//! in short critical sections; the render thread holds it across the blit
//! walk and is the only place windows are physically destroyed.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use mullion_abi::buffer_key;
use mullion_abi::damage::DamageRect;
use mullion_abi::message::Advertisement;
use mullion_abi::window::{Wid, ZORDER_BOTTOM, ZORDER_TOP, ZSlot};
use mullion_ipc::{ConnId, SharedBuffer};

use crate::window::{Animation, Effect, PendingResize, ServerWindow, middle_z};

pub struct Registry {
    ident: String,
    next_wid: Wid,
    next_bufid: u32,

    windows: HashMap<Wid, ServerWindow>,
    by_owner: HashMap<ConnId, Vec<Wid>>,

    bottom: Option<Wid>,
    middle: Vec<Wid>,
    top: Option<Wid>,

    focused: Option<Wid>,
}

/// What `destroy` tore down, so the caller can damage and notify.
pub struct Destroyed {
    pub owner: ConnId,
    pub bounds: DamageRect,
    pub was_focused: bool,
}

impl Registry {
    pub fn new(ident: String) -> Self {
        Self {
            ident,
            next_wid: 1,
            next_bufid: 1,
            windows: HashMap::new(),
            by_owner: HashMap::new(),
            bottom: None,
            middle: Vec::new(),
            top: None,
            focused: None,
        }
    }

    #[inline]
    pub fn ident(&self) -> &str {
        &self.ident
    }

    #[inline]
    pub fn get(&self, wid: Wid) -> Option<&ServerWindow> {
        self.windows.get(&wid)
    }

    #[inline]
    pub fn get_mut(&mut self, wid: Wid) -> Option<&mut ServerWindow> {
        self.windows.get_mut(&wid)
    }

    #[inline]
    pub fn owner_of(&self, wid: Wid) -> Option<ConnId> {
        self.windows.get(&wid).map(|w| w.owner)
    }

    pub fn windows_of(&self, owner: ConnId) -> &[Wid] {
        self.by_owner.get(&owner).map_or(&[], Vec::as_slice)
    }

    /// Render/report order: bottom, middle front-to-back, top.
    pub fn z_order(&self) -> Vec<Wid> {
        let mut out = Vec::with_capacity(self.middle.len() + 2);
        out.extend(self.bottom);
        out.extend(self.middle.iter().copied());
        out.extend(self.top);
        out
    }

    #[inline]
    pub fn bottom(&self) -> Option<Wid> {
        self.bottom
    }

    #[inline]
    pub fn top(&self) -> Option<Wid> {
        self.top
    }

    #[inline]
    pub fn focused(&self) -> Option<Wid> {
        self.focused
    }

    /// The window keyboard input lands on: the focused middle window, or
    /// the bottom window when nothing is focused.
    #[inline]
    pub fn effective_focus(&self) -> Option<Wid> {
        self.focused.or(self.bottom)
    }

    /// Create a window for `owner`: fresh wid and bufid, a zeroed shared
    /// buffer, placed on top of the middle stack, fading in.
    pub fn create(&mut self, owner: ConnId, width: i32, height: i32, now_ms: u64) -> Wid {
        let wid = self.next_wid;
        self.next_wid += 1;

        let mut win = ServerWindow::new(wid, owner, width, height, now_ms);
        win.bufid = self.alloc_buffer(width, height, &mut win.buffer);
        win.z = middle_z();

        self.windows.insert(wid, win);
        self.middle.push(wid);
        self.by_owner.entry(owner).or_default().push(wid);
        debug!("window {} created for client {:#x}", wid, owner);
        wid
    }

    fn alloc_buffer(&mut self, width: i32, height: i32, slot: &mut Option<Arc<SharedBuffer>>) -> u32 {
        let bufid = self.next_bufid;
        self.next_bufid += 1;

        let size = (width.max(0) as usize) * (height.max(0) as usize) * 4;
        match SharedBuffer::create(&buffer_key(&self.ident, bufid), size) {
            Ok(buf) => *slot = Some(Arc::new(buf)),
            Err(e) => {
                // The window still exists; it just has nothing to show.
                warn!("buffer {} allocation failed: {}", bufid, e);
                *slot = None;
            }
        }
        bufid
    }

    /// Begin the fade-out. The window stays fully alive until the render
    /// thread sees the animation finish and calls [`Registry::destroy`].
    pub fn mark_for_close(&mut self, wid: Wid, now_ms: u64) {
        if let Some(win) = self.windows.get_mut(&wid) {
            if !matches!(
                win.anim,
                Some(Animation {
                    effect: Effect::FadeOut,
                    ..
                })
            ) {
                win.anim = Some(Animation {
                    effect: Effect::FadeOut,
                    start_ms: now_ms,
                });
            }
        }
    }

    /// Physically remove a window: every index, the z-order, focus, and the
    /// shared buffers behind it. Render-thread only.
    pub fn destroy(&mut self, wid: Wid) -> Option<Destroyed> {
        let win = self.windows.remove(&wid)?;
        self.unorder(wid);
        if let Some(wids) = self.by_owner.get_mut(&win.owner) {
            wids.retain(|w| *w != wid);
            if wids.is_empty() {
                self.by_owner.remove(&win.owner);
            }
        }
        let was_focused = self.focused == Some(wid);
        if was_focused {
            self.focused = None;
        }

        release_buffer(&self.ident, win.bufid, &win.buffer);
        if let Some(pending) = &win.pending {
            release_buffer(&self.ident, pending.bufid, &pending.buffer);
        }

        debug!("window {} destroyed", wid);
        Some(Destroyed {
            owner: win.owner,
            bounds: win.screen_bounds(),
            was_focused,
        })
    }

    fn unorder(&mut self, wid: Wid) {
        if self.bottom == Some(wid) {
            self.bottom = None;
            return;
        }
        if self.top == Some(wid) {
            self.top = None;
            return;
        }
        self.middle.retain(|w| *w != wid);
    }

    /// Move a window into the slot named by `z`. The top and bottom slots
    /// hold one window; whoever occupied the slot is reordered to the front
    /// of the middle stack, never destroyed.
    pub fn reorder(&mut self, wid: Wid, z: u32) {
        if !self.windows.contains_key(&wid) {
            return;
        }
        self.unorder(wid);

        match ZSlot::from_z(z) {
            ZSlot::Middle => {
                self.set_z(wid, z);
                self.middle.push(wid);
            }
            ZSlot::Top => {
                if let Some(evicted) = self.top.take() {
                    self.set_z(evicted, middle_z());
                    self.middle.push(evicted);
                }
                self.set_z(wid, ZORDER_TOP);
                self.top = Some(wid);
            }
            ZSlot::Bottom => {
                if let Some(evicted) = self.bottom.take() {
                    self.set_z(evicted, middle_z());
                    self.middle.push(evicted);
                }
                self.set_z(wid, ZORDER_BOTTOM);
                self.bottom = Some(wid);
            }
        }
    }

    fn set_z(&mut self, wid: Wid, z: u32) {
        if let Some(win) = self.windows.get_mut(&wid) {
            win.z = z;
        }
    }

    /// Raise a middle window to the front of its stack.
    pub fn raise(&mut self, wid: Wid) {
        if let Some(pos) = self.middle.iter().position(|w| *w == wid) {
            let w = self.middle.remove(pos);
            self.middle.push(w);
        }
    }

    /// Record the focused window and raise it. Only middle windows are ever
    /// recorded; focusing a top/bottom window (or nothing) clears the
    /// record, and keyboard input falls back to the bottom window. Returns
    /// `(previous, current)` when the recorded focus actually changed.
    pub fn set_focus(&mut self, target: Option<Wid>) -> Option<(Option<Wid>, Option<Wid>)> {
        let target = target.filter(|wid| {
            self.windows
                .get(wid)
                .is_some_and(ServerWindow::is_middle)
        });
        if target == self.focused {
            return None;
        }
        let previous = self.focused;
        self.focused = target;
        if let Some(wid) = target {
            self.raise(wid);
        }
        Some((previous, target))
    }

    /// Hit test: the topmost window whose pixel at (x, y) meets its shape
    /// threshold. Walks top, middle back-to-front, then bottom.
    pub fn top_at(&self, x: i32, y: i32) -> Option<Wid> {
        let candidates = self
            .top
            .into_iter()
            .chain(self.middle.iter().rev().copied())
            .chain(self.bottom);
        for wid in candidates {
            if let Some(win) = self.windows.get(&wid) {
                let (lx, ly) = mullion_gfx::device_to_window(&win.geometry(), x, y);
                if win.solid_at(lx, ly) {
                    return Some(wid);
                }
            }
        }
        None
    }

    /// Allocate (or re-hand-out) the pending buffer for a resize. While a
    /// resize is already pending the existing bufid is returned, so a
    /// repeated RESIZE_ACCEPT is harmless.
    pub fn begin_resize(&mut self, wid: Wid, width: i32, height: i32) -> Option<u32> {
        if let Some(bufid) = self
            .windows
            .get(&wid)
            .and_then(|w| w.pending.as_ref())
            .map(|p| p.bufid)
        {
            return Some(bufid);
        }
        self.windows.contains_key(&wid).then(|| {
            let mut buffer = None;
            let bufid = self.alloc_buffer(width, height, &mut buffer);
            let win = self
                .windows
                .get_mut(&wid)
                .expect("window existence checked above");
            win.pending = Some(PendingResize { bufid, buffer });
            bufid
        })
    }

    /// Swap the pending buffer in and release the old one. Returns the old
    /// and new screen extents for damage.
    pub fn commit_resize(
        &mut self,
        wid: Wid,
        width: i32,
        height: i32,
    ) -> Option<(DamageRect, DamageRect)> {
        let ident = self.ident.clone();
        let win = self.windows.get_mut(&wid)?;
        let pending = win.pending.take()?;

        let old_bounds = win.screen_bounds();
        let old_bufid = win.bufid;
        let old_buffer = win.buffer.take();

        win.width = width;
        win.height = height;
        win.bufid = pending.bufid;
        win.buffer = pending.buffer;

        release_buffer(&ident, old_bufid, &old_buffer);
        Some((old_bounds, win.screen_bounds()))
    }

    /// Replace a window's advertisement payload.
    pub fn update_advertisement(&mut self, ad: Advertisement) -> bool {
        match self.windows.get_mut(&ad.wid) {
            Some(win) => {
                win.advertisement = Some(ad);
                true
            }
            None => false,
        }
    }

    /// Detach a closing connection: fade out everything it owned and drop
    /// its by-owner entry.
    pub fn drop_owner(&mut self, owner: ConnId, now_ms: u64) -> usize {
        let wids = self.by_owner.remove(&owner).unwrap_or_default();
        let count = wids.len();
        for wid in wids {
            self.mark_for_close(wid, now_ms);
        }
        count
    }

    /// Geometry for snap-tiling: the usable area is the display minus the
    /// panel strip (a top window pushed above y=0 contributes less).
    pub fn usable_height(&self, display_height: i32) -> i32 {
        let panel_h = self
            .top
            .and_then(|wid| self.windows.get(&wid))
            .map_or(0, |panel| {
                let mut h = panel.height;
                if panel.y < 1 {
                    h += panel.y;
                }
                h.max(0)
            });
        display_height - panel_h
    }
}

fn release_buffer(ident: &str, bufid: u32, buffer: &Option<Arc<SharedBuffer>>) {
    // Unlink the name; the mapping itself lives until the last Arc drops,
    // so an in-flight render pass keeps reading valid memory.
    if buffer.is_some() {
        if let Err(e) = SharedBuffer::unlink(&buffer_key(ident, bufid)) {
            debug!("unlink of buffer {} failed: {}", bufid, e);
        }
    }
}

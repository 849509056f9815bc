//! End-to-end scenarios against an in-process server on a memory display.
//!
//! Each test boots a full server (service + render threads), talks to it
//! through the same transport real clients use, and observes effects on
//! the front surface or the protocol stream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mullion_abi::buffer_key;
use mullion_abi::input::{Buttons, KeyEvent, KeyMods, PointerEventKind, PointerPacket};
use mullion_abi::message::{Advertisement, Message};
use mullion_abi::window::{BindResponse, ResizeDirection, Wid, ZORDER_TOP};
use mullion_ipc::{Client, SharedBuffer};
use mullion_server::output::{MemoryOutput, Output};
use mullion_server::{ServerHandle, spawn_server};

const RED: u32 = 0xFFFF_0000;
const GREEN: u32 = 0xFF00_FF00;
const DEADLINE: Duration = Duration::from_secs(5);

struct Harness {
    handle: Option<ServerHandle>,
    front: Arc<spin::Mutex<Vec<u32>>>,
    ident: String,
    width: u32,
}

impl Harness {
    fn boot(tag: &str, width: u32, height: u32) -> Self {
        let ident = format!("mullion-e2e-{}-{}", std::process::id(), tag);
        let (mem, front) = MemoryOutput::new(width, height);
        let handle = spawn_server(&ident, Output::Memory(mem)).expect("server boot");
        Self {
            handle: Some(handle),
            front,
            ident,
            width,
        }
    }

    fn pixel(&self, x: u32, y: u32) -> u32 {
        self.front.lock()[(y * self.width + x) as usize]
    }

    fn wait_for_pixel(&self, x: u32, y: u32, expected: u32) {
        let start = Instant::now();
        while start.elapsed() < DEADLINE {
            if self.pixel(x, y) == expected {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!(
            "pixel ({}, {}) is {:#010x}, wanted {:#010x}",
            x,
            y,
            self.pixel(x, y),
            expected
        );
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
        }
    }
}

struct Peer {
    client: Client,
}

impl Peer {
    fn connect(harness: &Harness) -> Self {
        let client = Client::connect(&harness.ident).expect("connect");
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("timeout");
        Self { client }
    }

    fn send(&mut self, msg: &Message) {
        self.client.send(&msg.encode()).expect("send");
    }

    /// Next decodable message, or `None` once the read times out.
    fn recv(&mut self) -> Option<Message> {
        loop {
            match self.client.recv() {
                Ok(Some(frame)) if frame.is_empty() => continue,
                Ok(Some(frame)) => match Message::decode(&frame) {
                    Ok(m) => return Some(m),
                    Err(_) => continue,
                },
                _ => return None,
            }
        }
    }

    /// Scan the stream until `pick` matches, skipping unrelated traffic.
    fn wait_for<T>(&mut self, mut pick: impl FnMut(&Message) -> Option<T>) -> T {
        let start = Instant::now();
        while start.elapsed() < DEADLINE {
            let Some(msg) = self.recv() else { continue };
            if let Some(out) = pick(&msg) {
                return out;
            }
        }
        panic!("expected message never arrived");
    }

    fn hello(&mut self) -> (u32, u32) {
        self.send(&Message::Hello);
        self.wait_for(|m| match m {
            Message::Welcome { width, height } => Some((*width, *height)),
            _ => None,
        })
    }

    fn create_window(&mut self, width: u32, height: u32) -> (Wid, u32) {
        self.send(&Message::WindowNew { width, height });
        self.wait_for(|m| match m {
            Message::WindowInit { wid, bufid, .. } => Some((*wid, *bufid)),
            _ => None,
        })
    }
}

fn paint(harness: &Harness, bufid: u32, w: usize, h: usize, color: u32) -> SharedBuffer {
    let mut buf = SharedBuffer::open(&buffer_key(&harness.ident, bufid), w * h * 4)
        .expect("map window buffer");
    buf.pixels_mut()[..w * h].fill(color);
    buf
}

fn alt_down() -> Message {
    Message::KeyEvent {
        wid: 0,
        event: KeyEvent::pressed(0, KeyMods::LEFT_ALT),
        shadow: KeyMods::LEFT_ALT,
    }
}

fn mouse_abs(x: i32, y: i32, buttons: Buttons) -> Message {
    Message::MouseEvent {
        wid: 0,
        packet: PointerPacket {
            dx: x,
            dy: y,
            buttons,
        },
        kind: PointerEventKind::Absolute,
    }
}

#[test]
fn startup_and_welcome() {
    let harness = Harness::boot("welcome", 1024, 768);
    let mut peer = Peer::connect(&harness);
    assert_eq!(peer.hello(), (1024, 768));
}

#[test]
fn create_flip_close() {
    let harness = Harness::boot("lifecycle", 1024, 768);
    let mut peer = Peer::connect(&harness);
    peer.hello();

    let (wid, bufid) = peer.create_window(200, 150);
    let _buf = paint(&harness, bufid, 200, 150, RED);
    peer.send(&Message::Flip { wid });

    // The window sits at the origin; once the fade-in settles the screen
    // shows the client's pixels. Pixels it never covered were never
    // presented.
    harness.wait_for_pixel(10, 10, RED);
    harness.wait_for_pixel(199, 149, RED);
    assert_eq!(harness.pixel(250, 10), 0);

    // Advertise so listers can see the window, then watch it disappear.
    let mut ad = Advertisement {
        wid,
        ..Advertisement::default()
    };
    ad.strings = b"demo\0".to_vec();
    peer.send(&Message::WindowAdvertise(ad));

    let mut watcher = Peer::connect(&harness);
    watcher.send(&Message::Subscribe);
    std::thread::sleep(Duration::from_millis(50));

    watcher.send(&Message::QueryWindows);
    assert!(query_listing(&mut watcher).contains(&wid));

    peer.send(&Message::WindowClose { wid });
    watcher.wait_for(|m| matches!(m, Message::Notify).then_some(()));

    // The removal happens once the fade-out has played through a render
    // pass; after that the listing no longer names the window.
    let start = Instant::now();
    loop {
        watcher.send(&Message::QueryWindows);
        if !query_listing(&mut watcher).contains(&wid) {
            break;
        }
        assert!(start.elapsed() < DEADLINE, "window {} still listed", wid);
        std::thread::sleep(Duration::from_millis(30));
    }
}

/// Drain one QUERY_WINDOWS answer: advertised wids up to the sentinel.
fn query_listing(peer: &mut Peer) -> Vec<Wid> {
    let mut wids = Vec::new();
    loop {
        let wid = peer.wait_for(|m| match m {
            Message::WindowAdvertise(ad) => Some(ad.wid),
            _ => None,
        });
        if wid == 0 {
            return wids;
        }
        wids.push(wid);
    }
}

#[test]
fn alt_drag_moves_the_window() {
    let harness = Harness::boot("altdrag", 1024, 768);
    let mut peer = Peer::connect(&harness);
    peer.hello();
    let (wid, _bufid) = peer.create_window(300, 200);
    peer.send(&Message::WindowMove {
        wid,
        x: 100,
        y: 100,
    });
    // The move must land before the pointer anchors against it.
    peer.wait_for(|m| match m {
        Message::WindowMove { x: 100, y: 100, .. } => Some(()),
        _ => None,
    });
    peer.send(&Message::WindowFocus { wid });

    let mut devices = Peer::connect(&harness);
    devices.send(&alt_down());
    devices.send(&mouse_abs(200, 150, Buttons::empty()));
    devices.send(&mouse_abs(200, 150, Buttons::LEFT));
    devices.send(&mouse_abs(260, 180, Buttons::LEFT));
    devices.send(&mouse_abs(260, 180, Buttons::empty()));

    peer.wait_for(|m| match m {
        Message::WindowMove { x: 160, y: 130, .. } => Some(()),
        _ => None,
    });
}

#[test]
fn drag_to_top_snap_tiles() {
    let harness = Harness::boot("snaptile", 1024, 768);

    let mut panel = Peer::connect(&harness);
    panel.hello();
    let (panel_wid, _) = panel.create_window(1024, 24);
    panel.send(&Message::WindowStack {
        wid: panel_wid,
        z: ZORDER_TOP,
    });
    // Let the stacking land before anything measures the usable area.
    std::thread::sleep(Duration::from_millis(50));

    let mut peer = Peer::connect(&harness);
    peer.hello();
    let (wid, _) = peer.create_window(300, 200);
    peer.send(&Message::WindowMove {
        wid,
        x: 100,
        y: 100,
    });
    peer.wait_for(|m| match m {
        Message::WindowMove { x: 100, y: 100, .. } => Some(()),
        _ => None,
    });

    let mut devices = Peer::connect(&harness);
    devices.send(&alt_down());
    devices.send(&mouse_abs(200, 150, Buttons::empty()));
    devices.send(&mouse_abs(200, 150, Buttons::LEFT));
    devices.send(&mouse_abs(150, 0, Buttons::LEFT));

    // Snap: moved to the top-left of the usable area, then offered the
    // full usable size (display minus panel strip).
    peer.wait_for(|m| match m {
        Message::WindowMove { x: 0, y: 24, .. } => Some(()),
        _ => None,
    });
    peer.wait_for(|m| match m {
        Message::ResizeOffer {
            width: 1024,
            height: 744,
            ..
        } => Some(()),
        _ => None,
    });
}

#[test]
fn keybindings_route_before_focus() {
    let harness = Harness::boot("keybind", 1024, 768);

    let mut focused = Peer::connect(&harness);
    focused.hello();
    let (wid, _) = focused.create_window(100, 100);
    focused.send(&Message::WindowFocus { wid });
    focused.wait_for(|m| match m {
        Message::WindowFocusChange { focused: true, .. } => Some(()),
        _ => None,
    });

    let mut switcher = Peer::connect(&harness);
    switcher.hello();
    switcher.send(&Message::KeyBind {
        key: b'\t' as u32,
        modifiers: KeyMods::LEFT_ALT,
        response: BindResponse::Passthrough,
    });
    // Give the bind a moment to land before the key does.
    std::thread::sleep(Duration::from_millis(50));

    let mut devices = Peer::connect(&harness);
    let tab = Message::KeyEvent {
        wid: 0,
        event: KeyEvent::pressed(b'\t' as u32, KeyMods::LEFT_ALT),
        shadow: KeyMods::LEFT_ALT,
    };
    devices.send(&tab);

    // Passthrough: both the binding owner and the focused window hear it.
    switcher.wait_for(|m| match m {
        Message::KeyEvent { wid: w, .. } if *w == wid => Some(()),
        _ => None,
    });
    focused.wait_for(|m| match m {
        Message::KeyEvent { .. } => Some(()),
        _ => None,
    });

    // Steal: dispatch stops at the binding owner.
    switcher.send(&Message::KeyBind {
        key: b'\t' as u32,
        modifiers: KeyMods::LEFT_ALT,
        response: BindResponse::Steal,
    });
    std::thread::sleep(Duration::from_millis(50));
    devices.send(&tab);
    switcher.wait_for(|m| match m {
        Message::KeyEvent { .. } => Some(()),
        _ => None,
    });
    let mut leaked = false;
    while let Some(msg) = focused.recv() {
        if matches!(msg, Message::KeyEvent { .. }) {
            leaked = true;
            break;
        }
    }
    assert!(!leaked, "stolen key reached the focused window");
}

#[test]
fn interactive_resize_handshake() {
    let harness = Harness::boot("resize", 1024, 768);
    let mut peer = Peer::connect(&harness);
    peer.hello();
    let (wid, bufid) = peer.create_window(200, 150);
    let _old = paint(&harness, bufid, 200, 150, RED);
    peer.send(&Message::Flip { wid });
    peer.send(&Message::WindowFocus { wid });
    peer.wait_for(|m| match m {
        Message::WindowFocusChange { focused: true, .. } => Some(()),
        _ => None,
    });

    // Park the pointer over the window, then start a drag-resize.
    let mut devices = Peer::connect(&harness);
    devices.send(&mouse_abs(100, 75, Buttons::empty()));
    std::thread::sleep(Duration::from_millis(50));
    peer.send(&Message::WindowResizeStart {
        wid,
        direction: ResizeDirection::DownRight,
    });
    std::thread::sleep(Duration::from_millis(50));
    devices.send(&mouse_abs(150, 100, Buttons::LEFT));
    devices.send(&mouse_abs(150, 100, Buttons::empty()));

    let (ow, oh) = peer.wait_for(|m| match m {
        Message::ResizeOffer { width, height, .. } => Some((*width, *height)),
        _ => None,
    });
    assert_eq!((ow, oh), (250, 175));

    peer.send(&Message::ResizeAccept {
        wid,
        width: ow,
        height: oh,
    });
    let new_bufid = peer.wait_for(|m| match m {
        Message::ResizeBufid { bufid, .. } => Some(*bufid),
        _ => None,
    });
    assert_ne!(new_bufid, bufid);

    let _new = paint(&harness, new_bufid, ow as usize, oh as usize, GREEN);
    peer.send(&Message::ResizeDone {
        wid,
        width: ow,
        height: oh,
        bufid: new_bufid,
    });

    // Commit: pixels come from the new buffer at the accepted size...
    harness.wait_for_pixel(240, 170, GREEN);
    // ...and the old buffer's key is gone.
    let start = Instant::now();
    while SharedBuffer::open(&buffer_key(&harness.ident, bufid), 200 * 150 * 4).is_ok() {
        assert!(start.elapsed() < DEADLINE, "old buffer key still opens");
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn focus_handoff_orders_the_messages() {
    let harness = Harness::boot("focus", 1024, 768);
    let mut peer = Peer::connect(&harness);
    peer.hello();
    let (a, _) = peer.create_window(50, 50);
    let (b, _) = peer.create_window(50, 50);

    peer.send(&Message::WindowFocus { wid: a });
    peer.wait_for(|m| match m {
        Message::WindowFocusChange { wid, focused: true } if *wid == a => Some(()),
        _ => None,
    });

    peer.send(&Message::WindowFocus { wid: b });
    let first = peer.wait_for(|m| match m {
        Message::WindowFocusChange { wid, focused } => Some((*wid, *focused)),
        _ => None,
    });
    let second = peer.wait_for(|m| match m {
        Message::WindowFocusChange { wid, focused } => Some((*wid, *focused)),
        _ => None,
    });
    assert_eq!(first, (a, false));
    assert_eq!(second, (b, true));
}

#[test]
fn advertisements_reach_listers() {
    let harness = Harness::boot("advertise", 1024, 768);
    let mut app = Peer::connect(&harness);
    app.hello();
    let (wid, _) = app.create_window(64, 64);

    let mut watcher = Peer::connect(&harness);
    watcher.send(&Message::Subscribe);
    std::thread::sleep(Duration::from_millis(50));

    let mut ad = Advertisement {
        wid,
        ..Advertisement::default()
    };
    ad.strings = b"editor\0\0".to_vec();
    ad.offsets = [0, 7, 0, 0, 0];
    app.send(&Message::WindowAdvertise(ad.clone()));
    watcher.wait_for(|m| matches!(m, Message::Notify).then_some(()));

    watcher.send(&Message::QueryWindows);
    let listed = watcher.wait_for(|m| match m {
        Message::WindowAdvertise(got) if got.wid == wid => Some(got.clone()),
        _ => None,
    });
    assert_eq!(listed.strings, ad.strings);
    let sentinel = watcher.wait_for(|m| match m {
        Message::WindowAdvertise(got) => Some(got.wid),
        _ => None,
    });
    assert_eq!(sentinel, 0);
}

#[test]
fn passthrough_windows_let_clicks_fall_through() {
    let harness = Harness::boot("shape", 640, 480);

    let mut below = Peer::connect(&harness);
    below.hello();
    let (under, _) = below.create_window(200, 200);

    let mut above = Peer::connect(&harness);
    above.hello();
    let (over, _) = above.create_window(200, 200);
    above.send(&Message::WindowUpdateShape {
        wid: over,
        threshold: mullion_abi::window::SHAPE_PASSTHROUGH,
    });
    std::thread::sleep(Duration::from_millis(50));

    let mut devices = Peer::connect(&harness);
    devices.send(&mouse_abs(50, 50, Buttons::empty()));
    devices.send(&mouse_abs(50, 50, Buttons::LEFT));

    // The press lands on the lower window; the shaped one never hears it.
    below.wait_for(|m| match m {
        Message::WindowMouseEvent { wid, .. } if *wid == under => Some(()),
        _ => None,
    });
    let mut leaked = false;
    while let Some(msg) = above.recv() {
        if matches!(msg, Message::WindowMouseEvent { wid, .. } if wid == over) {
            leaked = true;
            break;
        }
    }
    assert!(!leaked, "click reached a passthrough window");
}

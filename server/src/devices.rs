//! Input device feeders.
//!
//! One thread per device, each blocking on its device node and feeding
//! events back through the ordinary client transport — input devices are
//! just privileged clients. A missing device is logged and skipped, which
//! keeps headless and nested runs quiet.

use std::fs::File;
use std::io::Read;
use std::thread;

use log::{debug, warn};

use mullion_abi::input::{
    Buttons, KeyAction, KeyEvent, KeyMods, POINTER_DEVICE_MAGIC, PointerEventKind, PointerPacket,
};
use mullion_abi::message::Message;
use mullion_ipc::Client;

const POINTER_DEVICE: &str = "/dev/mouse";
const KEYBOARD_DEVICE: &str = "/dev/kbd";

/// Start the pointer and keyboard feeders for the endpoint `ident`.
pub fn spawn(ident: &str) {
    for (name, run) in [
        ("input-pointer", pointer_feeder as fn(&str)),
        ("input-keyboard", keyboard_feeder as fn(&str)),
    ] {
        let ident = ident.to_owned();
        let spawned = thread::Builder::new()
            .name(name.into())
            .spawn(move || run(&ident));
        if let Err(e) = spawned {
            warn!("could not start {}: {}", name, e);
        }
    }
}

fn pointer_feeder(ident: &str) {
    let path = std::env::var("POINTER_DEVICE").unwrap_or_else(|_| POINTER_DEVICE.into());
    let Some(mut device) = open_device(&path) else {
        return;
    };
    let Some(mut client) = connect(ident) else {
        return;
    };

    // Device packets: magic, dx, dy, buttons — 16 bytes each.
    let mut raw = [0u8; 16];
    loop {
        if device.read_exact(&mut raw).is_err() {
            warn!("pointer device {} went away", path);
            return;
        }
        let magic = u32::from_le_bytes(raw[0..4].try_into().expect("fixed-size slice"));
        if magic != POINTER_DEVICE_MAGIC {
            debug!("pointer stream desynchronised, skipping packet");
            continue;
        }
        let packet = PointerPacket {
            dx: i32::from_le_bytes(raw[4..8].try_into().expect("fixed-size slice")),
            dy: i32::from_le_bytes(raw[8..12].try_into().expect("fixed-size slice")),
            buttons: Buttons::from_bits_truncate(raw[12]),
        };
        let msg = Message::MouseEvent {
            wid: 0,
            packet,
            kind: PointerEventKind::Relative,
        };
        if client.send(&msg.encode()).is_err() {
            return;
        }
    }
}

fn keyboard_feeder(ident: &str) {
    let path = std::env::var("KEYBOARD_DEVICE").unwrap_or_else(|_| KEYBOARD_DEVICE.into());
    let Some(mut device) = open_device(&path) else {
        return;
    };
    let Some(mut client) = connect(ident) else {
        return;
    };

    // Translated key records: keycode, modifiers, action, derived key,
    // two bytes of padding — 12 bytes each.
    let mut raw = [0u8; 12];
    loop {
        if device.read_exact(&mut raw).is_err() {
            warn!("keyboard device {} went away", path);
            return;
        }
        let keycode = u32::from_le_bytes(raw[0..4].try_into().expect("fixed-size slice"));
        let modifiers = KeyMods::from_bits_truncate(u32::from_le_bytes(
            raw[4..8].try_into().expect("fixed-size slice"),
        ));
        let Some(action) = KeyAction::from_u8(raw[8]) else {
            debug!("keyboard stream desynchronised, skipping record");
            continue;
        };
        let event = KeyEvent {
            keycode,
            modifiers,
            action,
            key: raw[9],
        };
        let msg = Message::KeyEvent {
            wid: 0,
            event,
            shadow: modifiers,
        };
        if client.send(&msg.encode()).is_err() {
            return;
        }
    }
}

fn open_device(path: &str) -> Option<File> {
    match File::open(path) {
        Ok(f) => Some(f),
        Err(e) => {
            warn!("input device {} unavailable: {}", path, e);
            None
        }
    }
}

fn connect(ident: &str) -> Option<Client> {
    match Client::connect(ident) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("input feeder could not reach '{}': {}", ident, e);
            None
        }
    }
}

//! Nested mode: run as a client of another compositor instance.
//!
//! The whole display becomes one window of the parent. Presents land in
//! the parent-shared buffer; the parent's key events and window-local
//! mouse coordinates are replayed into the local event stream, so the
//! nested instance behaves exactly like one driven by real devices.

use log::{debug, info, warn};

use mullion_abi::buffer_key;
use mullion_abi::input::{PointerEventKind, PointerPacket};
use mullion_abi::message::Message;
use mullion_ipc::Client;
use mullion_ipc::SharedBuffer;

use crate::ServerError;
use crate::output::NestedOutput;

pub struct NestedHandshake {
    pub output: NestedOutput,
    /// Read side of the parent connection, for the relay thread.
    pub reader: Client,
}

/// Connect to the parent, create the host window, and map its buffer.
pub fn connect(parent_ident: &str, width: u32, height: u32) -> Result<NestedHandshake, ServerError> {
    let mut client = Client::connect(parent_ident)?;

    client.send(&Message::Hello.encode())?;
    let (pw, ph) = loop {
        match recv_msg(&mut client)? {
            Message::Welcome { width, height } => break (width, height),
            other => debug!("awaiting welcome, ignoring {:#x}", other.type_code()),
        }
    };
    info!("nested under '{}' ({}x{} display)", parent_ident, pw, ph);

    client.send(&Message::WindowNew { width, height }.encode())?;
    let (wid, w, h, bufid) = loop {
        match recv_msg(&mut client)? {
            Message::WindowInit {
                wid,
                width,
                height,
                bufid,
            } => break (wid, width, height, bufid),
            other => debug!("awaiting window, ignoring {:#x}", other.type_code()),
        }
    };

    let buffer = SharedBuffer::open(&buffer_key(parent_ident, bufid), (w * h * 4) as usize)
        .map_err(ServerError::Ipc)?;
    client.send(&Message::WindowMove { wid, x: 40, y: 40 }.encode())?;

    let writer = client.try_clone()?;
    Ok(NestedHandshake {
        output: NestedOutput::new(w, h, wid, buffer, writer),
        reader: client,
    })
}

/// Replay parent input into the local endpoint. Runs until either side
/// goes away.
pub fn run_relay(mut reader: Client, local_ident: String) {
    let mut inject = match Client::connect(&local_ident) {
        Ok(c) => c,
        Err(e) => {
            warn!("nested relay could not reach '{}': {}", local_ident, e);
            return;
        }
    };

    loop {
        let frame = match reader.recv() {
            Ok(Some(f)) if !f.is_empty() => f,
            _ => {
                info!("parent compositor went away");
                return;
            }
        };
        let msg = match Message::decode(&frame) {
            Ok(m) => m,
            Err(e) => {
                debug!("relay dropped a frame: {}", e);
                continue;
            }
        };
        let forward = match msg {
            Message::KeyEvent { event, shadow, .. } => Some(Message::KeyEvent {
                wid: 0,
                event,
                shadow,
            }),
            Message::WindowMouseEvent {
                new_x,
                new_y,
                buttons,
                ..
            } => Some(Message::MouseEvent {
                wid: 0,
                packet: PointerPacket {
                    dx: new_x,
                    dy: new_y,
                    buttons,
                },
                kind: PointerEventKind::Absolute,
            }),
            Message::SessionEnd => {
                info!("parent session ended");
                return;
            }
            _ => None,
        };
        if let Some(msg) = forward {
            if inject.send(&msg.encode()).is_err() {
                return;
            }
        }
    }
}

fn recv_msg(client: &mut Client) -> Result<Message, ServerError> {
    loop {
        let Some(frame) = client.recv()? else {
            return Err(ServerError::Display("parent hung up mid-handshake".into()));
        };
        if frame.is_empty() {
            continue;
        }
        match Message::decode(&frame) {
            Ok(m) => return Ok(m),
            Err(e) => debug!("handshake skipped a frame: {}", e),
        }
    }
}

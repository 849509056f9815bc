//! The packet endpoint.
//!
//! A named Unix stream socket carrying length-prefixed frames. The server
//! side fans every connection into one receive queue, tagging each frame
//! with a stable per-connection source id; an empty frame is the close
//! sentinel (delivered exactly once per connection, whether the peer sent
//! it or just went away). Input device feeders, nested instances, and test
//! harnesses all use the same [`Client`] the real clients would.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::error::IpcError;

/// Connection source id. Stable for the life of the connection, never
/// reused by the endpoint that issued it.
pub type ConnId = u32;

/// Largest frame the transport will carry.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// One received frame. `data.is_empty()` means the peer is gone.
#[derive(Debug)]
pub struct Packet {
    pub source: ConnId,
    pub data: Vec<u8>,
}

/// Filesystem path of the endpoint named `ident`.
pub fn socket_path(ident: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}.sock", ident))
}

struct Writers {
    map: Mutex<HashMap<ConnId, UnixStream>>,
}

/// Server side of the endpoint.
///
/// The receive queue sits behind a mutex only so the endpoint can be
/// shared; in practice one service thread drains it.
pub struct Endpoint {
    path: PathBuf,
    writers: Arc<Writers>,
    rx: Mutex<Receiver<Packet>>,
}

impl Endpoint {
    /// Bind the endpoint named `ident`, replacing any stale socket file,
    /// and start accepting connections.
    pub fn bind(ident: &str) -> Result<Self, IpcError> {
        let path = socket_path(ident);
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;

        let writers = Arc::new(Writers {
            map: Mutex::new(HashMap::new()),
        });
        let (tx, rx) = channel();

        {
            let writers = Arc::clone(&writers);
            thread::Builder::new()
                .name("endpoint-accept".into())
                .spawn(move || accept_loop(listener, writers, tx))?;
        }

        Ok(Self {
            path,
            writers,
            rx: Mutex::new(rx),
        })
    }

    /// Block until the next frame from any connection.
    pub fn recv(&self) -> Result<Packet, IpcError> {
        self.rx
            .lock()
            .expect("receive queue poisoned")
            .recv()
            .map_err(|_| IpcError::EndpointClosed)
    }

    /// Like [`Endpoint::recv`] with a deadline; `None` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Packet>, IpcError> {
        match self
            .rx
            .lock()
            .expect("receive queue poisoned")
            .recv_timeout(timeout)
        {
            Ok(p) => Ok(Some(p)),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Err(IpcError::EndpointClosed),
        }
    }

    /// Send one frame to `conn`. Any thread may call this.
    pub fn send(&self, conn: ConnId, data: &[u8]) -> Result<(), IpcError> {
        let map = self.writers.map.lock().expect("writer table poisoned");
        let Some(stream) = map.get(&conn) else {
            return Err(IpcError::UnknownConnection(conn));
        };
        write_frame(stream, data)
    }

    /// Send one frame to every live connection.
    pub fn broadcast(&self, data: &[u8]) {
        let map = self.writers.map.lock().expect("writer table poisoned");
        for (id, stream) in map.iter() {
            if let Err(e) = write_frame(stream, data) {
                debug!("broadcast to {:#x} failed: {}", id, e);
            }
        }
    }

    /// Forget a connection's writer. Called after its close sentinel has
    /// been handled; reads have already stopped by then.
    pub fn drop_connection(&self, conn: ConnId) {
        self.writers
            .map
            .lock()
            .expect("writer table poisoned")
            .remove(&conn);
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn accept_loop(listener: UnixListener, writers: Arc<Writers>, tx: Sender<Packet>) {
    // 0 is reserved so handlers can use it as "no connection".
    static NEXT_CONN: AtomicU32 = AtomicU32::new(1);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        let id = NEXT_CONN.fetch_add(1, Ordering::Relaxed);
        trace!("connection {:#x} accepted", id);

        let reader = match stream.try_clone() {
            Ok(r) => r,
            Err(e) => {
                warn!("could not clone stream for {:#x}: {}", id, e);
                continue;
            }
        };
        writers
            .map
            .lock()
            .expect("writer table poisoned")
            .insert(id, stream);

        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("endpoint-read-{:x}", id))
            .spawn(move || read_loop(reader, id, tx));
        if spawned.is_err() {
            writers
                .map
                .lock()
                .expect("writer table poisoned")
                .remove(&id);
        }
    }
}

fn read_loop(mut stream: UnixStream, id: ConnId, tx: Sender<Packet>) {
    loop {
        match read_frame(&mut stream) {
            Ok(Some(data)) if !data.is_empty() => {
                if tx.send(Packet { source: id, data }).is_err() {
                    return;
                }
            }
            // Explicit empty frame, EOF, or a broken stream: one close
            // sentinel, then stop reading.
            Ok(Some(_)) | Ok(None) => break,
            Err(e) => {
                debug!("read on {:#x} failed: {}", id, e);
                break;
            }
        }
    }
    let _ = tx.send(Packet {
        source: id,
        data: Vec::new(),
    });
}

fn write_frame(mut stream: &UnixStream, data: &[u8]) -> Result<(), IpcError> {
    if data.len() > MAX_FRAME_LEN {
        return Err(IpcError::FrameTooLarge(data.len()));
    }
    let mut frame = Vec::with_capacity(4 + data.len());
    frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
    frame.extend_from_slice(data);
    stream.write_all(&frame)?;
    Ok(())
}

/// Read one frame; `None` on clean EOF at a frame boundary.
fn read_frame(stream: &mut UnixStream) -> Result<Option<Vec<u8>>, IpcError> {
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        match stream.read(&mut len_bytes[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(IpcError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
            Ok(n) => filled += n,
            Err(e) => return Err(e.into()),
        }
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(IpcError::FrameTooLarge(len));
    }
    let mut data = vec![0u8; len];
    stream.read_exact(&mut data)?;
    Ok(Some(data))
}

/// Client side of the endpoint.
pub struct Client {
    stream: UnixStream,
}

impl Client {
    /// Connect to the endpoint named `ident`.
    pub fn connect(ident: &str) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(socket_path(ident))?;
        Ok(Self { stream })
    }

    /// A second handle over the same connection, so one thread can read
    /// while another writes.
    pub fn try_clone(&self) -> Result<Self, IpcError> {
        Ok(Self {
            stream: self.stream.try_clone()?,
        })
    }

    pub fn send(&mut self, data: &[u8]) -> Result<(), IpcError> {
        write_frame(&self.stream, data)
    }

    /// Block for the next server frame. `Ok(None)` when the server is gone.
    pub fn recv(&mut self) -> Result<Option<Vec<u8>>, IpcError> {
        read_frame(&mut self.stream)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), IpcError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ident(tag: &str) -> String {
        format!("mullion-ipctest-{}-{}", std::process::id(), tag)
    }

    #[test]
    fn frames_arrive_tagged_and_in_order() {
        let ident = test_ident("order");
        let ep = Endpoint::bind(&ident).unwrap();

        let mut c = Client::connect(&ident).unwrap();
        c.send(b"first").unwrap();
        c.send(b"second").unwrap();

        let a = ep.recv().unwrap();
        let b = ep.recv().unwrap();
        assert_eq!(a.data, b"first");
        assert_eq!(b.data, b"second");
        assert_eq!(a.source, b.source);
    }

    #[test]
    fn replies_reach_the_right_client() {
        let ident = test_ident("reply");
        let ep = Endpoint::bind(&ident).unwrap();

        let mut c1 = Client::connect(&ident).unwrap();
        let mut c2 = Client::connect(&ident).unwrap();
        c1.send(b"one").unwrap();
        c2.send(b"two").unwrap();

        for _ in 0..2 {
            let p = ep.recv().unwrap();
            // Echo back reversed, so each client can check its own reply.
            let mut out = p.data.clone();
            out.reverse();
            ep.send(p.source, &out).unwrap();
        }

        assert_eq!(c1.recv().unwrap().unwrap(), b"eno");
        assert_eq!(c2.recv().unwrap().unwrap(), b"owt");
    }

    #[test]
    fn disconnect_delivers_one_empty_packet() {
        let ident = test_ident("close");
        let ep = Endpoint::bind(&ident).unwrap();

        let mut c = Client::connect(&ident).unwrap();
        c.send(b"hello").unwrap();
        let hello = ep.recv().unwrap();
        assert_eq!(hello.data, b"hello");

        drop(c);
        let close = ep.recv().unwrap();
        assert_eq!(close.source, hello.source);
        assert!(close.data.is_empty());

        ep.drop_connection(close.source);
        assert!(matches!(
            ep.send(close.source, b"late"),
            Err(IpcError::UnknownConnection(_))
        ));
    }

    #[test]
    fn broadcast_hits_every_connection() {
        let ident = test_ident("bcast");
        let ep = Endpoint::bind(&ident).unwrap();

        let mut c1 = Client::connect(&ident).unwrap();
        let mut c2 = Client::connect(&ident).unwrap();
        // Make sure both connections are registered before broadcasting.
        c1.send(b"a").unwrap();
        c2.send(b"b").unwrap();
        ep.recv().unwrap();
        ep.recv().unwrap();

        ep.broadcast(b"down");
        assert_eq!(c1.recv().unwrap().unwrap(), b"down");
        assert_eq!(c2.recv().unwrap().unwrap(), b"down");
    }
}

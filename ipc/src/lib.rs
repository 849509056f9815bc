//! Platform primitives for the mullion compositor.
//!
//! Two things live here: the packet endpoint (a named stream socket carrying
//! length-framed packets with per-connection source ids — the transport the
//! server shares with its clients and its input feeders) and the
//! shared-memory window buffers the server hands out to clients.

pub mod endpoint;
pub mod error;
pub mod shm;

pub use endpoint::{Client, ConnId, Endpoint, Packet, socket_path};
pub use error::IpcError;
pub use shm::SharedBuffer;

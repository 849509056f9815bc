use std::fmt;
use std::io;

#[derive(Debug)]
pub enum IpcError {
    Io(io::Error),
    /// The endpoint's receive channel has no more producers.
    EndpointClosed,
    /// A send named a connection that is gone.
    UnknownConnection(u32),
    /// A transport frame declared an unreasonable length.
    FrameTooLarge(usize),
    /// A shared-memory call failed; carries the operation name.
    Shm(&'static str, io::Error),
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {}", e),
            Self::EndpointClosed => write!(f, "endpoint closed"),
            Self::UnknownConnection(id) => write!(f, "no such connection {:#x}", id),
            Self::FrameTooLarge(n) => write!(f, "frame of {} bytes exceeds the transport cap", n),
            Self::Shm(op, e) => write!(f, "shared memory {} failed: {}", op, e),
        }
    }
}

impl std::error::Error for IpcError {}

impl From<io::Error> for IpcError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

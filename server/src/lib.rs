//! The mullion compositor server.
//!
//! One process arbitrates the framebuffer among unprivileged clients:
//! windows live in shared memory, a packet endpoint carries the protocol,
//! a service thread handles messages, a render thread composites damaged
//! regions, and input devices feed events in as privileged clients.
//!
//! The crate is a library so the integration tests can boot a complete
//! in-process server against a memory display; the binary in `main.rs` is
//! a thin bootstrap around [`spawn_server`].

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use mullion_ipc::{Client, Endpoint, IpcError};

pub mod devices;
pub mod handlers;
pub mod input;
pub mod nested;
pub mod output;
pub mod registry;
pub mod render;
pub mod state;
pub mod window;

pub use output::{MemoryOutput, Output};
pub use state::Server;

#[derive(Debug)]
pub enum ServerError {
    Ipc(IpcError),
    Io(io::Error),
    Display(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipc(e) => write!(f, "transport error: {}", e),
            Self::Io(e) => write!(f, "i/o error: {}", e),
            Self::Display(what) => write!(f, "display error: {}", what),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<IpcError> for ServerError {
    fn from(e: IpcError) -> Self {
        Self::Ipc(e)
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// A running server: the shared state plus its two core threads.
pub struct ServerHandle {
    pub server: Arc<Server>,
    service: JoinHandle<()>,
    render: JoinHandle<()>,
}

/// Bind the endpoint and start the service and render threads.
pub fn spawn_server(ident: &str, output: Output) -> Result<ServerHandle, ServerError> {
    let endpoint = Endpoint::bind(ident)?;
    let server = Arc::new(Server::new(
        ident.to_owned(),
        output.width(),
        output.height(),
        endpoint,
    ));

    let render = {
        let server = Arc::clone(&server);
        std::thread::Builder::new()
            .name("render".into())
            .spawn(move || render::run(server, output))?
    };
    let service = {
        let server = Arc::clone(&server);
        std::thread::Builder::new()
            .name("service".into())
            .spawn(move || handlers::service_loop(server))?
    };

    Ok(ServerHandle {
        server,
        service,
        render,
    })
}

impl ServerHandle {
    /// Block until the service loop exits.
    pub fn wait(self) {
        let _ = self.service.join();
        let _ = self.render.join();
    }

    /// Stop both threads and wait for them.
    pub fn shutdown(self) {
        self.server.stop();
        // A throwaway connection wakes the service thread out of recv();
        // its immediate close sentinel is then the last packet handled.
        let _ = Client::connect(&self.server.ident);
        let _ = self.service.join();
        let _ = self.render.join();
    }
}

//! Wire protocol and shared constants for the mullion compositor.
//!
//! Everything a client needs to talk to the server lives here: the message
//! header and typed bodies, damage rectangles, input packets, and the
//! constant tables (z-order slots, cursor modes, shape thresholds, resize
//! directions). The crate is `no_std` so the same definitions serve the
//! server, device feeders, and any client runtime.

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod damage;
pub mod input;
pub mod message;
pub mod window;

use alloc::format;
use alloc::string::String;

/// Name of the shared-memory object backing a window buffer.
///
/// Buffers are w * h 32-bit BGRA pixels, tightly packed, row-major. A client
/// maps the object named in WINDOW_INIT or RESIZE_BUFID.
pub fn buffer_key(ident: &str, bufid: u32) -> String {
    format!("sys.{}.{}", ident, bufid)
}

/// Environment variable through which the server publishes its endpoint name.
pub const DISPLAY_ENV: &str = "DISPLAY";

/// Default endpoint name for the system compositor.
pub const DEFAULT_IDENT: &str = "compositor";

//! UDP time service for embedded devices.
//!
//! A device sends `Get time`, the server answers with the current Unix time in
//! milliseconds once per interval until the same device sends `Get OK`.

pub mod logging;
pub mod protocol;
pub mod server;
pub mod session;

pub use server::{Config, TimeServer, DEFAULT_INTERVAL, DEFAULT_PORT};

//! NetFS Library
//!
//! Minimal client/server file exchange: typed packets framed over TCP, a
//! fixed-capacity server slot pool with one handler thread per connection,
//! and a client that pairs a background reader with a packet queue.

pub mod cli;
pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod listing;
pub mod logger;
pub mod packet;
pub mod paths;
pub mod pool;
pub mod progress;
pub mod protocol;
pub mod queue;
pub mod server;

pub use error::NetError;
pub use packet::{Frame, Packet, PacketHeader, PacketType};
pub use queue::PacketQueue;

/// Install the `tracing` subscriber used by both binaries. `RUST_LOG` overrides `default_level`.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub mod classifier;
pub mod client;
pub mod error;
pub mod handshake;
pub mod header_cache;
pub mod server;
pub mod store;
pub mod tls;
pub mod token;
pub mod transport;
pub mod tunnel;

pub use error::{Error, Result};

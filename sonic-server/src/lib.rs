//! # Sonic Mock Server
//!
//! Purpose: An in-memory server speaking the Sonic Channel protocol, used to
//! exercise the client end to end without a real search backend.
//!
//! ## Design Principles
//! 1. **Task per Connection**: Each client gets its own tokio task with a
//!    `BytesMut` read buffer.
//! 2. **Channel Command Sets**: `START` picks the channel; commands outside
//!    its set answer `ERR unknown_command`.
//! 3. **Word Index**: Objects store lower-cased words, enough for query and
//!    suggest to behave plausibly.

pub mod index;
pub mod protocol;
pub mod server;

pub use index::Index;
pub use server::{
    handle_connection, run, serve, ServerConfig, ServerState, CONNECTED_BANNER, PROTOCOL_VERSION,
};

// sonic-common - Shared types and protocol codec for the Sonic Channel client
//
// This crate defines the error taxonomy, channel/action/lang types and the
// line-protocol encoder/decoder used by both the client and the mock server.

pub mod error;
pub mod types;
pub mod protocol;

// Re-export for convenience
pub use error::*;
pub use types::*;
pub use protocol::*;

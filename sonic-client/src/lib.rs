//! # Sonic Channel Sync Client
//!
//! Purpose: Provide a blocking client for the Sonic search backend with
//! connection pooling, so ingest, search and control commands skip the TCP
//! dial and `START` handshake on the hot path.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse drivers; validate them lazily on checkout.
//! 2. **Composition**: One pooled client per channel, wrapped by a facade with
//!    that channel's command set.
//! 3. **Error Isolation**: Bulk ingestion reports failures per record instead
//!    of aborting the batch.
//! 4. **Protocol Clarity**: Every command goes through the shared line codec
//!    in `sonic-common`.
//!
//! ## Example
//!
//! ```no_run
//! use sonic_client::{ClientConfig, IngestClient, Lang, SearchClient};
//!
//! let config = ClientConfig::new("localhost", 1491, "SecretPassword");
//! let ingest = IngestClient::connect(&config)?;
//! ingest.push("movies", "general", "id:6ab56b4kk3", "Star wars", &Lang::ENG)?;
//!
//! let search = SearchClient::connect(&config)?;
//! let ids = search.query("movies", "general", "star", 10, 0, &Lang::AUTO_DETECT)?;
//! # Ok::<(), sonic_client::SonicError>(())
//! ```

mod backoff;
mod bulk;
mod client;
mod control;
mod driver;
mod ingest;
mod pool;
mod search;

pub use backoff::{fibonacci, Backoff, DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS};
pub use bulk::{dispatch, partition};
pub use client::{ClientConfig, PooledClient};
pub use control::ControlClient;
pub use driver::{Driver, DriverFactory};
pub use ingest::{pop_text, push_text, IngestClient};
pub use pool::{Pool, PoolConfig, PooledDriver, ACQUIRE_RETRY_LIMIT};
pub use search::SearchClient;

pub use sonic_common::{
    Action, Channel, IngestBulkError, IngestBulkRecord, Lang, SonicError, SonicResult,
};

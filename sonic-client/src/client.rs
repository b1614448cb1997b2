//! # Pooled Client
//!
//! Purpose: Hold the configuration and the driver pool shared by the ingest,
//! search and control facades.
//!
//! ## Design Principles
//! 1. **Composition**: Each facade wraps one `PooledClient`; there is no base
//!    class, only a shared pool handle.
//! 2. **Borrow-and-Return**: Every call acquires a driver, runs its command
//!    and drops the guard, returning the driver to the pool.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sonic_common::{check_word, Channel, SonicError, SonicResult};

use crate::driver::DriverFactory;
use crate::pool::{Pool, PoolConfig, PooledDriver};

/// Configuration for a Sonic client and its pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server port; Sonic listens on 1491 by default.
    pub port: u16,
    /// Channel password configured on the server.
    pub password: String,
    /// Lower bound on warm-up capacity; must not exceed `pool_max_idle`.
    pub pool_min_idle: usize,
    /// Maximum idle connections kept in the pool.
    pub pool_max_idle: usize,
    /// Ping idle connections older than this on checkout. Zero disables.
    pub ping_threshold: Duration,
    /// Discard idle connections unused for longer than this. Zero disables.
    pub max_idle_lifetime: Duration,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 1491,
            password: "SecretPassword".to_string(),
            pool_min_idle: 1,
            pool_max_idle: 16,
            ping_threshold: Duration::ZERO,
            max_idle_lifetime: Duration::from_secs(5 * 60),
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with default pool settings.
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            password: password.into(),
            ..ClientConfig::default()
        }
    }

    /// Rejects inconsistent pool bounds and passwords that cannot be sent
    /// as a single token.
    pub fn validate(&self) -> SonicResult<()> {
        check_word("password", &self.password)?;
        if self.pool_min_idle > self.pool_max_idle {
            return Err(SonicError::invalid_argument(format!(
                "pool_min_idle ({}) exceeds pool_max_idle ({})",
                self.pool_min_idle, self.pool_max_idle
            )));
        }
        Ok(())
    }

    fn driver_factory(&self, channel: Channel) -> DriverFactory {
        DriverFactory {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
            channel,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            min_idle: self.pool_min_idle,
            max_idle: self.pool_max_idle,
            ping_threshold: self.ping_threshold,
            max_idle_lifetime: self.max_idle_lifetime,
        }
    }
}

/// Pool-backed client for one channel.
#[derive(Clone)]
pub struct PooledClient {
    channel: Channel,
    pool: Pool,
}

impl PooledClient {
    /// Validates the configuration and warms up a pool for `channel`.
    pub fn connect(config: &ClientConfig, channel: Channel) -> SonicResult<Self> {
        config.validate()?;
        let pool = Pool::new(config.driver_factory(channel), config.pool_config())?;
        Ok(PooledClient { channel, pool })
    }

    /// Checks out one driver.
    pub fn driver(&self) -> SonicResult<PooledDriver> {
        self.pool.get()
    }

    /// Pings the server over one pooled connection.
    pub fn ping(&self) -> SonicResult<()> {
        let mut driver = self.pool.get()?;
        driver.ping()
    }

    /// Quits every connection and closes the pool. Never fails.
    pub fn quit(&self) -> SonicResult<()> {
        self.pool.close();
        Ok(())
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

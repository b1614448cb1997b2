//! # Connection Pool
//!
//! Purpose: Reuse Sonic drivers across calls so most commands skip the TCP
//! dial and `START` handshake.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of idle drivers; never block
//!    waiting for capacity, dial instead.
//! 2. **Lazy Validation**: Idle drivers are checked on checkout with
//!    `Driver::check_conn`, which usually costs no I/O.
//! 3. **Minimal Locking**: Only the closed flag sits behind a lock; the idle
//!    set is a lock-free bounded MPMC queue.
//! 4. **RAII Return**: `PooledDriver` hands its driver back on drop.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use sonic_common::{SonicError, SonicResult};
use tracing::{debug, warn};

use crate::driver::{Driver, DriverFactory};

/// Idle drivers inspected per `get` before dialing unconditionally.
pub const ACQUIRE_RETRY_LIMIT: usize = 8;

/// Pool sizing and health-check configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Capacity reserved for warm-up bookkeeping; must not exceed `max_idle`.
    pub min_idle: usize,
    /// Maximum number of idle drivers kept; warm-up opens this many.
    pub max_idle: usize,
    /// Ping idle drivers whose last ping is older than this. Zero disables.
    pub ping_threshold: Duration,
    /// Discard idle drivers unused for longer than this. Zero disables.
    pub max_idle_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min_idle: 1,
            max_idle: 16,
            ping_threshold: Duration::ZERO,
            max_idle_lifetime: Duration::from_secs(5 * 60),
        }
    }
}

struct PoolInner {
    factory: Arc<DriverFactory>,
    config: PoolConfig,
    idle_tx: Sender<Driver>,
    idle_rx: Receiver<Driver>,
    closed: RwLock<bool>,
}

/// Connection pool handle.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Creates a pool and warms it up with `max_idle` connected drivers.
    ///
    /// The first connection failure aborts warm-up; drivers opened before it
    /// are quit before the error is returned.
    pub fn new(factory: DriverFactory, config: PoolConfig) -> SonicResult<Self> {
        if config.min_idle > config.max_idle {
            return Err(SonicError::invalid_argument(format!(
                "pool min idle ({}) exceeds max idle ({})",
                config.min_idle, config.max_idle
            )));
        }

        // A zero-capacity channel never holds a driver, so max_idle == 0
        // degrades to dial-per-call.
        let (idle_tx, idle_rx) = bounded(config.max_idle);
        let pool = Pool {
            inner: Arc::new(PoolInner {
                factory: Arc::new(factory),
                config,
                idle_tx,
                idle_rx,
                closed: RwLock::new(false),
            }),
        };

        pool.warm_up()?;
        Ok(pool)
    }

    fn warm_up(&self) -> SonicResult<()> {
        let config = &self.inner.config;
        let mut opened = Vec::with_capacity(config.min_idle);
        let mut failure = None;
        for _ in 0..config.max_idle {
            match self.get() {
                Ok(driver) => opened.push(driver),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        // Guards go back to the idle set on drop.
        let warmed = opened.len();
        drop(opened);

        match failure {
            None => {
                debug!(drivers = warmed, "sonic pool warmed up");
                Ok(())
            }
            Some(err) => {
                warn!(
                    host = %self.inner.factory.host,
                    port = self.inner.factory.port,
                    opened = warmed,
                    error = %err,
                    "sonic pool warm-up failed"
                );
                self.close();
                Err(err)
            }
        }
    }

    /// Acquires a healthy driver, dialing a new one when none is idle.
    pub fn get(&self) -> SonicResult<PooledDriver> {
        let closed = self.inner.closed.read();
        if *closed {
            return Err(SonicError::ConnectionClosed);
        }
        let driver = self.next_driver()?;
        drop(closed);
        Ok(PooledDriver::new(self.clone(), driver))
    }

    fn next_driver(&self) -> SonicResult<Driver> {
        let config = &self.inner.config;
        for _ in 0..ACQUIRE_RETRY_LIMIT {
            let Ok(mut driver) = self.inner.idle_rx.try_recv() else {
                return self.inner.factory.open();
            };
            if driver.check_conn(config.ping_threshold, config.max_idle_lifetime) {
                return Ok(driver);
            }
            driver.release();
        }

        debug!(
            limit = ACQUIRE_RETRY_LIMIT,
            "sonic pool skipped stale idle drivers, dialing"
        );
        self.inner.factory.open()
    }

    /// Returns a driver to the idle set.
    ///
    /// Closed drivers are dropped. When the pool is closed or full the driver
    /// is quit instead of queued.
    pub fn put(&self, driver: Driver) {
        if driver.is_closed() {
            return;
        }

        let rejected = {
            let closed = self.inner.closed.read();
            if *closed {
                Some(driver)
            } else {
                self.inner.idle_tx.try_send(driver).err().map(|err| err.into_inner())
            }
        };

        if let Some(mut driver) = rejected {
            debug!("sonic pool closed or full, quitting driver");
            let _ = driver.quit();
        }
    }

    /// Closes the pool and quits every idle driver. Idempotent.
    ///
    /// Checked-out drivers are quit when their holder returns them.
    pub fn close(&self) {
        let mut closed = self.inner.closed.write();
        if *closed {
            return;
        }
        *closed = true;

        let mut drained = 0usize;
        while let Ok(mut driver) = self.inner.idle_rx.try_recv() {
            let _ = driver.quit();
            drained += 1;
        }
        debug!(drained, "sonic pool closed");
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.read()
    }

    /// Number of drivers currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.inner.idle_rx.len()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

/// RAII wrapper returning a driver to the pool on drop.
pub struct PooledDriver {
    pool: Pool,
    driver: Option<Driver>,
}

impl PooledDriver {
    fn new(pool: Pool, driver: Driver) -> Self {
        PooledDriver {
            pool,
            driver: Some(driver),
        }
    }

    /// Detaches the driver; it will not return to the pool.
    pub fn into_inner(mut self) -> Driver {
        self.driver.take().expect("driver exists")
    }
}

impl Deref for PooledDriver {
    type Target = Driver;

    fn deref(&self) -> &Driver {
        self.driver.as_ref().expect("driver exists")
    }
}

impl DerefMut for PooledDriver {
    fn deref_mut(&mut self) -> &mut Driver {
        self.driver.as_mut().expect("driver exists")
    }
}

impl Drop for PooledDriver {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            self.pool.put(driver);
        }
    }
}

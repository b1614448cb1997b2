//! # Driver
//!
//! Purpose: Own exactly one TCP connection to a Sonic server, started in one
//! channel, and expose the blocking read/write primitives every command is
//! built from.
//!
//! ## Design Principles
//! 1. **Single Owner**: A `Driver` is `&mut`-only; whoever holds it is the only
//!    caller on the socket, so one request is in flight at a time.
//! 2. **Terminal Close**: Once `closed` is set the socket is gone and every
//!    primitive returns `ConnectionClosed` without touching the network.
//! 3. **Cheap Health Checks**: `check_conn` only pays a `PING` round trip when
//!    the last successful ping is older than the configured threshold.
//! 4. **Buffer Reuse**: Command and reply buffers live on the driver.

use std::io::{BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sonic_common::{
    check_reply, check_word, encode_command, expect_reply, parse_started, read_line,
    reply_line_limit, Arg, Channel, SonicError, SonicResult,
};
use tracing::debug;

/// Upper bound on the wait for `ENDED` when the socket has no read timeout.
const QUIT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything needed to open a driver. Shared by all drivers of a pool.
#[derive(Debug, Clone)]
pub struct DriverFactory {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub channel: Channel,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
}

impl DriverFactory {
    /// Creates a driver that is not yet connected.
    pub fn build(self: &Arc<Self>) -> Driver {
        Driver::new(Arc::clone(self))
    }

    /// Creates and connects a driver.
    pub fn open(self: &Arc<Self>) -> SonicResult<Driver> {
        let mut driver = self.build();
        driver.connect()?;
        Ok(driver)
    }
}

/// A single Sonic connection plus its protocol state.
pub struct Driver {
    factory: Arc<DriverFactory>,
    // Buffered reader reduces syscalls while still allowing direct writes.
    stream: Option<BufReader<TcpStream>>,
    line_buf: Vec<u8>,
    write_buf: String,
    max_command_bytes: usize,
    closed: bool,
    last_use: Instant,
    last_ping: Instant,
}

impl Driver {
    pub fn new(factory: Arc<DriverFactory>) -> Self {
        let now = Instant::now();
        Driver {
            factory,
            stream: None,
            line_buf: Vec::with_capacity(128),
            write_buf: String::with_capacity(256),
            max_command_bytes: 0,
            closed: false,
            last_use: now,
            last_ping: now,
        }
    }

    /// Dials the server and performs the `START` handshake.
    ///
    /// Reads the version banner and the `STARTED` banner, keeping the
    /// announced buffer size for payload chunking. A failed handshake leaves
    /// the driver closed.
    pub fn connect(&mut self) -> SonicResult<()> {
        if self.closed {
            return Err(SonicError::ConnectionClosed);
        }

        let result = self.handshake();
        match &result {
            Ok(()) => debug!(
                host = %self.factory.host,
                port = self.factory.port,
                channel = %self.factory.channel,
                max_command_bytes = self.max_command_bytes,
                "sonic driver connected"
            ),
            Err(err) => {
                debug!(host = %self.factory.host, port = self.factory.port, error = %err, "sonic handshake failed");
                self.release();
            }
        }
        result
    }

    fn handshake(&mut self) -> SonicResult<()> {
        let factory = Arc::clone(&self.factory);
        // The password travels as a bare token in `START`.
        check_word("password", &factory.password)?;
        let stream = dial(&factory)?;
        stream.set_read_timeout(factory.read_timeout)?;
        stream.set_write_timeout(factory.write_timeout)?;
        // Disable Nagle to keep request latency low for small command lines.
        stream.set_nodelay(true)?;
        self.stream = Some(BufReader::new(stream));

        self.write_command(
            "START",
            &[Arg::Word(factory.channel.as_str()), Arg::Word(&factory.password)],
        )?;
        // Protocol version banner, e.g. "CONNECTED <sonic-server v1.4.0>".
        self.read_reply()?;
        let started = self.read_reply()?;
        self.max_command_bytes = parse_started(&started)?;

        let now = Instant::now();
        self.last_use = now;
        self.last_ping = now;
        Ok(())
    }

    /// Writes one command line.
    pub fn write_command(&mut self, command: &str, args: &[Arg<'_>]) -> SonicResult<()> {
        if self.closed {
            return Err(SonicError::ConnectionClosed);
        }
        let Some(reader) = self.stream.as_mut() else {
            return Err(SonicError::ConnectionClosed);
        };

        self.write_buf.clear();
        encode_command(command, args, &mut self.write_buf);
        let result = {
            let stream = reader.get_mut();
            stream
                .write_all(self.write_buf.as_bytes())
                .and_then(|()| stream.flush())
        };

        if let Err(err) = result {
            // The peer may have seen a partial line; the connection is unusable.
            self.release();
            return Err(err.into());
        }
        Ok(())
    }

    /// Reads one reply line, turning `ERR ...` into a protocol error.
    ///
    /// End-of-stream, oversized lines and other read failures close the driver.
    pub fn read_reply(&mut self) -> SonicResult<String> {
        if self.closed {
            return Err(SonicError::ConnectionClosed);
        }
        let limit = reply_line_limit(self.max_command_bytes);
        let Some(reader) = self.stream.as_mut() else {
            return Err(SonicError::ConnectionClosed);
        };

        match read_line(reader, &mut self.line_buf, limit) {
            Ok(line) => check_reply(line),
            Err(err) => {
                self.release();
                Err(err)
            }
        }
    }

    /// Writes a command and reads its single reply line.
    pub fn exec(&mut self, command: &str, args: &[Arg<'_>]) -> SonicResult<String> {
        self.write_command(command, args)?;
        self.read_reply()
    }

    /// Sends `PING` and expects `PONG`.
    pub fn ping(&mut self) -> SonicResult<()> {
        let reply = self.exec("PING", &[])?;
        expect_reply(&reply, "PONG")?;
        self.last_ping = Instant::now();
        Ok(())
    }

    /// Sends `QUIT`, waits for `ENDED` and releases the socket.
    ///
    /// The socket is released whether or not `ENDED` arrives.
    pub fn quit(&mut self) -> SonicResult<()> {
        if self.factory.read_timeout.is_none() {
            if let Some(reader) = self.stream.as_ref() {
                let _ = reader.get_ref().set_read_timeout(Some(QUIT_READ_TIMEOUT));
            }
        }

        let result = self
            .write_command("QUIT", &[])
            .and_then(|()| self.read_reply())
            .and_then(|reply| expect_reply(&reply, "ENDED"));
        self.release();
        debug!(host = %self.factory.host, port = self.factory.port, "sonic driver quit");
        result
    }

    /// Reports whether a pooled driver is still usable.
    ///
    /// A zero duration disables the corresponding check. Only an expired ping
    /// threshold causes network I/O.
    pub fn check_conn(&mut self, ping_threshold: Duration, max_idle_lifetime: Duration) -> bool {
        let now = Instant::now();
        if !max_idle_lifetime.is_zero() && now.duration_since(self.last_use) > max_idle_lifetime {
            debug!(idle = ?now.duration_since(self.last_use), "sonic driver exceeded idle lifetime");
            return false;
        }
        self.last_use = now;

        if !ping_threshold.is_zero() && now.duration_since(self.last_ping) > ping_threshold {
            return match self.ping() {
                Ok(()) => true,
                Err(err) => {
                    debug!(error = %err, "sonic driver failed health ping");
                    false
                }
            };
        }
        true
    }

    /// Releases the socket and marks the driver closed. Idempotent.
    pub(crate) fn release(&mut self) {
        self.closed = true;
        if let Some(reader) = self.stream.take() {
            let _ = reader.get_ref().shutdown(Shutdown::Both);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn channel(&self) -> Channel {
        self.factory.channel
    }

    /// Buffer size announced by the server; zero before the handshake.
    pub fn max_command_bytes(&self) -> usize {
        self.max_command_bytes
    }

    pub fn last_use(&self) -> Instant {
        self.last_use
    }

    pub fn last_ping(&self) -> Instant {
        self.last_ping
    }
}

fn dial(factory: &DriverFactory) -> SonicResult<TcpStream> {
    let addr = (factory.host.as_str(), factory.port);
    let Some(timeout) = factory.connect_timeout else {
        return Ok(TcpStream::connect(addr)?);
    };

    let mut last_err = None;
    for socket_addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err
        .unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "address resolved to nothing")
        })
        .into())
}

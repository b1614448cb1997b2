//! # TCP Server
//!
//! Accept Sonic Channel connections, frame command lines, and dispatch them
//! to the in-memory index. Each connection runs `START` first, which fixes
//! the channel and therefore the command set it may use.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use sonic_common::{Action, Channel, DEFAULT_MAX_COMMAND_BYTES, ERR_PREFIX};

use crate::index::Index;
use crate::protocol::{parse_command, take_line, Command};

/// Version line written as soon as a client connects.
pub const CONNECTED_BANNER: &str = "CONNECTED <sonic-server v1.4.0>";
pub const PROTOCOL_VERSION: u32 = 1;

const DEFAULT_QUERY_LIMIT: usize = 10;
const DEFAULT_SUGGEST_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub password: String,
    /// Longest accepted command line, advertised as `buffer(<n>)`.
    pub buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 1491)),
            password: "SecretPassword".to_string(),
            buffer_size: DEFAULT_MAX_COMMAND_BYTES,
        }
    }
}

/// State shared by every connection task.
#[derive(Debug)]
pub struct ServerState {
    config: ServerConfig,
    index: Index,
    next_event: AtomicU64,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        ServerState {
            config,
            index: Index::new(),
            next_event: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    fn event_id(&self) -> String {
        format!("{:08X}", self.next_event.fetch_add(1, Ordering::Relaxed))
    }
}

/// Binds `config.addr` and serves until the listener fails.
pub async fn run(config: ServerConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.addr).await?;
    serve(listener, Arc::new(ServerState::new(config))).await
}

/// Accepts connections on `listener`, one task per client.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, buffer = state.config.buffer_size, "sonic server listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            debug!(%peer, "connection accepted");
            if let Err(err) = handle_connection(stream, state).await {
                debug!(%peer, error = %err, "connection failed");
            }
        });
    }
}

/// Handles a single client connection until `QUIT`, a failed `START` or EOF.
pub async fn handle_connection<S>(mut stream: S, state: Arc<ServerState>) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limit = state.config.buffer_size;
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut session = Session::default();
    let mut out = String::new();

    stream
        .write_all(format!("{CONNECTED_BANNER}\r\n").as_bytes())
        .await?;

    loop {
        let bytes = stream.read_buf(&mut buffer).await?;
        if bytes == 0 {
            break;
        }

        while let Some(line) = take_line(&mut buffer) {
            out.clear();
            let replies = if line.len() > limit {
                vec![error_reply("buffer_overflow")]
            } else {
                session.dispatch(&line, &state)
            };
            for reply in &replies {
                out.push_str(reply);
                out.push_str("\r\n");
            }
            stream.write_all(out.as_bytes()).await?;
            if session.ended {
                return Ok(());
            }
        }

        // A partial line already past the limit can never become valid.
        if buffer.len() > limit {
            stream
                .write_all(format!("{}\r\n", error_reply("buffer_overflow")).as_bytes())
                .await?;
            return Ok(());
        }
    }

    Ok(())
}

type Replies = Vec<String>;

#[derive(Debug, Default)]
struct Session {
    channel: Option<Channel>,
    ended: bool,
}

impl Session {
    fn dispatch(&mut self, line: &str, state: &ServerState) -> Replies {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(err) => return vec![error_reply(err.reason())],
        };

        let index = &state.index;
        match (self.channel, command.name.as_str()) {
            (_, "PING") => vec!["PONG".to_string()],
            (_, "QUIT") => {
                self.ended = true;
                vec!["ENDED quit".to_string()]
            }
            (None, "START") => self.handle_start(&command, state),
            (Some(_), "START") => vec![error_reply("already_started")],
            (None, _) => vec![error_reply("not_started")],
            (Some(Channel::Ingest), "PUSH") => handle_push(&command, index),
            (Some(Channel::Ingest), "POP") => handle_pop(&command, index),
            (Some(Channel::Ingest), "COUNT") => handle_count(&command, index),
            (Some(Channel::Ingest), "FLUSHC") => handle_flushc(&command, index),
            (Some(Channel::Ingest), "FLUSHB") => handle_flushb(&command, index),
            (Some(Channel::Ingest), "FLUSHO") => handle_flusho(&command, index),
            (Some(Channel::Search), "QUERY") => handle_query(&command, state),
            (Some(Channel::Search), "SUGGEST") => handle_suggest(&command, state),
            (Some(Channel::Control), "TRIGGER") => handle_trigger(&command),
            _ => vec![error_reply("unknown_command")],
        }
    }

    fn handle_start(&mut self, command: &Command, state: &ServerState) -> Replies {
        let [mode, password] = command.words.as_slice() else {
            return vec![error_reply("invalid_format(START <mode> <password>)")];
        };
        let Ok(channel) = mode.parse::<Channel>() else {
            return vec![error_reply("invalid_mode")];
        };
        if *password != state.config.password {
            self.ended = true;
            return vec!["ENDED authentication_failed".to_string()];
        }

        self.channel = Some(channel);
        debug!(channel = %channel, "session started");
        vec![format!(
            "STARTED {channel} protocol({PROTOCOL_VERSION}) buffer({})",
            state.config.buffer_size
        )]
    }
}

fn handle_push(command: &Command, index: &Index) -> Replies {
    let ([collection, bucket, object], Some(text)) = (command.words.as_slice(), &command.text)
    else {
        return invalid_format("PUSH <collection> <bucket> <object> \"<text>\"");
    };
    index.push(collection, bucket, object, text);
    vec!["OK".to_string()]
}

fn handle_pop(command: &Command, index: &Index) -> Replies {
    let ([collection, bucket, object], Some(text)) = (command.words.as_slice(), &command.text)
    else {
        return invalid_format("POP <collection> <bucket> <object> \"<text>\"");
    };
    result_reply(index.pop(collection, bucket, object, text))
}

fn handle_count(command: &Command, index: &Index) -> Replies {
    match command.words.as_slice() {
        [collection] => result_reply(index.count(collection, None, None)),
        [collection, bucket] => result_reply(index.count(collection, Some(bucket.as_str()), None)),
        [collection, bucket, object] => result_reply(index.count(
            collection,
            Some(bucket.as_str()),
            Some(object.as_str()),
        )),
        _ => invalid_format("COUNT <collection> [<bucket> [<object>]]"),
    }
}

fn handle_flushc(command: &Command, index: &Index) -> Replies {
    match command.words.as_slice() {
        [collection] => result_reply(index.flush_collection(collection)),
        _ => invalid_format("FLUSHC <collection>"),
    }
}

fn handle_flushb(command: &Command, index: &Index) -> Replies {
    match command.words.as_slice() {
        [collection, bucket] => result_reply(index.flush_bucket(collection, bucket)),
        _ => invalid_format("FLUSHB <collection> <bucket>"),
    }
}

fn handle_flusho(command: &Command, index: &Index) -> Replies {
    match command.words.as_slice() {
        [collection, bucket, object] => result_reply(index.flush_object(collection, bucket, object)),
        _ => invalid_format("FLUSHO <collection> <bucket> <object>"),
    }
}

fn handle_query(command: &Command, state: &ServerState) -> Replies {
    let ([collection, bucket], Some(terms)) = (command.words.as_slice(), &command.text) else {
        return invalid_format("QUERY <collection> <bucket> \"<terms>\"");
    };
    let Some(limit) = parse_count(command.param("LIMIT"), DEFAULT_QUERY_LIMIT) else {
        return invalid_format("LIMIT(<count>)");
    };
    let Some(offset) = parse_count(command.param("OFFSET"), 0) else {
        return invalid_format("OFFSET(<count>)");
    };

    let results = state.index.query(collection, bucket, terms, limit, offset);
    event_replies("QUERY", &state.event_id(), &results)
}

fn handle_suggest(command: &Command, state: &ServerState) -> Replies {
    let ([collection, bucket], Some(word)) = (command.words.as_slice(), &command.text) else {
        return invalid_format("SUGGEST <collection> <bucket> \"<word>\"");
    };
    let Some(limit) = parse_count(command.param("LIMIT"), DEFAULT_SUGGEST_LIMIT) else {
        return invalid_format("LIMIT(<count>)");
    };

    let results = state.index.suggest(collection, bucket, word, limit);
    event_replies("SUGGEST", &state.event_id(), &results)
}

fn handle_trigger(command: &Command) -> Replies {
    match command.words.as_slice() {
        [action] if action.parse::<Action>().is_ok() => vec!["OK".to_string()],
        [_] => vec![error_reply("invalid_action")],
        _ => invalid_format("TRIGGER <action>"),
    }
}

fn parse_count(raw: Option<&str>, fallback: usize) -> Option<usize> {
    match raw {
        Some(raw) => raw.parse().ok(),
        None => Some(fallback),
    }
}

fn event_replies(kind: &str, id: &str, results: &[String]) -> Replies {
    let mut event = format!("EVENT {kind} {id}");
    for result in results {
        event.push(' ');
        event.push_str(result);
    }
    vec![format!("PENDING {id}"), event]
}

fn result_reply(count: u64) -> Replies {
    vec![format!("RESULT {count}")]
}

fn invalid_format(usage: &str) -> Replies {
    vec![error_reply(&format!("invalid_format({usage})"))]
}

fn error_reply(reason: &str) -> String {
    format!("{ERR_PREFIX}{reason}")
}

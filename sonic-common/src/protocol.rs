//! # Sonic Channel Line Protocol
//!
//! Purpose: Encode client commands and decode server replies for the Sonic
//! Channel protocol: ASCII command lines terminated by CRLF, one reply line per
//! command (two for `QUERY`/`SUGGEST`).
//!
//! ## Design Principles
//! 1. **Buffer Reuse**: Encoders append into caller-provided buffers.
//! 2. **Fail Fast**: `ERR` replies and malformed banners become errors at the
//!    first parse, never later.
//! 3. **UTF-8 Safety**: Payload chunking only cuts on `char` boundaries.
//! 4. **Lenient Events**: An `EVENT` line of an unexpected shape decodes to an
//!    empty result set rather than an error.
//!
//! ## Line Shapes
//!
//! ```text
//! client: PUSH <collection> <bucket> <object> "<text>" [LANG(<tag>)]\r\n
//! server: CONNECTED <sonic-server v1.4.0>\r\n
//!         STARTED ingest protocol(1) buffer(20000)\r\n
//!         PENDING Bt2m2gYa\r\n
//!         EVENT QUERY Bt2m2gYa conversation:1 conversation:2\r\n
//!         ERR <reason>\r\n
//! ```

use std::borrow::Cow;
use std::io::{self, BufRead, Read};

use crate::error::{SonicError, SonicResult};
use crate::types::Lang;

/// Buffer size announced by a stock server; used until a handshake says otherwise.
pub const DEFAULT_MAX_COMMAND_BYTES: usize = 20_000;

/// Reply lines may be at most this many times the command buffer.
pub const REPLY_LINE_FACTOR: usize = 4;

/// Prefix of server error replies.
pub const ERR_PREFIX: &str = "ERR ";

/// One argument of an outgoing command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg<'a> {
    /// Bare token, written as-is (collection, bucket, object, action).
    Word(&'a str),
    /// Free text, escaped and wrapped in double quotes.
    Quoted(&'a str),
    /// Keyword parameter written as `NAME(value)`.
    Param(&'static str, Cow<'a, str>),
}

impl<'a> Arg<'a> {
    pub fn limit(count: u32) -> Self {
        Arg::Param("LIMIT", Cow::Owned(count.to_string()))
    }

    pub fn offset(count: u32) -> Self {
        Arg::Param("OFFSET", Cow::Owned(count.to_string()))
    }

    pub fn lang(tag: &'a str) -> Self {
        Arg::Param("LANG", Cow::Borrowed(tag))
    }
}

/// Two-phase replies delivered as `EVENT <kind> ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Query,
    Suggest,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::Query => "QUERY",
            EventKind::Suggest => "SUGGEST",
        }
    }
}

/// Appends one CRLF-terminated command line to `out`.
pub fn encode_command(command: &str, args: &[Arg<'_>], out: &mut String) {
    out.push_str(command);
    for arg in args {
        out.push(' ');
        match arg {
            Arg::Word(word) => out.push_str(word),
            Arg::Quoted(text) => {
                out.push('"');
                escape_text(text, out);
                out.push('"');
            }
            Arg::Param(name, value) => {
                out.push_str(name);
                out.push('(');
                out.push_str(value);
                out.push(')');
            }
        }
    }
    out.push_str("\r\n");
}

/// Convenience wrapper around [`encode_command`] returning a fresh line.
pub fn encode(command: &str, args: &[Arg<'_>]) -> String {
    let mut out = String::with_capacity(64);
    encode_command(command, args, &mut out);
    out
}

/// Rejects values that cannot be sent as a bare token.
///
/// Collections, buckets and objects are space-separated on the wire, so an
/// empty value or one containing whitespace or a quote would shift every
/// following argument.
pub fn check_word(name: &str, value: &str) -> SonicResult<()> {
    if value.is_empty() || value.chars().any(|ch| ch.is_whitespace() || ch == '"') {
        return Err(SonicError::invalid_argument(format!("invalid {name}: {value:?}")));
    }
    Ok(())
}

/// Rejects language tags that are not plain ASCII alphanumerics.
///
/// The tag is written inside `LANG(...)` without quoting. The empty
/// auto-detect tag is accepted because it is never sent.
pub fn check_lang(lang: &Lang) -> SonicResult<()> {
    let tag = lang.as_str();
    if tag.bytes().all(|byte| byte.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(SonicError::invalid_argument(format!("invalid lang: {tag:?}")))
    }
}

/// Escapes backslash, newline and double quote for use inside a quoted argument.
pub fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' => out.push_str("\\\""),
            _ => out.push(ch),
        }
    }
}

#[inline]
fn escaped_len(ch: char) -> usize {
    match ch {
        '\\' | '\n' | '"' => 2,
        _ => ch.len_utf8(),
    }
}

/// Maximum escaped bytes of text per command for a given server buffer.
pub fn chunk_budget(max_command_bytes: usize) -> usize {
    let max = if max_command_bytes == 0 {
        DEFAULT_MAX_COMMAND_BYTES
    } else {
        max_command_bytes
    };
    (max / 2).max(1)
}

/// Splits `text` into the fewest pieces whose escaped size fits
/// `chunk_budget(max_command_bytes)`.
///
/// Pieces are slices of the original string, so concatenating them yields
/// `text` and no piece starts or ends inside a code point. A single character
/// wider than the budget still gets a piece of its own. Empty input yields one
/// empty piece so callers always emit at least one command.
pub fn split_text(text: &str, max_command_bytes: usize) -> Vec<&str> {
    let budget = chunk_budget(max_command_bytes);
    let mut chunks = Vec::with_capacity(text.len() / budget + 1);
    let mut start = 0;
    let mut used = 0;

    for (idx, ch) in text.char_indices() {
        let cost = escaped_len(ch);
        if used + cost > budget && idx > start {
            chunks.push(&text[start..idx]);
            start = idx;
            used = 0;
        }
        used += cost;
    }
    chunks.push(&text[start..]);
    chunks
}

/// Longest reply line accepted for a given server buffer size.
pub fn reply_line_limit(max_command_bytes: usize) -> usize {
    let max = if max_command_bytes == 0 {
        DEFAULT_MAX_COMMAND_BYTES
    } else {
        max_command_bytes
    };
    max.saturating_mul(REPLY_LINE_FACTOR)
}

/// Reads one logical line, reassembling it across partial buffer fills.
///
/// The trailing `\n` (and `\r` before it) is stripped. End-of-stream before any
/// byte is returned as `UnexpectedEof`. A line longer than `limit` bytes is an
/// `InvalidData` I/O error.
pub fn read_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> SonicResult<String> {
    buf.clear();
    // Room for the CRLF terminator after a line of exactly `limit` bytes.
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(2);
    let bytes = reader.by_ref().take(cap).read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer").into());
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    if buf.len() > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("reply line exceeds {limit} bytes"),
        )
        .into());
    }
    Ok(String::from_utf8_lossy(buf).into_owned())
}

/// Turns an `ERR <message>` reply into a protocol error and passes anything
/// else through.
pub fn check_reply(line: String) -> SonicResult<String> {
    match line.strip_prefix(ERR_PREFIX) {
        Some(message) => Err(SonicError::protocol(message)),
        None => Ok(line),
    }
}

/// Verifies that the first token of `line` is `expected` (`OK`, `PONG`, `ENDED`).
pub fn expect_reply(line: &str, expected: &str) -> SonicResult<()> {
    if line.split(' ').next() == Some(expected) {
        Ok(())
    } else {
        Err(unexpected(line))
    }
}

/// Extracts `<n>` from `STARTED <mode> protocol(<v>) buffer(<n>)`.
pub fn parse_started(line: &str) -> SonicResult<usize> {
    if !line.starts_with("STARTED ") {
        return Err(malformed_started(line));
    }
    param_value(line, "buffer")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| malformed_started(line))
}

/// Parses `RESULT <n>`.
pub fn parse_result(line: &str) -> SonicResult<u64> {
    line.strip_prefix("RESULT ")
        .and_then(|raw| raw.trim().parse().ok())
        .ok_or_else(|| unexpected(line))
}

/// Returns the event id announced by `PENDING <id>`.
pub fn parse_pending(line: &str) -> Option<&str> {
    line.strip_prefix("PENDING ").map(str::trim)
}

/// Extracts result tokens from `EVENT <kind> <id> <r1> <r2> ...`.
///
/// Any other shape yields an empty list.
pub fn parse_event(line: &str, kind: EventKind) -> Vec<String> {
    let mut tokens = line.split(' ');
    if tokens.next() != Some("EVENT") || tokens.next() != Some(kind.as_str()) {
        return Vec::new();
    }
    tokens
        .skip(1)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

fn param_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    line.split(' ').find_map(|token| {
        token
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.strip_suffix(')'))
    })
}

fn malformed_started(line: &str) -> SonicError {
    SonicError::protocol(format!("malformed STARTED banner: {line}"))
}

fn unexpected(line: &str) -> SonicError {
    SonicError::protocol(format!("unexpected response: {line}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{BufReader, Cursor, Read};

    #[test]
    fn encodes_push_line() {
        let line = encode(
            "PUSH",
            &[Arg::Word("c"), Arg::Word("b"), Arg::Word("o1"), Arg::Quoted("hello")],
        );
        assert_eq!(line, "PUSH c b o1 \"hello\"\r\n");
    }

    #[test]
    fn encodes_query_parameters() {
        let line = encode(
            "QUERY",
            &[
                Arg::Word("movies"),
                Arg::Word("general"),
                Arg::Quoted("star wars"),
                Arg::limit(10),
                Arg::offset(0),
                Arg::lang("eng"),
            ],
        );
        assert_eq!(
            line,
            "QUERY movies general \"star wars\" LIMIT(10) OFFSET(0) LANG(eng)\r\n"
        );
    }

    #[test]
    fn escapes_quoted_text() {
        let mut out = String::new();
        escape_text("a \"b\"\nc\\d", &mut out);
        assert_eq!(out, "a \\\"b\\\"\\nc\\\\d");
    }

    #[test]
    fn rejects_words_with_separators() {
        assert!(check_word("collection", "movies").is_ok());
        assert!(check_word("collection", "").is_err());
        assert!(check_word("bucket", "a b").is_err());
        assert!(check_word("object", "o\"1").is_err());
    }

    #[test]
    fn parses_started_banner() {
        let size = parse_started("STARTED ingest protocol(1) buffer(20000)").unwrap();
        assert_eq!(size, 20000);
    }

    #[test]
    fn rejects_malformed_started_banner() {
        for line in ["STARTED ingest protocol(1)", "STARTED ingest buffer(abc)", "CONNECTED"] {
            let err = parse_started(line).unwrap_err();
            assert!(err.protocol_message().unwrap().starts_with("malformed STARTED banner"));
        }
    }

    #[test]
    fn err_reply_becomes_protocol_error() {
        let err = check_reply("ERR unknown_command".to_string()).unwrap_err();
        assert_eq!(err, SonicError::protocol("unknown_command"));
        assert_eq!(check_reply("OK".to_string()).unwrap(), "OK");
    }

    #[test]
    fn parses_result_count() {
        assert_eq!(parse_result("RESULT 3").unwrap(), 3);
        assert!(parse_result("OK").is_err());
    }

    #[test]
    fn parses_query_event() {
        assert_eq!(parse_pending("PENDING Q1"), Some("Q1"));
        let results = parse_event("EVENT QUERY Q1 id1 id2", EventKind::Query);
        assert_eq!(results, vec!["id1".to_string(), "id2".to_string()]);
    }

    #[test]
    fn mismatched_event_yields_empty_result() {
        assert!(parse_event("EVENT SUGGEST Q1 id1", EventKind::Query).is_empty());
        assert!(parse_event("PENDING Q1", EventKind::Query).is_empty());
        assert!(parse_event("EVENT QUERY Q1", EventKind::Query).is_empty());
    }

    #[test]
    fn expects_first_token() {
        assert!(expect_reply("ENDED quit", "ENDED").is_ok());
        assert!(expect_reply("PONG", "PONG").is_ok());
        assert!(expect_reply("PONGX", "PONG").is_err());
    }

    #[test]
    fn reads_line_across_partial_fills() {
        // A one-byte buffer forces read_until to stitch the line together.
        let data = Cursor::new(b"STARTED search protocol(1) buffer(20000)\r\nPONG\n".to_vec());
        let mut reader = BufReader::with_capacity(1, data);
        let mut buf = Vec::new();
        assert_eq!(
            read_line(&mut reader, &mut buf, 64).unwrap(),
            "STARTED search protocol(1) buffer(20000)"
        );
        assert_eq!(read_line(&mut reader, &mut buf, 64).unwrap(), "PONG");
        assert!(read_line(&mut reader, &mut buf, 64).unwrap_err().is_eof());
    }

    #[test]
    fn reads_trailing_line_without_newline() {
        let mut reader = BufReader::new(Cursor::new(b"ENDED quit".to_vec()));
        let mut buf = Vec::new();
        assert_eq!(read_line(&mut reader, &mut buf, 64).unwrap(), "ENDED quit");
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn rejects_oversized_reply_lines() {
        let data = b"12345678\r\n123456789\n".to_vec();
        let mut reader = BufReader::with_capacity(3, Cursor::new(data));
        let mut buf = Vec::new();
        assert_eq!(read_line(&mut reader, &mut buf, 8).unwrap(), "12345678");

        let err = read_line(&mut reader, &mut buf, 8).unwrap_err();
        match err {
            SonicError::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::InvalidData),
            other => panic!("unexpected error: {other}"),
        }
        assert!(buf.len() <= 10);
    }

    #[test]
    fn reply_limit_scales_with_buffer() {
        assert_eq!(reply_line_limit(0), DEFAULT_MAX_COMMAND_BYTES * REPLY_LINE_FACTOR);
        assert_eq!(reply_line_limit(100), 400);
    }

    #[test]
    fn lang_tags_must_be_alphanumeric() {
        assert!(check_lang(&Lang::ENG).is_ok());
        assert!(check_lang(&Lang::AUTO_DETECT).is_ok());
        for tag in ["eng)", "en g", "eng\r\nFLUSHC c", "fr(a", "é"] {
            let err = check_lang(&Lang::new(tag)).unwrap_err();
            assert!(matches!(err, SonicError::InvalidArgument(_)), "{tag:?}");
        }
    }

    #[test]
    fn split_respects_budget_and_code_points() {
        let text = "héllo wörld, 日本語のテキスト \"quoted\" and\nnewlines";
        for max in [2, 4, 6, 10, 17, 64] {
            let budget = chunk_budget(max);
            let chunks = split_text(text, max);
            assert_eq!(chunks.concat(), text);
            for chunk in &chunks {
                let mut escaped = String::new();
                escape_text(chunk, &mut escaped);
                let single_char = chunk.chars().count() == 1;
                assert!(escaped.len() <= budget || single_char, "chunk {chunk:?} over {budget}");
            }
        }
    }

    #[test]
    fn split_uses_fewest_chunks() {
        let chunks = split_text("abcdefghij", 8);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
        assert_eq!(split_text("short", 0), vec!["short"]);
        assert_eq!(split_text("", 8), vec![""]);
    }

    #[test]
    fn split_never_cuts_inside_a_code_point() {
        // Each 'é' is two bytes; a budget of three bytes can only hold one.
        let chunks = split_text("ééé", 6);
        assert_eq!(chunks, vec!["é", "é", "é"]);
    }

    fn escaped_size(chunk: &str) -> usize {
        chunk.chars().map(escaped_len).sum()
    }

    proptest! {
        #[test]
        fn prop_split_text_is_lossless_and_minimal(
            text in prop_oneof![any::<String>(), "[a-z \"\\\\\n\réü日😀]{0,96}"],
            max in 1usize..128,
        ) {
            let budget = chunk_budget(max);
            let chunks = split_text(&text, max);

            prop_assert_eq!(chunks.concat(), text.clone());
            if text.is_empty() {
                prop_assert_eq!(chunks, vec![""]);
                return Ok(());
            }

            let mut offset = 0;
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert!(!chunk.is_empty());
                prop_assert!(text.is_char_boundary(offset));
                let size = escaped_size(chunk);
                prop_assert!(size <= budget || chunk.chars().count() == 1);

                // Greedy fill: the next character would not have fit.
                if let Some(next) = chunks.get(i + 1).and_then(|next| next.chars().next()) {
                    prop_assert!(size + escaped_len(next) > budget);
                }
                offset += chunk.len();
            }
            prop_assert_eq!(offset, text.len());
        }
    }
}

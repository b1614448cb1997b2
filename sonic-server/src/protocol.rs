//! # Command Line Parser
//!
//! Purpose: Split one Sonic command line into its name, positional words,
//! the optional quoted text and trailing `NAME(value)` parameters.
//!
//! ## Design Principles
//! 1. **Incremental Framing**: `take_line` drains complete lines from the
//!    connection buffer and leaves partial input in place.
//! 2. **Strict Shape**: Words never follow the quoted text or a parameter;
//!    anything else is reported as a format error.

use bytes::{Buf, BytesMut};

/// Parsed command line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Command {
    /// Upper-cased command name.
    pub name: String,
    pub words: Vec<String>,
    /// Unescaped contents of the quoted argument.
    pub text: Option<String>,
    pub params: Vec<(String, String)>,
}

impl Command {
    /// Value of the parameter `name`, if present.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    UnterminatedQuote,
    DuplicateText,
    MisplacedWord,
}

impl ParseError {
    /// Reason sent back in the `ERR` reply.
    pub fn reason(self) -> &'static str {
        match self {
            ParseError::Empty => "empty_command",
            ParseError::UnterminatedQuote => "invalid_format(unterminated quote)",
            ParseError::DuplicateText => "invalid_format(more than one text)",
            ParseError::MisplacedWord => "invalid_format(word after text)",
        }
    }
}

/// Removes one `\n`-terminated line from `buffer`, without its terminator.
/// Returns `None` while the line is still incomplete.
pub fn take_line(buffer: &mut BytesMut) -> Option<String> {
    let end = buffer.iter().position(|byte| *byte == b'\n')?;
    let mut line = buffer.split_to(end);
    buffer.advance(1);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    Some(String::from_utf8_lossy(&line).into_owned())
}

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let mut rest = line.trim();
    if rest.is_empty() {
        return Err(ParseError::Empty);
    }

    let (name, tail) = split_word(rest);
    let mut command = Command {
        name: name.to_ascii_uppercase(),
        ..Command::default()
    };
    rest = tail;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        if let Some(quoted) = rest.strip_prefix('"') {
            if command.text.is_some() {
                return Err(ParseError::DuplicateText);
            }
            let (text, tail) = read_quoted(quoted)?;
            command.text = Some(text);
            rest = tail;
            continue;
        }

        let (word, tail) = split_word(rest);
        rest = tail;
        match as_param(word) {
            Some((key, value)) => command.params.push((key.to_string(), value.to_string())),
            None if command.text.is_some() || !command.params.is_empty() => {
                return Err(ParseError::MisplacedWord);
            }
            None => command.words.push(word.to_string()),
        }
    }

    Ok(command)
}

fn split_word(input: &str) -> (&str, &str) {
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, ""),
    }
}

fn read_quoted(input: &str) -> Result<(String, &str), ParseError> {
    let mut text = String::with_capacity(input.len());
    let mut chars = input.char_indices();
    while let Some((index, ch)) = chars.next() {
        match ch {
            '"' => return Ok((text, &input[index + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, escaped @ ('"' | '\\'))) => text.push(escaped),
                Some((_, other)) => {
                    text.push('\\');
                    text.push(other);
                }
                None => return Err(ParseError::UnterminatedQuote),
            },
            _ => text.push(ch),
        }
    }
    Err(ParseError::UnterminatedQuote)
}

/// `LIMIT(10)` style parameter: upper-case name followed by a parenthesised value.
fn as_param(word: &str) -> Option<(&str, &str)> {
    let open = word.find('(')?;
    let value = word[open + 1..].strip_suffix(')')?;
    let name = &word[..open];
    if name.is_empty() || !name.bytes().all(|byte| byte.is_ascii_uppercase()) {
        return None;
    }
    Some((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_line_waits_for_terminator() {
        let mut buffer = BytesMut::from(&b"PING\r\nQUI"[..]);
        assert_eq!(take_line(&mut buffer).as_deref(), Some("PING"));
        assert_eq!(take_line(&mut buffer), None);

        buffer.extend_from_slice(b"T\n");
        assert_eq!(take_line(&mut buffer).as_deref(), Some("QUIT"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn parses_push_with_lang() {
        let command =
            parse_command(r#"PUSH movies general id:1 "Star \"wars\"\nepisode" LANG(eng)"#)
                .unwrap();
        assert_eq!(command.name, "PUSH");
        assert_eq!(command.words, vec!["movies", "general", "id:1"]);
        assert_eq!(command.text.as_deref(), Some("Star \"wars\"\nepisode"));
        assert_eq!(command.param("LANG"), Some("eng"));
        assert_eq!(command.param("LIMIT"), None);
    }

    #[test]
    fn parses_query_parameters_in_any_order() {
        let command =
            parse_command(r#"query c b "star" OFFSET(5) LIMIT(10)"#).unwrap();
        assert_eq!(command.name, "QUERY");
        assert_eq!(command.param("LIMIT"), Some("10"));
        assert_eq!(command.param("OFFSET"), Some("5"));
    }

    #[test]
    fn lowercase_parenthesised_word_is_positional() {
        let command = parse_command("COUNT c o(1)").unwrap();
        assert_eq!(command.words, vec!["c", "o(1)"]);
        assert!(command.params.is_empty());
    }

    #[test]
    fn keeps_backslash_before_unknown_escape() {
        let command = parse_command(r#"PUSH c b o "a\tb\\c""#).unwrap();
        assert_eq!(command.text.as_deref(), Some("a\\tb\\c"));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse_command("   "), Err(ParseError::Empty));
        assert_eq!(
            parse_command(r#"PUSH c b o "open"#),
            Err(ParseError::UnterminatedQuote)
        );
        assert_eq!(
            parse_command(r#"PUSH c b o "a" "b""#),
            Err(ParseError::DuplicateText)
        );
        assert_eq!(
            parse_command(r#"PUSH c b "a" o"#),
            Err(ParseError::MisplacedWord)
        );
    }
}

//! The generic message shape produced by the parser and consumed by the
//! (table-driven, not enum-matched) command dispatcher upstream in
//! `irc-client`.

use std::fmt;

use crate::error::{MessageError, ParseError};
use crate::prefix::Prefix;

/// Parameters beyond this count are folded into the last one, verbatim.
pub const MAX_PARAMS: usize = 15;
/// Wire limit including the trailing CRLF (RFC 2812 §2.3).
pub const MAX_LINE_LEN: usize = 512;

/// A single parsed IRC message: `[":" prefix SPACE] command SPACE params`.
///
/// `command` is kept as a plain string (rather than a closed enum) so the
/// dispatcher can route on it by table lookup, including numeric ranges,
/// without this crate knowing the full set of commands a client cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<Prefix>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn new(command: impl Into<String>, params: Vec<String>) -> IrcMessage {
        IrcMessage {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    pub fn with_prefix(mut self, prefix: Prefix) -> IrcMessage {
        self.prefix = Some(prefix);
        self
    }

    /// If `command` is a three-digit numeric reply, its value.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Parse one already-framed line (no CR, LF, or terminator bytes).
    pub fn parse(line: &str) -> Result<IrcMessage, ParseError> {
        let mut rest = line;

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            match stripped.find(' ') {
                Some(idx) => {
                    let raw_prefix = &stripped[..idx];
                    rest = stripped[idx + 1..].trim_start_matches(' ');
                    Some(Prefix::parse(raw_prefix))
                }
                None => return Err(ParseError::UnterminatedPrefix),
            }
        } else {
            None
        };

        let (command, after_command) = match rest.find(' ') {
            Some(idx) => (&rest[..idx], rest[idx + 1..].trim_start_matches(' ')),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        Ok(IrcMessage {
            prefix,
            command: command.to_ascii_uppercase(),
            params: parse_params(after_command),
        })
    }

    /// Serialize to the wire form, including the trailing CRLF.
    pub fn serialize(&self) -> Result<String, MessageError> {
        if self.command.is_empty() {
            return Err(MessageError::EmptyCommand);
        }
        if self
            .command
            .bytes()
            .any(|b| b == b' ' || b == b'\r' || b == b'\n' || b == 0)
        {
            return Err(MessageError::InvalidCommand);
        }
        if self.params.len() > MAX_PARAMS {
            return Err(MessageError::TooManyParameters);
        }

        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push(':');
            out.push_str(&prefix.to_string());
            out.push(' ');
        }
        out.push_str(&self.command.to_ascii_uppercase());

        let last = self.params.len().checked_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if param.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) {
                return Err(MessageError::ForbiddenChar);
            }
            let needs_trailing = param.is_empty() || param.contains(' ') || param.starts_with(':');
            if needs_trailing {
                if Some(i) != last {
                    return Err(MessageError::InvalidMiddleParameter);
                }
                out.push_str(" :");
                out.push_str(param);
            } else {
                out.push(' ');
                out.push_str(param);
            }
        }
        out.push_str("\r\n");

        if out.len() > MAX_LINE_LEN {
            return Err(MessageError::LineTooLong);
        }
        Ok(out)
    }
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.serialize() {
            Ok(line) => f.write_str(line.trim_end_matches("\r\n")),
            Err(e) => write!(f, "<invalid message: {e}>"),
        }
    }
}

/// Split the text following the command into up to [`MAX_PARAMS`] parameters.
/// Once the 15th parameter is reached the rest of the line is taken verbatim,
/// `:` or not, matching the grammar's trailing-parameter shortcut.
fn parse_params(rest: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut s = rest;
    loop {
        if s.is_empty() {
            break;
        }
        if params.len() == MAX_PARAMS - 1 {
            params.push(s.strip_prefix(':').unwrap_or(s).to_owned());
            break;
        }
        if let Some(trailing) = s.strip_prefix(':') {
            params.push(trailing.to_owned());
            break;
        }
        match s.find(' ') {
            Some(idx) => {
                params.push(s[..idx].to_owned());
                s = s[idx + 1..].trim_start_matches(' ');
            }
            None => {
                params.push(s.to_owned());
                break;
            }
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_command_and_trailing() {
        let msg = IrcMessage::parse(":nick!user@host PRIVMSG #rust :hello there").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#rust".to_string(), "hello there".to_string()]);
        assert_eq!(msg.prefix.unwrap().nick(), Some("nick"));
    }

    #[test]
    fn parses_without_prefix_or_trailing() {
        let msg = IrcMessage::parse("NICK newnick").unwrap();
        assert!(msg.prefix.is_none());
        assert_eq!(msg.params, vec!["newnick".to_string()]);
    }

    #[test]
    fn command_without_params_parses() {
        let msg = IrcMessage::parse("PING").unwrap();
        assert_eq!(msg.command, "PING");
        assert!(msg.params.is_empty());
    }

    #[test]
    fn rejects_unterminated_prefix() {
        assert_eq!(IrcMessage::parse(":onlyprefix"), Err(ParseError::UnterminatedPrefix));
    }

    #[test]
    fn numeric_command_is_recognised() {
        let msg = IrcMessage::parse(":irc.example.net 001 nick :Welcome").unwrap();
        assert_eq!(msg.numeric(), Some(1));
    }

    #[test]
    fn more_than_fifteen_params_fold_into_the_last() {
        let params: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        let line = format!("CMD {}", params.join(" "));
        let msg = IrcMessage::parse(&line).unwrap();
        assert_eq!(msg.params.len(), 15);
        assert_eq!(msg.params[14], "14 15 16 17 18 19");
    }

    #[test]
    fn serialize_picks_trailing_form_when_needed() {
        let msg = IrcMessage::new("PRIVMSG", vec!["#rust".into(), "hello there".into()]);
        assert_eq!(msg.serialize().unwrap(), "PRIVMSG #rust :hello there\r\n");
    }

    #[test]
    fn serialize_rejects_middle_param_needing_trailing_form() {
        let msg = IrcMessage::new("PRIVMSG", vec!["has space".into(), "#rust".into()]);
        assert_eq!(msg.serialize(), Err(MessageError::InvalidMiddleParameter));
    }

    #[test]
    fn serialize_uppercases_command() {
        let msg = IrcMessage::new("join", vec!["#rust".into()]);
        assert_eq!(msg.serialize().unwrap(), "JOIN #rust\r\n");
    }

    #[test]
    fn serialize_rejects_too_many_params() {
        let msg = IrcMessage::new("CMD", vec!["x".into(); 16]);
        assert_eq!(msg.serialize(), Err(MessageError::TooManyParameters));
    }

    #[test]
    fn serialize_rejects_line_over_512_bytes() {
        let msg = IrcMessage::new("PRIVMSG", vec!["#rust".into(), "a".repeat(510)]);
        assert_eq!(msg.serialize(), Err(MessageError::LineTooLong));
    }
}

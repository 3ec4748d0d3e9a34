//! IRC message parsing and serialization.
//!
//! Implements the RFC 2812 message shape:
//!   [`:`prefix SPACE] command [SPACE params] [SPACE `:` trailing]
//!
//! Messages are terminated by CR-LF (`\r\n`) on the wire, but parsing
//! operates on the content without the terminator. The trailing parameter
//! is kept apart from the middle parameters: registration reads the real
//! name from it, and replies that echo a request must preserve the
//! distinction.

use std::fmt;

/// A parsed IRC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Optional prefix (server name or `nick!account@host`).
    pub prefix: Option<String>,
    /// The command (e.g. `NICK`, `USER`, `001`).
    pub command: String,
    /// Middle parameters. Never contain spaces.
    pub params: Vec<String>,
    /// Trailing parameter: free text, may contain spaces.
    pub trailing: Option<String>,
}

/// Errors that can occur during message parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("prefix without a command")]
    MissingCommand,
}

impl Message {
    /// Parse a single IRC message from a line (without the trailing `\r\n`).
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut rest = input.trim_end_matches("\r\n");
        if rest.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut prefix = None;
        if let Some(tail) = rest.strip_prefix(':') {
            // Prefix runs until the first space.
            let (name, tail) = tail.split_once(' ').ok_or(ParseError::MissingCommand)?;
            prefix = Some(name.to_owned());
            rest = tail;
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        let mut params = Vec::new();
        let mut trailing = None;
        while !rest.is_empty() {
            if let Some(text) = rest.strip_prefix(':') {
                // Everything after the colon, spaces included.
                trailing = Some(text.to_owned());
                break;
            }
            let (param, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            params.push(param.to_owned());
            rest = tail;
        }

        Ok(Message {
            prefix,
            command: command.to_owned(),
            params,
            trailing,
        })
    }
}

impl fmt::Display for Message {
    /// The wire form, without the terminating `\r\n`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        if let Some(trailing) = &self.trailing {
            write!(f, " :{trailing}")?;
        }
        Ok(())
    }
}

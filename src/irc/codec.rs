//! IRC line codec: frames a TCP byte stream into IRC messages.
//!
//! Splits on `\r\n` (per RFC 2812), parses each line into a [`Message`],
//! and serializes outgoing messages with `\r\n` termination.

use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::message::{Message, ParseError};

/// Maximum line length (including `\r\n`), per RFC 2812.
const MAX_LINE_LENGTH: usize = 512;

/// Codec error: either a protocol parse failure or an I/O error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("line longer than {MAX_LINE_LENGTH} bytes")]
    LineTooLong,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A tokio codec that frames IRC messages on `\r\n` boundaries.
#[derive(Debug, Default)]
pub struct IrcCodec;

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        match src.windows(2).position(|w| w == b"\r\n") {
            Some(pos) => {
                // Take the frame including its terminator, parse without it.
                let frame = src.split_to(pos + 2);
                let line = std::str::from_utf8(&frame[..pos])
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(Message::parse(line)?))
            }
            None if src.len() > MAX_LINE_LENGTH => Err(CodecError::LineTooLong),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let wire = item.to_string();
        dst.reserve(wire.len() + 2);
        dst.extend_from_slice(wire.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

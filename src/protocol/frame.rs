use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{CoordinatorError, Result};

/// Largest accepted frame body (tag plus payload).
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

const HEADER_LEN: usize = 4;
const TAG_TEXT: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_BOOLEAN: u8 = 0x03;

/// A typed value carried by one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

/// Frame layout: `u32` big-endian body length, then the body: a one byte
/// type tag followed by the payload.
///
/// | tag  | payload                 |
/// |------|-------------------------|
/// | 0x01 | UTF-8 text              |
/// | 0x02 | `i64` big-endian        |
/// | 0x03 | one byte, 0 or 1        |
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Value;
    type Error = CoordinatorError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len == 0 {
            return Err(CoordinatorError::Protocol("empty frame".to_string()));
        }
        if len > MAX_FRAME_LENGTH {
            return Err(CoordinatorError::FrameTooLarge(len));
        }
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let mut body = src.split_to(len);
        let tag = body.get_u8();
        let value = match tag {
            TAG_TEXT => String::from_utf8(body.to_vec())
                .map(Value::Text)
                .map_err(|_| CoordinatorError::Protocol("text is not valid UTF-8".to_string()))?,
            TAG_INTEGER => {
                if body.len() != 8 {
                    return Err(payload_size(tag, body.len()));
                }
                Value::Integer(body.get_i64())
            }
            TAG_BOOLEAN => {
                if body.len() != 1 {
                    return Err(payload_size(tag, body.len()));
                }
                match body.get_u8() {
                    0 => Value::Boolean(false),
                    1 => Value::Boolean(true),
                    other => {
                        return Err(CoordinatorError::Protocol(format!(
                            "invalid boolean byte {:#04x}",
                            other
                        )))
                    }
                }
            }
            other => return Err(CoordinatorError::UnknownTag(other)),
        };
        Ok(Some(value))
    }
}

fn payload_size(tag: u8, len: usize) -> CoordinatorError {
    CoordinatorError::Protocol(format!("tag {:#04x} with {} byte payload", tag, len))
}

impl Encoder<Value> for FrameCodec {
    type Error = CoordinatorError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<()> {
        match item {
            Value::Text(text) => {
                let len = 1 + text.len();
                if len > MAX_FRAME_LENGTH {
                    return Err(CoordinatorError::FrameTooLarge(len));
                }
                dst.reserve(HEADER_LEN + len);
                dst.put_u32(len as u32);
                dst.put_u8(TAG_TEXT);
                dst.put_slice(text.as_bytes());
            }
            Value::Integer(n) => {
                dst.reserve(HEADER_LEN + 9);
                dst.put_u32(9);
                dst.put_u8(TAG_INTEGER);
                dst.put_i64(n);
            }
            Value::Boolean(b) => {
                dst.reserve(HEADER_LEN + 2);
                dst.put_u32(2);
                dst.put_u8(TAG_BOOLEAN);
                dst.put_u8(u8::from(b));
            }
        }
        Ok(())
    }
}

//! Decoder for the pickle (protocol 2) subset used by Graphite batch senders.
//!
//! The decoder is a small stack machine: every opcode is a transition on an
//! operand stack and a memo table. Only the opcodes needed to carry
//! `[(path, (timestamp, value)), ...]` batches are supported; anything else
//! fails with [`DecodeError::UnknownOpcode`].
//!
//! # Example
//!
//! ```
//! use quarry_lib::pickle::{self, Value};
//!
//! let value = Value::List(vec![Value::Integer(1), Value::Float(2.5)]);
//! let bytes = pickle::encode(&value);
//! assert_eq!(pickle::decode(&bytes).unwrap(), value);
//! ```

pub mod decoder;
pub mod encoder;
pub mod opcodes;
pub mod value;

pub use decoder::{decode, Decoder};
pub use encoder::{encode, Encoder};
pub use opcodes::{Opcode, PROTOCOL_VERSION};
pub use value::Value;

use thiserror::Error;

/// Errors raised while decoding a pickle stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown opcode 0x{code:02x} at position {position}")]
    UnknownOpcode { code: u8, position: usize },

    #[error("truncated stream: needed {needed} bytes, {available} available")]
    TruncatedStream { needed: usize, available: usize },

    #[error("unsupported protocol version {version}")]
    InvalidVersionMarker { version: u8 },

    #[error("unknown memo key {0}")]
    UnknownMemoKey(u32),

    #[error("invalid memo key {0:?}")]
    InvalidMemoKey(String),

    #[error("no mark on the stack")]
    MissingMark,

    #[error("stack underflow: needed {needed} values, {available} available")]
    StackUnderflow { needed: usize, available: usize },

    #[error("stack is empty")]
    EmptyStack,

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("integer of {bytes} bytes does not fit in 64 bits")]
    IntegerOverflow { bytes: usize },

    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

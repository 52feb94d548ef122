//! Protocol 2 encoder for the value shapes the decoder understands.

use super::opcodes::{Opcode, PROTOCOL_VERSION};
use super::value::Value;
use bytes::BufMut;

/// Encode `value` as a complete stream: `PROTO 2`, the value, `STOP`.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.write(value);
    encoder.finish()
}

/// Incremental encoder.
#[derive(Debug)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// Start a stream with the protocol marker.
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.put_u8(Opcode::Proto.byte());
        buf.put_u8(PROTOCOL_VERSION);
        Self { buf }
    }

    /// Append the opcodes that push `value`.
    pub fn write(&mut self, value: &Value) {
        match value {
            Value::Integer(i) => self.write_int(*i),
            Value::Float(f) => {
                self.op(Opcode::BinFloat);
                self.buf.put_f64(*f);
            },
            Value::String(s) => {
                self.op(Opcode::BinUnicode);
                self.buf.put_u32_le(len32(s.len()));
                self.buf.put_slice(s.as_bytes());
            },
            Value::List(items) => {
                self.op(Opcode::EmptyList);
                if !items.is_empty() {
                    self.op(Opcode::Mark);
                    for item in items {
                        self.write(item);
                    }
                    self.op(Opcode::Appends);
                }
            },
            Value::Tuple(items) => match items.len() {
                0 => self.op(Opcode::EmptyTuple),
                1..=3 => {
                    for item in items {
                        self.write(item);
                    }
                    self.op(match items.len() {
                        1 => Opcode::Tuple1,
                        2 => Opcode::Tuple2,
                        _ => Opcode::Tuple3,
                    });
                },
                _ => {
                    self.op(Opcode::Mark);
                    for item in items {
                        self.write(item);
                    }
                    self.op(Opcode::Tuple);
                },
            },
            Value::Mark => self.op(Opcode::Mark),
            Value::None => self.op(Opcode::None),
        }
    }

    /// Terminate the stream and return its bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.op(Opcode::Stop);
        self.buf
    }

    fn op(&mut self, op: Opcode) {
        self.buf.put_u8(op.byte());
    }

    fn write_int(&mut self, i: i64) {
        if let Ok(b) = u8::try_from(i) {
            self.op(Opcode::BinInt1);
            self.buf.put_u8(b);
        } else if let Ok(w) = u16::try_from(i) {
            self.op(Opcode::BinInt2);
            self.buf.put_u16_le(w);
        } else if let Ok(d) = i32::try_from(i) {
            self.op(Opcode::BinInt);
            self.buf.put_i32_le(d);
        } else {
            self.op(Opcode::Long1);
            self.buf.put_u8(8);
            self.buf.put_i64_le(i);
        }
    }
}

fn len32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

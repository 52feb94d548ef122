//! Stack machine that rebuilds values from an opcode stream.

use super::opcodes::{Opcode, PROTOCOL_VERSION};
use super::value::Value;
use super::DecodeError;
use bytes::Buf;
use std::collections::HashMap;

type Result<T> = std::result::Result<T, DecodeError>;

/// Decode a complete pickle stream.
pub fn decode(input: &[u8]) -> Result<Value> {
    Decoder::new(input).decode()
}

/// Decoder over an in-memory byte slice.
///
/// The operand stack and memo table live for a single decode and are never
/// shared between connections.
#[derive(Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    position: usize,
    stack: Vec<Value>,
    memo: HashMap<u32, Value>,
    /// Memo keys whose value still sits on the stack, by slot. Appends to
    /// that slot are copied into the memo entry.
    pins: Vec<(usize, u32)>,
}

impl<'a> Decoder<'a> {
    /// Create a decoder over `input`.
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            position: 0,
            stack: Vec::new(),
            memo: HashMap::new(),
            pins: Vec::new(),
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left after the last consumed opcode.
    pub fn remaining(&self) -> usize {
        self.input.len()
    }

    /// Run opcodes until `STOP` or end of input and return the top of stack.
    pub fn decode(&mut self) -> Result<Value> {
        while let Some(&code) = self.input.first() {
            let position = self.position;
            self.advance(1);

            let op = Opcode::from_byte(code).ok_or(DecodeError::UnknownOpcode { code, position })?;
            if op == Opcode::Stop {
                break;
            }
            self.step(op)?;
        }

        self.stack.pop().ok_or(DecodeError::EmptyStack)
    }

    fn step(&mut self, op: Opcode) -> Result<()> {
        match op {
            Opcode::Proto => {
                let version = self.read_u8()?;
                if version != PROTOCOL_VERSION {
                    return Err(DecodeError::InvalidVersionMarker { version });
                }
            },
            Opcode::Stop => {},

            Opcode::Mark => self.stack.push(Value::Mark),
            Opcode::Pop => {
                self.pop()?;
            },
            Opcode::PopMark => {
                self.pop_to_mark()?;
            },
            Opcode::None => self.stack.push(Value::None),

            Opcode::BinInt => {
                let v = self.take(4)?.get_i32_le();
                self.stack.push(Value::Integer(i64::from(v)));
            },
            Opcode::BinInt1 => {
                let v = self.read_u8()?;
                self.stack.push(Value::Integer(i64::from(v)));
            },
            Opcode::BinInt2 => {
                let v = self.take(2)?.get_u16_le();
                self.stack.push(Value::Integer(i64::from(v)));
            },
            Opcode::Long1 => {
                let len = usize::from(self.read_u8()?);
                let v = self.read_long(len)?;
                self.stack.push(Value::Integer(v));
            },
            Opcode::BinFloat => {
                let v = self.take(8)?.get_f64();
                self.stack.push(Value::Float(v));
            },

            Opcode::BinString => {
                let len = self.read_len32()?;
                let raw = self.take(len)?;
                self.stack.push(Value::String(String::from_utf8_lossy(raw).into_owned()));
            },
            Opcode::ShortBinString => {
                let len = usize::from(self.read_u8()?);
                let raw = self.take(len)?;
                self.stack.push(Value::String(String::from_utf8_lossy(raw).into_owned()));
            },
            Opcode::BinUnicode => {
                let len = self.read_len32()?;
                let raw = self.take(len)?;
                let s = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
                self.stack.push(Value::String(s.to_owned()));
            },

            Opcode::EmptyList => self.stack.push(Value::List(Vec::new())),
            Opcode::EmptyTuple => self.stack.push(Value::Tuple(Vec::new())),
            Opcode::List => {
                let items = self.pop_to_mark()?;
                self.stack.push(Value::List(items));
            },
            Opcode::Tuple => {
                let items = self.pop_to_mark()?;
                self.stack.push(Value::Tuple(items));
            },
            Opcode::Tuple1 => self.build_tuple(1)?,
            Opcode::Tuple2 => self.build_tuple(2)?,
            Opcode::Tuple3 => self.build_tuple(3)?,
            Opcode::Append => {
                let item = self.pop()?;
                self.target_list()?.push(item);
                self.refresh_pins();
            },
            Opcode::Appends => {
                let items = self.pop_to_mark()?;
                self.target_list()?.extend(items);
                self.refresh_pins();
            },

            Opcode::Put => {
                let key = self.read_text_key()?;
                self.memo_put(key)?;
            },
            Opcode::BinPut => {
                let key = u32::from(self.read_u8()?);
                self.memo_put(key)?;
            },
            Opcode::LongBinPut => {
                let key = self.take(4)?.get_u32_le();
                self.memo_put(key)?;
            },
            Opcode::Get => {
                let key = self.read_text_key()?;
                self.memo_get(key)?;
            },
            Opcode::BinGet => {
                let key = u32::from(self.read_u8()?);
                self.memo_get(key)?;
            },
            Opcode::LongBinGet => {
                let key = self.take(4)?.get_u32_le();
                self.memo_get(key)?;
            },
        }
        Ok(())
    }

    fn advance(&mut self, n: usize) {
        self.input = &self.input[n..];
        self.position += n;
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.input.len() < n {
            return Err(DecodeError::TruncatedStream {
                needed: n,
                available: self.input.len(),
            });
        }
        let (head, tail) = self.input.split_at(n);
        self.input = tail;
        self.position += n;
        Ok(head)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?.get_u8())
    }

    fn read_len32(&mut self) -> Result<usize> {
        let len = self.take(4)?.get_u32_le();
        usize::try_from(len).map_err(|_| DecodeError::TruncatedStream {
            needed: usize::MAX,
            available: self.input.len(),
        })
    }

    /// Little-endian two's complement integer of `len` bytes.
    fn read_long(&mut self, len: usize) -> Result<i64> {
        let raw = self.take(len)?;
        if len > 8 {
            return Err(DecodeError::IntegerOverflow { bytes: len });
        }
        let Some(&last) = raw.last() else {
            return Ok(0);
        };
        let mut buf = if last & 0x80 == 0 { [0u8; 8] } else { [0xffu8; 8] };
        buf[..len].copy_from_slice(raw);
        Ok(i64::from_le_bytes(buf))
    }

    /// Newline-terminated decimal memo key.
    fn read_text_key(&mut self) -> Result<u32> {
        let end = self
            .input
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(DecodeError::TruncatedStream {
                needed: self.input.len() + 1,
                available: self.input.len(),
            })?;
        let line = self.take(end + 1)?;
        let text = std::str::from_utf8(&line[..end]).map_err(|_| DecodeError::InvalidUtf8)?;
        text.trim()
            .parse()
            .map_err(|_| DecodeError::InvalidMemoKey(text.to_owned()))
    }

    fn pop(&mut self) -> Result<Value> {
        let value = self.stack.pop().ok_or(DecodeError::StackUnderflow {
            needed: 1,
            available: 0,
        })?;
        self.release_pins();
        Ok(value)
    }

    /// Index of the most recent mark, scanning from the top down.
    fn marker(&self) -> Result<usize> {
        self.stack
            .iter()
            .rposition(|v| matches!(v, Value::Mark))
            .ok_or(DecodeError::MissingMark)
    }

    /// Remove everything above the most recent mark, and the mark itself.
    fn pop_to_mark(&mut self) -> Result<Vec<Value>> {
        let k = self.marker()?;
        let items = self.stack.split_off(k + 1);
        self.stack.truncate(k);
        self.release_pins();
        Ok(items)
    }

    fn build_tuple(&mut self, arity: usize) -> Result<()> {
        let available = self.stack.len();
        if available < arity {
            return Err(DecodeError::StackUnderflow {
                needed: arity,
                available,
            });
        }
        let items = self.stack.split_off(available - arity);
        self.release_pins();
        self.stack.push(Value::Tuple(items));
        Ok(())
    }

    /// The list an append opcode extends: the value now on top of the stack.
    fn target_list(&mut self) -> Result<&mut Vec<Value>> {
        match self.stack.last_mut() {
            Some(Value::List(items)) => Ok(items),
            Some(other) => Err(DecodeError::TypeMismatch {
                expected: "list",
                found: other.type_name(),
            }),
            None => Err(DecodeError::StackUnderflow {
                needed: 1,
                available: 0,
            }),
        }
    }

    fn memo_put(&mut self, key: u32) -> Result<()> {
        let top = self.stack.last().ok_or(DecodeError::EmptyStack)?;
        self.memo.insert(key, top.clone());
        self.pins.retain(|&(_, pinned)| pinned != key);
        self.pins.push((self.stack.len() - 1, key));
        Ok(())
    }

    /// Copy the list on top of the stack into every memo entry put from
    /// that slot.
    fn refresh_pins(&mut self) {
        let Some(top) = self.stack.last() else {
            return;
        };
        let slot = self.stack.len() - 1;
        for &(pinned, key) in &self.pins {
            if pinned == slot {
                self.memo.insert(key, top.clone());
            }
        }
    }

    /// Forget pins for slots that have left the stack.
    fn release_pins(&mut self) {
        let len = self.stack.len();
        self.pins.retain(|&(slot, _)| slot < len);
    }

    fn memo_get(&mut self, key: u32) -> Result<()> {
        let value = self.memo.get(&key).ok_or(DecodeError::UnknownMemoKey(key))?;
        self.stack.push(value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pickle::encode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalars_round_trip() {
        for value in [
            Value::Integer(0),
            Value::Integer(255),
            Value::Integer(256),
            Value::Integer(65_535),
            Value::Integer(65_536),
            Value::Integer(-1),
            Value::Integer(1_700_000_000),
            Value::Integer(i64::MAX),
            Value::Integer(i64::MIN),
            Value::Float(0.42),
            Value::Float(-1.5e300),
            Value::String("servers.web1.load".into()),
            Value::String(String::new()),
            Value::None,
        ] {
            assert_eq!(decode(&encode(&value)).unwrap(), value);
        }
    }

    #[test]
    fn test_binint_is_signed_32_bit() {
        // BININT 0xffffffff is -1, not 4294967295.
        let bytes = [b'J', 0xff, 0xff, 0xff, 0xff, b'.'];
        assert_eq!(decode(&bytes).unwrap(), Value::Integer(-1));

        let bytes = [b'J', 0x00, 0x00, 0x00, 0x80, b'.'];
        assert_eq!(decode(&bytes).unwrap(), Value::Integer(i64::from(i32::MIN)));
    }

    #[test]
    fn test_small_ints_are_unsigned() {
        assert_eq!(decode(&[b'K', 0xff, b'.']).unwrap(), Value::Integer(255));
        assert_eq!(decode(&[b'M', 0xff, 0xff, b'.']).unwrap(), Value::Integer(65_535));
    }

    #[test]
    fn test_binfloat_is_big_endian() {
        let mut bytes = vec![b'G'];
        bytes.extend_from_slice(&2.5f64.to_be_bytes());
        bytes.push(b'.');
        assert_eq!(decode(&bytes).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn test_long1() {
        assert_eq!(decode(&[0x8a, 0x00, b'.']).unwrap(), Value::Integer(0));
        assert_eq!(decode(&[0x8a, 0x01, 0xff, b'.']).unwrap(), Value::Integer(-1));
        assert_eq!(
            decode(&[0x8a, 0x05, 0x00, 0x00, 0x00, 0x00, 0x01, b'.']).unwrap(),
            Value::Integer(1 << 32)
        );
        let mut too_long = vec![0x8a, 9];
        too_long.extend_from_slice(&[0; 9]);
        assert_eq!(decode(&too_long), Err(DecodeError::IntegerOverflow { bytes: 9 }));
    }

    #[test]
    fn test_marked_list_preserves_order() {
        let bytes = [b'(', b'K', 1, b'K', 2, b'K', 3, b'l', b'.'];
        assert_eq!(
            decode(&bytes).unwrap(),
            Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
    }

    #[test]
    fn test_empty_marked_list() {
        assert_eq!(decode(b"(l.").unwrap(), Value::List(vec![]));
        assert_eq!(decode(b"(t.").unwrap(), Value::Tuple(vec![]));
    }

    #[test]
    fn test_fixed_tuples() {
        let bytes = [b'K', 1, b'K', 2, 0x86, b'.'];
        assert_eq!(
            decode(&bytes).unwrap(),
            Value::Tuple(vec![Value::Integer(1), Value::Integer(2)])
        );
        assert_eq!(
            decode(&[b'K', 1, 0x87, b'.']),
            Err(DecodeError::StackUnderflow {
                needed: 3,
                available: 1
            })
        );
    }

    #[test]
    fn test_appends_extends_list_below_mark() {
        let bytes = [b']', b'(', b'K', 1, b'K', 2, b'e', b'(', b'K', 3, b'e', b'.'];
        assert_eq!(
            decode(&bytes).unwrap(),
            Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
    }

    #[test]
    fn test_append_single() {
        let bytes = [b']', b'K', 7, b'a', b'.'];
        assert_eq!(decode(&bytes).unwrap(), Value::List(vec![Value::Integer(7)]));
    }

    #[test]
    fn test_appends_requires_list_target() {
        let bytes = [b'K', 1, b'(', b'K', 2, b'e', b'.'];
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::TypeMismatch {
                expected: "list",
                found: "integer"
            })
        );
    }

    #[test]
    fn test_missing_mark_is_typed_error() {
        assert_eq!(decode(&[b'K', 1, b'l', b'.']), Err(DecodeError::MissingMark));
        assert_eq!(decode(&[b']', b'K', 1, b'e', b'.']), Err(DecodeError::MissingMark));
    }

    #[test]
    fn test_memo_put_get() {
        // "abc" memoised as 1, fetched back with every key width.
        let mut bytes = vec![b'U', 3, b'a', b'b', b'c', b'q', 1, b'0'];
        bytes.extend_from_slice(&[b'h', 1]);
        bytes.extend_from_slice(&[b'j', 1, 0, 0, 0]);
        bytes.extend_from_slice(b"g1\n");
        bytes.extend_from_slice(&[0x87, b'.']);

        let abc = Value::String("abc".into());
        assert_eq!(
            decode(&bytes).unwrap(),
            Value::Tuple(vec![abc.clone(), abc.clone(), abc])
        );
    }

    #[test]
    fn test_memo_put_keeps_top_of_stack() {
        let bytes = [b'K', 9, b'r', 5, 0, 0, 0, b'.'];
        assert_eq!(decode(&bytes).unwrap(), Value::Integer(9));

        let bytes = b"K\x09p12\ng12\n\x86.";
        assert_eq!(
            decode(bytes).unwrap(),
            Value::Tuple(vec![Value::Integer(9), Value::Integer(9)])
        );
    }

    #[test]
    fn test_memoised_list_sees_later_appends() {
        // dp = [100, 1]; [("a", dp), ("b", dp)] as a protocol 2 pickler
        // writes it: dp is memoised while still empty.
        let bytes = b"\x80\x02]q\x00(X\x01\x00\x00\x00aq\x01]q\x02(KdK\x01e\x86q\x03\
X\x01\x00\x00\x00bq\x04h\x02\x86q\x05e.";

        let dp = Value::List(vec![Value::Integer(100), Value::Integer(1)]);
        assert_eq!(
            decode(bytes).unwrap(),
            Value::List(vec![
                Value::Tuple(vec![Value::String("a".into()), dp.clone()]),
                Value::Tuple(vec![Value::String("b".into()), dp]),
            ])
        );
    }

    #[test]
    fn test_popped_list_no_longer_tracks_its_slot() {
        // The list memoised as 1 is popped; a new list in the same slot is
        // appended to and must not leak into memo entry 1.
        let bytes = b"]q\x010]K\x05ah\x01\x86.";
        assert_eq!(
            decode(bytes).unwrap(),
            Value::Tuple(vec![
                Value::List(vec![Value::Integer(5)]),
                Value::List(Vec::new()),
            ])
        );
    }

    #[test]
    fn test_unknown_memo_key() {
        assert_eq!(decode(&[b'h', 4, b'.']), Err(DecodeError::UnknownMemoKey(4)));
        assert_eq!(
            decode(b"gabc\n."),
            Err(DecodeError::InvalidMemoKey("abc".into()))
        );
    }

    #[test]
    fn test_unknown_opcode_reports_position() {
        let bytes = [0x80, 2, b'K', 1, b'R', b'.'];
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::UnknownOpcode {
                code: b'R',
                position: 4
            })
        );
    }

    #[test]
    fn test_version_marker() {
        assert_eq!(decode(&[0x80, 2, b'N', b'.']).unwrap(), Value::None);
        assert_eq!(
            decode(&[0x80, 4, b'N', b'.']),
            Err(DecodeError::InvalidVersionMarker { version: 4 })
        );
        assert_eq!(
            decode(&[0x80]),
            Err(DecodeError::TruncatedStream {
                needed: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_truncated_operands() {
        assert_eq!(
            decode(&[b'J', 1, 2]),
            Err(DecodeError::TruncatedStream {
                needed: 4,
                available: 2
            })
        );
        assert_eq!(
            decode(&[b'X', 10, 0, 0, 0, b'a']),
            Err(DecodeError::TruncatedStream {
                needed: 10,
                available: 1
            })
        );
    }

    #[test]
    fn test_stop_on_empty_stack_fails() {
        assert_eq!(decode(b"."), Err(DecodeError::EmptyStack));
        assert_eq!(decode(b""), Err(DecodeError::EmptyStack));
    }

    #[test]
    fn test_end_of_stream_acts_as_stop() {
        assert_eq!(decode(&[b'K', 5]).unwrap(), Value::Integer(5));
    }

    #[test]
    fn test_position_stops_at_stop() {
        let bytes = [b'K', 5, b'.', b'N'];
        let mut decoder = Decoder::new(&bytes);
        assert_eq!(decoder.decode().unwrap(), Value::Integer(5));
        assert_eq!(decoder.position(), 3);
        assert_eq!(decoder.remaining(), 1);
    }

    #[test]
    fn test_invalid_unicode() {
        assert_eq!(decode(&[b'X', 1, 0, 0, 0, 0xff, b'.']), Err(DecodeError::InvalidUtf8));
    }
}

//! Opcode table for the supported pickle subset.

/// The only protocol version accepted by a `PROTO` opcode.
pub const PROTOCOL_VERSION: u8 = 2;

/// Supported opcodes, keyed by their wire byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Mark = b'(',
    Stop = b'.',
    Pop = b'0',
    PopMark = b'1',
    None = b'N',
    BinFloat = b'G',
    BinInt = b'J',
    BinInt1 = b'K',
    BinInt2 = b'M',
    BinString = b'T',
    ShortBinString = b'U',
    BinUnicode = b'X',
    Append = b'a',
    Appends = b'e',
    Get = b'g',
    BinGet = b'h',
    LongBinGet = b'j',
    List = b'l',
    EmptyList = b']',
    Put = b'p',
    BinPut = b'q',
    LongBinPut = b'r',
    Tuple = b't',
    EmptyTuple = b')',
    Proto = 0x80,
    Tuple1 = 0x85,
    Tuple2 = 0x86,
    Tuple3 = 0x87,
    Long1 = 0x8a,
}

impl Opcode {
    /// Look up the opcode for a wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let op = match byte {
            b'(' => Opcode::Mark,
            b'.' => Opcode::Stop,
            b'0' => Opcode::Pop,
            b'1' => Opcode::PopMark,
            b'N' => Opcode::None,
            b'G' => Opcode::BinFloat,
            b'J' => Opcode::BinInt,
            b'K' => Opcode::BinInt1,
            b'M' => Opcode::BinInt2,
            b'T' => Opcode::BinString,
            b'U' => Opcode::ShortBinString,
            b'X' => Opcode::BinUnicode,
            b'a' => Opcode::Append,
            b'e' => Opcode::Appends,
            b'g' => Opcode::Get,
            b'h' => Opcode::BinGet,
            b'j' => Opcode::LongBinGet,
            b'l' => Opcode::List,
            b']' => Opcode::EmptyList,
            b'p' => Opcode::Put,
            b'q' => Opcode::BinPut,
            b'r' => Opcode::LongBinPut,
            b't' => Opcode::Tuple,
            b')' => Opcode::EmptyTuple,
            0x80 => Opcode::Proto,
            0x85 => Opcode::Tuple1,
            0x86 => Opcode::Tuple2,
            0x87 => Opcode::Tuple3,
            0x8a => Opcode::Long1,
            _ => return None,
        };
        Some(op)
    }

    /// Wire byte of this opcode.
    pub fn byte(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_lookup_is_inverse() {
        for op in [
            Opcode::Mark,
            Opcode::Stop,
            Opcode::BinFloat,
            Opcode::BinUnicode,
            Opcode::Appends,
            Opcode::LongBinGet,
            Opcode::Proto,
            Opcode::Tuple3,
            Opcode::Long1,
        ] {
            assert_eq!(Opcode::from_byte(op.byte()), Some(op));
        }
    }

    #[test]
    fn test_unsupported_bytes() {
        // FRAME (protocol 4), REDUCE and GLOBAL are outside the subset.
        assert_eq!(Opcode::from_byte(0x95), None);
        assert_eq!(Opcode::from_byte(b'R'), None);
        assert_eq!(Opcode::from_byte(b'c'), None);
    }
}

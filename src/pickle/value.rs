//! Values produced by the decoder.

/// A decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Any integer opcode, widened to 64 bits
    Integer(i64),
    /// `BINFLOAT`
    Float(f64),
    /// Byte or unicode string
    String(String),
    /// Mutable sequence
    List(Vec<Value>),
    /// Fixed-arity sequence
    Tuple(Vec<Value>),
    /// Scan boundary pushed by `MARK`
    Mark,
    /// `NONE`
    None,
}

impl Value {
    /// Name of the variant, used in type mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Mark => "mark",
            Value::None => "none",
        }
    }

    /// Borrow the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric payload normalised to a float; integers are converted.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

use vecx::{HandleVector, Vector};

/// A live instance of whatever a [`crate::Descriptor`] describes (spec §3).
/// `Array` is backed by the *vector adapter*, `HandleArray` by the
/// *handle-vector adapter* (spec §4.3) — both built on the same growable
/// containers the loop and handle-vector modules use.
#[derive(Debug, Clone)]
pub enum Value {
    UInt(u64),
    Int(i64),
    Bool(bool),
    Double(f64),
    OwnedString(Option<String>),
    BorrowedString(Option<&'static str>),
    Pointer(Option<Box<Value>>),
    Struct(Vec<Value>),
    Array(Vector<Value>),
    HandleArray(HandleVector<u64>),
    Enum(i64),
}

impl Default for Value {
    fn default() -> Self {
        Value::UInt(0)
    }
}

impl Value {
    /// Widens any integer-shaped variant (including enum and bool) to
    /// `i64`, the width `to_str`/`from_str` key against (spec §4.3
    /// `get_as_int64`).
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::UInt(v) => Some(*v as i64),
            Value::Int(v) => Some(*v),
            Value::Bool(v) => Some(*v as i64),
            Value::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn set_as_int64(&mut self, raw: i64) {
        match self {
            Value::UInt(v) => *v = raw as u64,
            Value::Int(v) => *v = raw,
            Value::Bool(v) => *v = raw != 0,
            Value::Enum(v) => *v = raw,
            _ => {}
        }
    }
}

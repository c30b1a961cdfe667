//! Runtime values for packing/unpacking frames (reference codec representation).

use crate::types::ElementType;

/// A single element value: one scalar, a fixed-length array, or a string.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    Bool(bool),
    /// One byte character.
    Char(u8),
    /// Raw string bytes, without terminator.
    String(Vec<u8>),
    Array(Vec<Value>),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(s.as_bytes().to_vec())
    }

    /// Element type this scalar encodes as; `None` for arrays.
    pub fn element_type(&self) -> Option<ElementType> {
        Some(match self {
            Value::Int8(_) => ElementType::Int8,
            Value::Uint8(_) => ElementType::Uint8,
            Value::Int16(_) => ElementType::Int16,
            Value::Uint16(_) => ElementType::Uint16,
            Value::Int32(_) => ElementType::Int32,
            Value::Uint32(_) => ElementType::Uint32,
            Value::Int64(_) => ElementType::Int64,
            Value::Uint64(_) => ElementType::Uint64,
            Value::Float32(_) => ElementType::Float32,
            Value::Bool(_) => ElementType::Bool,
            Value::Char(_) => ElementType::Char,
            Value::String(_) => ElementType::String,
            Value::Array(_) => return None,
        })
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint8(x) => Some(*x as u64),
            Value::Uint16(x) => Some(*x as u64),
            Value::Uint32(x) => Some(*x as u64),
            Value::Uint64(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(x) => Some(*x as i64),
            Value::Int16(x) => Some(*x as i64),
            Value::Int32(x) => Some(*x as i64),
            Value::Int64(x) => Some(*x),
            Value::Uint8(x) => Some(*x as i64),
            Value::Uint16(x) => Some(*x as i64),
            Value::Uint32(x) => Some(*x as i64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float32(x) => Some(*x),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_widen_integers() {
        assert_eq!(Value::Uint16(7).as_u64(), Some(7));
        assert_eq!(Value::Int8(-7).as_u64(), None);
        assert_eq!(Value::Int8(-7).as_i64(), Some(-7));
        assert_eq!(Value::Uint32(u32::MAX).as_i64(), Some(u32::MAX as i64));
        assert_eq!(Value::Uint64(1).as_i64(), None);
        assert_eq!(Value::Float32(0.5).as_f32(), Some(0.5));
    }

    #[test]
    fn strings_and_arrays() {
        let s = Value::string("ab");
        assert_eq!(s.as_bytes(), Some(&b"ab"[..]));
        assert_eq!(s.element_type(), Some(ElementType::String));
        let a = Value::Array(vec![Value::Bool(true)]);
        assert_eq!(a.as_list().map(|l| l.len()), Some(1));
        assert_eq!(a.element_type(), None);
        assert_eq!(Value::Char(b'x').element_type(), Some(ElementType::Char));
    }
}

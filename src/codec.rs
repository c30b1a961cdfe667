//! Reference codec: executes the marshalling statements of [`crate::emit::ir`]
//! over a byte buffer.
//!
//! This is the executable meaning of what every backend emits. Multi-byte
//! values are little-endian; strings are truncated to their declared length on
//! write and zero-padded when shorter, and read back up to the first NUL.

use crate::emit::ir::{lower_pack, lower_unpack, Cond, Item, Stmt};
use crate::layout::{FieldSlot, PacketLayout};
use crate::schema::{Element, Packet};
use crate::types::ElementType;
use crate::value::Value;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("missing value for field {0}")]
    MissingField(String),
    #[error("field {field}: expected {expected} value")]
    TypeMismatch { field: String, expected: ElementType },
    #[error("field {field}: expected {expected} items, got {actual}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },
    #[error("frame too short: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("frame length {actual} does not match expected {expected}")]
    FrameLength { expected: usize, actual: usize },
    #[error("function id {actual} does not match expected {expected}")]
    FunctionMismatch { expected: u8, actual: u8 },
    #[error("statement not valid in a {0} program")]
    Program(&'static str),
}

/// Write `values` into `frame` by running a pack program.
pub fn pack(program: &[Stmt<'_>], values: &HashMap<String, Value>, frame: &mut [u8]) -> Result<(), CodecError> {
    for stmt in program {
        pack_stmt(stmt, values, frame, 0)?;
    }
    Ok(())
}

/// Read values out of `frame` by running an unpack program.
pub fn unpack(program: &[Stmt<'_>], frame: &[u8]) -> Result<HashMap<String, Value>, CodecError> {
    let mut out = HashMap::new();
    for stmt in program {
        unpack_stmt(stmt, frame, &mut out, 0)?;
    }
    Ok(out)
}

fn pack_stmt(stmt: &Stmt<'_>, values: &HashMap<String, Value>, frame: &mut [u8], i: usize) -> Result<(), CodecError> {
    match stmt {
        Stmt::Put { field, item, at } => {
            let value = lookup(values, field)?;
            let offset = at.resolve(i);
            match item {
                Item::Scalar => write_scalar(field, value, frame, offset),
                Item::Indexed => {
                    let v = item_at(field, value, i)?;
                    write_scalar(field, &v, frame, offset)
                }
            }
        }
        Stmt::PutZero { at } => {
            bytes_mut(frame, at.resolve(i), 1)?[0] = 0;
            Ok(())
        }
        Stmt::Loop { count, body } => {
            for j in 0..*count {
                for s in body {
                    pack_stmt(s, values, frame, j)?;
                }
            }
            Ok(())
        }
        Stmt::Branch { cond, then, otherwise } => {
            let taken = match cond {
                Cond::WithinString(field) => {
                    let bytes = lookup(values, field)?.as_bytes().ok_or_else(|| CodecError::TypeMismatch {
                        field: field.name.clone(),
                        expected: ElementType::String,
                    })?;
                    i < bytes.len()
                }
            };
            for s in if taken { then } else { otherwise } {
                pack_stmt(s, values, frame, i)?;
            }
            Ok(())
        }
        Stmt::Get { .. } | Stmt::GetString { .. } => Err(CodecError::Program("pack")),
    }
}

fn unpack_stmt(stmt: &Stmt<'_>, frame: &[u8], out: &mut HashMap<String, Value>, i: usize) -> Result<(), CodecError> {
    match stmt {
        Stmt::Get { field, item, at } => {
            let v = read_scalar(field.ty, frame, at.resolve(i))?;
            match item {
                Item::Scalar => {
                    out.insert(field.name.clone(), v);
                }
                Item::Indexed => {
                    let entry = out
                        .entry(field.name.clone())
                        .or_insert_with(|| Value::Array(Vec::with_capacity(field.cardinality)));
                    if let Value::Array(items) = entry {
                        items.push(v);
                    }
                }
            }
            Ok(())
        }
        Stmt::GetString { field, at, len } => {
            let raw = bytes(frame, at.resolve(i), *len)?;
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            out.insert(field.name.clone(), Value::String(raw[..end].to_vec()));
            Ok(())
        }
        Stmt::Loop { count, body } => {
            for j in 0..*count {
                for s in body {
                    unpack_stmt(s, frame, out, j)?;
                }
            }
            Ok(())
        }
        Stmt::Put { .. } | Stmt::PutZero { .. } | Stmt::Branch { .. } => Err(CodecError::Program("unpack")),
    }
}

fn lookup<'v>(values: &'v HashMap<String, Value>, field: &Element) -> Result<&'v Value, CodecError> {
    values
        .get(&field.name)
        .ok_or_else(|| CodecError::MissingField(field.name.clone()))
}

/// Item `i` of an array value, or character `i` of a string value.
fn item_at(field: &Element, value: &Value, i: usize) -> Result<Value, CodecError> {
    let mismatch = || CodecError::TypeMismatch {
        field: field.name.clone(),
        expected: field.ty,
    };
    match value {
        Value::String(bytes) if field.ty.is_string() => bytes.get(i).map(|&b| Value::Char(b)).ok_or_else(mismatch),
        Value::Array(items) if !field.ty.is_string() => {
            if items.len() != field.cardinality {
                return Err(CodecError::LengthMismatch {
                    field: field.name.clone(),
                    expected: field.cardinality,
                    actual: items.len(),
                });
            }
            items.get(i).cloned().ok_or_else(mismatch)
        }
        _ => Err(mismatch()),
    }
}

fn bytes(frame: &[u8], offset: usize, len: usize) -> Result<&[u8], CodecError> {
    frame.get(offset..offset + len).ok_or(CodecError::Truncated {
        needed: offset + len,
        actual: frame.len(),
    })
}

fn bytes_mut(frame: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8], CodecError> {
    let actual = frame.len();
    frame.get_mut(offset..offset + len).ok_or(CodecError::Truncated {
        needed: offset + len,
        actual,
    })
}

fn write_scalar(field: &Element, value: &Value, frame: &mut [u8], offset: usize) -> Result<(), CodecError> {
    let buf = bytes_mut(frame, offset, field.ty.width())?;
    match (field.ty, value) {
        (ElementType::Int8, Value::Int8(v)) => buf[0] = *v as u8,
        (ElementType::Uint8, Value::Uint8(v)) => buf[0] = *v,
        (ElementType::Int16, Value::Int16(v)) => LittleEndian::write_i16(buf, *v),
        (ElementType::Uint16, Value::Uint16(v)) => LittleEndian::write_u16(buf, *v),
        (ElementType::Int32, Value::Int32(v)) => LittleEndian::write_i32(buf, *v),
        (ElementType::Uint32, Value::Uint32(v)) => LittleEndian::write_u32(buf, *v),
        (ElementType::Int64, Value::Int64(v)) => LittleEndian::write_i64(buf, *v),
        (ElementType::Uint64, Value::Uint64(v)) => LittleEndian::write_u64(buf, *v),
        (ElementType::Float32, Value::Float32(v)) => LittleEndian::write_f32(buf, *v),
        (ElementType::Bool, Value::Bool(v)) => buf[0] = u8::from(*v),
        (ElementType::Char | ElementType::String, Value::Char(c)) => buf[0] = *c,
        _ => {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: field.ty,
            })
        }
    }
    Ok(())
}

fn read_scalar(ty: ElementType, frame: &[u8], offset: usize) -> Result<Value, CodecError> {
    let buf = bytes(frame, offset, ty.width())?;
    Ok(match ty {
        ElementType::Int8 => Value::Int8(buf[0] as i8),
        ElementType::Uint8 => Value::Uint8(buf[0]),
        ElementType::Int16 => Value::Int16(LittleEndian::read_i16(buf)),
        ElementType::Uint16 => Value::Uint16(LittleEndian::read_u16(buf)),
        ElementType::Int32 => Value::Int32(LittleEndian::read_i32(buf)),
        ElementType::Uint32 => Value::Uint32(LittleEndian::read_u32(buf)),
        ElementType::Int64 => Value::Int64(LittleEndian::read_i64(buf)),
        ElementType::Uint64 => Value::Uint64(LittleEndian::read_u64(buf)),
        ElementType::Float32 => Value::Float32(LittleEndian::read_f32(buf)),
        ElementType::Bool => Value::Bool(buf[0] != 0),
        ElementType::Char | ElementType::String => Value::Char(buf[0]),
    })
}

/// Pack and unpack programs for one direction of a packet.
#[derive(Debug, Clone)]
struct Programs<'a> {
    length: usize,
    pack: Vec<Stmt<'a>>,
    unpack: Vec<Stmt<'a>>,
}

impl<'a> Programs<'a> {
    fn new(length: usize, slots: &[FieldSlot<'a>]) -> Self {
        Programs {
            length,
            pack: lower_pack(slots),
            unpack: lower_unpack(slots),
        }
    }

    fn encode(&self, values: &HashMap<String, Value>) -> Result<Vec<u8>, CodecError> {
        let mut frame = vec![0u8; self.length];
        pack(&self.pack, values, &mut frame)?;
        Ok(frame)
    }

    fn decode(&self, frame: &[u8]) -> Result<HashMap<String, Value>, CodecError> {
        if frame.len() < self.length {
            return Err(CodecError::Truncated {
                needed: self.length,
                actual: frame.len(),
            });
        }
        unpack(&self.unpack, frame)
    }
}

/// Request/response codec for one packet. The header bytes are left zeroed.
#[derive(Debug, Clone)]
pub struct Codec<'a> {
    packet: &'a Packet,
    request: Programs<'a>,
    response: Programs<'a>,
}

impl<'a> Codec<'a> {
    pub fn new(packet: &'a Packet) -> Self {
        let layout = PacketLayout::compute(packet);
        Codec {
            packet,
            request: Programs::new(layout.request_length, &layout.request),
            response: Programs::new(layout.response_length, &layout.response),
        }
    }

    pub fn packet(&self) -> &'a Packet {
        self.packet
    }

    /// Request frame carrying the `in` values.
    pub fn encode_request(&self, values: &HashMap<String, Value>) -> Result<Vec<u8>, CodecError> {
        self.request.encode(values)
    }

    pub fn decode_request(&self, frame: &[u8]) -> Result<HashMap<String, Value>, CodecError> {
        self.request.decode(frame)
    }

    /// Response (or callback) frame carrying the `out` values.
    pub fn encode_response(&self, values: &HashMap<String, Value>) -> Result<Vec<u8>, CodecError> {
        self.response.encode(values)
    }

    pub fn decode_response(&self, frame: &[u8]) -> Result<HashMap<String, Value>, CodecError> {
        self.response.decode(frame)
    }
}

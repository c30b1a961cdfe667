//! Error taxonomy for configuration parsing, schema validation, type lookup and emission.

use crate::types::{ElementType, Target};
use std::path::PathBuf;

/// Malformed device, packet or element declaration. Always fatal to that device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("name mismatch: {display} != {wire}")]
    NameMismatch { display: String, wire: String },
    #[error("invalid element direction {direction:?} for {packet}.{element}")]
    InvalidDirection {
        packet: String,
        element: String,
        direction: String,
    },
    #[error("invalid packet type {kind:?} for {packet}")]
    InvalidKind { packet: String, kind: String },
    #[error("element {packet}.{element}: cardinality must be at least 1")]
    InvalidCardinality { packet: String, element: String },
    #[error("packet {packet}: function id {function_id} outside 1..=255")]
    FunctionIdOutOfRange { packet: String, function_id: u64 },
    #[error("duplicate function id {function_id}: {first} and {second}")]
    DuplicateFunctionId {
        function_id: u8,
        first: String,
        second: String,
    },
    /// `length` is `None` when the size does not fit a `usize`.
    #[error("packet {packet}: frame length {} exceeds {}", frame_length(.length), crate::schema::MAX_FRAME_LENGTH)]
    FrameTooLong { packet: String, length: Option<usize> },
    #[error("constant {group}.{item}: {reason}")]
    InvalidConstant {
        group: String,
        item: String,
        reason: String,
    },
}

fn frame_length(length: &Option<usize>) -> String {
    match length {
        Some(l) => l.to_string(),
        None => "overflow".to_string(),
    }
}

/// Element type or target mapping absent from the type registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnknownTypeError {
    #[error("unknown element type {0:?}")]
    Type(String),
    #[error("no {target} mapping for element type {ty}")]
    Mapping { ty: ElementType, target: Target },
}

/// Emission operation a backend does not support.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{backend} backend does not support {capability}")]
pub struct BackendCapabilityError {
    pub backend: Target,
    pub capability: &'static str,
}

/// Syntax error in a device configuration file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            line: 0,
            column: 0,
            message: message.into(),
        }
    }

    pub(crate) fn at(pair: &pest::iterators::Pair<'_, crate::parser::Rule>, message: impl Into<String>) -> Self {
        let (line, column) = pair.as_span().start_pos().line_col();
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Any failure of one device's generation pass.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("parse: {0}")]
    Parse(#[from] ParseError),
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("type: {0}")]
    UnknownType(#[from] UnknownTypeError),
    #[error("backend: {0}")]
    Capability(#[from] BackendCapabilityError),
    #[error("device {device} writes the same files as the one in {}", first.display())]
    DuplicateOutput { device: String, first: PathBuf },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, GenError>;

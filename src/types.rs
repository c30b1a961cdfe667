//! Type registry: the closed set of element types, their wire widths, and
//! per-target native type names.

use crate::error::UnknownTypeError;
use std::fmt;
use std::str::FromStr;

/// Element type. Closed: anything else in a configuration is an [`UnknownTypeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Bool,
    Char,
    String,
}

impl ElementType {
    pub const ALL: [ElementType; 12] = [
        ElementType::Int8,
        ElementType::Uint8,
        ElementType::Int16,
        ElementType::Uint16,
        ElementType::Int32,
        ElementType::Uint32,
        ElementType::Int64,
        ElementType::Uint64,
        ElementType::Float32,
        ElementType::Bool,
        ElementType::Char,
        ElementType::String,
    ];

    /// Bytes per item on the wire. A string of cardinality n occupies n bytes.
    pub fn width(self) -> usize {
        match self {
            ElementType::Int8
            | ElementType::Uint8
            | ElementType::Bool
            | ElementType::Char
            | ElementType::String => 1,
            ElementType::Int16 | ElementType::Uint16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
            ElementType::Int64 | ElementType::Uint64 => 8,
        }
    }

    /// Configuration spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Int8 => "int8",
            ElementType::Uint8 => "uint8",
            ElementType::Int16 => "int16",
            ElementType::Uint16 => "uint16",
            ElementType::Int32 => "int32",
            ElementType::Uint32 => "uint32",
            ElementType::Int64 => "int64",
            ElementType::Uint64 => "uint64",
            ElementType::Float32 => "float",
            ElementType::Bool => "bool",
            ElementType::Char => "char",
            ElementType::String => "string",
        }
    }

    pub fn is_string(self) -> bool {
        self == ElementType::String
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = UnknownTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `float32` is accepted as an alias of `float`.
        if s == "float32" {
            return Ok(ElementType::Float32);
        }
        ElementType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTypeError::Type(s.to_string()))
    }
}

/// Generation target. Each variant has exactly one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    C,
    Java,
    Matlab,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::C, Target::Java, Target::Matlab];

    pub fn as_str(self) -> &'static str {
        match self {
            Target::C => "c",
            Target::Java => "java",
            Target::Matlab => "matlab",
        }
    }

    fn native_table(self) -> &'static [(ElementType, &'static str)] {
        match self {
            Target::C => C_NATIVE,
            // MATLAB consumes the Java classes directly.
            Target::Java | Target::Matlab => JAVA_NATIVE,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown target {:?} (expected c, java or matlab)", s))
    }
}

const C_NATIVE: &[(ElementType, &str)] = &[
    (ElementType::Int8, "int8_t"),
    (ElementType::Uint8, "uint8_t"),
    (ElementType::Int16, "int16_t"),
    (ElementType::Uint16, "uint16_t"),
    (ElementType::Int32, "int32_t"),
    (ElementType::Uint32, "uint32_t"),
    (ElementType::Int64, "int64_t"),
    (ElementType::Uint64, "uint64_t"),
    (ElementType::Float32, "float"),
    (ElementType::Bool, "bool"),
    (ElementType::Char, "char"),
    (ElementType::String, "char"),
];

// Java has no unsigned types: unsigned values widen to the next signed type.
const JAVA_NATIVE: &[(ElementType, &str)] = &[
    (ElementType::Int8, "byte"),
    (ElementType::Uint8, "short"),
    (ElementType::Int16, "short"),
    (ElementType::Uint16, "int"),
    (ElementType::Int32, "int"),
    (ElementType::Uint32, "long"),
    (ElementType::Int64, "long"),
    (ElementType::Uint64, "long"),
    (ElementType::Float32, "float"),
    (ElementType::Bool, "boolean"),
    (ElementType::Char, "char"),
    (ElementType::String, "String"),
];

/// Wire width of a type in bytes.
pub fn width(ty: ElementType) -> usize {
    ty.width()
}

/// Native type name of `ty` in `target`. Fails if the target's table has no entry.
pub fn native_name(ty: ElementType, target: Target) -> Result<&'static str, UnknownTypeError> {
    lookup(target.native_table(), ty).ok_or(UnknownTypeError::Mapping { ty, target })
}

fn lookup(table: &[(ElementType, &'static str)], ty: ElementType) -> Option<&'static str> {
    table.iter().find(|(t, _)| *t == ty).map(|(_, name)| *name)
}

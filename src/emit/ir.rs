//! Target-neutral marshalling statements.
//!
//! Lowering turns a layout into an ordered statement list (write-field, loop,
//! branch); each backend only decides how a statement is spelled. Offsets here
//! are frame offsets, i.e. they already include the header.

use crate::layout::FieldSlot;
use crate::schema::{Element, HEADER_LENGTH};

/// Frame offset `base + i * stride`, where `i` is the enclosing loop counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct At {
    pub base: usize,
    pub stride: usize,
}

impl At {
    pub fn fixed(base: usize) -> Self {
        At { base, stride: 0 }
    }

    pub fn strided(base: usize, stride: usize) -> Self {
        At { base, stride }
    }

    /// Concrete offset for loop counter `i`.
    pub fn resolve(self, i: usize) -> usize {
        self.base + i * self.stride
    }
}

/// Which part of a field a statement touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
    /// The whole scalar.
    Scalar,
    /// Item `i` of an array, or character `i` of a string.
    Indexed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cond<'a> {
    /// `i` is below the actual length of the string value.
    WithinString(&'a Element),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt<'a> {
    /// Store one item of `field` little-endian at `at`.
    Put { field: &'a Element, item: Item, at: At },
    /// Store a single zero byte at `at`.
    PutZero { at: At },
    /// Load one item of `field` from `at`.
    Get { field: &'a Element, item: Item, at: At },
    /// Load `len` bytes as a string, ending at the first NUL.
    GetString { field: &'a Element, at: At, len: usize },
    /// Run `body` for `i` in `0..count`.
    Loop { count: usize, body: Vec<Stmt<'a>> },
    Branch {
        cond: Cond<'a>,
        then: Vec<Stmt<'a>>,
        otherwise: Vec<Stmt<'a>>,
    },
}

/// Statements writing every slot into a frame.
///
/// Strings are written byte by byte: characters past the declared length are
/// dropped, missing ones are zero-filled.
pub fn lower_pack<'a>(slots: &[FieldSlot<'a>]) -> Vec<Stmt<'a>> {
    slots
        .iter()
        .map(|slot| {
            let field = slot.element;
            let base = HEADER_LENGTH + slot.offset;
            if field.ty.is_string() {
                let at = At::strided(base, 1);
                Stmt::Loop {
                    count: field.cardinality,
                    body: vec![Stmt::Branch {
                        cond: Cond::WithinString(field),
                        then: vec![Stmt::Put {
                            field,
                            item: Item::Indexed,
                            at,
                        }],
                        otherwise: vec![Stmt::PutZero { at }],
                    }],
                }
            } else if field.is_array() {
                Stmt::Loop {
                    count: field.cardinality,
                    body: vec![Stmt::Put {
                        field,
                        item: Item::Indexed,
                        at: At::strided(base, field.ty.width()),
                    }],
                }
            } else {
                Stmt::Put {
                    field,
                    item: Item::Scalar,
                    at: At::fixed(base),
                }
            }
        })
        .collect()
}

/// Statements reading every slot back out of a frame.
pub fn lower_unpack<'a>(slots: &[FieldSlot<'a>]) -> Vec<Stmt<'a>> {
    slots
        .iter()
        .map(|slot| {
            let field = slot.element;
            let base = HEADER_LENGTH + slot.offset;
            if field.ty.is_string() {
                Stmt::GetString {
                    field,
                    at: At::fixed(base),
                    len: field.cardinality,
                }
            } else if field.is_array() {
                Stmt::Loop {
                    count: field.cardinality,
                    body: vec![Stmt::Get {
                        field,
                        item: Item::Indexed,
                        at: At::strided(base, field.ty.width()),
                    }],
                }
            } else {
                Stmt::Get {
                    field,
                    item: Item::Scalar,
                    at: At::fixed(base),
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::slots;
    use crate::schema::Direction;
    use crate::types::ElementType;

    fn el(name: &str, ty: ElementType, cardinality: usize) -> Element {
        Element {
            name: name.to_string(),
            ty,
            cardinality,
            direction: Direction::In,
        }
    }

    #[test]
    fn scalar_array_and_string_lowering() {
        let elements = [
            el("a", ElementType::Uint32, 1),
            el("b", ElementType::Int16, 3),
            el("s", ElementType::String, 4),
        ];
        let slots = slots(&elements);
        let program = lower_pack(&slots);
        assert_eq!(program.len(), 3);
        assert_eq!(
            program[0],
            Stmt::Put {
                field: &elements[0],
                item: Item::Scalar,
                at: At::fixed(4)
            }
        );
        match &program[1] {
            Stmt::Loop { count, body } => {
                assert_eq!(*count, 3);
                assert_eq!(
                    body[0],
                    Stmt::Put {
                        field: &elements[1],
                        item: Item::Indexed,
                        at: At::strided(8, 2)
                    }
                );
            }
            other => panic!("expected loop, got {:?}", other),
        }
        match &program[2] {
            Stmt::Loop { count, body } => {
                assert_eq!(*count, 4);
                assert!(matches!(body[0], Stmt::Branch { .. }));
            }
            other => panic!("expected loop, got {:?}", other),
        }
    }

    #[test]
    fn unpack_reads_strings_whole() {
        let elements = [el("s", ElementType::String, 6)];
        let slots = slots(&elements);
        assert_eq!(
            lower_unpack(&slots),
            vec![Stmt::GetString {
                field: &elements[0],
                at: At::fixed(4),
                len: 6
            }]
        );
    }

    #[test]
    fn at_resolves_per_iteration() {
        assert_eq!(At::strided(6, 4).resolve(3), 18);
        assert_eq!(At::fixed(6).resolve(3), 6);
    }
}

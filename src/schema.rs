//! Schema model: validated devices, packets and elements.
//!
//! A [`Device`] is built once per generation pass from a [`DeviceConfig`] and is
//! read-only afterwards. All declaration errors surface here, before any layout
//! or emission work starts.

use crate::ast::{ConstantGroupConfig, DeviceConfig, DeviceName, ElementConfig, Literal, PacketConfig};
use crate::error::{GenError, SchemaError};
use crate::types::ElementType;
use convert_case::{Case, Casing};

/// Size of the frame header that precedes every payload.
pub const HEADER_LENGTH: usize = 4;

/// Largest frame, header included. Generated bindings pass the frame length as one byte.
pub const MAX_FRAME_LENGTH: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Function,
    Callback,
}

impl PacketKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(PacketKind::Function),
            "callback" => Some(PacketKind::Callback),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PacketKind::Function => "function",
            PacketKind::Callback => "callback",
        }
    }
}

/// One field of a packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub ty: ElementType,
    /// 1 for scalars; array length, or maximum string length.
    pub cardinality: usize,
    pub direction: Direction,
}

impl Element {
    fn load(packet: &str, config: ElementConfig) -> Result<Self, GenError> {
        let direction = Direction::parse(&config.direction).ok_or_else(|| SchemaError::InvalidDirection {
            packet: packet.to_string(),
            element: config.name.clone(),
            direction: config.direction.clone(),
        })?;
        let ty: ElementType = config.type_name.parse()?;
        let cardinality = usize::try_from(config.cardinality).unwrap_or(0);
        if cardinality == 0 {
            return Err(SchemaError::InvalidCardinality {
                packet: packet.to_string(),
                element: config.name,
            }
            .into());
        }
        let element = Element {
            name: config.name,
            ty,
            cardinality,
            direction,
        };
        match ty.width().checked_mul(cardinality) {
            Some(size) if size <= MAX_FRAME_LENGTH - HEADER_LENGTH => Ok(element),
            size => Err(SchemaError::FrameTooLong {
                packet: packet.to_string(),
                length: size.and_then(|s| s.checked_add(HEADER_LENGTH)),
            }
            .into()),
        }
    }

    /// Bytes this element occupies in its frame. Saturates instead of wrapping.
    pub fn byte_size(&self) -> usize {
        self.ty.width().saturating_mul(self.cardinality)
    }

    /// Fixed-length array of a non-string type.
    pub fn is_array(&self) -> bool {
        self.cardinality > 1 && !self.ty.is_string()
    }

    pub fn headless_camel_case_name(&self) -> String {
        self.name.from_case(Case::Snake).to_case(Case::Camel)
    }
}

/// A named unit of communication: one function or callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub display_name: String,
    pub wire_name: String,
    pub kind: PacketKind,
    /// Declared function id; [`crate::ids::assign`] fills the gaps.
    pub function_id: Option<u8>,
    pub response_expected: Option<bool>,
    pub doc: Option<String>,
    elements: Vec<Element>,
    in_elements: Vec<usize>,
    out_elements: Vec<usize>,
    request_length: usize,
    response_length: usize,
}

impl Packet {
    pub fn load(config: PacketConfig) -> Result<Self, GenError> {
        check_name(&config.display_name, &config.wire_name)?;
        let kind = PacketKind::parse(&config.kind).ok_or_else(|| SchemaError::InvalidKind {
            packet: config.display_name.clone(),
            kind: config.kind.clone(),
        })?;
        let function_id = match config.function_id {
            None => None,
            Some(id) => Some(
                u8::try_from(id)
                    .ok()
                    .filter(|&id| id > 0)
                    .ok_or_else(|| SchemaError::FunctionIdOutOfRange {
                        packet: config.display_name.clone(),
                        function_id: id,
                    })?,
            ),
        };
        let elements = config
            .elements
            .into_iter()
            .map(|e| Element::load(&config.display_name, e))
            .collect::<Result<Vec<_>, _>>()?;
        let packet = Packet::new(
            config.display_name,
            config.wire_name,
            kind,
            function_id,
            config.response_expected,
            config.doc,
            elements,
        );
        let longest = packet.request_length.max(packet.response_length);
        if longest > MAX_FRAME_LENGTH {
            return Err(SchemaError::FrameTooLong {
                packet: packet.display_name,
                length: Some(longest).filter(|&l| l < usize::MAX),
            }
            .into());
        }
        Ok(packet)
    }

    /// Build a packet directly from validated parts. Names and frame limits are
    /// not checked; lengths saturate at `usize::MAX`.
    pub fn new(
        display_name: String,
        wire_name: String,
        kind: PacketKind,
        function_id: Option<u8>,
        response_expected: Option<bool>,
        doc: Option<String>,
        elements: Vec<Element>,
    ) -> Self {
        let pick = |dir: Direction| -> Vec<usize> {
            elements
                .iter()
                .enumerate()
                .filter(|(_, e)| e.direction == dir)
                .map(|(i, _)| i)
                .collect()
        };
        let in_elements = pick(Direction::In);
        let out_elements = pick(Direction::Out);
        let frame_length = |indices: &[usize]| {
            indices
                .iter()
                .fold(HEADER_LENGTH, |total, &i| total.saturating_add(elements[i].byte_size()))
        };
        let request_length = frame_length(&in_elements);
        let response_length = frame_length(&out_elements);
        Packet {
            display_name,
            wire_name,
            kind,
            function_id,
            response_expected,
            doc,
            elements,
            in_elements,
            out_elements,
            request_length,
            response_length,
        }
    }

    /// All elements in declaration (wire) order.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Elements of one direction, in declaration order.
    pub fn elements_in(&self, direction: Direction) -> impl Iterator<Item = &Element> + '_ {
        let indices = match direction {
            Direction::In => &self.in_elements,
            Direction::Out => &self.out_elements,
        };
        indices.iter().map(move |&i| &self.elements[i])
    }

    pub fn in_elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.elements_in(Direction::In)
    }

    pub fn out_elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.elements_in(Direction::Out)
    }

    pub fn has_out_elements(&self) -> bool {
        !self.out_elements.is_empty()
    }

    pub fn out_count(&self) -> usize {
        self.out_elements.len()
    }

    /// Header plus every `in` element.
    pub fn request_length(&self) -> usize {
        self.request_length
    }

    /// Header plus every `out` element.
    pub fn response_length(&self) -> usize {
        self.response_length
    }

    pub fn camel_case_name(&self) -> &str {
        &self.display_name
    }

    pub fn headless_camel_case_name(&self) -> String {
        headless(&self.display_name)
    }

    pub fn underscore_name(&self) -> &str {
        &self.wire_name
    }

    pub fn upper_case_name(&self) -> String {
        self.wire_name.to_uppercase()
    }
}

/// The wire name must be the lowercased display name with underscores added.
fn check_name(display: &str, wire: &str) -> Result<(), SchemaError> {
    if display.to_lowercase() != wire.replace('_', "") {
        return Err(SchemaError::NameMismatch {
            display: display.to_string(),
            wire: wire.to_string(),
        });
    }
    Ok(())
}

/// Lowercase the leading run of capitals: `MorseCode` -> `morseCode`, `LEDOn` -> `ledon`.
fn headless(display: &str) -> String {
    let split = display
        .char_indices()
        .find(|(_, c)| !c.is_ascii_uppercase())
        .map(|(i, _)| i)
        .unwrap_or(display.len());
    let (head, tail) = display.split_at(split);
    format!("{}{}", head.to_ascii_lowercase(), tail)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    Int(i64),
    Char(char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantItem {
    pub name: String,
    pub value: ConstantValue,
}

impl ConstantItem {
    pub fn upper_case_name(&self) -> String {
        self.name.from_case(Case::Pascal).to_case(Case::UpperSnake)
    }
}

/// Symbolic constants of one type, rendered as target enumerations.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantGroup {
    pub name: String,
    pub ty: ElementType,
    pub items: Vec<ConstantItem>,
}

impl ConstantGroup {
    fn load(config: ConstantGroupConfig) -> Result<Self, GenError> {
        let ty: ElementType = config.type_name.parse()?;
        let mut items = Vec::with_capacity(config.items.len());
        for (name, literal) in config.items {
            let invalid = |reason: &str| SchemaError::InvalidConstant {
                group: config.name.clone(),
                item: name.clone(),
                reason: reason.to_string(),
            };
            let value = match (ty, literal) {
                (ElementType::Char, Literal::Char(c)) if c.is_ascii() => ConstantValue::Char(c),
                (ElementType::Char, _) => return Err(invalid("char group needs an ASCII char literal").into()),
                (ElementType::String | ElementType::Float32, _) => {
                    return Err(invalid("constants must be integers or chars").into())
                }
                (ElementType::Bool, Literal::Bool(b)) => ConstantValue::Int(b as i64),
                (_, Literal::Int(v)) => {
                    if !int_fits(ty, v) {
                        return Err(invalid(&format!("value {} does not fit {}", v, ty)).into());
                    }
                    ConstantValue::Int(v)
                }
                _ => return Err(invalid("expected integer literal").into()),
            };
            items.push(ConstantItem { name, value });
        }
        Ok(ConstantGroup {
            name: config.name,
            ty,
            items,
        })
    }

    pub fn upper_case_name(&self) -> String {
        self.name.from_case(Case::Pascal).to_case(Case::UpperSnake)
    }
}

fn int_fits(ty: ElementType, v: i64) -> bool {
    match ty {
        ElementType::Int8 => i8::try_from(v).is_ok(),
        ElementType::Uint8 => u8::try_from(v).is_ok(),
        ElementType::Int16 => i16::try_from(v).is_ok(),
        ElementType::Uint16 => u16::try_from(v).is_ok(),
        ElementType::Int32 => i32::try_from(v).is_ok(),
        ElementType::Uint32 => u32::try_from(v).is_ok(),
        ElementType::Int64 => true,
        ElementType::Uint64 => v >= 0,
        ElementType::Bool => v == 0 || v == 1,
        ElementType::Float32 | ElementType::Char | ElementType::String => false,
    }
}

/// A named hardware unit and its packets.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub name: DeviceName,
    pub category: String,
    pub device_identifier: u16,
    pub version: (u8, u8, u8),
    pub description: Option<String>,
    pub released: bool,
    pub constant_groups: Vec<ConstantGroup>,
    pub common_included: bool,
    packets: Vec<Packet>,
}

impl Device {
    /// Validate a configuration record. The first declaration error aborts the device.
    pub fn load(config: DeviceConfig) -> Result<Self, GenError> {
        let packets = config
            .packets
            .into_iter()
            .map(Packet::load)
            .collect::<Result<Vec<_>, _>>()?;
        let constant_groups = config
            .constant_groups
            .into_iter()
            .map(ConstantGroup::load)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Device {
            name: config.name,
            category: config.category,
            device_identifier: config.device_identifier,
            version: config.version,
            description: config.description,
            released: config.released,
            constant_groups,
            common_included: config.common_included,
            packets,
        })
    }

    /// Every packet in declaration order.
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn packets_of(&self, kind: PacketKind) -> impl Iterator<Item = &Packet> + '_ {
        self.packets.iter().filter(move |p| p.kind == kind)
    }

    pub fn function_packets(&self) -> impl Iterator<Item = &Packet> + '_ {
        self.packets_of(PacketKind::Function)
    }

    pub fn callback_packets(&self) -> impl Iterator<Item = &Packet> + '_ {
        self.packets_of(PacketKind::Callback)
    }

    pub fn callback_count(&self) -> usize {
        self.callback_packets().count()
    }

    pub fn camel_case_name(&self) -> &str {
        &self.name.display
    }

    pub fn headless_camel_case_name(&self) -> String {
        headless(&self.name.display)
    }

    pub fn underscore_name(&self) -> &str {
        &self.name.wire
    }

    pub fn upper_case_name(&self) -> String {
        self.name.wire.to_uppercase()
    }

    pub fn display_name(&self) -> &str {
        &self.name.human
    }

    #[cfg(test)]
    pub(crate) fn replace_packets(&mut self, packets: Vec<Packet>) {
        self.packets = packets;
    }
}

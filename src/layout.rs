//! Wire layout: byte offsets and lengths of every element in a frame.
//!
//! Offsets are relative to the payload, i.e. they exclude the fixed
//! [`HEADER_LENGTH`](crate::schema::HEADER_LENGTH)-byte header. The protocol is byte-packed:
//! each element starts exactly where the previous same-direction element ends.

use crate::schema::{Device, Direction, Element, Packet};

/// Placement of one element inside a request or response payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSlot<'a> {
    pub element: &'a Element,
    /// Bytes from the start of the payload.
    pub offset: usize,
    /// `width(type) * cardinality`.
    pub length: usize,
}

impl FieldSlot<'_> {
    /// Offset of item `i` of an array element.
    pub fn item_offset(&self, i: usize) -> usize {
        self.offset + i * self.element.ty.width()
    }
}

/// Request and response layout of one packet.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketLayout<'a> {
    pub request_length: usize,
    pub response_length: usize,
    pub request: Vec<FieldSlot<'a>>,
    pub response: Vec<FieldSlot<'a>>,
}

impl<'a> PacketLayout<'a> {
    pub fn compute(packet: &'a Packet) -> Self {
        PacketLayout {
            request_length: packet.request_length(),
            response_length: packet.response_length(),
            request: slots(packet.elements_in(Direction::In)),
            response: slots(packet.elements_in(Direction::Out)),
        }
    }

    pub fn slots(&self, direction: Direction) -> &[FieldSlot<'a>] {
        match direction {
            Direction::In => &self.request,
            Direction::Out => &self.response,
        }
    }
}

/// Consecutive placement of `elements` starting at payload offset 0.
pub fn slots<'a>(elements: impl IntoIterator<Item = &'a Element>) -> Vec<FieldSlot<'a>> {
    let mut offset = 0;
    elements
        .into_iter()
        .map(|element| {
            let length = element.byte_size();
            let slot = FieldSlot { element, offset, length };
            offset += length;
            slot
        })
        .collect()
}

/// Layouts of every packet of a device, computed once per generation pass.
#[derive(Debug, Clone)]
pub struct LayoutCache<'a> {
    layouts: Vec<PacketLayout<'a>>,
}

impl<'a> LayoutCache<'a> {
    pub fn new(device: &'a Device) -> Self {
        LayoutCache {
            layouts: device.packets().iter().map(PacketLayout::compute).collect(),
        }
    }

    /// Layout of the packet at `index` in [`Device::packets`].
    pub fn get(&self, index: usize) -> Option<&PacketLayout<'a>> {
        self.layouts.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PacketLayout<'a>> {
        self.layouts.iter()
    }
}

//! Function identifier allocation and response-expected flags.

use crate::error::SchemaError;
use crate::schema::{Device, Packet, PacketKind};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Whether a runtime dispatcher waits for a reply frame after sending a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseExpected {
    /// The function returns data; a response is always sent.
    AlwaysTrue,
    /// Acknowledged by default; callers may switch it off.
    True,
    /// Not acknowledged by default; callers may switch it on.
    False,
    /// Callbacks are never acknowledged.
    AlwaysFalse,
}

impl ResponseExpected {
    pub fn for_packet(packet: &Packet) -> Self {
        match packet.kind {
            PacketKind::Callback => ResponseExpected::AlwaysFalse,
            PacketKind::Function if packet.has_out_elements() => ResponseExpected::AlwaysTrue,
            PacketKind::Function => match packet.response_expected {
                Some(true) => ResponseExpected::True,
                Some(false) | None => ResponseExpected::False,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseExpected::AlwaysTrue => "always_true",
            ResponseExpected::True => "true",
            ResponseExpected::False => "false",
            ResponseExpected::AlwaysFalse => "always_false",
        }
    }

    /// Initial value of the flag.
    pub fn is_expected(self) -> bool {
        matches!(self, ResponseExpected::AlwaysTrue | ResponseExpected::True)
    }
}

/// Identity of one packet on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketId {
    pub function_id: u8,
    pub kind: PacketKind,
    pub response_expected: ResponseExpected,
}

/// Function ids and flags for every packet of a device, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierTable {
    entries: Vec<PacketId>,
}

impl IdentifierTable {
    /// Entry of the packet at `index` in [`Device::packets`].
    pub fn get(&self, index: usize) -> Option<&PacketId> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PacketId> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatcher table: `kind<TAB>function_id<TAB>wire_name<TAB>response_expected` per line.
    pub fn render(&self, device: &Device) -> String {
        let mut out = String::new();
        for (packet, id) in device.packets().iter().zip(&self.entries) {
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{}",
                id.kind.as_str(),
                id.function_id,
                packet.wire_name,
                id.response_expected.as_str()
            );
        }
        out
    }
}

/// Give every packet without an explicit id its 1-based position, then check
/// that no two packets share an id.
pub fn assign(device: &Device) -> Result<IdentifierTable, SchemaError> {
    let mut entries = Vec::with_capacity(device.packets().len());
    let mut seen: HashMap<u8, &str> = HashMap::new();
    for (i, packet) in device.packets().iter().enumerate() {
        let function_id = match packet.function_id {
            Some(id) => id,
            None => u8::try_from(i + 1).map_err(|_| SchemaError::FunctionIdOutOfRange {
                packet: packet.display_name.clone(),
                function_id: (i + 1) as u64,
            })?,
        };
        if let Some(first) = seen.insert(function_id, &packet.display_name) {
            return Err(SchemaError::DuplicateFunctionId {
                function_id,
                first: first.to_string(),
                second: packet.display_name.clone(),
            });
        }
        entries.push(PacketId {
            function_id,
            kind: packet.kind,
            response_expected: ResponseExpected::for_packet(packet),
        });
    }
    Ok(IdentifierTable { entries })
}

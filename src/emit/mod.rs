//! Code emission: one backend per target, all driven by the same layouts and ids.
//!
//! Backends share the [`Backend`] capability set. Each capability renders a
//! fragment from the schema model; [`Backend::emit_device`] assembles the
//! fragments into the complete source unit for one device. Marshalling
//! fragments are rendered from the target-neutral statements in [`ir`], so no
//! backend computes offsets on its own.

pub mod c;
pub mod ir;
pub mod java;
pub mod matlab;

use crate::error::{BackendCapabilityError, Result, SchemaError};
use crate::ids::{IdentifierTable, PacketId};
use crate::layout::{LayoutCache, PacketLayout};
use crate::schema::{Device, Packet, MAX_FRAME_LENGTH};
use crate::types::Target;

/// Everything a backend reads while emitting one device.
pub struct DeviceContext<'a> {
    pub device: &'a Device,
    pub ids: &'a IdentifierTable,
    pub layouts: &'a LayoutCache<'a>,
}

/// One packet with its id and layout.
pub struct PacketView<'a> {
    pub packet: &'a Packet,
    pub id: &'a PacketId,
    pub layout: &'a PacketLayout<'a>,
}

impl<'a> DeviceContext<'a> {
    pub fn new(device: &'a Device, ids: &'a IdentifierTable, layouts: &'a LayoutCache<'a>) -> Self {
        DeviceContext { device, ids, layouts }
    }

    /// Packets in declaration order.
    pub fn packets(&self) -> impl Iterator<Item = PacketView<'a>> + '_ {
        self.device
            .packets()
            .iter()
            .zip(self.ids.iter())
            .zip(self.layouts.iter())
            .map(|((packet, id), layout)| PacketView { packet, id, layout })
    }

    pub fn functions(&self) -> impl Iterator<Item = PacketView<'a>> + '_ {
        self.packets()
            .filter(|v| v.packet.kind == crate::schema::PacketKind::Function)
    }

    pub fn callbacks(&self) -> impl Iterator<Item = PacketView<'a>> + '_ {
        self.packets()
            .filter(|v| v.packet.kind == crate::schema::PacketKind::Callback)
    }
}

/// Capability set every target implements.
///
/// Backends never mutate the model; a missing native type mapping is an error,
/// never a fallback.
pub trait Backend: Send + Sync {
    fn target(&self) -> Target;

    /// Output file name for `device`.
    fn file_name(&self, device: &Device) -> String;

    /// Statements that fill a request frame from the packet's `in` parameters.
    fn emit_pack_request(&self, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String>;

    /// Statements that read the packet's `out` values from a response frame.
    fn emit_unpack_response(&self, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String>;

    /// Handler that decodes a callback frame and hands the values to user code.
    fn emit_callback_dispatch(&self, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String>;

    fn emit_constants(&self, device: &Device) -> Result<String>;

    fn emit_listener_declarations(&self, device: &Device) -> Result<String>;

    /// Typed record passed to callback listeners.
    fn emit_callback_record(&self, _packet: &Packet, _layout: &PacketLayout<'_>) -> Result<String> {
        Err(BackendCapabilityError {
            backend: self.target(),
            capability: "callback records",
        }
        .into())
    }

    /// Complete source unit for one device.
    fn emit_device(&self, ctx: &DeviceContext<'_>) -> Result<String>;
}

/// Backend for `target`.
pub fn backend(target: Target) -> Box<dyn Backend> {
    match target {
        Target::C => Box::new(c::CBackend::default()),
        Target::Java => Box::new(java::JavaBackend),
        Target::Matlab => Box::new(matlab::MatlabBackend),
    }
}

/// Line-oriented text builder with indentation.
#[derive(Debug, Clone)]
pub struct CodeWriter {
    out: String,
    depth: usize,
    unit: &'static str,
}

impl CodeWriter {
    pub fn new(unit: &'static str) -> Self {
        CodeWriter {
            out: String::new(),
            depth: 0,
            unit,
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(self.unit);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Write `text` and indent what follows.
    pub fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.depth += 1;
    }

    /// Dedent and write `text`.
    pub fn close(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Write every line of a pre-rendered fragment at the current depth.
    pub fn block(&mut self, text: &str) {
        for l in text.lines() {
            self.line(l);
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Frame length as written into generated code. Packets built without
/// [`Packet::load`] can exceed the limit, so every backend checks here.
pub(crate) fn frame_length(packet: &Packet, length: usize) -> Result<usize> {
    if length > MAX_FRAME_LENGTH {
        return Err(SchemaError::FrameTooLong {
            packet: packet.display_name.clone(),
            length: Some(length),
        }
        .into());
    }
    Ok(length)
}

/// Comment lines placed at the top of every generated file.
pub(crate) fn banner(device: &Device) -> Vec<String> {
    let (major, minor, patch) = device.version;
    vec![
        format!(
            "This file was automatically generated by packetgen {} for the {} {} {}.{}.{}.",
            env!("CARGO_PKG_VERSION"),
            device.display_name(),
            device.category,
            major,
            minor,
            patch
        ),
        String::new(),
        "If you have a bugfix for this file and want to commit it,".to_string(),
        "please fix the bug in the generator.".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_indents_blocks() {
        let mut w = CodeWriter::new("\t");
        w.open("a {");
        w.block("b;\n\nc;");
        w.close("}");
        assert_eq!(w.finish(), "a {\n\tb;\n\n\tc;\n}\n");
    }

    #[test]
    fn every_target_has_a_backend() {
        for target in Target::ALL {
            assert_eq!(backend(target).target(), target);
        }
    }
}

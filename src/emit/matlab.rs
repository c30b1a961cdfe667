//! MATLAB/Octave backend.
//!
//! MATLAB consumes Java classes directly, so the output is the Java unit with
//! one difference: listeners receive a `<Name>CallbackData` event record
//! carrying the device and the decoded values.

use super::java::{self, CallbackShape};
use super::{Backend, DeviceContext};
use crate::error::Result;
use crate::layout::PacketLayout;
use crate::schema::{Device, Packet};
use crate::types::Target;

pub struct MatlabBackend;

const RECORD_CALLBACKS: CallbackShape = CallbackShape {
    handler_params: "Device device, byte[] data",
    listener_params: record_listener_params,
    listener_args: record_listener_args,
};

fn record_listener_params(packet: &Packet, _: Target) -> Result<String> {
    Ok(format!("{}CallbackData data", packet.camel_case_name()))
}

fn record_listener_args(packet: &Packet, names: &[String]) -> String {
    let mut args = String::from("device");
    for name in names {
        args.push_str(", ");
        args.push_str(name);
    }
    format!("new {}CallbackData({})", packet.camel_case_name(), args)
}

impl Backend for MatlabBackend {
    fn target(&self) -> Target {
        Target::Matlab
    }

    fn file_name(&self, device: &Device) -> String {
        format!("{}.java", java::class_name(device))
    }

    fn emit_pack_request(&self, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String> {
        java::pack_request(packet, layout, self.target())
    }

    fn emit_unpack_response(&self, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String> {
        java::unpack_response(packet, layout, self.target())
    }

    fn emit_callback_dispatch(&self, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String> {
        java::callback_dispatch(packet, layout, self.target(), &RECORD_CALLBACKS)
    }

    fn emit_constants(&self, device: &Device) -> Result<String> {
        java::constants(device, self.target())
    }

    fn emit_listener_declarations(&self, device: &Device) -> Result<String> {
        java::listener_declarations(device, self.target(), &RECORD_CALLBACKS)
    }

    fn emit_callback_record(&self, packet: &Packet, _layout: &PacketLayout<'_>) -> Result<String> {
        java::callback_record(packet, self.target())
    }

    fn emit_device(&self, ctx: &DeviceContext<'_>) -> Result<String> {
        let mut records = String::new();
        for view in ctx.callbacks() {
            records.push('\n');
            records.push_str(&self.emit_callback_record(view.packet, view.layout)?);
        }
        java::device_source(self, ctx, Some(records))
    }
}

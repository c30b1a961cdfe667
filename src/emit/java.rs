//! Java backend: `java.nio.ByteBuffer` marshalling with listener-based callbacks.

use super::ir::{lower_pack, lower_unpack, At, Cond, Item, Stmt};
use super::{banner, frame_length, Backend, CodeWriter, DeviceContext};
use crate::error::Result;
use crate::ids::ResponseExpected;
use crate::layout::PacketLayout;
use crate::schema::{ConstantValue, Device, Element, Packet};
use crate::types::{native_name, ElementType, Target};

pub struct JavaBackend;

/// How callbacks reach user code. The MATLAB flavour wraps values in a record.
pub(crate) struct CallbackShape {
    /// Parameters of the generated `callback(...)` handler.
    pub handler_params: &'static str,
    /// Listener method parameter list.
    pub listener_params: fn(&Packet, Target) -> Result<String>,
    /// Listener call argument list, given the decoded local names.
    pub listener_args: fn(&Packet, &[String]) -> String,
}

pub(crate) const PLAIN_CALLBACKS: CallbackShape = CallbackShape {
    handler_params: "byte[] data",
    listener_params: plain_listener_params,
    listener_args: plain_listener_args,
};

fn plain_listener_params(packet: &Packet, target: Target) -> Result<String> {
    param_list(packet.out_elements(), target)
}

fn plain_listener_args(_: &Packet, names: &[String]) -> String {
    names.join(", ")
}

impl Backend for JavaBackend {
    fn target(&self) -> Target {
        Target::Java
    }

    fn file_name(&self, device: &Device) -> String {
        format!("{}.java", class_name(device))
    }

    fn emit_pack_request(&self, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String> {
        pack_request(packet, layout, self.target())
    }

    fn emit_unpack_response(&self, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String> {
        unpack_response(packet, layout, self.target())
    }

    fn emit_callback_dispatch(&self, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String> {
        callback_dispatch(packet, layout, self.target(), &PLAIN_CALLBACKS)
    }

    fn emit_constants(&self, device: &Device) -> Result<String> {
        constants(device, self.target())
    }

    fn emit_listener_declarations(&self, device: &Device) -> Result<String> {
        listener_declarations(device, self.target(), &PLAIN_CALLBACKS)
    }

    fn emit_device(&self, ctx: &DeviceContext<'_>) -> Result<String> {
        device_source(self, ctx, None)
    }
}

pub(crate) fn class_name(device: &Device) -> String {
    format!("{}{}", device.category, device.camel_case_name())
}

/// `ByteBuffer` accessor suffix and storage type for a wire type.
fn buffer_access(ty: ElementType) -> (&'static str, &'static str) {
    match ty {
        ElementType::Int8 | ElementType::Uint8 | ElementType::Bool | ElementType::Char | ElementType::String => {
            ("", "byte")
        }
        ElementType::Int16 | ElementType::Uint16 => ("Short", "short"),
        ElementType::Int32 | ElementType::Uint32 => ("Int", "int"),
        ElementType::Int64 | ElementType::Uint64 => ("Long", "long"),
        ElementType::Float32 => ("Float", "float"),
    }
}

/// Declared Java type of an element: `short`, `int[]`, `String`.
pub(crate) fn element_type(element: &Element, target: Target) -> Result<String> {
    let base = native_name(element.ty, target)?;
    Ok(if element.is_array() {
        format!("{}[]", base)
    } else {
        base.to_string()
    })
}

pub(crate) fn param_list<'a>(elements: impl Iterator<Item = &'a Element>, target: Target) -> Result<String> {
    let params = elements
        .map(|e| Ok(format!("{} {}", element_type(e, target)?, e.headless_camel_case_name())))
        .collect::<Result<Vec<_>>>()?;
    Ok(params.join(", "))
}

fn offset(at: At) -> String {
    match at.stride {
        0 => at.base.to_string(),
        1 => format!("{} + i", at.base),
        s => format!("{} + i * {}", at.base, s),
    }
}

fn put_expr(field: &Element, item: Item, target: Target) -> Result<String> {
    let name = field.headless_camel_case_name();
    let access = match item {
        Item::Scalar => name,
        Item::Indexed if field.ty.is_string() => format!("{}.charAt(i)", name),
        Item::Indexed => format!("{}[i]", name),
    };
    let (_, storage) = buffer_access(field.ty);
    let native = native_name(field.ty, target)?;
    Ok(if field.ty == ElementType::Bool {
        format!("(byte)({} ? 1 : 0)", access)
    } else if native != storage {
        format!("({}){}", storage, access)
    } else {
        access
    })
}

fn get_expr(ty: ElementType, at: At) -> String {
    let (suffix, _) = buffer_access(ty);
    let raw = format!("bb.get{}({})", suffix, offset(at));
    match ty {
        ElementType::Uint8 => format!("IPConnection.unsignedByte({})", raw),
        ElementType::Uint16 => format!("IPConnection.unsignedShort({})", raw),
        ElementType::Uint32 => format!("IPConnection.unsignedInt({})", raw),
        ElementType::Bool => format!("({}) != 0", raw),
        ElementType::Char => format!("(char)({})", raw),
        _ => raw,
    }
}

/// Where decoded values go.
#[derive(Clone, Copy)]
enum Sink<'s> {
    /// Fresh local variables.
    Local,
    /// Fields of an already allocated object.
    Field(&'s str),
}

impl Sink<'_> {
    fn target(&self, name: &str) -> String {
        match self {
            Sink::Local => name.to_string(),
            Sink::Field(obj) => format!("{}.{}", obj, name),
        }
    }
}

fn render(w: &mut CodeWriter, stmts: &[Stmt<'_>], sink: Sink<'_>, target: Target) -> Result<()> {
    for stmt in stmts {
        match stmt {
            Stmt::Put { field, item, at } => {
                let (suffix, _) = buffer_access(field.ty);
                w.line(format!("bb.put{}({}, {});", suffix, offset(*at), put_expr(field, *item, target)?));
            }
            Stmt::PutZero { at } => w.line(format!("bb.put({}, (byte)0);", offset(*at))),
            Stmt::Get { field, item, at } => {
                let name = field.headless_camel_case_name();
                let value = get_expr(field.ty, *at);
                match (item, sink) {
                    (Item::Scalar, Sink::Local) => {
                        w.line(format!("{} {} = {};", native_name(field.ty, target)?, name, value))
                    }
                    (Item::Scalar, _) => w.line(format!("{} = {};", sink.target(&name), value)),
                    (Item::Indexed, _) => w.line(format!("{}[i] = {};", sink.target(&name), value)),
                }
            }
            Stmt::GetString { field, at, len } => {
                let name = field.headless_camel_case_name();
                let value = format!("IPConnection.string(bb, {}, {})", offset(*at), len);
                match sink {
                    Sink::Local => w.line(format!("String {} = {};", name, value)),
                    Sink::Field(_) => w.line(format!("{} = {};", sink.target(&name), value)),
                }
            }
            Stmt::Loop { count, body } => {
                if let Sink::Local = sink {
                    for s in body {
                        if let Stmt::Get { field, .. } = s {
                            let base = native_name(field.ty, target)?;
                            w.line(format!(
                                "{}[] {} = new {}[{}];",
                                base,
                                field.headless_camel_case_name(),
                                base,
                                count
                            ));
                        }
                    }
                }
                w.open(format!("for (int i = 0; i < {}; i++) {{", count));
                render(w, body, sink, target)?;
                w.close("}");
            }
            Stmt::Branch { cond, then, otherwise } => {
                match cond {
                    Cond::WithinString(field) => {
                        w.open(format!("if (i < {}.length()) {{", field.headless_camel_case_name()))
                    }
                }
                render(w, then, sink, target)?;
                if !otherwise.is_empty() {
                    w.dedent();
                    w.open("} else {");
                    render(w, otherwise, sink, target)?;
                }
                w.close("}");
            }
        }
    }
    Ok(())
}

/// Name of the class returned by functions with several `out` elements.
pub(crate) fn return_object_name(packet: &Packet) -> String {
    match packet.display_name.strip_prefix("Get") {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => rest.to_string(),
        _ => format!("{}Result", packet.display_name),
    }
}

fn return_type(packet: &Packet, target: Target) -> Result<String> {
    let mut outs = packet.out_elements();
    match (outs.next(), outs.next()) {
        (None, _) => Ok("void".to_string()),
        (Some(e), None) => element_type(e, target),
        _ => Ok(return_object_name(packet)),
    }
}

pub(crate) fn pack_request(packet: &Packet, layout: &PacketLayout<'_>, target: Target) -> Result<String> {
    let mut w = CodeWriter::new("\t");
    w.line(format!(
        "ByteBuffer bb = ipcon.createRequestPacket((byte){}, FUNCTION_{}, this);",
        frame_length(packet, layout.request_length)?,
        packet.upper_case_name()
    ));
    render(&mut w, &lower_pack(&layout.request), Sink::Local, target)?;
    Ok(w.finish())
}

pub(crate) fn unpack_response(packet: &Packet, layout: &PacketLayout<'_>, target: Target) -> Result<String> {
    let mut w = CodeWriter::new("\t");
    if layout.response.is_empty() {
        return Ok(String::new());
    }
    w.line("bb = ByteBuffer.wrap(response);");
    w.line("bb.order(ByteOrder.LITTLE_ENDIAN);");
    w.blank();
    let program = lower_unpack(&layout.response);
    if packet.out_count() > 1 {
        let obj = return_object_name(packet);
        w.line(format!("{} obj = new {}();", obj, obj));
        render(&mut w, &program, Sink::Field("obj"), target)?;
        w.blank();
        w.line("return obj;");
    } else {
        render(&mut w, &program, Sink::Local, target)?;
        w.blank();
        if let Some(e) = packet.out_elements().next() {
            w.line(format!("return {};", e.headless_camel_case_name()));
        }
    }
    Ok(w.finish())
}

pub(crate) fn callback_dispatch(
    packet: &Packet,
    layout: &PacketLayout<'_>,
    target: Target,
    shape: &CallbackShape,
) -> Result<String> {
    let mut w = CodeWriter::new("\t");
    let name = packet.camel_case_name();
    w.open(format!(
        "callbacks[IPConnection.unsignedByte(CALLBACK_{})] = new IPConnection.DeviceCallbackListener() {{",
        packet.upper_case_name()
    ));
    w.open(format!("public void callback({}) {{", shape.handler_params));
    if !layout.response.is_empty() {
        w.line("ByteBuffer bb = ByteBuffer.wrap(data);");
        w.line("bb.order(ByteOrder.LITTLE_ENDIAN);");
        w.blank();
        render(&mut w, &lower_unpack(&layout.response), Sink::Local, target)?;
        w.blank();
    }
    let names: Vec<String> = packet.out_elements().map(|e| e.headless_camel_case_name()).collect();
    w.open(format!("for ({}Listener listener: listener{}) {{", name, name));
    w.line(format!(
        "listener.{}({});",
        packet.headless_camel_case_name(),
        (shape.listener_args)(packet, &names)
    ));
    w.close("}");
    w.close("}");
    w.close("};");
    Ok(w.finish())
}

pub(crate) fn listener_declarations(device: &Device, target: Target, shape: &CallbackShape) -> Result<String> {
    let mut w = CodeWriter::new("\t");
    for packet in device.callback_packets() {
        let name = packet.camel_case_name();
        w.blank();
        write_doc(&mut w, packet.doc.as_deref());
        w.open(format!("public interface {}Listener extends DeviceListener {{", name));
        w.line(format!(
            "public void {}({});",
            packet.headless_camel_case_name(),
            (shape.listener_params)(packet, target)?
        ));
        w.close("}");
    }
    Ok(w.finish())
}

pub(crate) fn constants(device: &Device, target: Target) -> Result<String> {
    let mut w = CodeWriter::new("\t");
    for group in &device.constant_groups {
        let ty = native_name(group.ty, target)?;
        for item in &group.items {
            let value = match item.value {
                ConstantValue::Char(c) => format!("'{}'", c.escape_default()),
                ConstantValue::Int(v) if group.ty == ElementType::Bool => (v != 0).to_string(),
                ConstantValue::Int(v) if ty == "long" => format!("{}L", v),
                ConstantValue::Int(v) => format!("({}){}", ty, v),
            };
            w.line(format!(
                "public final static {} {}_{} = {};",
                ty,
                group.upper_case_name(),
                item.upper_case_name(),
                value
            ));
        }
    }
    Ok(w.finish())
}

/// Public fields plus `toString`, shared by return objects and callback records.
fn value_class_body(w: &mut CodeWriter, elements: &[&Element], target: Target, allocate: bool) -> Result<()> {
    for e in elements {
        let base = native_name(e.ty, target)?;
        let name = e.headless_camel_case_name();
        if e.is_array() {
            if allocate {
                w.line(format!("public {}[] {} = new {}[{}];", base, name, base, e.cardinality));
            } else {
                w.line(format!("public {}[] {};", base, name));
            }
        } else {
            w.line(format!("public {} {};", base, name));
        }
    }
    Ok(())
}

fn to_string_method(w: &mut CodeWriter, elements: &[&Element]) {
    let parts: Vec<String> = elements
        .iter()
        .map(|e| {
            let name = e.headless_camel_case_name();
            if e.is_array() {
                format!("\"{} = \" + Arrays.toString({})", name, name)
            } else {
                format!("\"{} = \" + {}", name, name)
            }
        })
        .collect();
    w.blank();
    w.open("public String toString() {");
    if parts.is_empty() {
        w.line("return \"[]\";");
    } else {
        w.line(format!("return \"[\" + {} + \"]\";", parts.join(" + \", \" + ")));
    }
    w.close("}");
}

fn return_objects(ctx: &DeviceContext<'_>, target: Target) -> Result<String> {
    let mut w = CodeWriter::new("\t");
    for view in ctx.functions() {
        if view.packet.out_count() < 2 {
            continue;
        }
        let outs: Vec<&Element> = view.packet.out_elements().collect();
        w.blank();
        w.open(format!("public class {} {{", return_object_name(view.packet)));
        value_class_body(&mut w, &outs, target, true)?;
        to_string_method(&mut w, &outs);
        w.close("}");
    }
    Ok(w.finish())
}

/// Typed record handed to listeners instead of loose arguments.
pub(crate) fn callback_record(packet: &Packet, target: Target) -> Result<String> {
    let mut w = CodeWriter::new("\t");
    let name = packet.camel_case_name();
    let outs: Vec<&Element> = packet.out_elements().collect();
    w.open(format!("public class {}CallbackData extends java.util.EventObject {{", name));
    w.line("private static final long serialVersionUID = 1L;");
    w.blank();
    value_class_body(&mut w, &outs, target, false)?;
    w.blank();
    let params = param_list(outs.iter().copied(), target)?;
    let sep = if params.is_empty() { "" } else { ", " };
    w.open(format!("public {}CallbackData(Object device{}{}) {{", name, sep, params));
    w.line("super(device);");
    if !outs.is_empty() {
        w.blank();
    }
    for e in &outs {
        let n = e.headless_camel_case_name();
        w.line(format!("this.{} = {};", n, n));
    }
    w.close("}");
    to_string_method(&mut w, &outs);
    w.close("}");
    Ok(w.finish())
}

fn write_doc(w: &mut CodeWriter, doc: Option<&str>) {
    let Some(doc) = doc else { return };
    w.line("/**");
    for l in doc.trim().lines() {
        let l = l.trim_end().replace("*/", "* /");
        if l.is_empty() {
            w.line(" *");
        } else {
            w.line(format!(" * {}", l));
        }
    }
    w.line(" */");
}

fn response_flag(flag: ResponseExpected) -> &'static str {
    match flag {
        ResponseExpected::AlwaysTrue => "RESPONSE_EXPECTED_FLAG_ALWAYS_TRUE",
        ResponseExpected::True => "RESPONSE_EXPECTED_FLAG_TRUE",
        ResponseExpected::False => "RESPONSE_EXPECTED_FLAG_FALSE",
        ResponseExpected::AlwaysFalse => "RESPONSE_EXPECTED_FLAG_ALWAYS_FALSE",
    }
}

/// Whole `.java` file. `records` holds pre-rendered callback record classes.
pub(crate) fn device_source(backend: &dyn Backend, ctx: &DeviceContext<'_>, records: Option<String>) -> Result<String> {
    let target = backend.target();
    let device = ctx.device;
    let class = class_name(device);
    let mut w = CodeWriter::new("\t");

    w.line("/*");
    for l in banner(device) {
        if l.is_empty() {
            w.line(" *");
        } else {
            w.line(format!(" * {}", l));
        }
    }
    w.line(" */");
    w.blank();
    w.line("package com.tinkerforge;");
    w.blank();
    for import in [
        "java.nio.ByteBuffer",
        "java.nio.ByteOrder",
        "java.util.concurrent.CopyOnWriteArrayList",
        "java.util.Arrays",
        "java.util.List",
    ] {
        w.line(format!("import {};", import));
    }
    w.blank();
    write_doc(&mut w, device.description.as_deref());
    w.open(format!("public class {} extends Device {{", class));
    w.line(format!("public final static int DEVICE_IDENTIFIER = {};", device.device_identifier));
    w.line(format!(
        "public final static String DEVICE_DISPLAY_NAME = \"{} {}\";",
        device.display_name(),
        device.category
    ));
    w.blank();

    for view in ctx.packets() {
        w.line(format!(
            "public final static byte {}_{} = (byte){};",
            view.packet.kind.as_str().to_uppercase(),
            view.packet.upper_case_name(),
            view.id.function_id
        ));
    }

    let constants = backend.emit_constants(device)?;
    if !constants.is_empty() {
        w.blank();
        w.block(&constants);
    }

    if device.callback_count() > 0 {
        w.blank();
        for packet in device.callback_packets() {
            let name = packet.camel_case_name();
            w.line(format!(
                "private List<{}Listener> listener{} = new CopyOnWriteArrayList<{}Listener>();",
                name, name, name
            ));
        }
    }

    if let Some(records) = records {
        w.block(&records);
    }
    w.block(&return_objects(ctx, target)?);
    w.block(&backend.emit_listener_declarations(device)?);

    // constructor
    let (major, minor, patch) = device.version;
    w.blank();
    w.line("/**");
    w.line(" * Creates an object with the unique device ID \\c uid. and adds it to");
    w.line(" * the IP Connection \\c ipcon.");
    w.line(" */");
    w.open(format!("public {}(String uid, IPConnection ipcon) {{", class));
    w.line("super(uid, ipcon);");
    w.blank();
    w.line(format!("apiVersion[0] = {};", major));
    w.line(format!("apiVersion[1] = {};", minor));
    w.line(format!("apiVersion[2] = {};", patch));
    w.blank();
    for view in ctx.packets() {
        w.line(format!(
            "responseExpected[IPConnection.unsignedByte({}_{})] = {};",
            view.packet.kind.as_str().to_uppercase(),
            view.packet.upper_case_name(),
            response_flag(view.id.response_expected)
        ));
    }
    for view in ctx.callbacks() {
        w.blank();
        w.block(&backend.emit_callback_dispatch(view.packet, view.layout)?);
    }
    w.close("}");

    for view in ctx.functions() {
        let packet = view.packet;
        w.blank();
        write_doc(&mut w, packet.doc.as_deref());
        w.open(format!(
            "public {} {}({}) throws TimeoutException, NotConnectedException {{",
            return_type(packet, target)?,
            packet.headless_camel_case_name(),
            param_list(packet.in_elements(), target)?
        ));
        w.block(&backend.emit_pack_request(packet, view.layout)?);
        w.blank();
        if packet.has_out_elements() {
            w.line("byte[] response = sendRequest(bb.array());");
            w.blank();
            w.block(&backend.emit_unpack_response(packet, view.layout)?);
        } else {
            w.line("sendRequest(bb.array());");
        }
        w.close("}");
    }

    for packet in device.callback_packets() {
        let name = packet.camel_case_name();
        w.blank();
        w.line("/**");
        w.line(format!(" * Adds a {} listener.", name));
        w.line(" */");
        w.open(format!("public void add{}Listener({}Listener listener) {{", name, name));
        w.line(format!("listener{}.add(listener);", name));
        w.close("}");
        w.blank();
        w.line("/**");
        w.line(format!(" * Removes a {} listener.", name));
        w.line(" */");
        w.open(format!("public void remove{}Listener({}Listener listener) {{", name, name));
        w.line(format!("listener{}.remove(listener);", name));
        w.close("}");
    }
    w.close("}");
    Ok(w.finish())
}

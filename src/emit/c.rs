//! C backend: byte-array marshalling through `leconvert_*` helpers.

use super::ir::{lower_pack, lower_unpack, At, Cond, Item, Stmt};
use super::{banner, frame_length, Backend, CodeWriter, DeviceContext};
use crate::error::Result;
use crate::ids::ResponseExpected;
use crate::layout::PacketLayout;
use crate::schema::{ConstantValue, Device, Element, Packet};
use crate::types::{native_name, ElementType, Target};

/// C backend. Callback wrappers are named after the device the backend is
/// scoped to; the default scope is the generic `device` prefix.
#[derive(Debug, Clone)]
pub struct CBackend {
    prefix: Prefix,
}

impl Default for CBackend {
    fn default() -> Self {
        CBackend {
            prefix: Prefix::standalone(),
        }
    }
}

impl CBackend {
    /// Backend whose fragments use `device`'s names and macros.
    pub fn for_device(device: &Device) -> Self {
        CBackend {
            prefix: Prefix::of_device(device),
        }
    }
}

impl Backend for CBackend {
    fn target(&self) -> Target {
        Target::C
    }

    fn file_name(&self, device: &Device) -> String {
        format!("{}_{}.c", device.category.to_lowercase(), device.underscore_name())
    }

    fn emit_pack_request(&self, _packet: &Packet, layout: &PacketLayout<'_>) -> Result<String> {
        let mut w = CodeWriter::new("\t");
        let program = lower_pack(&layout.request);
        render(&mut w, &program, Source::Request)?;
        Ok(w.finish())
    }

    fn emit_unpack_response(&self, _packet: &Packet, layout: &PacketLayout<'_>) -> Result<String> {
        let mut w = CodeWriter::new("\t");
        let program = lower_unpack(&layout.response);
        render(&mut w, &program, Source::Response)?;
        Ok(w.finish())
    }

    fn emit_callback_dispatch(&self, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String> {
        callback_wrapper(&self.prefix, packet, layout)
    }

    fn emit_constants(&self, device: &Device) -> Result<String> {
        let mut w = CodeWriter::new("\t");
        let prefix = device.upper_case_name();
        for group in &device.constant_groups {
            w.blank();
            w.line(format!("// {} ({})", group.name, native_name(group.ty, Target::C)?));
            for item in &group.items {
                let value = match item.value {
                    ConstantValue::Char(c) => format!("'{}'", c.escape_default()),
                    ConstantValue::Int(v) => match group.ty {
                        ElementType::Uint32 => format!("{}U", v),
                        ElementType::Int64 => format!("{}LL", v),
                        ElementType::Uint64 => format!("{}ULL", v),
                        _ => v.to_string(),
                    },
                };
                w.line(format!(
                    "#define {}_{}_{} {}",
                    prefix,
                    group.upper_case_name(),
                    item.upper_case_name(),
                    value
                ));
            }
        }
        Ok(w.finish())
    }

    fn emit_listener_declarations(&self, device: &Device) -> Result<String> {
        let mut w = CodeWriter::new("\t");
        for packet in device.callback_packets() {
            let mut params = packet
                .out_elements()
                .map(|e| value_param(e, false))
                .collect::<Result<Vec<_>>>()?;
            params.push("void *user_data".to_string());
            w.line(format!(
                "typedef void (*{})({});",
                callback_type(device.camel_case_name(), packet),
                params.join(", ")
            ));
        }
        Ok(w.finish())
    }

    fn emit_device(&self, ctx: &DeviceContext<'_>) -> Result<String> {
        let device = ctx.device;
        let scoped = CBackend::for_device(device);
        let prefix = &scoped.prefix;
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
        w.line("#define IPCON_EXPOSE_INTERNALS");
        w.blank();
        w.line("#include <stdbool.h>");
        w.line("#include <stdint.h>");
        w.line("#include <string.h>");
        w.blank();
        w.line("#include \"ip_connection.h\"");
        w.blank();
        w.line(format!("typedef Device {};", device.camel_case_name()));
        w.blank();
        w.line(format!("#define {}_DEVICE_IDENTIFIER {}", prefix.upper, device.device_identifier));
        w.line(format!(
            "#define {}_DEVICE_DISPLAY_NAME \"{} {}\"",
            prefix.upper,
            device.display_name(),
            device.category
        ));
        w.blank();
        for view in ctx.packets() {
            w.line(format!(
                "#define {} {}",
                id_macro(&prefix.upper, view.packet),
                view.id.function_id
            ));
        }
        w.block(&self.emit_constants(device)?);

        let listeners = self.emit_listener_declarations(device)?;
        if !listeners.is_empty() {
            w.blank();
            w.block(&listeners);
        }

        for view in ctx.callbacks() {
            w.blank();
            w.block(&scoped.emit_callback_dispatch(view.packet, view.layout)?);
        }

        let (major, minor, patch) = device.version;
        w.blank();
        w.open(format!(
            "void {}_create({} *{}, const char *uid, IPConnection *ipcon) {{",
            prefix.lower,
            device.camel_case_name(),
            prefix.lower
        ));
        w.line("DevicePrivate *device_p;");
        w.blank();
        w.line(format!(
            "device_create({}, uid, ipcon->p, {}, {}, {});",
            prefix.lower, major, minor, patch
        ));
        w.blank();
        w.line(format!("device_p = {}->p;", prefix.lower));
        w.blank();
        for view in ctx.packets() {
            w.line(format!(
                "device_p->response_expected[{}] = {};",
                id_macro(&prefix.upper, view.packet),
                response_flag(view.id.response_expected)
            ));
        }
        if device.callback_count() > 0 {
            w.blank();
        }
        for view in ctx.callbacks() {
            w.line(format!(
                "device_p->callback_wrappers[{}] = {}_callback_wrapper_{};",
                id_macro(&prefix.upper, view.packet),
                prefix.lower,
                view.packet.underscore_name()
            ));
        }
        w.close("}");

        for view in ctx.functions() {
            let packet = view.packet;
            let layout = view.layout;
            let mut params = vec![format!("{} *{}", device.camel_case_name(), prefix.lower)];
            for e in packet.in_elements() {
                params.push(value_param(e, true)?);
            }
            for e in packet.out_elements() {
                params.push(return_param(e)?);
            }
            w.blank();
            if let Some(doc) = &packet.doc {
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
            w.open(format!(
                "int {}_{}({}) {{",
                prefix.lower,
                packet.underscore_name(),
                params.join(", ")
            ));
            w.line(format!("DevicePrivate *device_p = {}->p;", prefix.lower));
            w.line(format!("uint8_t request[{}];", frame_length(packet, layout.request_length)?));
            if packet.has_out_elements() {
                w.line(format!("uint8_t response[{}];", frame_length(packet, layout.response_length)?));
            }
            w.line("int ret;");
            w.blank();
            w.line(format!(
                "ret = device_create_request(device_p, request, sizeof(request), {});",
                id_macro(&prefix.upper, packet)
            ));
            w.blank();
            return_on_error(&mut w);
            let pack = self.emit_pack_request(packet, layout)?;
            if !pack.is_empty() {
                w.blank();
                w.block(&pack);
            }
            w.blank();
            if packet.has_out_elements() {
                w.line("ret = device_send_request(device_p, request, sizeof(request), response, sizeof(response));");
                w.blank();
                return_on_error(&mut w);
                w.blank();
                w.block(&self.emit_unpack_response(packet, layout)?);
            } else {
                w.line("ret = device_send_request(device_p, request, sizeof(request), NULL, 0);");
            }
            w.blank();
            w.line("return ret;");
            w.close("}");
        }
        Ok(w.finish())
    }
}

/// Function-name and macro prefixes of a device.
#[derive(Debug, Clone)]
struct Prefix {
    lower: String,
    upper: String,
    camel: String,
}

impl Prefix {
    fn of_device(device: &Device) -> Self {
        Prefix {
            lower: device.underscore_name().to_string(),
            upper: device.upper_case_name(),
            camel: device.camel_case_name().to_string(),
        }
    }

    fn standalone() -> Self {
        Prefix {
            lower: "device".to_string(),
            upper: "DEVICE".to_string(),
            camel: "Device".to_string(),
        }
    }
}

fn id_macro(prefix: &str, packet: &Packet) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        packet.kind.as_str().to_uppercase(),
        packet.upper_case_name()
    )
}

fn callback_type(device: &str, packet: &Packet) -> String {
    format!("{}{}CallbackFunction", device, packet.camel_case_name())
}

fn response_flag(flag: ResponseExpected) -> &'static str {
    match flag {
        ResponseExpected::AlwaysTrue => "DEVICE_RESPONSE_EXPECTED_ALWAYS_TRUE",
        ResponseExpected::True => "DEVICE_RESPONSE_EXPECTED_TRUE",
        ResponseExpected::False => "DEVICE_RESPONSE_EXPECTED_FALSE",
        ResponseExpected::AlwaysFalse => "DEVICE_RESPONSE_EXPECTED_ALWAYS_FALSE",
    }
}

fn return_on_error(w: &mut CodeWriter) {
    w.open("if (ret < 0) {");
    w.line("return ret;");
    w.close("}");
}

/// Parameter carrying a value: `uint16_t x`, `const int16_t x[3]`, `const char *s`.
fn value_param(e: &Element, constant: bool) -> Result<String> {
    let native = native_name(e.ty, Target::C)?;
    let name = e.headless_camel_case_name();
    let qualifier = if constant { "const " } else { "" };
    Ok(if e.ty.is_string() {
        format!("{}char *{}", qualifier, name)
    } else if e.is_array() {
        format!("{}{} {}[{}]", qualifier, native, name, e.cardinality)
    } else {
        format!("{} {}", native, name)
    })
}

/// Out parameter: `uint16_t *ret_x`, `int16_t ret_x[3]`, `char ret_s[N + 1]`.
fn return_param(e: &Element) -> Result<String> {
    let native = native_name(e.ty, Target::C)?;
    let name = e.headless_camel_case_name();
    Ok(if e.ty.is_string() {
        format!("char ret_{}[{}]", name, e.cardinality + 1)
    } else if e.is_array() {
        format!("{} ret_{}[{}]", native, name, e.cardinality)
    } else {
        format!("{} *ret_{}", native, name)
    })
}

/// Which buffer a statement list touches, and where decoded values land.
#[derive(Clone, Copy, PartialEq)]
enum Source {
    /// Write into `request`.
    Request,
    /// Read `response` into `ret_*` out parameters.
    Response,
    /// Read callback `data` into locals.
    Callback,
}

impl Source {
    fn buffer(self) -> &'static str {
        match self {
            Source::Request => "request",
            Source::Response => "response",
            Source::Callback => "data",
        }
    }

    fn sink(self, field: &Element, item: Item) -> String {
        let name = field.headless_camel_case_name();
        match (self, item) {
            (Source::Callback, Item::Scalar) => name,
            (Source::Callback, Item::Indexed) => format!("{}[i]", name),
            (_, Item::Scalar) => format!("*ret_{}", name),
            (_, Item::Indexed) => format!("ret_{}[i]", name),
        }
    }

    fn string_sink(self, field: &Element) -> String {
        match self {
            Source::Callback => field.headless_camel_case_name(),
            _ => format!("ret_{}", field.headless_camel_case_name()),
        }
    }
}

fn offset(at: At) -> String {
    match at.stride {
        0 => at.base.to_string(),
        1 => format!("{} + i", at.base),
        s => format!("{} + i * {}", at.base, s),
    }
}

fn value_expr(field: &Element, item: Item) -> String {
    let name = field.headless_camel_case_name();
    match item {
        Item::Scalar => name,
        Item::Indexed => format!("{}[i]", name),
    }
}

fn render(w: &mut CodeWriter, stmts: &[Stmt<'_>], source: Source) -> Result<()> {
    let buffer = source.buffer();
    for stmt in stmts {
        match stmt {
            Stmt::Put { field, item, at } => {
                let value = value_expr(field, *item);
                let slot = format!("{}[{}]", buffer, offset(*at));
                match field.ty {
                    ElementType::Bool => w.line(format!("{} = {} ? 1 : 0;", slot, value)),
                    ty if ty.width() == 1 => w.line(format!("{} = (uint8_t){};", slot, value)),
                    ty => w.line(format!("leconvert_{}_to({}, &{});", ty.as_str(), value, slot)),
                }
            }
            Stmt::PutZero { at } => w.line(format!("{}[{}] = 0;", buffer, offset(*at))),
            Stmt::Get { field, item, at } => {
                let slot = format!("{}[{}]", buffer, offset(*at));
                let value = match field.ty {
                    ElementType::Bool => format!("{} != 0", slot),
                    ElementType::Uint8 => slot,
                    ty if ty.width() == 1 => format!("({}){}", native_name(ty, Target::C)?, slot),
                    ty => format!("leconvert_{}_from(&{})", ty.as_str(), slot),
                };
                w.line(format!("{} = {};", source.sink(field, *item), value));
            }
            Stmt::GetString { field, at, len } => {
                w.line(format!(
                    "string_copy({}, (const char *)&{}[{}], {});",
                    source.string_sink(field),
                    buffer,
                    offset(*at),
                    len
                ));
            }
            Stmt::Loop { count, body } => {
                for s in body {
                    if let Stmt::Branch {
                        cond: Cond::WithinString(field),
                        ..
                    } = s
                    {
                        let name = field.headless_camel_case_name();
                        w.line(format!("size_t {}_length = strnlen({}, {});", name, name, field.cardinality));
                    }
                }
                w.open(format!("for (size_t i = 0; i < {}; ++i) {{", count));
                render(w, body, source)?;
                w.close("}");
            }
            Stmt::Branch { cond, then, otherwise } => {
                match cond {
                    Cond::WithinString(field) => {
                        w.open(format!("if (i < {}_length) {{", field.headless_camel_case_name()))
                    }
                }
                render(w, then, source)?;
                if !otherwise.is_empty() {
                    w.dedent();
                    w.open("} else {");
                    render(w, otherwise, source)?;
                }
                w.close("}");
            }
        }
    }
    Ok(())
}

fn callback_wrapper(prefix: &Prefix, packet: &Packet, layout: &PacketLayout<'_>) -> Result<String> {
    let mut w = CodeWriter::new("\t");
    let function_type = callback_type(&prefix.camel, packet);
    let id = id_macro(&prefix.upper, packet);

    w.open(format!(
        "static void {}_callback_wrapper_{}(DevicePrivate *device_p, uint8_t *data) {{",
        prefix.lower,
        packet.underscore_name()
    ));
    w.line(format!("{} callback_function;", function_type));
    w.line("void *user_data;");
    for e in packet.out_elements() {
        let native = native_name(e.ty, Target::C)?;
        let name = e.headless_camel_case_name();
        if e.ty.is_string() {
            w.line(format!("char {}[{}];", name, e.cardinality + 1));
        } else if e.is_array() {
            w.line(format!("{} {}[{}];", native, name, e.cardinality));
        } else {
            w.line(format!("{} {};", native, name));
        }
    }
    w.blank();
    w.line(format!(
        "callback_function = ({})device_p->registered_callbacks[{}];",
        function_type, id
    ));
    w.line(format!("user_data = device_p->registered_callback_user_data[{}];", id));

    if !layout.response.is_empty() {
        w.blank();
        render(&mut w, &lower_unpack(&layout.response), Source::Callback)?;
    }

    let mut args: Vec<String> = packet.out_elements().map(|e| e.headless_camel_case_name()).collect();
    args.push("user_data".to_string());
    w.blank();
    w.open("if (callback_function != NULL) {");
    w.line(format!("callback_function({});", args.join(", ")));
    w.close("}");
    w.close("}");
    Ok(w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Direction, PacketKind};

    fn el(name: &str, ty: ElementType, cardinality: usize, direction: Direction) -> Element {
        Element {
            name: name.to_string(),
            ty,
            cardinality,
            direction,
        }
    }

    fn packet(name: &str, wire: &str, kind: PacketKind, elements: Vec<Element>) -> Packet {
        Packet::new(name.into(), wire.into(), kind, None, None, None, elements)
    }

    #[test]
    fn pack_uses_leconvert_for_wide_types() {
        let p = packet(
            "Beep",
            "beep",
            PacketKind::Function,
            vec![
                el("duration", ElementType::Uint32, 1, Direction::In),
                el("frequency", ElementType::Uint16, 1, Direction::In),
                el("loud", ElementType::Bool, 1, Direction::In),
            ],
        );
        let layout = PacketLayout::compute(&p);
        let code = CBackend::default().emit_pack_request(&p, &layout).unwrap();
        assert_eq!(
            code,
            "leconvert_uint32_to(duration, &request[4]);\n\
             leconvert_uint16_to(frequency, &request[8]);\n\
             request[10] = loud ? 1 : 0;\n"
        );
    }

    #[test]
    fn string_parameter_is_measured_once() {
        let p = packet(
            "SetLabel",
            "set_label",
            PacketKind::Function,
            vec![el("label", ElementType::String, 8, Direction::In)],
        );
        let layout = PacketLayout::compute(&p);
        let code = CBackend::default().emit_pack_request(&p, &layout).unwrap();
        assert!(code.starts_with("size_t label_length = strnlen(label, 8);\n"));
        assert!(code.contains("\t\trequest[4 + i] = (uint8_t)label[i];\n\t} else {\n\t\trequest[4 + i] = 0;\n"));
    }

    #[test]
    fn unpack_writes_out_parameters() {
        let p = packet(
            "GetReadings",
            "get_readings",
            PacketKind::Function,
            vec![
                el("values", ElementType::Int16, 3, Direction::Out),
                el("name", ElementType::String, 5, Direction::Out),
                el("mode", ElementType::Int8, 1, Direction::Out),
            ],
        );
        let layout = PacketLayout::compute(&p);
        let code = CBackend::default().emit_unpack_response(&p, &layout).unwrap();
        assert!(code.contains("\tret_values[i] = leconvert_int16_from(&response[4 + i * 2]);"));
        assert!(code.contains("string_copy(ret_name, (const char *)&response[10], 5);"));
        assert!(code.contains("*ret_mode = (int8_t)response[15];"));
    }

    #[test]
    fn callback_wrapper_decodes_into_locals() {
        let p = packet(
            "Tick",
            "tick",
            PacketKind::Callback,
            vec![el("count", ElementType::Uint8, 1, Direction::Out)],
        );
        let layout = PacketLayout::compute(&p);
        let code = CBackend::default().emit_callback_dispatch(&p, &layout).unwrap();
        assert!(code.contains("static void device_callback_wrapper_tick(DevicePrivate *device_p, uint8_t *data) {"));
        assert!(code.contains("\tuint8_t count;"));
        assert!(code.contains("\tcount = data[4];"));
        assert!(code.contains("\t\tcallback_function(count, user_data);"));
    }

    #[test]
    fn oversized_frame_is_not_emitted() {
        let config = crate::parser::parse(
            "device Thing / thing \"Thing\" { category: Bricklet; identifier: 1; version: 1.0.0; }",
        )
        .unwrap();
        let mut device = Device::load(config.devices.into_iter().next().unwrap()).unwrap();
        let p = packet(
            "GetValues",
            "get_values",
            PacketKind::Function,
            vec![el("values", ElementType::Uint16, 126, Direction::Out)],
        );
        device.replace_packets(vec![p]);
        let ids = crate::ids::assign(&device).unwrap();
        let layouts = crate::layout::LayoutCache::new(&device);
        let ctx = DeviceContext::new(&device, &ids, &layouts);
        let err = CBackend::default().emit_device(&ctx).unwrap_err();
        assert!(matches!(
            err,
            crate::error::GenError::Schema(crate::error::SchemaError::FrameTooLong { length: Some(256), .. })
        ));
    }

    #[test]
    fn device_wrappers_use_the_device_scope() {
        let config = crate::parser::parse(
            "device Thing / thing \"Thing\" { category: Bricklet; identifier: 1; version: 1.0.0; callback Tick / tick { count: uint8 out; } }",
        )
        .unwrap();
        let device = Device::load(config.devices.into_iter().next().unwrap()).unwrap();
        let ids = crate::ids::assign(&device).unwrap();
        let layouts = crate::layout::LayoutCache::new(&device);
        let ctx = DeviceContext::new(&device, &ids, &layouts);
        let unit = CBackend::default().emit_device(&ctx).unwrap();
        let tick = &device.packets()[0];
        let wrapper = CBackend::for_device(&device)
            .emit_callback_dispatch(tick, &PacketLayout::compute(tick))
            .unwrap();
        assert!(wrapper.contains("ThingTickCallbackFunction callback_function;"));
        assert!(wrapper.contains("registered_callbacks[THING_CALLBACK_TICK]"));
        assert!(unit.contains(&wrapper));
        assert!(!unit.contains("DeviceTickCallbackFunction"));
    }

    #[test]
    fn c_has_no_record_capability() {
        let p = packet("Tick", "tick", PacketKind::Callback, vec![]);
        let layout = PacketLayout::compute(&p);
        assert!(CBackend::default().emit_callback_record(&p, &layout).is_err());
    }
}

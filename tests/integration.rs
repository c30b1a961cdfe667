//! Integration tests: configuration to model, layout, identifiers, emission,
//! reference codec round trips and the batch driver.

use packetgen::driver::{common_packets, merge_common, DeviceState, Options};
use packetgen::emit::c::CBackend;
use packetgen::emit::{Backend, DeviceContext};
use packetgen::{
    assign, backend, build_request, build_response, generate, generate_device, native_name, parse, parse_request,
    parse_response, Codec, CodecError, Device, Direction, Element, ElementType, GenError, LayoutCache, Packet,
    PacketKind, PacketLayout, ResponseExpected, SchemaError, Target, Value, HEADER_LENGTH, MAX_FRAME_LENGTH,
};
use std::collections::HashMap;
use std::fs;

const PIEZO: &str = r#"
// Piezo speaker with a tone, a Morse sender and a completion callback.
device PiezoSpeaker / piezo_speaker "Piezo Speaker" {
    category: Bricklet;
    identifier: 242;
    version: 2.0.1;
    description: "Creates beep with configurable frequency";

    function Beep / beep {
        doc: "Beeps with the given frequency for the given duration in ms.";
        duration: uint32 in;
        frequency: uint16 in;
    }
    function MorseCode / morse_code (response_expected = true) {
        morse: string[60] in;
        frequency: uint16 in;
    }
    function GetStatus / get_status {
        busy: bool out;
        levels: uint8[3] out;
        label: string[8] out;
    }
    callback BeepFinished / beep_finished { }
    callback LevelReached / level_reached {
        level: uint8 out;
    }

    constants BeepMode: uint8 {
        Off = 0;
        On = 1;
    }
}
"#;

const COMMON: &str = r#"
common Bricklet {
    function GetIdentity / get_identity (id = 255) {
        uid: string[8] out;
        firmware_version: uint8[3] out;
        device_identifier: uint16 out;
    }
}
"#;

fn load(src: &str) -> Device {
    let mut file = parse(src).expect("parse");
    Device::load(file.devices.remove(0)).expect("load")
}

fn el(name: &str, ty: ElementType, cardinality: usize, direction: Direction) -> Element {
    Element {
        name: name.to_string(),
        ty,
        cardinality,
        direction,
    }
}

fn values(pairs: Vec<(&str, Value)>) -> HashMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

// ==================== Model, layout, identifiers ====================

#[test]
fn frame_lengths_include_header() {
    let device = load(PIEZO);
    for packet in device.packets() {
        let request: usize = packet.in_elements().map(|e| e.ty.width() * e.cardinality).sum();
        let response: usize = packet.out_elements().map(|e| e.ty.width() * e.cardinality).sum();
        assert_eq!(packet.request_length(), HEADER_LENGTH + request);
        assert_eq!(packet.response_length(), HEADER_LENGTH + response);
    }
}

#[test]
fn beep_scenario() {
    let device = load(PIEZO);
    let ids = assign(&device).expect("ids");
    let beep = &device.packets()[0];
    assert_eq!(beep.request_length(), 10);
    assert_eq!(beep.response_length(), 4);
    assert_eq!(ids.get(0).unwrap().response_expected, ResponseExpected::False);
    assert_eq!(ids.get(1).unwrap().response_expected, ResponseExpected::True);
    assert_eq!(ids.get(2).unwrap().response_expected, ResponseExpected::AlwaysTrue);

    let level = &device.packets()[4];
    assert_eq!(level.kind, PacketKind::Callback);
    assert_eq!(level.response_length(), 5);
    assert_eq!(ids.get(4).unwrap().response_expected, ResponseExpected::AlwaysFalse);
}

#[test]
fn default_ids_follow_declaration_order() {
    let device = load(PIEZO);
    let ids = assign(&device).expect("ids");
    let assigned: Vec<u8> = ids.iter().map(|id| id.function_id).collect();
    assert_eq!(assigned, [1, 2, 3, 4, 5]);
}

#[test]
fn layout_offsets_are_packed() {
    let device = load(PIEZO);
    let layouts = LayoutCache::new(&device);
    let status = layouts.get(2).expect("layout");
    let offsets: Vec<(usize, usize)> = status.response.iter().map(|s| (s.offset, s.length)).collect();
    assert_eq!(offsets, [(0, 1), (1, 3), (4, 8)]);
    assert_eq!(status.response_length, 16);
}

#[test]
fn duplicate_ids_fail_the_device() {
    let src = r#"
device Relay / relay "Relay" {
    category: Bricklet;
    identifier: 26;
    version: 2.0.0;
    function SetState / set_state (id = 2) { state: bool in; }
    function GetState / get_state { state: bool out; }
}
"#;
    let device = load(src);
    assert_eq!(
        assign(&device).unwrap_err(),
        SchemaError::DuplicateFunctionId {
            function_id: 2,
            first: "SetState".into(),
            second: "GetState".into(),
        }
    );
}

#[test]
fn schema_errors_surface_from_load() {
    let bad_name = PIEZO.replace("MorseCode / morse_code", "MorseCode / morse_codes");
    let mut file = parse(&bad_name).expect("parse");
    assert!(matches!(
        Device::load(file.devices.remove(0)),
        Err(GenError::Schema(SchemaError::NameMismatch { .. }))
    ));

    let bad_direction = PIEZO.replace("duration: uint32 in;", "duration: uint32 inout;");
    let mut file = parse(&bad_direction).expect("parse");
    assert!(matches!(
        Device::load(file.devices.remove(0)),
        Err(GenError::Schema(SchemaError::InvalidDirection { .. }))
    ));

    let bad_kind = PIEZO.replace("callback BeepFinished", "event BeepFinished");
    let mut file = parse(&bad_kind).expect("parse");
    assert!(matches!(
        Device::load(file.devices.remove(0)),
        Err(GenError::Schema(SchemaError::InvalidKind { .. }))
    ));

    let bad_type = PIEZO.replace("duration: uint32 in;", "duration: uint24 in;");
    let mut file = parse(&bad_type).expect("parse");
    assert!(matches!(Device::load(file.devices.remove(0)), Err(GenError::UnknownType(_))));
}

#[test]
fn native_names_are_total() {
    for target in Target::ALL {
        for ty in ElementType::ALL {
            assert!(native_name(ty, target).is_ok(), "{} has no {} mapping", ty, target);
        }
    }
}

// ==================== Round trips through the reference codec ====================

#[test]
fn round_trip_every_type() {
    let elements = vec![
        el("a", ElementType::Int8, 1, Direction::In),
        el("b", ElementType::Uint8, 1, Direction::In),
        el("c", ElementType::Int16, 1, Direction::In),
        el("d", ElementType::Uint16, 1, Direction::In),
        el("e", ElementType::Int32, 1, Direction::In),
        el("f", ElementType::Uint32, 1, Direction::In),
        el("g", ElementType::Int64, 1, Direction::In),
        el("h", ElementType::Uint64, 1, Direction::In),
        el("i", ElementType::Float32, 1, Direction::In),
        el("j", ElementType::Bool, 1, Direction::In),
        el("k", ElementType::Char, 1, Direction::In),
        el("l", ElementType::String, 5, Direction::In),
        el("m", ElementType::Int16, 3, Direction::In),
        el("n", ElementType::Float32, 2, Direction::In),
        el("o", ElementType::Bool, 2, Direction::In),
    ];
    let packet = Packet::new("All".into(), "all".into(), PacketKind::Function, None, None, None, elements);
    let codec = Codec::new(&packet);
    let input = values(vec![
        ("a", Value::Int8(-5)),
        ("b", Value::Uint8(250)),
        ("c", Value::Int16(-30000)),
        ("d", Value::Uint16(65000)),
        ("e", Value::Int32(i32::MIN)),
        ("f", Value::Uint32(u32::MAX)),
        ("g", Value::Int64(-1)),
        ("h", Value::Uint64(u64::MAX - 1)),
        ("i", Value::Float32(-1.5e-3)),
        ("j", Value::Bool(true)),
        ("k", Value::Char(b'z')),
        ("l", Value::string("hello")),
        ("m", Value::Array(vec![Value::Int16(1), Value::Int16(-2), Value::Int16(3)])),
        ("n", Value::Array(vec![Value::Float32(0.25), Value::Float32(f32::MAX)])),
        ("o", Value::Array(vec![Value::Bool(false), Value::Bool(true)])),
    ]);
    let frame = codec.encode_request(&input).expect("encode");
    assert_eq!(frame.len(), packet.request_length());
    let output = codec.decode_request(&frame).expect("decode");
    assert_eq!(output, input);
    let (Value::Float32(x), Value::Float32(y)) = (&input["i"], &output["i"]) else {
        panic!("float values expected");
    };
    assert_eq!(x.to_bits(), y.to_bits());
}

#[test]
fn strings_are_padded_and_truncated() {
    let packet = Packet::new(
        "SetLabel".into(),
        "set_label".into(),
        PacketKind::Function,
        None,
        None,
        None,
        vec![el("label", ElementType::String, 6, Direction::In)],
    );
    let codec = Codec::new(&packet);

    let short = codec.encode_request(&values(vec![("label", Value::string("ab"))])).unwrap();
    assert_eq!(&short[HEADER_LENGTH..], b"ab\0\0\0\0");
    assert_eq!(codec.decode_request(&short).unwrap()["label"], Value::string("ab"));

    let long = codec
        .encode_request(&values(vec![("label", Value::string("abcdefgh"))]))
        .unwrap();
    assert_eq!(long.len(), 10);
    assert_eq!(codec.decode_request(&long).unwrap()["label"], Value::string("abcdef"));
}

#[test]
fn frames_carry_header_and_are_checked() {
    let device = load(PIEZO);
    let ids = assign(&device).unwrap();
    let beep = &device.packets()[0];
    let id = ids.get(0).unwrap().function_id;
    let codec = Codec::new(beep);
    let input = values(vec![("duration", Value::Uint32(1000)), ("frequency", Value::Uint16(2000))]);

    let frame = build_request(&codec, 7, id, &input).unwrap();
    assert_eq!(frame, [7, 1, 10, 0, 0xe8, 0x03, 0, 0, 0xd0, 0x07]);
    let decoded = parse_request(&codec, id, &frame).unwrap();
    assert_eq!(decoded.header.stack_id, 7);
    assert_eq!(decoded.values, input);

    assert_eq!(
        parse_request(&codec, 2, &frame).unwrap_err(),
        CodecError::FunctionMismatch { expected: 2, actual: 1 }
    );
    assert!(matches!(
        parse_request(&codec, id, &frame[..9]),
        Err(CodecError::FrameLength { expected: 10, .. })
    ));

    let level = &device.packets()[4];
    let codec = Codec::new(level);
    let frame = build_response(&codec, 1, 5, &values(vec![("level", Value::Uint8(9))])).unwrap();
    assert_eq!(frame, [1, 5, 5, 0, 9]);
    assert_eq!(parse_response(&codec, 5, &frame).unwrap().values["level"], Value::Uint8(9));
}

// ==================== Emission ====================

#[test]
fn c_output_has_ids_tables_and_marshalling() {
    let unit = generate_device(parse(PIEZO).unwrap().devices.remove(0), Target::C).unwrap();
    let src = &unit.source;
    assert_eq!(unit.file_name, "bricklet_piezo_speaker.c");
    assert!(src.contains("#define PIEZO_SPEAKER_DEVICE_IDENTIFIER 242"));
    assert!(src.contains("#define PIEZO_SPEAKER_FUNCTION_BEEP 1"));
    assert!(src.contains("#define PIEZO_SPEAKER_CALLBACK_LEVEL_REACHED 5"));
    assert!(src.contains("#define PIEZO_SPEAKER_BEEP_MODE_ON 1"));
    assert!(src.contains("typedef void (*PiezoSpeakerLevelReachedCallbackFunction)(uint8_t level, void *user_data);"));
    assert!(src.contains("device_p->response_expected[PIEZO_SPEAKER_FUNCTION_MORSE_CODE] = DEVICE_RESPONSE_EXPECTED_TRUE;"));
    assert!(src.contains("int piezo_speaker_beep(PiezoSpeaker *piezo_speaker, uint32_t duration, uint16_t frequency) {"));
    assert!(src.contains("\tleconvert_uint32_to(duration, &request[4]);"));
    assert!(src.contains("\tsize_t morse_length = strnlen(morse, 60);"));
    assert!(src.contains(
        "int piezo_speaker_get_status(PiezoSpeaker *piezo_speaker, bool *ret_busy, uint8_t ret_levels[3], char ret_label[9]) {"
    ));
    assert!(src.contains("\tstring_copy(ret_label, (const char *)&response[8], 8);"));
    assert!(src.contains("static void piezo_speaker_callback_wrapper_level_reached(DevicePrivate *device_p, uint8_t *data) {"));
    assert!(!src.contains("apiVersion"));
    assert!(src.contains("device_create(piezo_speaker, uid, ipcon->p, 2, 0, 1);"));
}

#[test]
fn c_wrappers_come_from_the_dispatch_capability() {
    let device = load(PIEZO);
    let unit = generate_device(parse(PIEZO).unwrap().devices.remove(0), Target::C).unwrap();
    for callback in device.callback_packets() {
        let wrapper = CBackend::for_device(&device)
            .emit_callback_dispatch(callback, &PacketLayout::compute(callback))
            .unwrap();
        assert!(unit.source.contains(&wrapper));
    }
    let level = &device.packets()[4];
    let generic = backend(Target::C)
        .emit_callback_dispatch(level, &PacketLayout::compute(level))
        .unwrap();
    assert!(generic.contains("DeviceLevelReachedCallbackFunction callback_function;"));
    assert!(!unit.source.contains("DEVICE_CALLBACK_LEVEL_REACHED"));
}

#[test]
fn largest_frame_reaches_every_backend() {
    let largest = r#"
device Buffer / buffer "Buffer" {
    category: Bricklet;
    identifier: 7;
    version: 1.0.0;
    function SetData / set_data { data: uint8[251] in; }
    function GetData / get_data { data: uint8[251] out; }
}
"#;
    for target in Target::ALL {
        let unit = generate_device(parse(largest).unwrap().devices.remove(0), target).unwrap();
        match target {
            Target::C => {
                assert!(unit.source.contains("\tuint8_t request[255];"));
                assert!(unit.source.contains("\tuint8_t response[255];"));
            }
            Target::Java | Target::Matlab => {
                assert!(unit.source.contains("createRequestPacket((byte)255, FUNCTION_SET_DATA, this);"));
            }
        }
    }
    let too_large = largest.replace("uint8[251] out", "uint8[252] out");
    for target in Target::ALL {
        assert!(matches!(
            generate_device(parse(&too_large).unwrap().devices.remove(0), target),
            Err(GenError::Schema(SchemaError::FrameTooLong { length: Some(256), .. }))
        ));
    }
    assert_eq!(MAX_FRAME_LENGTH, 255);
}

#[test]
fn java_output_has_listeners_and_return_objects() {
    let unit = generate_device(parse(PIEZO).unwrap().devices.remove(0), Target::Java).unwrap();
    let src = &unit.source;
    assert_eq!(unit.file_name, "BrickletPiezoSpeaker.java");
    assert!(src.contains("public class BrickletPiezoSpeaker extends Device {"));
    assert!(src.contains("\tpublic final static byte FUNCTION_BEEP = (byte)1;"));
    assert!(src.contains("\tpublic final static short BEEP_MODE_OFF = (short)0;"));
    assert!(src.contains("\tpublic class Status {"));
    assert!(src.contains("\tpublic interface LevelReachedListener extends DeviceListener {"));
    assert!(src.contains("\t\tpublic void levelReached(short level);"));
    assert!(src.contains("\tpublic void beep(long duration, int frequency) throws TimeoutException, NotConnectedException {"));
    assert!(src.contains("\tpublic Status getStatus() throws TimeoutException, NotConnectedException {"));
    assert!(src.contains("\t\tresponseExpected[IPConnection.unsignedByte(FUNCTION_GET_STATUS)] = RESPONSE_EXPECTED_FLAG_ALWAYS_TRUE;"));
    assert!(src.contains("\tpublic void addLevelReachedListener(LevelReachedListener listener) {"));
    assert!(src.contains("callbacks[IPConnection.unsignedByte(CALLBACK_LEVEL_REACHED)] = new IPConnection.DeviceCallbackListener() {"));
    assert!(!src.contains("CallbackData"));
}

#[test]
fn matlab_output_adds_callback_records() {
    let unit = generate_device(parse(PIEZO).unwrap().devices.remove(0), Target::Matlab).unwrap();
    let src = &unit.source;
    assert!(src.contains("\tpublic class LevelReachedCallbackData extends java.util.EventObject {"));
    assert!(src.contains("\tpublic class BeepFinishedCallbackData extends java.util.EventObject {"));
    assert!(src.contains("\t\tpublic void levelReached(LevelReachedCallbackData data);"));
    assert!(src.contains("listener.levelReached(new LevelReachedCallbackData(device, level));"));
}

#[test]
fn record_capability_is_backend_specific() {
    let device = load(PIEZO);
    let callback = &device.packets()[4];
    let layout = PacketLayout::compute(callback);
    for target in [Target::C, Target::Java] {
        assert!(matches!(
            backend(target).emit_callback_record(callback, &layout),
            Err(GenError::Capability(e)) if e.backend == target
        ));
    }
    assert!(backend(Target::Matlab).emit_callback_record(callback, &layout).is_ok());
}

#[test]
fn emission_leaves_model_untouched() {
    let device = load(PIEZO);
    let before = device.clone();
    let ids = assign(&device).unwrap();
    let layouts = LayoutCache::new(&device);
    let ctx = DeviceContext::new(&device, &ids, &layouts);
    for target in Target::ALL {
        backend(target).emit_device(&ctx).unwrap();
    }
    assert_eq!(device, before);
}

// ==================== Driver ====================

#[test]
fn common_merge_is_idempotent_across_runs() {
    let files = vec![parse(PIEZO).unwrap(), parse(COMMON).unwrap()];
    let common = common_packets(&files);
    let mut devices = files[0].devices.clone();
    merge_common(&mut devices, &common);
    let first = devices[0].packets.len();
    merge_common(&mut devices, &common);
    assert_eq!(devices[0].packets.len(), first);
    assert_eq!(first, 6);

    let device = Device::load(devices.remove(0)).unwrap();
    assert!(device.common_included);
    let ids = assign(&device).unwrap();
    assert_eq!(ids.get(5).unwrap().function_id, 255);
}

#[test]
fn generation_is_deterministic_and_writes_id_tables() {
    let config = tempfile::tempdir().unwrap();
    fs::write(config.path().join("piezo_speaker.device"), PIEZO).unwrap();
    fs::write(config.path().join("bricklet_common.device"), COMMON).unwrap();

    let mut outputs = Vec::new();
    for jobs in [Some(1), Some(4)] {
        let out = tempfile::tempdir().unwrap();
        let options = Options {
            target: Target::Java,
            out_dir: out.path().to_path_buf(),
            jobs,
        };
        let report = generate(config.path(), &options).unwrap();
        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 1);
        let source = fs::read_to_string(out.path().join("BrickletPiezoSpeaker.java")).unwrap();
        let ids = fs::read_to_string(out.path().join("bricklet_piezo_speaker.ids")).unwrap();
        outputs.push((source, ids));
    }
    assert_eq!(outputs[0], outputs[1]);
    let ids = &outputs[0].1;
    assert_eq!(ids.lines().count(), 6);
    assert!(ids.starts_with("function\t1\tbeep\tfalse\n"));
    assert!(ids.ends_with("function\t255\tget_identity\talways_true\n"));
}

#[test]
fn one_bad_device_does_not_stop_the_batch() {
    let config = tempfile::tempdir().unwrap();
    fs::write(config.path().join("a_piezo.device"), PIEZO).unwrap();
    fs::write(config.path().join("b_broken.device"), "device Broken / broken {").unwrap();
    fs::write(
        config.path().join("c_dup.device"),
        r#"
device Relay / relay "Relay" {
    category: Bricklet;
    identifier: 26;
    version: 2.0.0;
    function SetState / set_state (id = 2) { state: bool in; }
    function GetState / get_state { state: bool out; }
}
"#,
    )
    .unwrap();
    fs::write(config.path().join("notes.txt"), "ignored").unwrap();

    let out = tempfile::tempdir().unwrap();
    let options = Options {
        target: Target::C,
        out_dir: out.path().join("gen"),
        jobs: None,
    };
    let report = generate(config.path(), &options).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.outcomes.len(), 3);

    let states: Vec<DeviceState> = report.outcomes.iter().map(|o| o.state).collect();
    assert_eq!(states, [DeviceState::Emitted, DeviceState::Failed, DeviceState::Failed]);
    assert!(matches!(report.outcomes[1].error, Some(GenError::Parse(_))));
    assert!(matches!(
        report.outcomes[2].error,
        Some(GenError::Schema(SchemaError::DuplicateFunctionId { .. }))
    ));
    assert!(out.path().join("gen/bricklet_piezo_speaker.c").is_file());
    assert!(!out.path().join("gen/bricklet_relay.c").exists());
}

#[test]
fn duplicate_devices_do_not_race_for_output() {
    let config = tempfile::tempdir().unwrap();
    fs::write(config.path().join("a_piezo.device"), PIEZO).unwrap();
    fs::write(
        config.path().join("b_piezo.device"),
        PIEZO.replace("identifier: 242;", "identifier: 243;"),
    )
    .unwrap();

    let out = tempfile::tempdir().unwrap();
    let options = Options {
        target: Target::C,
        out_dir: out.path().to_path_buf(),
        jobs: Some(4),
    };
    let report = generate(config.path(), &options).unwrap();
    let states: Vec<DeviceState> = report.outcomes.iter().map(|o| o.state).collect();
    assert_eq!(states, [DeviceState::Emitted, DeviceState::Failed]);
    assert!(matches!(
        &report.outcomes[1].error,
        Some(GenError::DuplicateOutput { device, first })
            if device == "piezo_speaker" && first.ends_with("a_piezo.device")
    ));
    let source = fs::read_to_string(out.path().join("bricklet_piezo_speaker.c")).unwrap();
    assert!(source.contains("#define PIEZO_SPEAKER_DEVICE_IDENTIFIER 242"));
}

#[test]
fn missing_config_dir_is_an_error() {
    let out = tempfile::tempdir().unwrap();
    let options = Options {
        target: Target::C,
        out_dir: out.path().to_path_buf(),
        jobs: None,
    };
    assert!(matches!(
        generate(&out.path().join("nope"), &options),
        Err(GenError::Io { .. })
    ));
}

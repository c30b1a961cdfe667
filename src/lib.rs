//! # packetgen: binding generator for fixed-size binary device protocols
//!
//! Devices are described in a small configuration language; each device owns
//! an ordered list of function and callback packets whose elements are laid
//! out byte-packed and little-endian behind a 4-byte header. From that model
//! the crate emits client bindings for several target languages, plus a
//! function-id table for runtime dispatchers.
//!
//! ## Pipeline
//!
//! - [`parser`]: configuration text to raw [`ast`] records
//! - [`schema`]: validated [`Device`] / [`Packet`] / [`Element`] model
//! - [`layout`]: byte offsets and frame lengths
//! - [`ids`]: function ids and response-expected flags
//! - [`emit`]: per-target backends rendering target-neutral statements
//! - [`driver`]: batch generation over a configuration directory
//!
//! [`codec`] and [`frame`] execute the same statements the backends render,
//! which makes them the reference for what generated code does on the wire.
//!
//! ## Example configuration
//!
//! ```text
//! device PiezoSpeaker / piezo_speaker "Piezo Speaker" {
//!   category: Bricklet;
//!   identifier: 242;
//!   version: 2.0.0;
//!
//!   function Beep / beep {
//!     duration: uint32 in;
//!     frequency: uint16 in;
//!   }
//!   callback BeepFinished / beep_finished { }
//! }
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use packetgen::{generate_device, parse, Target};
//!
//! let config = parse(&std::fs::read_to_string("piezo_speaker.device")?)?;
//! for device in config.devices {
//!     let unit = generate_device(device, Target::C)?;
//!     println!("{}", unit.source);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ast;
pub mod codec;
pub mod driver;
pub mod emit;
pub mod error;
pub mod frame;
pub mod ids;
pub mod layout;
pub mod parser;
pub mod schema;
pub mod types;
pub mod value;

pub use codec::{Codec, CodecError};
pub use driver::{generate, generate_device, DeviceState, GeneratedUnit, GenerationReport, Options};
pub use emit::{backend, Backend};
pub use error::{BackendCapabilityError, GenError, ParseError, SchemaError, UnknownTypeError};
pub use frame::{build_request, build_response, parse_request, parse_response, DecodedFrame, FrameHeader};
pub use ids::{assign, IdentifierTable, ResponseExpected};
pub use layout::{FieldSlot, LayoutCache, PacketLayout};
pub use parser::parse;
pub use schema::{Device, Direction, Element, Packet, PacketKind, HEADER_LENGTH, MAX_FRAME_LENGTH};
pub use types::{native_name, width, ElementType, Target};
pub use value::Value;

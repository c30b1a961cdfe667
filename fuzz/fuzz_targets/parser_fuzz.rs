//! Parser fuzz target: feed arbitrary bytes to the device configuration parser.
//! The parser must not panic; it should return Ok(ConfigFile) or Err(ParseError).
//! Build with: cargo fuzz run parser_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(file) = packetgen::parse(s) {
        // Whatever parses must either load or fail with a typed error, never panic.
        for device in file.devices {
            let _ = packetgen::Device::load(device);
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parser_fuzz");
}

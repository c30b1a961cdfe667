//! Frame handling: the 4-byte header in front of every payload.
//!
//! Header layout: `stack_id: u8`, `function_id: u8`, `length: u16` (little-endian,
//! total frame length including the header). Frames are built only up to
//! [`MAX_FRAME_LENGTH`], the limit every generated binding can express.

use crate::codec::{Codec, CodecError};
use crate::schema::{HEADER_LENGTH, MAX_FRAME_LENGTH};
use crate::value::Value;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub stack_id: u8,
    pub function_id: u8,
    pub length: u16,
}

impl FrameHeader {
    pub fn write(&self, frame: &mut [u8]) -> Result<(), CodecError> {
        if frame.len() < HEADER_LENGTH {
            return Err(CodecError::Truncated {
                needed: HEADER_LENGTH,
                actual: frame.len(),
            });
        }
        frame[0] = self.stack_id;
        frame[1] = self.function_id;
        LittleEndian::write_u16(&mut frame[2..4], self.length);
        Ok(())
    }

    pub fn read(frame: &[u8]) -> Result<Self, CodecError> {
        if frame.len() < HEADER_LENGTH {
            return Err(CodecError::Truncated {
                needed: HEADER_LENGTH,
                actual: frame.len(),
            });
        }
        Ok(FrameHeader {
            stack_id: frame[0],
            function_id: frame[1],
            length: LittleEndian::read_u16(&frame[2..4]),
        })
    }
}

/// A decoded frame: header and element values.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub header: FrameHeader,
    pub values: HashMap<String, Value>,
}

/// Complete request frame for `codec`'s packet.
pub fn build_request(
    codec: &Codec<'_>,
    stack_id: u8,
    function_id: u8,
    values: &HashMap<String, Value>,
) -> Result<Vec<u8>, CodecError> {
    let mut frame = codec.encode_request(values)?;
    write_header(&mut frame, stack_id, function_id)?;
    Ok(frame)
}

/// Complete response or callback frame for `codec`'s packet.
pub fn build_response(
    codec: &Codec<'_>,
    stack_id: u8,
    function_id: u8,
    values: &HashMap<String, Value>,
) -> Result<Vec<u8>, CodecError> {
    let mut frame = codec.encode_response(values)?;
    write_header(&mut frame, stack_id, function_id)?;
    Ok(frame)
}

fn write_header(frame: &mut [u8], stack_id: u8, function_id: u8) -> Result<(), CodecError> {
    let length = u16::try_from(frame.len())
        .ok()
        .filter(|&l| l as usize <= MAX_FRAME_LENGTH)
        .ok_or(CodecError::FrameLength {
            expected: MAX_FRAME_LENGTH,
            actual: frame.len(),
        })?;
    FrameHeader {
        stack_id,
        function_id,
        length,
    }
    .write(frame)
}

/// Split a received request frame, checking the id and every length.
pub fn parse_request(codec: &Codec<'_>, function_id: u8, frame: &[u8]) -> Result<DecodedFrame, CodecError> {
    let expected = codec.packet().request_length();
    let header = check_header(frame, function_id, expected)?;
    Ok(DecodedFrame {
        header,
        values: codec.decode_request(frame)?,
    })
}

/// Split a received response or callback frame, checking the id and every length.
pub fn parse_response(codec: &Codec<'_>, function_id: u8, frame: &[u8]) -> Result<DecodedFrame, CodecError> {
    let expected = codec.packet().response_length();
    let header = check_header(frame, function_id, expected)?;
    Ok(DecodedFrame {
        header,
        values: codec.decode_response(frame)?,
    })
}

fn check_header(frame: &[u8], function_id: u8, expected: usize) -> Result<FrameHeader, CodecError> {
    let header = FrameHeader::read(frame)?;
    if header.function_id != function_id {
        return Err(CodecError::FunctionMismatch {
            expected: function_id,
            actual: header.function_id,
        });
    }
    for actual in [header.length as usize, frame.len()] {
        if actual != expected {
            return Err(CodecError::FrameLength { expected, actual });
        }
    }
    Ok(header)
}

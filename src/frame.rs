//! Wire encoding for command, ACK and telemetry frames.
//!
//! Frame layouts:
//!
//! ```text
//! command:   FF FF 01 <f32 LE torque>
//! ack:       FF FF AA
//! telemetry: FF FF <len> 02 <f32 LE fields...> <checksum>
//! ```
//!
//! The telemetry checksum is the two's complement of the byte sum of the
//! length byte and payload, so the length byte, payload and checksum sum to
//! zero modulo 256.

use crate::constants::*;
use crate::error::Result;
use crate::types::{FrameFault, Telemetry, TelemetryVariant};

/// Two's-complement checksum over `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

/// Build the fixed 7-byte SET_TORQUE frame
pub fn encode_command(torque: f32) -> [u8; COMMAND_FRAME_LEN] {
    let mut frame = [0u8; COMMAND_FRAME_LEN];
    frame[..2].copy_from_slice(&HEADER);
    frame[2] = CMD_SET_TORQUE;
    frame[3..].copy_from_slice(&torque.to_le_bytes());
    frame
}

/// Float fields of `telemetry` in the wire order of `variant`.
///
/// Fields the record does not carry are sent as zero.
fn fields(variant: TelemetryVariant, telemetry: &Telemetry) -> Vec<f32> {
    let pwm = telemetry.pwm.unwrap_or(0.0);
    match variant {
        TelemetryVariant::V1 => vec![telemetry.torque, telemetry.angle],
        TelemetryVariant::V2 => vec![telemetry.torque, telemetry.angle, pwm],
        TelemetryVariant::V3 => vec![
            telemetry.millis.unwrap_or(0.0),
            telemetry.desired_torque.unwrap_or(0.0),
            telemetry.torque,
            pwm,
            telemetry.angle,
        ],
    }
}

/// Build a complete telemetry frame including header and checksum
pub fn encode_telemetry(variant: TelemetryVariant, telemetry: &Telemetry) -> Vec<u8> {
    let mut frame = Vec::with_capacity(variant.frame_len());
    frame.extend_from_slice(&HEADER);
    frame.push(variant.payload_len() as u8);
    frame.push(CMD_GET_DATA);
    for value in fields(variant, telemetry) {
        frame.extend_from_slice(&value.to_le_bytes());
    }
    let sum = checksum(&frame[2..]);
    frame.push(sum);
    frame
}

fn read_f32(bytes: &[u8], index: usize) -> f32 {
    let start = 1 + index * FIELD_LEN;
    f32::from_le_bytes([
        bytes[start],
        bytes[start + 1],
        bytes[start + 2],
        bytes[start + 3],
    ])
}

/// Decode a payload (command byte onwards, checksum excluded).
///
/// Fails with [`FrameFault::UnexpectedLength`] unless the slice is exactly
/// `variant.payload_len()` bytes.
pub fn decode_payload(
    variant: TelemetryVariant,
    payload: &[u8],
) -> std::result::Result<Telemetry, FrameFault> {
    if payload.len() != variant.payload_len() {
        return Err(FrameFault::UnexpectedLength {
            declared: u8::try_from(payload.len()).unwrap_or(u8::MAX),
        });
    }
    Ok(match variant {
        TelemetryVariant::V1 => Telemetry::v1(read_f32(payload, 0), read_f32(payload, 1)),
        TelemetryVariant::V2 => Telemetry::v2(
            read_f32(payload, 0),
            read_f32(payload, 1),
            read_f32(payload, 2),
        ),
        TelemetryVariant::V3 => Telemetry::v3(
            read_f32(payload, 0),
            read_f32(payload, 1),
            read_f32(payload, 2),
            read_f32(payload, 3),
            read_f32(payload, 4),
        ),
    })
}

/// Validate the body of a telemetry frame: `<len> <payload> <checksum>`.
///
/// `body.len()` must equal `variant.payload_len() + 2`.
pub(crate) fn validate_body(
    variant: TelemetryVariant,
    body: &[u8],
) -> std::result::Result<Telemetry, FrameFault> {
    let (covered, tail) = body.split_at(body.len() - 1);
    let expected = checksum(covered);
    let actual = tail[0];
    if expected != actual {
        return Err(FrameFault::ChecksumMismatch { expected, actual });
    }

    let payload = &covered[1..];
    if payload[0] != CMD_GET_DATA {
        return Err(FrameFault::UnexpectedCommand {
            command: payload[0],
        });
    }
    decode_payload(variant, payload)
}

/// Strictly decode one complete telemetry frame.
///
/// The variant is taken from the length byte.
pub fn decode_telemetry_frame(frame: &[u8]) -> Result<Telemetry> {
    if frame.len() < 3 || frame[..2] != HEADER {
        return Err(FrameFault::Desync {
            skipped: frame.len(),
        }
        .into());
    }
    let declared = frame[2];
    let variant = TelemetryVariant::from_payload_len(declared)
        .filter(|variant| variant.frame_len() == frame.len())
        .ok_or(FrameFault::UnexpectedLength { declared })?;
    Ok(validate_body(variant, &frame[2..])?)
}

/// Offset of the first ACK frame inside `bytes`, if any
pub fn find_ack(bytes: &[u8]) -> Option<usize> {
    bytes.windows(ACK_FRAME.len()).position(|w| w == ACK_FRAME)
}

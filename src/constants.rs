//! Protocol constants for CableScope serial communication.
//!
//! This module defines every constant shared by the host and device sides of
//! the protocol: sentinel bytes, command codes, frame sizes and the timing
//! defaults used during connection setup and streaming.

/// First sentinel byte of every frame
pub const HEADER1: u8 = 0xFF;

/// Second sentinel byte of every frame
pub const HEADER2: u8 = 0xFF;

/// Both sentinel bytes, in wire order
pub const HEADER: [u8; 2] = [HEADER1, HEADER2];

/// Set desired torque (host -> device)
pub const CMD_SET_TORQUE: u8 = 0x01;

/// Telemetry payload marker (device -> host)
pub const CMD_GET_DATA: u8 = 0x02;

/// Acknowledgment marker following the header
pub const ACK_BYTE: u8 = 0xAA;

/// Complete acknowledgment frame
pub const ACK_FRAME: [u8; 3] = [HEADER1, HEADER2, ACK_BYTE];

/// Command frame length: header(2) + command(1) + float(4)
pub const COMMAND_FRAME_LEN: usize = 7;

/// Size of one encoded float field
pub const FIELD_LEN: usize = 4;

/// Bytes surrounding a telemetry payload: header(2) + length(1) + checksum(1)
pub const TELEMETRY_OVERHEAD: usize = 4;

/// Default baud rate (115200 bps)
pub const BAUD_RATE: u32 = 115_200;

/// Serial read timeout in milliseconds
pub const TIMEOUT_MS: u64 = 1000;

/// How long the host waits for an ACK after a command
pub const ACK_TIMEOUT_MS: u64 = 2000;

/// Bytes retained in the rolling ACK search window
pub const ACK_WINDOW_LEN: usize = 100;

/// Time allowed for the device to reset after the port opens
pub const SETTLE_MS: u64 = 1000;

/// Extra wait before checking for unsolicited telemetry during detection
pub const AUTONOMOUS_WAIT_MS: u64 = 500;

/// Unsolicited bytes required to classify firmware as autonomous
pub const AUTONOMOUS_MIN_BYTES: usize = 10;

/// Sleep between telemetry polls and between ACK-wait drains
pub const POLL_INTERVAL_MS: u64 = 10;

/// Window over which the telemetry data rate is recomputed
pub const RATE_WINDOW_MS: u64 = 1000;

/// Device-side telemetry cadence (100 Hz)
pub const TELEMETRY_INTERVAL_MS: u64 = 10;

/// Cadence of the slow autonomous firmware variant (10 Hz)
pub const SLOW_TELEMETRY_INTERVAL_MS: u64 = 100;

/// Shortest telemetry cadence the emitter accepts
pub const MIN_TELEMETRY_INTERVAL_MS: u64 = 1;

/// Device-side ceiling for receiving a command payload
pub const PAYLOAD_TIMEOUT_MS: u64 = 100;

/// Upper bound on bytes buffered by the host scanner before old data is dropped
pub const SCAN_BUFFER_LIMIT: usize = 4096;

/// Capacity of the command queue into the IO thread
pub const COMMAND_QUEUE_LEN: usize = 10;

/// USB vendor ID used by PJRC Teensy boards
pub const TEENSY_VID: u16 = 0x16C0;

/// Known Teensy product IDs (4.x, 3.x, LC)
pub const TEENSY_PIDS: [u16; 3] = [0x0483, 0x0476, 0x0478];

/// Frame faults retained for callers that have not drained them
pub const FAULT_BACKLOG: usize = 64;

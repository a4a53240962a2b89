//! Device-side framing: what the motor firmware puts on the wire.
//!
//! [`TelemetryEmitter`] produces telemetry frames at a fixed cadence and
//! [`CommandParser`] recognises inbound SET_TORQUE frames byte by byte.
//! [`Device`] ties both to an [`Actuator`] the way the firmware main loop
//! does. The simulator runs this code behind a host-side transport.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::constants::*;
use crate::frame::encode_telemetry;
use crate::types::{FirmwareMode, Telemetry, TelemetryVariant};

/// Physical side of the firmware: applies torque and reports sensor readings
pub trait Actuator {
    fn apply_torque(&mut self, torque: f32);

    /// Current readings; `elapsed` is time since the device booted
    fn sample(&mut self, elapsed: Duration) -> Telemetry;
}

/// Emits at most one telemetry frame per interval.
///
/// The next frame is due one interval after the last one went out, so a
/// stalled loop resumes with a single frame rather than a burst.
#[derive(Debug, Clone)]
pub struct TelemetryEmitter {
    variant: TelemetryVariant,
    interval: Duration,
    next_due: Option<Instant>,
}

impl TelemetryEmitter {
    /// `interval` is raised to at least one millisecond
    pub fn new(variant: TelemetryVariant, interval: Duration) -> Self {
        Self {
            variant,
            interval: interval.max(Duration::from_millis(MIN_TELEMETRY_INTERVAL_MS)),
            next_due: None,
        }
    }

    pub fn variant(&self) -> TelemetryVariant {
        self.variant
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Whether a frame is due at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.map_or(true, |due| now >= due)
    }

    /// Emit a frame if one is due. Returns whether a frame was written.
    ///
    /// The frame goes out in a single write; write failures are ignored.
    pub fn poll<W: Write + ?Sized>(&mut self, now: Instant, sample: &Telemetry, sink: &mut W) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.next_due = Some(now + self.interval);
        let frame = encode_telemetry(self.variant, sample);
        let _ = sink.write_all(&frame);
        true
    }
}

/// Command decoded by the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    SetTorque(f32),
}

/// Receive states of the command parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    WaitHeader1,
    WaitHeader2,
    WaitCommand,
    WaitPayload { received: usize, deadline: Instant },
}

/// Byte-fed SET_TORQUE frame recogniser
#[derive(Debug, Clone)]
pub struct CommandParser {
    state: ParserState,
    payload: [u8; FIELD_LEN],
    payload_timeout: Duration,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new(Duration::from_millis(PAYLOAD_TIMEOUT_MS))
    }
}

impl CommandParser {
    pub fn new(payload_timeout: Duration) -> Self {
        Self {
            state: ParserState::WaitHeader1,
            payload: [0; FIELD_LEN],
            payload_timeout,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Abandon a payload whose deadline has passed
    pub fn expire(&mut self, now: Instant) {
        if let ParserState::WaitPayload { deadline, .. } = self.state {
            if now > deadline {
                log::debug!("Command payload timed out, dropping frame");
                self.state = ParserState::WaitHeader1;
            }
        }
    }

    /// Consume one byte; yields a command when a frame completes
    pub fn feed(&mut self, byte: u8, now: Instant) -> Option<DeviceCommand> {
        self.expire(now);
        match self.state {
            ParserState::WaitHeader1 => {
                if byte == HEADER1 {
                    self.state = ParserState::WaitHeader2;
                }
            }
            ParserState::WaitHeader2 => {
                self.state = if byte == HEADER2 {
                    ParserState::WaitCommand
                } else {
                    ParserState::WaitHeader1
                };
            }
            ParserState::WaitCommand => {
                self.state = match byte {
                    CMD_SET_TORQUE => ParserState::WaitPayload {
                        received: 0,
                        deadline: now + self.payload_timeout,
                    },
                    // may be the start of the next frame's header
                    HEADER1 => ParserState::WaitHeader2,
                    _ => ParserState::WaitHeader1,
                };
            }
            ParserState::WaitPayload { received, deadline } => {
                self.payload[received] = byte;
                let received = received + 1;
                if received < FIELD_LEN {
                    self.state = ParserState::WaitPayload { received, deadline };
                } else {
                    self.state = ParserState::WaitHeader1;
                    return Some(DeviceCommand::SetTorque(f32::from_le_bytes(self.payload)));
                }
            }
        }
        None
    }
}

/// Firmware main loop: command handling plus periodic telemetry
pub struct Device<A: Actuator> {
    actuator: A,
    mode: FirmwareMode,
    parser: CommandParser,
    emitter: TelemetryEmitter,
    booted: Instant,
}

impl<A: Actuator> Device<A> {
    pub fn new(actuator: A, mode: FirmwareMode, emitter: TelemetryEmitter, booted: Instant) -> Self {
        Self {
            actuator,
            mode,
            parser: CommandParser::default(),
            emitter,
            booted,
        }
    }

    pub fn mode(&self) -> FirmwareMode {
        self.mode
    }

    /// Reflash with different firmware behaviour; the clock keeps running
    pub fn set_mode(&mut self, mode: FirmwareMode) {
        self.mode = mode;
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn emitter(&self) -> &TelemetryEmitter {
        &self.emitter
    }

    /// Handle inbound bytes, acknowledging each applied command.
    ///
    /// Autonomous firmware never reads its input.
    pub fn receive<W: Write + ?Sized>(&mut self, bytes: &[u8], now: Instant, sink: &mut W) {
        if self.mode == FirmwareMode::Autonomous {
            return;
        }
        for &byte in bytes {
            if let Some(DeviceCommand::SetTorque(torque)) = self.parser.feed(byte, now) {
                self.actuator.apply_torque(torque);
                let _ = sink.write_all(&ACK_FRAME);
            }
        }
    }

    /// One pass of the firmware loop's telemetry side. Returns whether a
    /// frame was written.
    pub fn tick<W: Write + ?Sized>(&mut self, now: Instant, sink: &mut W) -> bool {
        self.parser.expire(now);
        if !self.emitter.is_due(now) {
            return false;
        }
        let sample = self.actuator.sample(now.saturating_duration_since(self.booted));
        self.emitter.poll(now, &sample, sink)
    }
}

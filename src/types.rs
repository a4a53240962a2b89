use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{FIELD_LEN, TELEMETRY_OVERHEAD};
use crate::error::{FaultReason, LinkError};

/// Telemetry payload layouts emitted by the different firmware builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelemetryVariant {
    /// cmd + torque + angle
    V1,
    /// cmd + torque + angle + pwm
    V2,
    /// cmd + millis + desired torque + actual torque + pwm + angle
    V3,
}

impl TelemetryVariant {
    /// Every known variant, smallest payload first
    pub const ALL: [TelemetryVariant; 3] =
        [TelemetryVariant::V1, TelemetryVariant::V2, TelemetryVariant::V3];

    /// Number of float fields after the command byte
    pub fn field_count(self) -> usize {
        match self {
            TelemetryVariant::V1 => 2,
            TelemetryVariant::V2 => 3,
            TelemetryVariant::V3 => 5,
        }
    }

    /// Declared length byte: command byte plus fields
    pub fn payload_len(self) -> usize {
        1 + self.field_count() * FIELD_LEN
    }

    /// Complete frame size on the wire
    pub fn frame_len(self) -> usize {
        self.payload_len() + TELEMETRY_OVERHEAD
    }

    /// Look up the variant for a declared length byte
    pub fn from_payload_len(len: u8) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|variant| variant.payload_len() == len as usize)
    }
}

/// One decoded telemetry record.
///
/// `torque` and `angle` are present in every variant. For V3, `torque` holds
/// the measured (actual) torque.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Telemetry {
    pub torque: f32,
    pub angle: f32,
    pub pwm: Option<f32>,
    pub desired_torque: Option<f32>,
    pub millis: Option<f32>,
}

impl Telemetry {
    pub fn v1(torque: f32, angle: f32) -> Self {
        Self {
            torque,
            angle,
            ..Self::default()
        }
    }

    pub fn v2(torque: f32, angle: f32, pwm: f32) -> Self {
        Self {
            torque,
            angle,
            pwm: Some(pwm),
            ..Self::default()
        }
    }

    pub fn v3(millis: f32, desired_torque: f32, actual_torque: f32, pwm: f32, angle: f32) -> Self {
        Self {
            torque: actual_torque,
            angle,
            pwm: Some(pwm),
            desired_torque: Some(desired_torque),
            millis: Some(millis),
        }
    }
}

/// Telemetry record stamped with its host-side arrival time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub received_at: DateTime<Utc>,
    pub telemetry: Telemetry,
}

impl TelemetrySample {
    pub fn now(telemetry: Telemetry) -> Self {
        Self {
            received_at: Utc::now(),
            telemetry,
        }
    }
}

/// Firmware behaviour discovered during the connection handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FirmwareMode {
    /// Commands are accepted and acknowledged
    Interactive,
    /// Telemetry streams unconditionally; commands are ignored
    Autonomous,
}

/// Result of one send-and-wait command cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    Acked,
    TimedOut,
}

impl CommandOutcome {
    pub fn is_acked(self) -> bool {
        self == CommandOutcome::Acked
    }

    /// Diagnostic reason for an unanswered command
    pub fn fault_reason(self) -> Option<FaultReason> {
        match self {
            CommandOutcome::Acked => None,
            CommandOutcome::TimedOut => Some(FaultReason::AckTimeout),
        }
    }
}

/// Why the scanner rejected bytes from the inbound stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFault {
    /// Bytes skipped while hunting for a header pair
    Desync { skipped: usize },
    /// Header found but the length byte matches no accepted variant
    UnexpectedLength { declared: u8 },
    /// Frame complete but the checksum does not validate
    ChecksumMismatch { expected: u8, actual: u8 },
    /// Checksum valid but the payload does not start with `GET_DATA`
    UnexpectedCommand { command: u8 },
}

impl FrameFault {
    pub fn reason(&self) -> FaultReason {
        match self {
            FrameFault::ChecksumMismatch { .. } => FaultReason::ChecksumMismatch,
            _ => FaultReason::FramingDesync,
        }
    }
}

impl From<FrameFault> for LinkError {
    fn from(fault: FrameFault) -> Self {
        match fault {
            FrameFault::ChecksumMismatch { expected, actual } => {
                LinkError::ChecksumMismatch { expected, actual }
            }
            FrameFault::Desync { skipped } => {
                LinkError::FramingDesync(format!("skipped {} bytes", skipped))
            }
            FrameFault::UnexpectedLength { declared } => {
                LinkError::FramingDesync(format!("unexpected length byte {:#04x}", declared))
            }
            FrameFault::UnexpectedCommand { command } => {
                LinkError::FramingDesync(format!("unexpected payload command {:#04x}", command))
            }
        }
    }
}

/// Snapshot of the connection state for status displays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub connected: bool,
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub mode: Option<FirmwareMode>,
    pub variant: Option<TelemetryVariant>,
    /// Frames per second over the last completed rate window
    pub data_rate: f64,
    pub frames_received: u64,
    pub faults: u64,
    pub last_torque_command: f32,
    pub connected_at: Option<DateTime<Utc>>,
}

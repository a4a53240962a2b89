//! Error types for CableScope link operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Error types for host-side communication with the motor firmware.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Serial port communication error
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// General I/O error on the open port
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame checksum validation failed
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum computed over length byte and payload
        expected: u8,
        /// Checksum byte found on the wire
        actual: u8,
    },

    /// Receive stream lost frame alignment
    #[error("Framing desync: {0}")]
    FramingDesync(String),

    /// Operation requires an established connection
    #[error("Not connected")]
    NotConnected,

    /// Handshake saw neither an ACK nor unsolicited telemetry
    #[error("No response from device on {port}")]
    ConnectionFailed {
        /// Port the handshake ran on
        port: String,
    },

    /// Torque commands must be finite
    #[error("Torque must be finite, got {0}")]
    NonFiniteTorque(f32),

    /// The IO thread is gone
    #[error("Link channel closed")]
    ChannelClosed,

    /// A queued command waited too long and was dropped unsent
    #[error("Torque command {0} expired before it was sent")]
    CommandExpired(f32),

    /// The IO thread panicked
    #[error("IO thread panicked")]
    ThreadPanicked,
}

impl LinkError {
    /// Port-level failures close the connection; everything else leaves it open.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::SerialPort(_) | LinkError::Io(_))
    }

    /// Coarse reason suitable for user-facing diagnostics.
    pub fn reason(&self) -> FaultReason {
        match self {
            LinkError::SerialPort(_) | LinkError::Io(_) => FaultReason::PortIoError,
            LinkError::ChecksumMismatch { .. } => FaultReason::ChecksumMismatch,
            LinkError::FramingDesync(_) => FaultReason::FramingDesync,
            _ => FaultReason::Other,
        }
    }
}

/// Distinguishable failure reasons reported to UI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultReason {
    ChecksumMismatch,
    FramingDesync,
    AckTimeout,
    PortIoError,
    Other,
}

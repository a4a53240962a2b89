//! Link configuration.
//!
//! `LinkConfig` carries the serial parameters and the timing thresholds used
//! by the handshake, the command sender and the polling loop. Defaults match
//! the stock firmware; all thresholds can be tuned for slower boards or tests.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::*;
use crate::types::TelemetryVariant;

/// How the scanner recovers after rejecting bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResyncPolicy {
    /// Advance past the offending byte and search for the next header pair
    #[default]
    Rescan,
    /// Drop everything buffered and wait for fresh data
    DiscardBuffer,
}

/// Settings for opening and driving a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    pub settle_ms: u64,
    pub autonomous_wait_ms: u64,
    pub autonomous_min_bytes: usize,
    pub poll_interval_ms: u64,
    pub ack_window: usize,
    /// Fixed telemetry layout, or `None` to lock onto the first valid frame
    pub variant: Option<TelemetryVariant>,
    pub resync: ResyncPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: BAUD_RATE,
            read_timeout_ms: TIMEOUT_MS,
            ack_timeout_ms: ACK_TIMEOUT_MS,
            settle_ms: SETTLE_MS,
            autonomous_wait_ms: AUTONOMOUS_WAIT_MS,
            autonomous_min_bytes: AUTONOMOUS_MIN_BYTES,
            poll_interval_ms: POLL_INTERVAL_MS,
            ack_window: ACK_WINDOW_LEN,
            variant: None,
            resync: ResyncPolicy::default(),
        }
    }
}

impl LinkConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_variant(mut self, variant: TelemetryVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_resync(mut self, resync: ResyncPolicy) -> Self {
        self.resync = resync;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Override the handshake delays (device settle, autonomous secondary wait)
    pub fn with_handshake_timing(mut self, settle: Duration, autonomous_wait: Duration) -> Self {
        self.settle_ms = settle.as_millis() as u64;
        self.autonomous_wait_ms = autonomous_wait.as_millis() as u64;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn autonomous_wait(&self) -> Duration {
        Duration::from_millis(self.autonomous_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

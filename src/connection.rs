use chrono::{DateTime, Utc};
use serialport::{ClearBuffer, SerialPort};
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use crate::ack::AckWindow;
use crate::config::LinkConfig;
use crate::constants::*;
use crate::error::{LinkError, Result};
use crate::frame::encode_command;
use crate::scanner::{Scan, TelemetryScanner};
use crate::transport::{hex, Transport};
use crate::types::*;

/// Frames-per-second estimate over fixed windows
#[derive(Debug, Clone)]
struct RateMeter {
    window_start: Instant,
    count: u64,
    rate: f64,
}

impl RateMeter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            rate: 0.0,
        }
    }

    fn record(&mut self) {
        self.count += 1;
    }

    /// Close the current window if it is old enough; returns the latest rate
    fn update(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Duration::from_millis(RATE_WINDOW_MS) {
            self.rate = self.count as f64 / elapsed.as_secs_f64();
            self.count = 0;
            self.window_start = now;
        }
        self.rate
    }
}

/// An established link to the motor firmware.
///
/// Owns the transport exclusively. Created by a successful handshake, closed
/// by [`Connection::close`], drop, or the first port I/O error. A closed
/// connection stays closed; open a new one to reconnect.
pub struct Connection<T: Transport> {
    transport: Option<T>,
    config: LinkConfig,
    port_name: String,
    mode: Option<FirmwareMode>,
    scanner: TelemetryScanner,
    faults: VecDeque<FrameFault>,
    rate: RateMeter,
    frames_received: u64,
    fault_count: u64,
    last_torque: f32,
    connected_at: Option<DateTime<Utc>>,
}

impl Connection<Box<dyn SerialPort>> {
    /// Open `config.port` and run the firmware handshake
    pub fn open(config: LinkConfig) -> Result<Self> {
        log::debug!(
            "Opening serial port {} at {} baud",
            config.port,
            config.baud_rate
        );
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout())
            .open()?;
        Connection::establish(port, config)
    }
}

impl<T: Transport> Connection<T> {
    /// Run the handshake on an already-open transport.
    ///
    /// On failure the transport is closed and released.
    pub fn establish(transport: T, config: LinkConfig) -> Result<Self> {
        let port_name = if config.port.is_empty() {
            transport.name()
        } else {
            config.port.clone()
        };
        let mut conn = Connection {
            transport: Some(transport),
            scanner: TelemetryScanner::new(config.variant, config.resync),
            config,
            port_name,
            mode: None,
            faults: VecDeque::new(),
            rate: RateMeter::new(Instant::now()),
            frames_received: 0,
            fault_count: 0,
            last_torque: 0.0,
            connected_at: None,
        };

        match conn.detect_mode() {
            Ok(mode) => {
                log::info!("Connected to {} ({:?} firmware)", conn.port_name, mode);
                conn.mode = Some(mode);
                conn.connected_at = Some(Utc::now());
                conn.rate = RateMeter::new(Instant::now());
                Ok(conn)
            }
            Err(e) => {
                log::warn!("Handshake on {} failed: {}", conn.port_name, e);
                conn.transport = None;
                Err(e)
            }
        }
    }

    /// Probe with a zero-torque command and classify the firmware
    fn detect_mode(&mut self) -> Result<FirmwareMode> {
        log::debug!("Waiting {:?} for the device to settle", self.config.settle());
        thread::sleep(self.config.settle());
        self.clear_port()?;

        log::debug!("Testing communication with zero torque command");
        if self.transmit(0.0)?.is_acked() {
            return Ok(FirmwareMode::Interactive);
        }

        thread::sleep(self.config.autonomous_wait());
        let result = self.port()?.bytes_available();
        let unsolicited = self.check(result)?;
        log::debug!("{} unsolicited bytes after probe", unsolicited);
        if unsolicited > self.config.autonomous_min_bytes {
            Ok(FirmwareMode::Autonomous)
        } else {
            Err(LinkError::ConnectionFailed {
                port: self.port_name.clone(),
            })
        }
    }

    fn port(&mut self) -> Result<&mut T> {
        self.transport.as_mut().ok_or(LinkError::NotConnected)
    }

    /// Close the connection if `result` carries a port-level failure
    fn check<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(e) = &result {
            if e.is_fatal() && self.transport.is_some() {
                log::error!("Port I/O error on {}: {}", self.port_name, e);
                self.transport = None;
            }
        }
        result
    }

    fn clear_port(&mut self) -> Result<()> {
        let result = self.port()?.clear(ClearBuffer::All);
        self.check(result)?;
        self.scanner.clear();
        Ok(())
    }

    /// Send SET_TORQUE and wait for the ACK, regardless of mode.
    ///
    /// Bytes drained while waiting are also handed to the telemetry scanner,
    /// so frames that arrive around the ACK are not lost.
    fn transmit(&mut self, torque: f32) -> Result<CommandOutcome> {
        let frame = encode_command(torque);
        log::trace!("TX {}", hex(&frame));
        let result = self.port()?.write_frame(&frame);
        self.check(result)?;
        self.last_torque = torque;

        let deadline = Instant::now() + self.config.ack_timeout();
        let mut window = AckWindow::new(self.config.ack_window);
        loop {
            let result = self.port()?.read_available();
            let bytes = self.check(result)?;
            if !bytes.is_empty() {
                log::trace!("RX {}", hex(&bytes));
                self.scanner.push(&bytes);
                if window.push(&bytes) {
                    return Ok(CommandOutcome::Acked);
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(self.config.poll_interval());
        }

        log::warn!("Timeout waiting for acknowledgment of torque {}", torque);
        Ok(CommandOutcome::TimedOut)
    }

    /// Command a new desired torque.
    ///
    /// Autonomous firmware never answers, so the call succeeds without
    /// touching the port.
    pub fn send_torque(&mut self, torque: f32) -> Result<CommandOutcome> {
        if !torque.is_finite() {
            return Err(LinkError::NonFiniteTorque(torque));
        }
        if self.transport.is_none() {
            return Err(LinkError::NotConnected);
        }
        match self.mode {
            None => Err(LinkError::NotConnected),
            Some(FirmwareMode::Autonomous) => {
                log::debug!("Autonomous firmware, not sending torque {}", torque);
                Ok(CommandOutcome::Acked)
            }
            Some(FirmwareMode::Interactive) => self.transmit(torque),
        }
    }

    /// Return the next validated telemetry record, if one is available.
    ///
    /// Rejected frames never surface as errors; they are counted and queued
    /// for [`Connection::drain_faults`]. Only port failures return `Err`.
    pub fn poll_telemetry(&mut self) -> Result<Option<Telemetry>> {
        loop {
            let result = match self.transport.as_mut() {
                Some(port) => self.scanner.poll(port),
                None => return Err(LinkError::NotConnected),
            };
            match self.check(result)? {
                Scan::Telemetry(telemetry) => {
                    self.frames_received += 1;
                    self.rate.record();
                    return Ok(Some(telemetry));
                }
                Scan::Ack => log::debug!("Ignoring unsolicited ACK"),
                Scan::Rejected(fault) => self.record_fault(fault),
                Scan::Pending => return Ok(None),
            }
        }
    }

    fn record_fault(&mut self, fault: FrameFault) {
        log::warn!("Rejected inbound data on {}: {:?}", self.port_name, fault);
        self.fault_count += 1;
        if self.faults.len() == FAULT_BACKLOG {
            self.faults.pop_front();
        }
        self.faults.push_back(fault);
    }

    /// Frame faults seen since the last call, oldest first
    pub fn drain_faults(&mut self) -> Vec<FrameFault> {
        self.faults.drain(..).collect()
    }

    /// Discard pending data in both directions
    pub fn flush_buffers(&mut self) -> Result<()> {
        self.clear_port()
    }

    pub fn mode(&self) -> Option<FirmwareMode> {
        self.mode
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some() && self.mode.is_some()
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn info(&mut self) -> ConnectionInfo {
        let data_rate = self.rate.update(Instant::now());
        ConnectionInfo {
            connected: self.is_connected(),
            port: self.port_name.clone(),
            baud_rate: self.config.baud_rate,
            timeout_ms: self.config.read_timeout_ms,
            mode: self.mode,
            variant: self.scanner.variant(),
            data_rate,
            frames_received: self.frames_received,
            faults: self.fault_count,
            last_torque_command: self.last_torque,
            connected_at: self.connected_at,
        }
    }

    /// Close the port, zeroing torque first on interactive firmware.
    ///
    /// The zero command is best effort; the port is released either way.
    pub fn close(&mut self) {
        if self.transport.is_none() {
            return;
        }
        if self.mode == Some(FirmwareMode::Interactive) {
            match self.transmit(0.0) {
                Ok(CommandOutcome::Acked) => log::debug!("Zero torque acknowledged"),
                Ok(CommandOutcome::TimedOut) => {
                    log::warn!("Zero torque not acknowledged before close")
                }
                Err(e) => log::warn!("Zero torque failed before close: {}", e),
            }
        }
        self.transport = None;
        log::info!("Disconnected from {}", self.port_name);
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        self.close();
    }
}

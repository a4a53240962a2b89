//! In-process simulated firmware.
//!
//! A [`SimulatedDevice`] runs the device-side framing from [`crate::device`]
//! behind a [`SimTransport`], so the host stack can be exercised without a
//! board attached. Time is real: telemetry accrues at the configured cadence
//! whenever the host polls.

use parking_lot::Mutex;
use serialport::ClearBuffer;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constants::*;
use crate::device::{Actuator, Device, TelemetryEmitter};
use crate::error::Result;
use crate::transport::Transport;
use crate::types::{FirmwareMode, Telemetry, TelemetryVariant};

/// Motor model used by the simulator
#[derive(Debug, Clone, Default)]
pub struct SimMotor {
    desired: f32,
    applied: Vec<f32>,
}

impl SimMotor {
    /// PWM duty the stock firmware derives from a torque request
    fn pwm(torque: f32) -> f32 {
        let current = (torque / 3.35).clamp(-2.0, 2.0);
        if current.abs() < 0.01 {
            0.0
        } else {
            (409.6 + 410.0 * current.abs()).clamp(0.0, 4095.0)
        }
    }
}

impl Actuator for SimMotor {
    fn apply_torque(&mut self, torque: f32) {
        self.desired = torque;
        self.applied.push(torque);
    }

    fn sample(&mut self, elapsed: Duration) -> Telemetry {
        let secs = elapsed.as_secs_f32();
        let actual = self.desired * 0.98;
        Telemetry {
            torque: actual,
            angle: secs * 12.0 * self.desired,
            pwm: Some(Self::pwm(self.desired)),
            desired_torque: Some(self.desired),
            millis: Some(elapsed.as_millis() as f32),
        }
    }
}

struct SimState {
    device: Option<Device<SimMotor>>,
    outbound: VecDeque<u8>,
    received: Vec<u8>,
    unplugged: bool,
}

impl SimState {
    /// Catch the firmware loop up to the present.
    ///
    /// The real board keeps looping while the host is not reading, so every
    /// loop pass since the last poll is replayed at its own timestamp. Passes
    /// older than what the outbound buffer could hold are skipped.
    fn tick(&mut self) {
        let now = Instant::now();
        if let Some(device) = self.device.as_mut() {
            let step = device.emitter().interval();
            let backlog = (SCAN_BUFFER_LIMIT / device.emitter().variant().frame_len()) as u32 + 1;
            let oldest = now.checked_sub(step * backlog);
            loop {
                let mut due = device.emitter().next_due().unwrap_or(now);
                if let Some(oldest) = oldest {
                    due = due.max(oldest);
                }
                if due > now || !device.tick(due, &mut self.outbound) {
                    break;
                }
            }
        }
        if self.outbound.len() > SCAN_BUFFER_LIMIT {
            let excess = self.outbound.len() - SCAN_BUFFER_LIMIT;
            self.outbound.drain(..excess);
        }
    }

    fn check_plugged(&self) -> io::Result<()> {
        if self.unplugged {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
        } else {
            Ok(())
        }
    }
}

/// Handle to a simulated board; clone freely
#[derive(Clone)]
pub struct SimulatedDevice {
    shared: Arc<Mutex<SimState>>,
}

impl SimulatedDevice {
    fn with_device(device: Option<Device<SimMotor>>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SimState {
                device,
                outbound: VecDeque::new(),
                received: Vec::new(),
                unplugged: false,
            })),
        }
    }

    /// Firmware that acknowledges commands and streams at 100 Hz
    pub fn interactive(variant: TelemetryVariant) -> Self {
        let emitter =
            TelemetryEmitter::new(variant, Duration::from_millis(TELEMETRY_INTERVAL_MS));
        Self::with_device(Some(Device::new(
            SimMotor::default(),
            FirmwareMode::Interactive,
            emitter,
            Instant::now(),
        )))
    }

    /// Firmware that ignores commands and streams at `interval`
    pub fn autonomous(variant: TelemetryVariant, interval: Duration) -> Self {
        let emitter = TelemetryEmitter::new(variant, interval);
        Self::with_device(Some(Device::new(
            SimMotor::default(),
            FirmwareMode::Autonomous,
            emitter,
            Instant::now(),
        )))
    }

    /// A port with nothing listening on the other end
    pub fn silent() -> Self {
        Self::with_device(None)
    }

    /// Host-side end of the link
    pub fn transport(&self) -> SimTransport {
        SimTransport {
            shared: self.shared.clone(),
        }
    }

    /// Queue raw bytes towards the host, e.g. line noise
    pub fn inject(&self, bytes: &[u8]) {
        self.shared.lock().outbound.extend(bytes.iter().copied());
    }

    /// Swap the firmware behaviour, e.g. to a board that stops acknowledging
    pub fn set_mode(&self, mode: FirmwareMode) {
        if let Some(device) = self.shared.lock().device.as_mut() {
            device.set_mode(mode);
        }
    }

    /// Make every further port operation fail
    pub fn unplug(&self) {
        self.shared.lock().unplugged = true;
    }

    /// Torque values the firmware has applied, in order
    pub fn applied_torques(&self) -> Vec<f32> {
        self.shared
            .lock()
            .device
            .as_ref()
            .map(|device| device.actuator().applied.clone())
            .unwrap_or_default()
    }

    /// Every byte the host has written
    pub fn received(&self) -> Vec<u8> {
        self.shared.lock().received.clone()
    }
}

/// Host-side transport backed by a [`SimulatedDevice`]
pub struct SimTransport {
    shared: Arc<Mutex<SimState>>,
}

impl Transport for SimTransport {
    fn bytes_available(&mut self) -> Result<usize> {
        let mut state = self.shared.lock();
        state.check_plugged()?;
        state.tick();
        Ok(state.outbound.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.shared.lock();
        state.check_plugged()?;
        let n = buf.len().min(state.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let mut state = self.shared.lock();
        state.check_plugged()?;
        state.received.extend_from_slice(frame);
        let SimState {
            device, outbound, ..
        } = &mut *state;
        if let Some(device) = device.as_mut() {
            device.receive(frame, Instant::now(), outbound);
        }
        Ok(())
    }

    fn clear(&mut self, buffer: ClearBuffer) -> Result<()> {
        let mut state = self.shared.lock();
        state.check_plugged()?;
        if matches!(buffer, ClearBuffer::Input | ClearBuffer::All) {
            state.outbound.clear();
        }
        Ok(())
    }

    fn name(&self) -> String {
        "sim".to_string()
    }
}

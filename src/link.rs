//! Background IO thread.
//!
//! One thread owns the [`Connection`] and with it the port. It polls for
//! telemetry, forwards decoded records and diagnostics over a channel, and
//! services torque commands queued by [`Link::send_torque`]. No other thread
//! ever touches the port.
//!
//! Commands are served one per loop pass, with telemetry polled in between.
//! A command that sat in the queue past its deadline is dropped unsent and
//! its caller gets [`LinkError::CommandExpired`].

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use serialport::SerialPort;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::LinkConfig;
use crate::connection::Connection;
use crate::constants::COMMAND_QUEUE_LEN;
use crate::error::{FaultReason, LinkError, Result};
use crate::transport::Transport;
use crate::types::*;

/// Slack on top of the ACK wait before a caller stops listening for a reply
const REPLY_MARGIN: Duration = Duration::from_secs(1);

/// Notifications published by the IO thread
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Handshake result; always the first event
    Mode(FirmwareMode),
    Telemetry(TelemetrySample),
    Fault(FrameFault),
    /// Outcome of a torque command
    Command {
        torque: f32,
        result: std::result::Result<CommandOutcome, FaultReason>,
    },
    /// The IO thread stopped; `reason` is set when the port failed
    Disconnected { reason: Option<FaultReason> },
}

enum Request {
    SetTorque {
        torque: f32,
        /// Latest time the IO thread may start sending
        deadline: Instant,
        reply: Sender<Result<CommandOutcome>>,
    },
}

/// Handle to a running IO thread
pub struct Link {
    requests: Sender<Request>,
    events: Receiver<LinkEvent>,
    is_running: Arc<AtomicBool>,
    info: Arc<Mutex<ConnectionInfo>>,
    mode: FirmwareMode,
    queue_timeout: Duration,
    ack_timeout: Duration,
    io_thread: Option<JoinHandle<()>>,
}

impl Link {
    /// Open a serial port, run the handshake and start streaming
    pub fn open(config: LinkConfig) -> Result<Self> {
        let conn: Connection<Box<dyn SerialPort>> = Connection::open(config)?;
        Link::spawn(conn)
    }

    /// Move an established connection into a new IO thread.
    ///
    /// If the thread cannot be started the connection is closed and the
    /// spawn error returned.
    pub fn spawn<T: Transport + 'static>(mut conn: Connection<T>) -> Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::bounded(COMMAND_QUEUE_LEN);
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let is_running = Arc::new(AtomicBool::new(true));
        let info = Arc::new(Mutex::new(conn.info()));

        let mode = conn.mode().unwrap_or(FirmwareMode::Interactive);
        let ack_timeout = conn.config().ack_timeout();
        let _ = event_tx.send(LinkEvent::Mode(mode));

        let running = is_running.clone();
        let shared_info = info.clone();
        let io_thread = thread::Builder::new()
            .name("cablescope-io".to_string())
            .spawn(move || io_loop(conn, request_rx, event_tx, running, shared_info))
            .map_err(|e| {
                log::error!("Failed to spawn IO thread: {}", e);
                is_running.store(false, Ordering::Release);
                e
            })?;

        Ok(Link {
            requests: request_tx,
            events: event_rx,
            is_running,
            info,
            mode,
            queue_timeout: ack_timeout,
            ack_timeout,
            io_thread: Some(io_thread),
        })
    }

    /// Command a new torque and wait for the firmware's answer.
    ///
    /// The command must reach the front of the queue within one ACK timeout,
    /// otherwise it is dropped unsent and `CommandExpired` is returned.
    pub fn send_torque(&self, torque: f32) -> Result<CommandOutcome> {
        if !torque.is_finite() {
            return Err(LinkError::NonFiniteTorque(torque));
        }
        let deadline = Instant::now() + self.queue_timeout;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.requests
            .send_deadline(
                Request::SetTorque {
                    torque,
                    deadline,
                    reply: reply_tx,
                },
                deadline,
            )
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => LinkError::CommandExpired(torque),
                SendTimeoutError::Disconnected(_) => LinkError::ChannelClosed,
            })?;

        // a request started before its deadline finishes within one ACK wait
        let reply_by = deadline + self.ack_timeout + REPLY_MARGIN;
        match reply_rx.recv_deadline(reply_by) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(LinkError::CommandExpired(torque)),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::ChannelClosed),
        }
    }

    /// Event stream; receivers may be cloned to fan out
    pub fn events(&self) -> &Receiver<LinkEvent> {
        &self.events
    }

    pub fn mode(&self) -> FirmwareMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Latest connection snapshot published by the IO thread
    pub fn info(&self) -> ConnectionInfo {
        self.info.lock().clone()
    }

    /// Stop the IO thread and close the port
    pub fn disconnect(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.is_running.store(false, Ordering::Release);
        match self.io_thread.take() {
            Some(handle) => handle.join().map_err(|_| LinkError::ThreadPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("IO thread shutdown failed: {}", e);
        }
    }
}

fn io_loop<T: Transport>(
    mut conn: Connection<T>,
    requests: Receiver<Request>,
    events: Sender<LinkEvent>,
    is_running: Arc<AtomicBool>,
    info: Arc<Mutex<ConnectionInfo>>,
) {
    let poll_interval = conn.config().poll_interval();
    let mut failure = None;

    'outer: while is_running.load(Ordering::Acquire) {
        match requests.try_recv() {
            Ok(Request::SetTorque {
                torque,
                deadline,
                reply,
            }) => {
                if Instant::now() > deadline {
                    log::warn!("Dropping torque command {} queued past its deadline", torque);
                    let _ = reply.send(Err(LinkError::CommandExpired(torque)));
                    continue;
                }
                let result = conn.send_torque(torque);
                let fatal = match &result {
                    Err(e) if e.is_fatal() => Some(e.reason()),
                    _ => None,
                };
                *info.lock() = conn.info();
                let _ = events.send(LinkEvent::Command {
                    torque,
                    result: result.as_ref().copied().map_err(|e| e.reason()),
                });
                let _ = reply.send(result);
                if fatal.is_some() {
                    failure = fatal;
                    break 'outer;
                }
            }
            Err(TryRecvError::Empty) => {}
            // every handle is gone; nobody is listening
            Err(TryRecvError::Disconnected) => break 'outer,
        }

        loop {
            match conn.poll_telemetry() {
                Ok(Some(telemetry)) => {
                    let _ = events.send(LinkEvent::Telemetry(TelemetrySample::now(telemetry)));
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("Telemetry polling stopped: {}", e);
                    failure = Some(e.reason());
                    break 'outer;
                }
            }
        }
        for fault in conn.drain_faults() {
            let _ = events.send(LinkEvent::Fault(fault));
        }
        *info.lock() = conn.info();

        if requests.is_empty() {
            thread::sleep(poll_interval);
        }
    }

    conn.close();
    *info.lock() = conn.info();
    is_running.store(false, Ordering::Release);
    let _ = events.send(LinkEvent::Disconnected { reason: failure });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedDevice;

    fn fast_config() -> LinkConfig {
        LinkConfig::default()
            .with_variant(TelemetryVariant::V1)
            .with_ack_timeout(Duration::from_millis(150))
            .with_handshake_timing(Duration::from_millis(5), Duration::from_millis(100))
    }

    #[test]
    fn mode_is_first_event() {
        let sim = SimulatedDevice::interactive(TelemetryVariant::V1);
        let conn = Connection::establish(sim.transport(), fast_config()).unwrap();
        let link = Link::spawn(conn).unwrap();
        assert_eq!(
            link.events().recv_timeout(Duration::from_secs(1)).unwrap(),
            LinkEvent::Mode(FirmwareMode::Interactive)
        );
        link.disconnect().unwrap();
    }

    #[test]
    fn disconnect_reports_clean_shutdown() {
        let sim = SimulatedDevice::interactive(TelemetryVariant::V1);
        let conn = Connection::establish(sim.transport(), fast_config()).unwrap();
        let link = Link::spawn(conn).unwrap();
        let events = link.events().clone();
        link.disconnect().unwrap();

        let last = events.try_iter().last();
        assert_eq!(last, Some(LinkEvent::Disconnected { reason: None }));
    }
}

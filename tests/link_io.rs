//! IO thread behaviour against simulated firmware.

use std::time::{Duration, Instant};

use cablescope_link::sim::SimulatedDevice;
use cablescope_link::{
    CommandOutcome, Connection, FaultReason, FirmwareMode, FrameFault, Link, LinkConfig,
    LinkError, LinkEvent, TelemetryVariant,
};

fn fast_config(variant: TelemetryVariant) -> LinkConfig {
    LinkConfig::default()
        .with_variant(variant)
        .with_ack_timeout(Duration::from_millis(200))
        .with_handshake_timing(Duration::from_millis(10), Duration::from_millis(150))
}

fn spawn(sim: &SimulatedDevice, variant: TelemetryVariant) -> Link {
    let conn = Connection::establish(sim.transport(), fast_config(variant)).unwrap();
    Link::spawn(conn).unwrap()
}

/// Collect events until `done` matches or the deadline passes
fn collect_until(link: &Link, timeout: Duration, done: impl Fn(&LinkEvent) -> bool) -> Vec<LinkEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match link.events().recv_timeout(left) {
            Ok(event) => {
                let stop = done(&event);
                events.push(event);
                if stop {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    events
}

#[test]
fn streams_telemetry_in_order() {
    let sim = SimulatedDevice::interactive(TelemetryVariant::V3);
    let link = spawn(&sim, TelemetryVariant::V3);

    let mut samples = Vec::new();
    let events = collect_until(&link, Duration::from_secs(2), |e| {
        matches!(e, LinkEvent::Telemetry(_))
    });
    assert_eq!(events[0], LinkEvent::Mode(FirmwareMode::Interactive));

    while samples.len() < 10 {
        match link.events().recv_timeout(Duration::from_secs(1)).unwrap() {
            LinkEvent::Telemetry(sample) => samples.push(sample),
            _ => {}
        }
    }
    // every frame carries its own device timestamp
    let millis: Vec<f32> = samples
        .iter()
        .map(|s| s.telemetry.millis.unwrap())
        .collect();
    assert!(millis.windows(2).all(|w| w[0] < w[1]), "{:?}", millis);

    link.disconnect().unwrap();
}

#[test]
fn torque_command_round_trip() {
    let sim = SimulatedDevice::interactive(TelemetryVariant::V2);
    let link = spawn(&sim, TelemetryVariant::V2);

    assert_eq!(link.send_torque(1.25).unwrap(), CommandOutcome::Acked);
    assert_eq!(sim.applied_torques(), vec![0.0, 1.25]);

    let events = collect_until(&link, Duration::from_secs(1), |e| {
        matches!(e, LinkEvent::Command { .. })
    });
    assert_eq!(
        events.last(),
        Some(&LinkEvent::Command {
            torque: 1.25,
            result: Ok(CommandOutcome::Acked)
        })
    );
    assert_eq!(link.info().last_torque_command, 1.25);

    link.disconnect().unwrap();
    // best-effort zero on the way out
    assert_eq!(sim.applied_torques().last(), Some(&0.0));
}

#[test]
fn noise_surfaces_as_fault_events() {
    let sim = SimulatedDevice::interactive(TelemetryVariant::V1);
    let link = spawn(&sim, TelemetryVariant::V1);
    sim.inject(&[0x10; 20]);

    let events = collect_until(&link, Duration::from_secs(2), |e| {
        matches!(e, LinkEvent::Fault(FrameFault::Desync { .. }))
    });
    assert!(events
        .iter()
        .any(|e| matches!(e, LinkEvent::Fault(FrameFault::Desync { .. }))));
    link.disconnect().unwrap();
}

#[test]
fn unplug_stops_the_loop() {
    let sim = SimulatedDevice::interactive(TelemetryVariant::V1);
    let link = spawn(&sim, TelemetryVariant::V1);
    sim.unplug();

    let events = collect_until(&link, Duration::from_secs(2), |e| {
        matches!(e, LinkEvent::Disconnected { .. })
    });
    assert_eq!(
        events.last(),
        Some(&LinkEvent::Disconnected {
            reason: Some(FaultReason::PortIoError)
        })
    );
    assert!(!link.is_running());
    assert!(!link.info().connected);
    assert!(link.send_torque(0.5).is_err());
}

#[test]
fn autonomous_link_skips_commands() {
    let sim = SimulatedDevice::autonomous(TelemetryVariant::V1, Duration::from_millis(10));
    let link = spawn(&sim, TelemetryVariant::V1);
    assert_eq!(link.mode(), FirmwareMode::Autonomous);

    let written = sim.received().len();
    assert_eq!(link.send_torque(3.0).unwrap(), CommandOutcome::Acked);
    link.disconnect().unwrap();

    // neither the command nor a shutdown zero reached the device
    assert_eq!(sim.received().len(), written);
}

/// Torques carried by the command frames in `bytes`
fn written_torques(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks(7)
        .map(|frame| f32::from_le_bytes([frame[3], frame[4], frame[5], frame[6]]))
        .collect()
}

#[test]
fn queued_commands_expire_when_acks_stop() {
    let sim = SimulatedDevice::interactive(TelemetryVariant::V1);
    let link = spawn(&sim, TelemetryVariant::V1);
    let handshake = sim.received().len();
    // still streaming, no longer answering
    sim.set_mode(FirmwareMode::Autonomous);

    let results: Vec<(f32, cablescope_link::Result<CommandOutcome>)> = std::thread::scope(|s| {
        let handles: Vec<_> = (1..=6)
            .map(|i| {
                let link = &link;
                let torque = i as f32;
                s.spawn(move || (torque, link.send_torque(torque)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut timed_out = Vec::new();
    let mut expired = Vec::new();
    for (torque, result) in &results {
        match result {
            Ok(CommandOutcome::TimedOut) => timed_out.push(*torque),
            Err(LinkError::CommandExpired(t)) => {
                assert_eq!(t, torque);
                expired.push(*torque);
            }
            other => panic!("torque {}: unexpected {:?}", torque, other),
        }
    }
    assert!(!timed_out.is_empty());
    assert!(!expired.is_empty());
    assert!(link.is_running());

    // only the commands reported as sent ever reached the wire
    let mut written = written_torques(&sim.received()[handshake..]);
    written.sort_by(f32::total_cmp);
    timed_out.sort_by(f32::total_cmp);
    assert_eq!(written, timed_out);

    // telemetry keeps flowing between queued commands
    let events: Vec<LinkEvent> = link.events().try_iter().collect();
    let commands: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, LinkEvent::Command { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(commands.len(), timed_out.len());
    for pair in commands.windows(2) {
        assert!(events[pair[0]..pair[1]]
            .iter()
            .any(|e| matches!(e, LinkEvent::Telemetry(_))));
    }

    link.disconnect().unwrap();
}

//! Simulated Board Example
//!
//! Runs the full host stack against the in-process firmware model, first
//! interactive firmware at 100 Hz, then autonomous firmware at 10 Hz.
//! No hardware required.
//!
//! Usage:
//!   cargo run --example simulated
//!   RUST_LOG=debug cargo run --example simulated

use cablescope_link::constants::SLOW_TELEMETRY_INTERVAL_MS;
use cablescope_link::sim::SimulatedDevice;
use cablescope_link::{Connection, Link, LinkConfig, LinkEvent, Result, TelemetryVariant};
use log::info;
use std::time::Duration;

fn run(name: &str, sim: SimulatedDevice) -> Result<()> {
    info!("=== {} ===", name);
    // auto-detect the layout from the stream
    let config = LinkConfig::default();
    let link = Link::spawn(Connection::establish(sim.transport(), config)?)?;
    info!("Firmware mode: {:?}", link.mode());

    for torque in [0.8, -0.8, 0.0] {
        info!("Torque {:.2} Nm -> {:?}", torque, link.send_torque(torque)?);
    }

    let mut shown = 0;
    while shown < 5 {
        match link.events().recv_timeout(Duration::from_secs(1)) {
            Ok(LinkEvent::Telemetry(sample)) => {
                println!("{:?}", sample.telemetry);
                shown += 1;
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    let snapshot = link.info();
    info!(
        "variant {:?}, {} frames, applied torques {:?}",
        snapshot.variant,
        snapshot.frames_received,
        sim.applied_torques()
    );
    link.disconnect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    run(
        "Interactive firmware",
        SimulatedDevice::interactive(TelemetryVariant::V3),
    )?;
    run(
        "Autonomous firmware",
        SimulatedDevice::autonomous(
            TelemetryVariant::V1,
            Duration::from_millis(SLOW_TELEMETRY_INTERVAL_MS),
        ),
    )?;
    Ok(())
}

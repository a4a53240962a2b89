//! Telemetry Monitor Example
//!
//! Connects to a CableScope board, reports the detected firmware mode,
//! steps through a few torque commands and prints telemetry as it arrives.
//!
//! Usage:
//!   cargo run --example monitor                  # Auto-detect or pick a port
//!   cargo run --example monitor -- COM3          # Specify port
//!   cargo run --example monitor -- /dev/ttyACM0
//!
//! Set RUST_LOG environment variable to control logging:
//!   RUST_LOG=debug cargo run --example monitor

use cablescope_link::ports::{find_teensy_port, list_ports};
use cablescope_link::{FirmwareMode, Link, LinkConfig, LinkEvent, Result};
use inquire::Select;
use log::{info, warn};
use std::time::{Duration, Instant};

/// Interactive serial port selection using inquire
fn select_port() -> Result<String> {
    let ports = list_ports()?;

    if let Some(port) = find_teensy_port(&ports) {
        info!("Teensy detected on {}", port);
        return Ok(port);
    }
    if ports.is_empty() {
        eprintln!("No serial ports found!");
        std::process::exit(1);
    }

    let port_names: Vec<String> = ports
        .iter()
        .map(|p| format!("{} - {:?}", p.port_name, p.port_type))
        .collect();

    let selection = Select::new("Select a serial port:", port_names)
        .prompt()
        .map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Selection cancelled: {}", e),
            )
        })?;

    Ok(selection
        .split(" - ")
        .next()
        .unwrap_or(selection.as_str())
        .to_string())
}

/// Print telemetry events for `duration`
fn watch(link: &Link, duration: Duration) {
    let deadline = Instant::now() + duration;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match link.events().recv_timeout(left) {
            Ok(LinkEvent::Telemetry(sample)) => {
                let t = sample.telemetry;
                println!(
                    "{}  torque {:>7.3} Nm  angle {:>8.2} deg  pwm {:>6}  desired {:>6}",
                    sample.received_at.format("%H:%M:%S%.3f"),
                    t.torque,
                    t.angle,
                    t.pwm.map_or("-".to_string(), |p| format!("{:.0}", p)),
                    t.desired_torque
                        .map_or("-".to_string(), |d| format!("{:.2}", d)),
                );
            }
            Ok(LinkEvent::Fault(fault)) => warn!("Frame fault: {:?}", fault),
            Ok(LinkEvent::Disconnected { reason }) => {
                warn!("Link closed ({:?})", reason);
                return;
            }
            Ok(_) => {}
            Err(_) => return,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port_name = std::env::args()
        .nth(1)
        .map(Ok)
        .unwrap_or_else(select_port)?;

    info!("Connecting to CableScope on {}...", port_name);
    let link = Link::open(LinkConfig::new(&port_name))?;
    info!("Firmware mode: {:?}", link.mode());

    if link.mode() == FirmwareMode::Interactive {
        for torque in [0.5, 1.0, 0.0] {
            let outcome = link.send_torque(torque)?;
            info!("Torque {:.2} Nm -> {:?}", torque, outcome);
            if let Some(reason) = outcome.fault_reason() {
                warn!("Command not confirmed: {:?}", reason);
            }
            watch(&link, Duration::from_millis(500));
        }
    } else {
        info!("Autonomous firmware; commands are skipped");
        watch(&link, Duration::from_secs(2));
    }

    let snapshot = link.info();
    info!(
        "{} frames, {} faults, {:.1} frames/s",
        snapshot.frames_received, snapshot.faults, snapshot.data_rate
    );
    if let Ok(json) = serde_json::to_string_pretty(&snapshot) {
        println!("{}", json);
    }

    link.disconnect()?;
    Ok(())
}

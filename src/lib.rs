//! # CableScope Link
//!
//! A Rust library for talking to the CableScope cable-actuated motor
//! firmware over a serial link: commanding torque and streaming
//! torque/angle telemetry.
//!
//! ## Features
//!
//! - Command framing with acknowledgment wait and timeout
//! - Telemetry scanning that survives noise, partial reads and desync
//! - Three telemetry layouts (V1/V2/V3), configured or auto-detected
//! - Firmware mode detection (interactive vs. autonomous) at connect time
//! - Single-owner IO thread publishing telemetry over a channel
//! - Device-side framing and an in-process simulated board for testing
//!
//! ## Example
//!
//! ```no_run
//! use cablescope_link::{Link, LinkConfig, LinkEvent};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = Link::open(LinkConfig::new("/dev/ttyACM0"))?;
//!     link.send_torque(0.5)?;
//!     for event in link.events().iter().take(100) {
//!         if let LinkEvent::Telemetry(sample) = event {
//!             println!("torque {:.3} Nm, angle {:.2} deg", sample.telemetry.torque, sample.telemetry.angle);
//!         }
//!     }
//!     link.disconnect()?;
//!     Ok(())
//! }
//! ```

pub mod ack;
pub mod config;
pub mod connection;
pub mod constants;
pub mod device;
pub mod error;
pub mod frame;
pub mod link;
pub mod ports;
pub mod scanner;
pub mod sim;
pub mod transport;
pub mod types;

pub use config::{LinkConfig, ResyncPolicy};
pub use connection::Connection;
pub use error::{FaultReason, LinkError, Result};
pub use link::{Link, LinkEvent};
pub use scanner::{Scan, TelemetryScanner};
pub use transport::Transport;
pub use types::*;

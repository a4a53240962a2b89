//! Byte-stream transport seam.
//!
//! The connection only needs four things from the port: a non-blocking
//! "bytes ready" query, a read, a flushed write and buffer reset. Real
//! hardware uses `serialport`; tests and demos plug in the simulator.

use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};

use crate::error::Result;

/// Duplex byte stream owned by a single connection
pub trait Transport: Send {
    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> Result<usize>;

    /// Read into `buf`, returning how many bytes were read
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write a whole frame in one call and flush it
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Discard buffered data in one or both directions
    fn clear(&mut self, buffer: ClearBuffer) -> Result<()>;

    /// Human-readable port name for logs and status
    fn name(&self) -> String {
        "unknown".to_string()
    }

    /// Read everything currently available
    fn read_available(&mut self) -> Result<Vec<u8>> {
        let available = self.bytes_available()?;
        if available == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; available];
        let n = self.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

impl Transport for Box<dyn SerialPort> {
    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match Read::read(self, buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.write_all(frame)?;
        self.flush()?;
        Ok(())
    }

    fn clear(&mut self, buffer: ClearBuffer) -> Result<()> {
        SerialPort::clear(self.as_ref(), buffer)?;
        Ok(())
    }

    fn name(&self) -> String {
        SerialPort::name(self.as_ref()).unwrap_or_else(|| "unknown".to_string())
    }
}

/// Hex dump used for TX/RX trace logging
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_dump_format() {
        assert_eq!(hex(&[0xFF, 0x01, 0x0a]), "FF 01 0A");
        assert_eq!(hex(&[]), "");
    }
}

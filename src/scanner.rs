//! Host-side telemetry frame scanner.
//!
//! Turns an unstructured inbound byte stream into validated telemetry records.
//! The stream may start mid-frame, carry noise, or interleave ACK frames with
//! telemetry; none of that is an error at this level. Rejected bytes are
//! reported as [`FrameFault`] diagnostics and the scanner realigns on the next
//! header pair.
//!
//! Bytes are buffered between polls, so a frame split across reads is decoded
//! once the remainder arrives.

use crate::config::ResyncPolicy;
use crate::constants::*;
use crate::error::Result;
use crate::frame::validate_body;
use crate::transport::{hex, Transport};
use crate::types::{FrameFault, Telemetry, TelemetryVariant};

/// Result of one scanning step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scan {
    /// A validated telemetry frame
    Telemetry(Telemetry),
    /// An ACK frame seen in the stream
    Ack,
    /// Bytes were discarded; scanning can continue
    Rejected(FrameFault),
    /// No complete frame buffered yet
    Pending,
}

#[derive(Debug, Clone)]
pub struct TelemetryScanner {
    buffer: Vec<u8>,
    variant: Option<TelemetryVariant>,
    policy: ResyncPolicy,
}

impl TelemetryScanner {
    /// Scanner for a fixed variant, or `None` to lock onto the first valid frame
    pub fn new(variant: Option<TelemetryVariant>, policy: ResyncPolicy) -> Self {
        Self {
            buffer: Vec::with_capacity(SCAN_BUFFER_LIMIT),
            variant,
            policy,
        }
    }

    /// Variant in use, once configured or detected
    pub fn variant(&self) -> Option<TelemetryVariant> {
        self.variant
    }

    /// Smallest complete frame worth reading for
    pub fn min_frame_len(&self) -> usize {
        self.variant
            .unwrap_or(TelemetryVariant::ALL[0])
            .frame_len()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Append inbound bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > SCAN_BUFFER_LIMIT {
            let excess = self.buffer.len() - SCAN_BUFFER_LIMIT;
            log::warn!("Scan buffer overflow, dropping {} oldest bytes", excess);
            self.buffer.drain(..excess);
        }
    }

    /// Read from `transport` if enough bytes are waiting, then scan.
    ///
    /// Nothing is read until buffered plus available bytes could hold a
    /// whole frame. Only port errors are returned as `Err`.
    pub fn poll<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Scan> {
        let scan = self.next_scan();
        if scan != Scan::Pending {
            return Ok(scan);
        }

        let available = transport.bytes_available()?;
        if available == 0 || self.buffer.len() + available < self.min_frame_len() {
            return Ok(Scan::Pending);
        }

        let bytes = transport.read_available()?;
        log::trace!("RX {}", hex(&bytes));
        self.push(&bytes);
        Ok(self.next_scan())
    }

    /// Scan buffered bytes for the next frame, ACK or fault
    pub fn next_scan(&mut self) -> Scan {
        loop {
            let start = match self.buffer.windows(2).position(|w| w == HEADER) {
                Some(start) => start,
                None => {
                    // a trailing sentinel may be the first half of the next header
                    let keep = usize::from(self.buffer.last() == Some(&HEADER1));
                    let skipped = self.buffer.len() - keep;
                    if skipped == 0 {
                        return Scan::Pending;
                    }
                    self.buffer.drain(..skipped);
                    return Scan::Rejected(FrameFault::Desync { skipped });
                }
            };

            if start > 0 {
                let skipped = match self.policy {
                    ResyncPolicy::Rescan => start,
                    ResyncPolicy::DiscardBuffer => self.buffer.len(),
                };
                self.buffer.drain(..skipped);
                return Scan::Rejected(FrameFault::Desync { skipped });
            }

            if self.buffer.len() < 3 {
                return Scan::Pending;
            }

            let marker = self.buffer[2];
            if marker == ACK_BYTE {
                self.buffer.drain(..ACK_FRAME.len());
                return Scan::Ack;
            }

            let variant = match self.accept_length(marker) {
                Some(variant) => variant,
                None if marker == HEADER1 => {
                    // run of sentinels: the header starts one byte later
                    self.buffer.drain(..1);
                    continue;
                }
                None => {
                    let whole = self.buffer.len();
                    self.resync(whole);
                    return Scan::Rejected(FrameFault::UnexpectedLength { declared: marker });
                }
            };

            let frame_len = variant.frame_len();
            if self.buffer.len() < frame_len {
                return Scan::Pending;
            }

            return match validate_body(variant, &self.buffer[2..frame_len]) {
                Ok(telemetry) => {
                    self.buffer.drain(..frame_len);
                    if self.variant.is_none() {
                        log::info!("Telemetry variant detected: {:?}", variant);
                        self.variant = Some(variant);
                    }
                    Scan::Telemetry(telemetry)
                }
                Err(fault) => {
                    log::trace!("Rejected frame {}", hex(&self.buffer[..frame_len]));
                    self.resync(frame_len);
                    Scan::Rejected(fault)
                }
            };
        }
    }

    fn accept_length(&self, declared: u8) -> Option<TelemetryVariant> {
        match self.variant {
            Some(variant) => (variant.payload_len() == declared as usize).then_some(variant),
            None => TelemetryVariant::from_payload_len(declared),
        }
    }

    /// Drop bytes after a rejected frame starting at offset 0.
    ///
    /// `consumed` is what the coarse policy throws away.
    fn resync(&mut self, consumed: usize) {
        let n = match self.policy {
            ResyncPolicy::Rescan => 1,
            ResyncPolicy::DiscardBuffer => consumed,
        };
        self.buffer.drain(..n.min(self.buffer.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_telemetry;

    fn drain_all(scanner: &mut TelemetryScanner) -> Vec<Scan> {
        let mut out = Vec::new();
        loop {
            match scanner.next_scan() {
                Scan::Pending => return out,
                scan => out.push(scan),
            }
        }
    }

    fn telemetry_only(scans: &[Scan]) -> Vec<Telemetry> {
        scans
            .iter()
            .filter_map(|scan| match scan {
                Scan::Telemetry(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut scanner = TelemetryScanner::new(Some(TelemetryVariant::V1), ResyncPolicy::Rescan);
        let a = Telemetry::v1(1.0, 2.0);
        let b = Telemetry::v1(-3.5, 90.0);
        scanner.push(&encode_telemetry(TelemetryVariant::V1, &a));
        scanner.push(&encode_telemetry(TelemetryVariant::V1, &b));

        let scans = drain_all(&mut scanner);
        assert_eq!(scans, vec![Scan::Telemetry(a), Scan::Telemetry(b)]);
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn skips_leading_garbage() {
        let mut scanner = TelemetryScanner::new(Some(TelemetryVariant::V2), ResyncPolicy::Rescan);
        let t = Telemetry::v2(0.25, 10.0, 700.0);
        scanner.push(&[0x13, 0x37, 0x00, 0xFF, 0x42]);
        scanner.push(&encode_telemetry(TelemetryVariant::V2, &t));

        let scans = drain_all(&mut scanner);
        assert_eq!(telemetry_only(&scans), vec![t]);
        assert!(matches!(scans[0], Scan::Rejected(FrameFault::Desync { .. })));
    }

    #[test]
    fn split_frame_is_not_rejected() {
        let mut scanner = TelemetryScanner::new(Some(TelemetryVariant::V2), ResyncPolicy::Rescan);
        let t = Telemetry::v2(1.234, -45.67, 812.0);
        let frame = encode_telemetry(TelemetryVariant::V2, &t);

        scanner.push(&frame[..3]);
        assert_eq!(scanner.next_scan(), Scan::Pending);
        scanner.push(&frame[3..]);
        assert_eq!(scanner.next_scan(), Scan::Telemetry(t));
    }

    #[test]
    fn checksum_failure_then_recovery() {
        let mut scanner = TelemetryScanner::new(Some(TelemetryVariant::V1), ResyncPolicy::Rescan);
        let mut bad = encode_telemetry(TelemetryVariant::V1, &Telemetry::v1(5.0, 6.0));
        bad[5] ^= 0x10;
        let good = Telemetry::v1(7.0, 8.0);
        scanner.push(&bad);
        scanner.push(&encode_telemetry(TelemetryVariant::V1, &good));

        let scans = drain_all(&mut scanner);
        assert!(scans
            .iter()
            .any(|s| matches!(s, Scan::Rejected(FrameFault::ChecksumMismatch { .. }))));
        assert_eq!(telemetry_only(&scans), vec![good]);
    }

    #[test]
    fn wrong_variant_length_is_rejected() {
        let mut scanner = TelemetryScanner::new(Some(TelemetryVariant::V1), ResyncPolicy::Rescan);
        scanner.push(&encode_telemetry(TelemetryVariant::V2, &Telemetry::v2(1.0, 1.0, 1.0)));
        let scans = drain_all(&mut scanner);
        assert_eq!(
            scans[0],
            Scan::Rejected(FrameFault::UnexpectedLength { declared: 13 })
        );
        assert!(telemetry_only(&scans).is_empty());
    }

    #[test]
    fn ack_between_frames() {
        let mut scanner = TelemetryScanner::new(Some(TelemetryVariant::V1), ResyncPolicy::Rescan);
        let t = Telemetry::v1(1.0, 1.0);
        scanner.push(&encode_telemetry(TelemetryVariant::V1, &t));
        scanner.push(&ACK_FRAME);
        scanner.push(&encode_telemetry(TelemetryVariant::V1, &t));

        let scans = drain_all(&mut scanner);
        assert_eq!(scans, vec![Scan::Telemetry(t), Scan::Ack, Scan::Telemetry(t)]);
    }

    #[test]
    fn extra_sentinel_before_header() {
        let mut scanner = TelemetryScanner::new(Some(TelemetryVariant::V1), ResyncPolicy::Rescan);
        let t = Telemetry::v1(4.0, 4.0);
        scanner.push(&[0xFF]);
        scanner.push(&encode_telemetry(TelemetryVariant::V1, &t));
        assert_eq!(drain_all(&mut scanner), vec![Scan::Telemetry(t)]);
    }

    #[test]
    fn detects_variant_from_first_valid_frame() {
        let mut scanner = TelemetryScanner::new(None, ResyncPolicy::Rescan);
        assert_eq!(scanner.min_frame_len(), 13);
        let t = Telemetry::v3(10.0, 1.0, 0.9, 800.0, 33.0);
        scanner.push(&encode_telemetry(TelemetryVariant::V3, &t));
        assert_eq!(scanner.next_scan(), Scan::Telemetry(t));
        assert_eq!(scanner.variant(), Some(TelemetryVariant::V3));
        assert_eq!(scanner.min_frame_len(), 25);

        // once locked, other layouts are framing errors
        scanner.push(&encode_telemetry(TelemetryVariant::V1, &Telemetry::v1(1.0, 1.0)));
        assert!(matches!(
            scanner.next_scan(),
            Scan::Rejected(FrameFault::UnexpectedLength { declared: 9 })
        ));
    }

    #[test]
    fn discard_policy_drops_trailing_data() {
        let mut scanner =
            TelemetryScanner::new(Some(TelemetryVariant::V1), ResyncPolicy::DiscardBuffer);
        let t = Telemetry::v1(1.0, 2.0);
        scanner.push(&[0x00, 0x01]);
        scanner.push(&encode_telemetry(TelemetryVariant::V1, &t));

        assert_eq!(
            scanner.next_scan(),
            Scan::Rejected(FrameFault::Desync { skipped: 15 })
        );
        assert_eq!(scanner.next_scan(), Scan::Pending);
        assert_eq!(scanner.buffered(), 0);
    }
}

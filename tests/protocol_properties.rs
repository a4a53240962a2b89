//! Property tests for telemetry framing.

use cablescope_link::frame::{encode_telemetry, decode_telemetry_frame};
use cablescope_link::{FrameFault, ResyncPolicy, Scan, Telemetry, TelemetryScanner, TelemetryVariant};
use proptest::prelude::*;

fn any_variant() -> impl Strategy<Value = TelemetryVariant> {
    prop_oneof![
        Just(TelemetryVariant::V1),
        Just(TelemetryVariant::V2),
        Just(TelemetryVariant::V3),
    ]
}

/// Telemetry shaped like `variant`, with arbitrary bit patterns (NaN included)
fn telemetry_for(variant: TelemetryVariant) -> impl Strategy<Value = Telemetry> {
    prop::array::uniform5(any::<u32>()).prop_map(move |bits| {
        let [a, b, c, d, e] = bits.map(f32::from_bits);
        match variant {
            TelemetryVariant::V1 => Telemetry::v1(a, b),
            TelemetryVariant::V2 => Telemetry::v2(a, b, c),
            TelemetryVariant::V3 => Telemetry::v3(a, b, c, d, e),
        }
    })
}

fn variant_and_telemetry() -> impl Strategy<Value = (TelemetryVariant, Telemetry)> {
    any_variant().prop_flat_map(|variant| (Just(variant), telemetry_for(variant)))
}

fn bits(t: &Telemetry) -> [Option<u32>; 5] {
    [
        Some(t.torque.to_bits()),
        Some(t.angle.to_bits()),
        t.pwm.map(f32::to_bits),
        t.desired_torque.map(f32::to_bits),
        t.millis.map(f32::to_bits),
    ]
}

fn scan_all(scanner: &mut TelemetryScanner) -> Vec<Scan> {
    let mut out = Vec::new();
    loop {
        match scanner.next_scan() {
            Scan::Pending => return out,
            scan => out.push(scan),
        }
    }
}

proptest! {
    /// Encoding then decoding is bit-exact for every variant
    #[test]
    fn encode_decode_bit_exact((variant, telemetry) in variant_and_telemetry()) {
        let frame = encode_telemetry(variant, &telemetry);
        prop_assert_eq!(frame.len(), variant.frame_len());
        prop_assert_eq!(frame[2] as usize, variant.payload_len());

        let decoded = decode_telemetry_frame(&frame).unwrap();
        prop_assert_eq!(bits(&decoded), bits(&telemetry));

        let mut scanner = TelemetryScanner::new(Some(variant), ResyncPolicy::Rescan);
        scanner.push(&frame);
        match scanner.next_scan() {
            Scan::Telemetry(t) => prop_assert_eq!(bits(&t), bits(&telemetry)),
            other => prop_assert!(false, "expected telemetry, got {:?}", other),
        }
    }

    /// Length byte, payload and checksum always sum to zero mod 256
    #[test]
    fn checksum_zero_sum((variant, telemetry) in variant_and_telemetry()) {
        let frame = encode_telemetry(variant, &telemetry);
        let sum = frame[2..].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        prop_assert_eq!(sum, 0);
    }

    /// Any single-bit flip inside the payload is rejected by the checksum
    #[test]
    fn payload_bit_flip_rejected(
        (variant, telemetry) in variant_and_telemetry(),
        offset in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut frame = encode_telemetry(variant, &telemetry);
        let payload_start = 3;
        let byte = payload_start + offset.index(variant.payload_len());
        frame[byte] ^= 1 << bit;

        let mut scanner = TelemetryScanner::new(Some(variant), ResyncPolicy::Rescan);
        scanner.push(&frame);
        let scans = scan_all(&mut scanner);
        prop_assert!(!scans.iter().any(|s| matches!(s, Scan::Telemetry(_))));
        let checksum_fault = scans
            .iter()
            .any(|s| matches!(s, Scan::Rejected(FrameFault::ChecksumMismatch { .. })));
        prop_assert!(checksum_fault, "scans: {:?}", scans);
    }

    /// Garbage ahead of a frame never hides it, even when the garbage holds
    /// sentinel bytes, stray ACKs or partial headers
    #[test]
    fn garbage_then_frame(
        (variant, telemetry) in variant_and_telemetry(),
        garbage in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut scanner = TelemetryScanner::new(Some(variant), ResyncPolicy::Rescan);
        scanner.push(&garbage);
        scanner.push(&encode_telemetry(variant, &telemetry));

        // a checksum-valid fake frame inside the garbage may decode first
        let decoded: Vec<Telemetry> = scan_all(&mut scanner)
            .into_iter()
            .filter_map(|s| match s {
                Scan::Telemetry(t) => Some(t),
                _ => None,
            })
            .collect();
        let last = decoded.last();
        prop_assert!(last.is_some());
        prop_assert_eq!(bits(last.unwrap()), bits(&telemetry));
    }

    /// Header-like noise right before the frame is skipped
    #[test]
    fn sentinel_noise_then_frame(
        (variant, telemetry) in variant_and_telemetry(),
        noise in prop::collection::vec(prop_oneof![Just(0xFFu8), Just(0xAA), any::<u8>()], 0..16),
    ) {
        let mut scanner = TelemetryScanner::new(Some(variant), ResyncPolicy::Rescan);
        scanner.push(&noise);
        scanner.push(&encode_telemetry(variant, &telemetry));

        let last = scan_all(&mut scanner)
            .into_iter()
            .filter_map(|s| match s {
                Scan::Telemetry(t) => Some(t),
                _ => None,
            })
            .last();
        prop_assert!(last.is_some());
        prop_assert_eq!(bits(&last.unwrap()), bits(&telemetry));
    }

    /// A clean split anywhere in the frame loses nothing
    #[test]
    fn split_anywhere(
        (variant, telemetry) in variant_and_telemetry(),
        cut in any::<prop::sample::Index>(),
    ) {
        let frame = encode_telemetry(variant, &telemetry);
        let cut = 1 + cut.index(frame.len() - 1);

        let mut scanner = TelemetryScanner::new(Some(variant), ResyncPolicy::Rescan);
        scanner.push(&frame[..cut]);
        prop_assert_eq!(scanner.next_scan(), Scan::Pending);
        scanner.push(&frame[cut..]);
        match scanner.next_scan() {
            Scan::Telemetry(t) => prop_assert_eq!(bits(&t), bits(&telemetry)),
            other => prop_assert!(false, "expected telemetry, got {:?}", other),
        }
    }
}

#[test]
fn v2_reference_frame() {
    let telemetry = Telemetry::v2(1.234, -45.67, 812.0);
    let frame = encode_telemetry(TelemetryVariant::V2, &telemetry);

    let mut expected = vec![0xFF, 0xFF, 0x0D, 0x02];
    expected.extend_from_slice(&1.234f32.to_le_bytes());
    expected.extend_from_slice(&(-45.67f32).to_le_bytes());
    expected.extend_from_slice(&812.0f32.to_le_bytes());
    let sum = expected[2..].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    expected.push((!sum).wrapping_add(1));

    assert_eq!(frame, expected);
    assert_eq!(decode_telemetry_frame(&expected).unwrap(), telemetry);
}

//! Tests for CRC-32C computation and verification.

use ironlro::checksum::{Checksum, attach_checksum, compute_checksum, verify_checksum};
use ironlro::rpc::{ErrorKind, Payload, RpcError};
use proptest::prelude::*;

#[test]
fn test_empty_input_is_zero() {
    assert_eq!(compute_checksum(&[]), Checksum::from_u32(0));
}

#[test]
fn test_castagnoli_check_value() {
    assert_eq!(compute_checksum(b"123456789").value(), 0xE306_9283);
}

#[test]
fn test_attach_then_verify() {
    let payload = attach_checksum(b"my super secret data".to_vec());
    let checksum = payload.checksum().unwrap();
    assert!(verify_checksum(payload.data(), checksum).is_ok());
    assert!(payload.verify().is_ok());
}

#[test]
fn test_mismatch_converts_to_integrity_error() {
    let expected = compute_checksum(b"original");
    let mismatch = verify_checksum(b"tampered", expected).unwrap_err();
    let err: RpcError = mismatch.into();
    assert_eq!(err.kind, ErrorKind::ChecksumMismatch);
    assert!(!err.is_transient());
    assert!(err.message.contains(&expected.to_string()));
}

#[test]
fn test_stale_checksum_detected_and_recomputed() {
    let stale = Payload::with_checksum(b"v2".to_vec(), compute_checksum(b"v1"));
    assert!(stale.verify().is_err());
    let fresh = stale.recompute();
    assert_eq!(fresh.checksum(), Some(compute_checksum(b"v2")));
}

proptest! {
    #[test]
    fn prop_checksum_is_deterministic(data in prop::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(compute_checksum(&data), compute_checksum(&data.clone()));
    }

    #[test]
    fn prop_single_byte_change_is_detected(
        data in prop::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let original = compute_checksum(&data);
        let mut changed = data.clone();
        let i = index.index(changed.len());
        changed[i] ^= flip;
        prop_assert_ne!(compute_checksum(&changed), original);
        prop_assert!(verify_checksum(&changed, original).is_err());
    }

    #[test]
    fn prop_i64_wire_form_round_trips(value in any::<u32>()) {
        let checksum = Checksum::from_u32(value);
        prop_assert!(checksum.as_i64() >= 0);
        prop_assert_eq!(Checksum::try_from_i64(checksum.as_i64()), Some(checksum));
    }
}

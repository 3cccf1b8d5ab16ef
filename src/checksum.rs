//! CRC-32C (Castagnoli) checksums for payload integrity.
//!
//! Remote stores that accept a checksum alongside a payload use the Castagnoli
//! polynomial and carry the value in a signed 64-bit field. [`Checksum`] keeps
//! the 32-bit value and converts to and from that wire representation.
//!
//! ```
//! use ironlro::checksum::{attach_checksum, compute_checksum, verify_checksum};
//!
//! let payload = attach_checksum(b"my super secret data".to_vec());
//! assert_eq!(payload.checksum(), Some(compute_checksum(payload.data())));
//! assert!(verify_checksum(payload.data(), compute_checksum(b"my super secret data")).is_ok());
//! ```

use crate::rpc::{ErrorKind, Payload, RpcError};
use std::fmt;
use thiserror::Error;

/// A CRC-32C value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum(u32);

impl Checksum {
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Wire form used by APIs that carry the checksum as an `int64` field.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// Parse the `int64` wire form; values outside `0..=u32::MAX` are not checksums.
    #[must_use]
    pub fn try_from_i64(value: i64) -> Option<Self> {
        u32::try_from(value).ok().map(Self)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<Checksum> for u32 {
    fn from(c: Checksum) -> Self {
        c.0
    }
}

/// Locally detected mismatch between a payload and its recorded checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("checksum mismatch: expected {expected}, computed {actual}")]
pub struct ChecksumMismatch {
    pub expected: Checksum,
    pub actual: Checksum,
}

impl From<ChecksumMismatch> for RpcError {
    fn from(e: ChecksumMismatch) -> Self {
        Self::new(ErrorKind::ChecksumMismatch, e.to_string())
    }
}

/// CRC-32C of `data`. The checksum of an empty slice is 0.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> Checksum {
    Checksum(crc32c::crc32c(data))
}

/// Wrap `data` in a [`Payload`] carrying its checksum.
pub fn attach_checksum(data: impl Into<Vec<u8>>) -> Payload {
    let data = data.into();
    let checksum = compute_checksum(&data);
    Payload::with_checksum(data, checksum)
}

/// Check `data` against an expected checksum.
///
/// # Errors
///
/// Returns [`ChecksumMismatch`] if the computed checksum differs from `expected`
pub fn verify_checksum(data: &[u8], expected: Checksum) -> Result<(), ChecksumMismatch> {
    let actual = compute_checksum(data);
    if actual == expected {
        Ok(())
    } else {
        Err(ChecksumMismatch { expected, actual })
    }
}

impl Payload {
    /// Verify the payload against its own checksum. Payloads without one pass.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumMismatch`] if a checksum is present and does not match
    pub fn verify(&self) -> Result<(), ChecksumMismatch> {
        self.checksum()
            .map_or(Ok(()), |expected| verify_checksum(self.data(), expected))
    }

    /// Same bytes with a freshly computed checksum.
    #[must_use]
    pub fn recompute(self) -> Self {
        attach_checksum(self.into_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(compute_checksum(b"").value(), 0);
        assert_eq!(compute_checksum(b"123456789").value(), 0xE306_9283);
        assert_eq!(compute_checksum(&[0u8; 32]).value(), 0x8A91_36AA);
    }

    #[test]
    fn test_i64_wire_form() {
        let c = Checksum::from_u32(u32::MAX);
        assert_eq!(c.as_i64(), 4_294_967_295);
        assert_eq!(Checksum::try_from_i64(c.as_i64()), Some(c));
        assert_eq!(Checksum::try_from_i64(-1), None);
        assert_eq!(Checksum::try_from_i64(1 << 32), None);
    }

    #[test]
    fn test_verify_mismatch() {
        let expected = compute_checksum(b"abc");
        let err = verify_checksum(b"abd", expected).unwrap_err();
        assert_eq!(err.expected, expected);
        assert_eq!(err.actual, compute_checksum(b"abd"));
    }

    #[test]
    fn test_payload_verify_and_recompute() {
        let stale = Payload::with_checksum(b"new bytes".to_vec(), compute_checksum(b"old bytes"));
        assert!(stale.verify().is_err());
        let fresh = stale.recompute();
        assert!(fresh.verify().is_ok());
        assert!(Payload::new(b"unchecked".to_vec()).verify().is_ok());
    }

    #[test]
    fn test_display_is_hex() {
        assert_eq!(Checksum::from_u32(0xE306_9283).to_string(), "e3069283");
        assert_eq!(Checksum::from_u32(1).to_string(), "00000001");
    }
}

//! # Hashing
//!
//! BLAKE3, and only BLAKE3. The audit trail records a digest of each
//! proposed payload rather than the payload itself, so log lines stay a
//! predictable size no matter what calldata an owner attaches.

/// Computes the BLAKE3 hash of the input.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hex-encoded BLAKE3 digest of a transaction payload.
pub fn payload_digest(payload: &[u8]) -> String {
    hex::encode(blake3_hash(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(payload_digest(&[0x12, 0x34]), payload_digest(&[0x12, 0x34]));
        assert_eq!(payload_digest(b"").len(), 64);
    }

    #[test]
    fn different_payloads_different_digests() {
        assert_ne!(payload_digest(&[0x12, 0x34]), payload_digest(&[0x12, 0x35]));
    }

    #[test]
    fn matches_reference_empty_hash() {
        // BLAKE3("") from the reference test vectors.
        assert_eq!(
            payload_digest(b""),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }
}

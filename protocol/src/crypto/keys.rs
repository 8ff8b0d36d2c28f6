//! # Signing Keys
//!
//! Thin Ed25519 wrappers for proving control of an [`Address`].
//!
//! The vault itself never sees a private key. Owners sign requests on their
//! side, and the host checks the signature against the caller's address
//! before the call ever reaches the state machine. This module holds the
//! two halves of that exchange: an [`OwnerKeypair`] for signing (clients,
//! tests, tooling) and a [`RequestSignature`] for carrying the result.
//!
//! Generating and storing keys is somebody else's job. Bring your own seed.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;
use thiserror::Error;

use crate::identity::Address;

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Errors that can occur while loading key material.
///
/// Deliberately vague. An error that explains *why* a secret key was
/// rejected is an error that leaks something about the secret key.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not hex")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature encoding: expected {SIGNATURE_LENGTH} hex-encoded bytes")]
    InvalidSignature,
}

/// An owner's Ed25519 signing key.
///
/// Does not implement `Serialize`. Writing a secret key somewhere should be
/// a deliberate act; use [`secret_key_bytes`](Self::secret_key_bytes).
pub struct OwnerKeypair {
    signing_key: SigningKey,
}

impl OwnerKeypair {
    /// Constructs a keypair deterministically from a 32-byte seed.
    ///
    /// In Ed25519 the 32-byte secret key *is* the seed, so this is also how
    /// you reload a key you exported earlier.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Reconstructs a keypair from a hex-encoded secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// The address this keypair controls.
    pub fn address(&self) -> Address {
        Address::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// Signs `message`. Deterministic: same key, same message, same bytes.
    pub fn sign(&self, message: &[u8]) -> RequestSignature {
        RequestSignature(self.signing_key.sign(message).to_bytes())
    }

    /// Exports the raw secret key. Handle accordingly.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for OwnerKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Public half only. Always.
        write!(f, "OwnerKeypair(addr={})", self.address().to_hex())
    }
}

/// A detached Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RequestSignature([u8; SIGNATURE_LENGTH]);

impl RequestSignature {
    /// Wraps raw signature bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Hex-encoded form, 128 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex-encoded signature.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidSignature)?;
        let arr: [u8; SIGNATURE_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self(arr))
    }

    /// Checks this signature over `message` against the key behind `signer`.
    ///
    /// Returns `false` both for a bad signature and for an address that is
    /// not a valid Ed25519 point; callers get a yes or a no, nothing more.
    pub fn verify(&self, signer: &Address, message: &[u8]) -> bool {
        let Ok(verifying_key) = verifying_key(signer) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&self.0);
        verifying_key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        write!(f, "RequestSignature({}...{})", &hex_str[..8], &hex_str[120..])
    }
}

/// Interprets an address as an Ed25519 verifying key.
pub fn verifying_key(address: &Address) -> Result<VerifyingKey, KeyError> {
    VerifyingKey::from_bytes(address.as_bytes()).map_err(|_| KeyError::InvalidPublicKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let kp = OwnerKeypair::from_seed(&[7; 32]);
        let sig = kp.sign(b"confirm 0");
        assert!(sig.verify(&kp.address(), b"confirm 0"));
    }

    #[test]
    fn wrong_message_fails_verification() {
        let kp = OwnerKeypair::from_seed(&[7; 32]);
        let sig = kp.sign(b"confirm 0");
        assert!(!sig.verify(&kp.address(), b"confirm 1"));
    }

    #[test]
    fn wrong_signer_fails_verification() {
        let alice = OwnerKeypair::from_seed(&[1; 32]);
        let bob = OwnerKeypair::from_seed(&[2; 32]);
        let sig = alice.sign(b"execute 0");
        assert!(!sig.verify(&bob.address(), b"execute 0"));
    }

    #[test]
    fn same_seed_same_address() {
        let a = OwnerKeypair::from_seed(&[9; 32]);
        let b = OwnerKeypair::from_hex(&hex::encode([9u8; 32])).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.secret_key_bytes(), [9; 32]);
    }

    #[test]
    fn short_secret_rejected() {
        assert!(OwnerKeypair::from_hex("deadbeef").is_err());
        assert!(OwnerKeypair::from_hex("zz").is_err());
    }

    #[test]
    fn signature_hex_roundtrip() {
        let kp = OwnerKeypair::from_seed(&[3; 32]);
        let sig = kp.sign(b"payload");
        let parsed = RequestSignature::from_hex(&sig.to_hex()).unwrap();
        assert_eq!(parsed, sig);
        assert!(RequestSignature::from_hex("abcd").is_err());
    }

    #[test]
    fn debug_never_prints_secret() {
        let kp = OwnerKeypair::from_seed(&[0x42; 32]);
        let dbg = format!("{kp:?}");
        assert!(!dbg.contains(&hex::encode([0x42u8; 32])));
        assert!(dbg.contains(&kp.address().to_hex()));
    }
}

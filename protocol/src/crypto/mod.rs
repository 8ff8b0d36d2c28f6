//! # Cryptographic Primitives
//!
//! Ed25519 for request signatures, BLAKE3 for payload digests. Both are
//! thin wrappers around audited crates; nothing in here is clever, and it
//! should stay that way.

pub mod hash;
pub mod keys;
pub mod replay;
pub mod signatures;

pub use hash::{blake3_hash, payload_digest};
pub use keys::{KeyError, OwnerKeypair, RequestSignature};
pub use replay::ReplayGuard;
pub use signatures::{request_message, sign_request, verify_request, SignatureError};

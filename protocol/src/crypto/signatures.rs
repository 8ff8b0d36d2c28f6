//! # Request Signatures
//!
//! Every mutating call against a hosted vault is attributed to a caller.
//! The caller proves who they are by signing a canonical rendering of the
//! request:
//!
//! ```text
//! {METHOD} {path}\n{unix_timestamp}\n{body}
//! ```
//!
//! The timestamp bounds how long a captured request stays replayable.
//! Hosts reject anything outside [`REQUEST_EXPIRY_WINDOW`] of their own
//! clock.
//!
//! [`REQUEST_EXPIRY_WINDOW`]: crate::config::REQUEST_EXPIRY_WINDOW

use thiserror::Error;

use super::keys::{OwnerKeypair, RequestSignature};
use crate::config::REQUEST_EXPIRY_WINDOW;
use crate::identity::Address;

/// Errors during request authentication.
///
/// Intentionally coarse; the caller learns that authentication failed,
/// not which byte was wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,

    #[error("request timestamp {timestamp} outside the accepted window (now {now})")]
    Expired {
        /// Timestamp carried by the request.
        timestamp: i64,
        /// Host clock at verification time.
        now: i64,
    },

    #[error("request already seen")]
    Replayed,
}

/// Builds the canonical byte string a caller signs.
pub fn request_message(method: &str, path: &str, timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(method.len() + path.len() + body.len() + 24);
    msg.extend_from_slice(method.to_ascii_uppercase().as_bytes());
    msg.push(b' ');
    msg.extend_from_slice(path.as_bytes());
    msg.push(b'\n');
    msg.extend_from_slice(timestamp.to_string().as_bytes());
    msg.push(b'\n');
    msg.extend_from_slice(body);
    msg
}

/// Signs a request on behalf of `keypair`'s address.
pub fn sign_request(
    keypair: &OwnerKeypair,
    method: &str,
    path: &str,
    timestamp: i64,
    body: &[u8],
) -> RequestSignature {
    keypair.sign(&request_message(method, path, timestamp, body))
}

/// Verifies a signed request.
///
/// Checks freshness first (cheap), then the signature (not cheap).
pub fn verify_request(
    caller: &Address,
    signature: &RequestSignature,
    method: &str,
    path: &str,
    timestamp: i64,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    // abs_diff: the timestamp is caller-supplied and may be anywhere in i64.
    if now.abs_diff(timestamp) > REQUEST_EXPIRY_WINDOW.as_secs() {
        return Err(SignatureError::Expired { timestamp, now });
    }

    let message = request_message(method, path, timestamp, body);
    if signature.verify(caller, &message) {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}

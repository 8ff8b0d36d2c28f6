//! # Replay Protection
//!
//! A signed request stays verifiable for the whole
//! [`REQUEST_EXPIRY_WINDOW`], so a signature alone does not stop someone
//! who captured a request from sending it again. [`ReplayGuard`] remembers
//! a digest of every request a host has accepted until the request's
//! timestamp leaves the window; past that point `verify_request` turns it
//! away on its own, and the guard forgets it.
//!
//! Requests are keyed by caller and the BLAKE3 digest of the canonical
//! signed message, not by signature bytes, so a re-encoded signature over
//! the same request is still caught.
//!
//! [`REQUEST_EXPIRY_WINDOW`]: crate::config::REQUEST_EXPIRY_WINDOW

use std::collections::{BTreeMap, HashSet};

use super::hash::blake3_hash;
use super::signatures::SignatureError;
use crate::config::REQUEST_EXPIRY_WINDOW;
use crate::identity::Address;

type RequestKey = (Address, [u8; 32]);

/// Set of recently accepted requests, pruned by timestamp.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    seen: HashSet<RequestKey>,
    by_timestamp: BTreeMap<i64, Vec<RequestKey>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests currently remembered.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Records an already verified request.
    ///
    /// `message` is the canonical signed message (see
    /// [`request_message`](super::signatures::request_message)) and
    /// `timestamp` the one it carries.
    ///
    /// # Errors
    ///
    /// [`SignatureError::Replayed`] if the same caller already sent the
    /// same message within the window.
    pub fn record(
        &mut self,
        caller: &Address,
        timestamp: i64,
        message: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        self.prune(now);

        let key = (*caller, blake3_hash(message));
        if !self.seen.insert(key) {
            return Err(SignatureError::Replayed);
        }
        self.by_timestamp.entry(timestamp).or_default().push(key);
        Ok(())
    }

    /// Drops every request whose timestamp is already outside the window.
    fn prune(&mut self, now: i64) {
        let window = i64::try_from(REQUEST_EXPIRY_WINDOW.as_secs()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(window);

        let live = self.by_timestamp.split_off(&cutoff);
        let expired = std::mem::replace(&mut self.by_timestamp, live);
        for key in expired.into_values().flatten() {
            self.seen.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signatures::request_message;

    const NOW: i64 = 1_760_000_000;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    #[test]
    fn second_identical_request_rejected() {
        let mut guard = ReplayGuard::new();
        let msg = request_message("POST", "/transactions/0/confirm", NOW, b"{}");

        assert_eq!(guard.record(&addr(1), NOW, &msg, NOW), Ok(()));
        assert_eq!(
            guard.record(&addr(1), NOW, &msg, NOW + 10),
            Err(SignatureError::Replayed)
        );
    }

    #[test]
    fn same_message_from_other_caller_is_distinct() {
        let mut guard = ReplayGuard::new();
        let msg = request_message("POST", "/deposit", NOW, b"{}");
        guard.record(&addr(1), NOW, &msg, NOW).unwrap();
        assert!(guard.record(&addr(2), NOW, &msg, NOW).is_ok());
    }

    #[test]
    fn fresh_timestamp_is_a_new_request() {
        let mut guard = ReplayGuard::new();
        let first = request_message("POST", "/transactions/0/confirm", NOW, b"{}");
        let again = request_message("POST", "/transactions/0/confirm", NOW + 1, b"{}");
        guard.record(&addr(1), NOW, &first, NOW).unwrap();
        assert!(guard.record(&addr(1), NOW + 1, &again, NOW + 1).is_ok());
    }

    #[test]
    fn expired_entries_are_pruned() {
        let mut guard = ReplayGuard::new();
        for i in 0..5 {
            let msg = request_message("POST", "/deposit", NOW + i, b"{}");
            guard.record(&addr(1), NOW + i, &msg, NOW + i).unwrap();
        }
        assert_eq!(guard.len(), 5);

        let window = REQUEST_EXPIRY_WINDOW.as_secs() as i64;
        let later = NOW + 3 + window;
        let msg = request_message("POST", "/deposit", later, b"{}");
        guard.record(&addr(1), later, &msg, later).unwrap();
        // NOW+3 and NOW+4 are still inside the window, plus the new one.
        assert_eq!(guard.len(), 3);
    }

    #[test]
    fn extreme_now_does_not_overflow() {
        let mut guard = ReplayGuard::new();
        let msg = request_message("POST", "/deposit", 0, b"");
        assert!(guard.record(&addr(1), 0, &msg, i64::MIN).is_ok());
        assert!(guard.record(&addr(2), 0, &msg, i64::MAX).is_ok());
    }
}

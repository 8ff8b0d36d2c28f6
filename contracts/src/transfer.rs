//! # Value Transfer
//!
//! The vault decides *whether* and *how much* to pay. Actually moving the
//! money, and delivering the payload to the destination, is the job of a
//! [`Transfer`] implementation supplied by the host.
//!
//! [`LedgerTransfer`] is the in-process implementation the node uses: an
//! append-only book of payouts with running per-destination totals. It can
//! be told to refuse specific destinations, which is how a host models a
//! payee that bounces incoming funds.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use quorum_protocol::Address;

/// Why a transfer did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The destination refused the funds.
    #[error("destination {0} rejected the transfer")]
    Rejected(Address),

    /// The backend could not process the transfer at all.
    #[error("transfer backend unavailable: {0}")]
    Unavailable(String),

    /// Crediting the destination would overflow its running total.
    #[error("destination {0} total would overflow")]
    Overflow(Address),
}

/// Moves value out of the vault.
///
/// Implementations must be all-or-nothing: on `Err`, no value may have
/// left. The vault rolls its own bookkeeping back on `Err` and trusts the
/// implementation to have done the same.
pub trait Transfer {
    fn transfer(
        &mut self,
        destination: &Address,
        amount: u64,
        payload: &[u8],
    ) -> Result<(), TransferError>;
}

/// One completed outgoing transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Position in the ledger, starting at 0.
    pub seq: u64,
    pub destination: Address,
    pub amount: u64,
    #[serde(with = "quorum_protocol::encoding::hex_bytes")]
    pub payload: Vec<u8>,
    pub at: DateTime<Utc>,
}

/// In-memory payout ledger.
#[derive(Debug, Default, Clone)]
pub struct LedgerTransfer {
    payouts: Vec<Payout>,
    totals: HashMap<Address, u64>,
    blocked: HashSet<Address>,
}

impl LedgerTransfer {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from previously recorded payouts.
    ///
    /// Payouts are re-sequenced in the order given, so the caller should
    /// pass them in their original order.
    pub fn from_payouts(payouts: impl IntoIterator<Item = Payout>) -> Result<Self, TransferError> {
        let mut ledger = Self::new();
        for p in payouts {
            ledger.record(p.destination, p.amount, p.payload, p.at)?;
        }
        Ok(ledger)
    }

    /// Refuses all future transfers to `destination`.
    pub fn block(&mut self, destination: Address) {
        self.blocked.insert(destination);
    }

    /// Lifts a previous [`block`](Self::block).
    pub fn unblock(&mut self, destination: &Address) {
        self.blocked.remove(destination);
    }

    /// Every payout so far, oldest first.
    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    /// Total ever paid to `destination`.
    pub fn total_paid(&self, destination: &Address) -> u64 {
        self.totals.get(destination).copied().unwrap_or(0)
    }

    fn record(
        &mut self,
        destination: Address,
        amount: u64,
        payload: Vec<u8>,
        at: DateTime<Utc>,
    ) -> Result<(), TransferError> {
        let current = self.total_paid(&destination);
        let total = current
            .checked_add(amount)
            .ok_or(TransferError::Overflow(destination))?;
        self.totals.insert(destination, total);
        self.payouts.push(Payout {
            seq: self.payouts.len() as u64,
            destination,
            amount,
            payload,
            at,
        });
        Ok(())
    }
}

impl Transfer for LedgerTransfer {
    fn transfer(
        &mut self,
        destination: &Address,
        amount: u64,
        payload: &[u8],
    ) -> Result<(), TransferError> {
        if self.blocked.contains(destination) {
            return Err(TransferError::Rejected(*destination));
        }
        self.record(*destination, amount, payload.to_vec(), Utc::now())
    }
}

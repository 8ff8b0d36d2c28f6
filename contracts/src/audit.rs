//! # Audit Trail
//!
//! Every accepted mutation against a vault leaves exactly one
//! [`VaultEvent`] behind. Rejected calls leave nothing: the audit log is a
//! record of what *happened*, and a rejection changes nothing.
//!
//! Events carry enough to answer "who confirmed what, and when" without
//! replaying the whole vault. Payloads are recorded as a BLAKE3 digest so
//! an owner attaching a megabyte of calldata doesn't bloat the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quorum_protocol::Address;

/// The mutating operations a vault accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deposit,
    Propose,
    Confirm,
    Revoke,
    Execute,
}

impl Operation {
    /// Stable lowercase label, used for log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Deposit => "deposit",
            Operation::Propose => "propose",
            Operation::Confirm => "confirm",
            Operation::Revoke => "revoke",
            Operation::Execute => "execute",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured notification for one accepted mutation.
///
/// Unset fields serialize as `null` rather than being skipped, so the
/// same struct round-trips through non-self-describing formats (bincode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEvent {
    /// Position in the vault's audit log, starting at 0.
    pub seq: u64,
    /// What happened.
    pub operation: Operation,
    /// Who made it happen. For deposits, the sender.
    pub caller: Address,
    /// Transaction index, for everything except deposits.
    pub index: Option<u64>,
    /// Value moved: deposited amount, proposed amount, or executed amount.
    pub amount: Option<u64>,
    /// Destination of a proposed transaction.
    pub destination: Option<Address>,
    /// BLAKE3 digest (hex) of a proposed payload.
    pub payload_digest: Option<String>,
    /// Confirmation count on the transaction after this event.
    pub confirmations: Option<usize>,
    /// Vault balance after this event.
    pub balance: u64,
    /// When the vault accepted the call.
    pub at: DateTime<Utc>,
}

impl VaultEvent {
    /// Starts an event with only the mandatory fields filled in. The vault
    /// assigns `seq` when it appends the event to its log.
    pub(crate) fn new(operation: Operation, caller: Address, balance: u64) -> Self {
        Self {
            seq: 0,
            operation,
            caller,
            index: None,
            amount: None,
            destination: None,
            payload_digest: None,
            confirmations: None,
            balance,
            at: Utc::now(),
        }
    }

    pub(crate) fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub(crate) fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub(crate) fn with_destination(mut self, destination: Address) -> Self {
        self.destination = Some(destination);
        self
    }

    pub(crate) fn with_payload_digest(mut self, digest: String) -> Self {
        self.payload_digest = Some(digest);
        self
    }

    pub(crate) fn with_confirmations(mut self, confirmations: usize) -> Self {
        self.confirmations = Some(confirmations);
        self
    }
}

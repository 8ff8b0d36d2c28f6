//! # Multi-Owner Vault Contract
//!
//! Holds funds on behalf of a fixed set of owners and releases them only
//! when enough of those owners agree. The lifecycle of a single outgoing
//! transaction is:
//!
//! 1. **Propose**: any owner records a destination, an amount and an
//!    opaque payload. The transaction gets the next index.
//! 2. **Confirm / Revoke**: owners add or withdraw their approval, any
//!    number of times, in any order.
//! 3. **Execute**: once at least `threshold` distinct owners are on
//!    record and the vault holds enough funds, any owner releases the
//!    transfer. Execution is terminal.
//!
//! ```text
//!            confirm / revoke
//!              ┌───────┐
//!              ▼       │
//! propose ─▶ Proposed ─┘ ── execute ──▶ Executed
//! ```
//!
//! Deposits are open to anyone and need no approval.
//!
//! ## Atomicity
//!
//! Every operation runs all of its checks before touching state, so a
//! rejected call changes nothing. The one failure that can happen after
//! state has moved is the transfer itself; `execute` marks the transaction
//! executed and debits the balance *before* handing off to the
//! [`Transfer`] collaborator, and restores both if the collaborator fails.
//! The collaborator cannot reach back into the vault mid-execution because
//! `execute` holds the only `&mut` to it.
//!
//! Balance sufficiency is checked at execution, never at proposal. A
//! proposal for more than the vault holds is legal; it just can't execute
//! until deposits catch up.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use quorum_protocol::config::{VaultConfig, SNAPSHOT_FORMAT_VERSION};
use quorum_protocol::crypto::payload_digest;
use quorum_protocol::Address;

use crate::audit::{Operation, VaultEvent};
use crate::transfer::{Transfer, TransferError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during vault operations.
///
/// Every variant is a synchronous, final rejection. None of them are
/// worth retrying unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// Owner list or threshold is malformed.
    #[error("invalid vault configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The caller is not one of the vault's owners.
    #[error("unauthorized: {caller} is not an owner")]
    Unauthorized { caller: Address },

    /// No transaction exists at the requested index.
    #[error("transaction {index} not found ({count} proposed so far)")]
    NotFound { index: u64, count: u64 },

    /// The transaction was executed; its record is frozen.
    #[error("transaction {index} already executed")]
    AlreadyExecuted { index: u64 },

    /// The owner's confirmation is already on record.
    #[error("owner {owner} already confirmed transaction {index}")]
    AlreadyConfirmed { index: u64, owner: Address },

    /// The owner has no confirmation on record to revoke.
    #[error("owner {owner} has not confirmed transaction {index}")]
    NotConfirmed { index: u64, owner: Address },

    /// Fewer than `threshold` owners have confirmed.
    #[error("transaction {index} has {confirmations} confirmations, {threshold} required")]
    InsufficientConfirmations {
        index: u64,
        confirmations: usize,
        threshold: usize,
    },

    /// The vault holds less than the transaction amount.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },

    /// The transfer collaborator refused. Nothing was executed.
    #[error("transfer for transaction {index} failed: {source}")]
    TransferFailed {
        index: u64,
        #[source]
        source: TransferError,
    },

    /// A deposit would push the balance past `u64::MAX`.
    #[error("balance overflow: current {current}, deposit {deposit}")]
    BalanceOverflow { current: u64, deposit: u64 },

    /// A persisted snapshot violates the vault's invariants.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl VaultError {
    /// Stable snake_case label for metrics and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::InvalidConfig { .. } => "invalid_config",
            VaultError::Unauthorized { .. } => "unauthorized",
            VaultError::NotFound { .. } => "not_found",
            VaultError::AlreadyExecuted { .. } => "already_executed",
            VaultError::AlreadyConfirmed { .. } => "already_confirmed",
            VaultError::NotConfirmed { .. } => "not_confirmed",
            VaultError::InsufficientConfirmations { .. } => "insufficient_confirmations",
            VaultError::InsufficientBalance { .. } => "insufficient_balance",
            VaultError::TransferFailed { .. } => "transfer_failed",
            VaultError::BalanceOverflow { .. } => "balance_overflow",
            VaultError::CorruptSnapshot(_) => "corrupt_snapshot",
        }
    }
}

fn invalid_config(reason: impl Into<String>) -> VaultError {
    VaultError::InvalidConfig {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a transaction sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Accepting confirmations and revocations.
    Proposed,
    /// Funds released. Terminal.
    Executed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Proposed => write!(f, "Proposed"),
            TransactionStatus::Executed => write!(f, "Executed"),
        }
    }
}

/// A proposed outgoing transaction and its approval state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Position in the vault's transaction sequence.
    pub index: u64,
    /// Who receives the funds.
    pub destination: Address,
    /// How much is released on execution.
    pub amount: u64,
    /// Opaque bytes delivered alongside the funds.
    #[serde(with = "quorum_protocol::encoding::hex_bytes")]
    pub payload: Vec<u8>,
    /// Whether the transaction has been executed.
    pub executed: bool,
    /// Number of owners currently confirming. Always `confirmed_by.len()`.
    pub confirmations: usize,
    /// Owners currently confirming.
    pub confirmed_by: BTreeSet<Address>,
    /// The owner who proposed it.
    pub proposed_by: Address,
    /// When it was proposed.
    pub proposed_at: DateTime<Utc>,
    /// When it was executed, if it has been.
    pub executed_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Lifecycle status derived from the `executed` flag.
    pub fn status(&self) -> TransactionStatus {
        if self.executed {
            TransactionStatus::Executed
        } else {
            TransactionStatus::Proposed
        }
    }

    /// Whether `owner` currently confirms this transaction.
    pub fn is_confirmed_by(&self, owner: &Address) -> bool {
        self.confirmed_by.contains(owner)
    }
}

/// Everything needed to rebuild a [`Vault`], in a serializable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    /// Layout version; see [`SNAPSHOT_FORMAT_VERSION`].
    pub format_version: u16,
    pub owners: Vec<Address>,
    pub threshold: usize,
    pub balance: u64,
    pub transactions: Vec<TransactionRecord>,
    pub events: Vec<VaultEvent>,
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// A multi-owner vault.
///
/// Owns all of its state. Reads hand out clones or shared slices; the
/// only way to change anything is through the mutating operations below.
#[derive(Debug, Clone)]
pub struct Vault {
    /// Owners in creation order.
    owners: Vec<Address>,
    /// Same owners, for O(1) membership checks.
    owner_set: HashSet<Address>,
    threshold: usize,
    balance: u64,
    /// Append-only. Index in this vector == `TransactionRecord::index`.
    transactions: Vec<TransactionRecord>,
    /// Append-only. Index in this vector == `VaultEvent::seq`.
    audit_log: Vec<VaultEvent>,
}

impl Vault {
    /// Creates an empty vault.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] if `owners` is empty, contains
    /// a duplicate, or `threshold` is not in `1..=owners.len()`.
    pub fn create(owners: Vec<Address>, threshold: usize) -> Result<Self, VaultError> {
        if owners.is_empty() {
            return Err(invalid_config("owner list is empty"));
        }

        let mut owner_set = HashSet::with_capacity(owners.len());
        for owner in &owners {
            if !owner_set.insert(*owner) {
                return Err(invalid_config(format!("duplicate owner {owner}")));
            }
        }

        if threshold == 0 || threshold > owners.len() {
            return Err(invalid_config(format!(
                "threshold {threshold} outside 1..={}",
                owners.len()
            )));
        }

        tracing::info!(owners = owners.len(), threshold, "vault created");

        Ok(Self {
            owners,
            owner_set,
            threshold,
            balance: 0,
            transactions: Vec::new(),
            audit_log: Vec::new(),
        })
    }

    /// Creates an empty vault from a loaded [`VaultConfig`].
    pub fn from_config(config: &VaultConfig) -> Result<Self, VaultError> {
        Self::create(config.owners.clone(), config.threshold)
    }

    // -- Queries -------------------------------------------------------------

    /// Owners in the order they were given at creation.
    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    /// Whether `identity` is an owner.
    pub fn is_owner(&self, identity: &Address) -> bool {
        self.owner_set.contains(identity)
    }

    /// Confirmations required to execute.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Funds currently held.
    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Number of transactions ever proposed.
    pub fn transaction_count(&self) -> u64 {
        self.transactions.len() as u64
    }

    /// A snapshot of the transaction at `index`.
    pub fn transaction(&self, index: u64) -> Result<TransactionRecord, VaultError> {
        self.record(index).cloned()
    }

    /// All transactions, oldest first.
    pub fn transactions(&self) -> &[TransactionRecord] {
        &self.transactions
    }

    /// Whether `owner` currently confirms the transaction at `index`.
    pub fn is_confirmed(&self, index: u64, owner: &Address) -> Result<bool, VaultError> {
        Ok(self.record(index)?.is_confirmed_by(owner))
    }

    /// The full audit log.
    pub fn events(&self) -> &[VaultEvent] {
        &self.audit_log
    }

    /// Audit events with `seq >= since`.
    pub fn events_since(&self, since: u64) -> &[VaultEvent] {
        let start = usize::try_from(since)
            .unwrap_or(usize::MAX)
            .min(self.audit_log.len());
        &self.audit_log[start..]
    }

    // -- Mutations -----------------------------------------------------------

    /// Adds `amount` to the balance. Open to anyone.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::BalanceOverflow`] if the balance would exceed
    /// `u64::MAX`.
    pub fn deposit(&mut self, sender: &Address, amount: u64) -> Result<u64, VaultError> {
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(VaultError::BalanceOverflow {
                current: self.balance,
                deposit: amount,
            })
            .map_err(|e| rejected(Operation::Deposit, sender, e))?;

        self.balance = balance;
        self.emit(VaultEvent::new(Operation::Deposit, *sender, balance).with_amount(amount));
        Ok(balance)
    }

    /// Records a new outgoing transaction and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Unauthorized`] if `caller` is not an owner.
    pub fn propose(
        &mut self,
        caller: &Address,
        destination: Address,
        amount: u64,
        payload: Vec<u8>,
    ) -> Result<u64, VaultError> {
        self.ensure_owner(caller)
            .map_err(|e| rejected(Operation::Propose, caller, e))?;

        let index = self.transactions.len() as u64;
        let digest = payload_digest(&payload);
        self.transactions.push(TransactionRecord {
            index,
            destination,
            amount,
            payload,
            executed: false,
            confirmations: 0,
            confirmed_by: BTreeSet::new(),
            proposed_by: *caller,
            proposed_at: Utc::now(),
            executed_at: None,
        });

        self.emit(
            VaultEvent::new(Operation::Propose, *caller, self.balance)
                .with_index(index)
                .with_amount(amount)
                .with_destination(destination)
                .with_payload_digest(digest)
                .with_confirmations(0),
        );
        Ok(index)
    }

    /// Adds `caller`'s confirmation to the transaction at `index`.
    ///
    /// Returns the new confirmation count.
    ///
    /// # Errors
    ///
    /// In order of precedence: [`VaultError::Unauthorized`],
    /// [`VaultError::NotFound`], [`VaultError::AlreadyExecuted`],
    /// [`VaultError::AlreadyConfirmed`].
    pub fn confirm(&mut self, caller: &Address, index: u64) -> Result<usize, VaultError> {
        let confirmations = self
            .apply_confirm(caller, index)
            .map_err(|e| rejected(Operation::Confirm, caller, e))?;

        self.emit(
            VaultEvent::new(Operation::Confirm, *caller, self.balance)
                .with_index(index)
                .with_confirmations(confirmations),
        );
        Ok(confirmations)
    }

    /// Withdraws `caller`'s confirmation from the transaction at `index`.
    ///
    /// Returns the new confirmation count.
    ///
    /// # Errors
    ///
    /// In order of precedence: [`VaultError::Unauthorized`],
    /// [`VaultError::NotFound`], [`VaultError::AlreadyExecuted`],
    /// [`VaultError::NotConfirmed`].
    pub fn revoke(&mut self, caller: &Address, index: u64) -> Result<usize, VaultError> {
        let confirmations = self
            .apply_revoke(caller, index)
            .map_err(|e| rejected(Operation::Revoke, caller, e))?;

        self.emit(
            VaultEvent::new(Operation::Revoke, *caller, self.balance)
                .with_index(index)
                .with_confirmations(confirmations),
        );
        Ok(confirmations)
    }

    /// Executes the transaction at `index`, paying out through `transfer`.
    ///
    /// # Errors
    ///
    /// In order of precedence: [`VaultError::Unauthorized`],
    /// [`VaultError::NotFound`], [`VaultError::AlreadyExecuted`],
    /// [`VaultError::InsufficientConfirmations`],
    /// [`VaultError::InsufficientBalance`], and finally
    /// [`VaultError::TransferFailed`] if the collaborator refuses, in which
    /// case the vault is left exactly as it was.
    pub fn execute<T>(
        &mut self,
        caller: &Address,
        index: u64,
        transfer: &mut T,
    ) -> Result<(), VaultError>
    where
        T: Transfer + ?Sized,
    {
        let (amount, confirmations) = self
            .apply_execute(caller, index, transfer)
            .map_err(|e| rejected(Operation::Execute, caller, e))?;

        self.emit(
            VaultEvent::new(Operation::Execute, *caller, self.balance)
                .with_index(index)
                .with_amount(amount)
                .with_confirmations(confirmations),
        );
        Ok(())
    }

    // -- Snapshots -----------------------------------------------------------

    /// Captures the full vault state.
    pub fn snapshot(&self) -> VaultSnapshot {
        VaultSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            owners: self.owners.clone(),
            threshold: self.threshold,
            balance: self.balance,
            transactions: self.transactions.clone(),
            events: self.audit_log.clone(),
        }
    }

    /// Rebuilds a vault from a snapshot, re-checking every invariant.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] for a bad owner set or
    /// threshold, and [`VaultError::CorruptSnapshot`] for anything else
    /// that could not have been produced by a live vault.
    pub fn restore(snapshot: VaultSnapshot) -> Result<Self, VaultError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(VaultError::CorruptSnapshot(format!(
                "format version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        let mut vault = Self::create(snapshot.owners, snapshot.threshold)?;

        for (pos, record) in snapshot.transactions.iter().enumerate() {
            if record.index != pos as u64 {
                return Err(VaultError::CorruptSnapshot(format!(
                    "transaction at position {pos} has index {}",
                    record.index
                )));
            }
            if record.confirmations != record.confirmed_by.len() {
                return Err(VaultError::CorruptSnapshot(format!(
                    "transaction {pos} counts {} confirmations but lists {}",
                    record.confirmations,
                    record.confirmed_by.len()
                )));
            }
            if let Some(stranger) = record.confirmed_by.iter().find(|o| !vault.is_owner(o)) {
                return Err(VaultError::CorruptSnapshot(format!(
                    "transaction {pos} confirmed by non-owner {stranger}"
                )));
            }
        }

        for (pos, event) in snapshot.events.iter().enumerate() {
            if event.seq != pos as u64 {
                return Err(VaultError::CorruptSnapshot(format!(
                    "event at position {pos} has seq {}",
                    event.seq
                )));
            }
        }

        vault.balance = snapshot.balance;
        vault.transactions = snapshot.transactions;
        vault.audit_log = snapshot.events;
        Ok(vault)
    }

    // -- Internals -----------------------------------------------------------

    fn ensure_owner(&self, caller: &Address) -> Result<(), VaultError> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(VaultError::Unauthorized { caller: *caller })
        }
    }

    fn position(&self, index: u64) -> Result<usize, VaultError> {
        usize::try_from(index)
            .ok()
            .filter(|pos| *pos < self.transactions.len())
            .ok_or(VaultError::NotFound {
                index,
                count: self.transactions.len() as u64,
            })
    }

    fn record(&self, index: u64) -> Result<&TransactionRecord, VaultError> {
        let pos = self.position(index)?;
        Ok(&self.transactions[pos])
    }

    /// Owner check, lookup and not-yet-executed check shared by every
    /// per-transaction mutation. Returns the record's position.
    fn pending_position(&self, caller: &Address, index: u64) -> Result<usize, VaultError> {
        self.ensure_owner(caller)?;
        let pos = self.position(index)?;
        if self.transactions[pos].executed {
            return Err(VaultError::AlreadyExecuted { index });
        }
        Ok(pos)
    }

    fn apply_confirm(&mut self, caller: &Address, index: u64) -> Result<usize, VaultError> {
        let pos = self.pending_position(caller, index)?;
        let record = &mut self.transactions[pos];
        if !record.confirmed_by.insert(*caller) {
            return Err(VaultError::AlreadyConfirmed {
                index,
                owner: *caller,
            });
        }
        record.confirmations += 1;
        Ok(record.confirmations)
    }

    fn apply_revoke(&mut self, caller: &Address, index: u64) -> Result<usize, VaultError> {
        let pos = self.pending_position(caller, index)?;
        let record = &mut self.transactions[pos];
        if !record.confirmed_by.remove(caller) {
            return Err(VaultError::NotConfirmed {
                index,
                owner: *caller,
            });
        }
        record.confirmations -= 1;
        Ok(record.confirmations)
    }

    /// Returns the executed amount and the confirmation count at execution.
    fn apply_execute<T>(
        &mut self,
        caller: &Address,
        index: u64,
        transfer: &mut T,
    ) -> Result<(u64, usize), VaultError>
    where
        T: Transfer + ?Sized,
    {
        let pos = self.pending_position(caller, index)?;

        let record = &self.transactions[pos];
        if record.confirmations < self.threshold {
            return Err(VaultError::InsufficientConfirmations {
                index,
                confirmations: record.confirmations,
                threshold: self.threshold,
            });
        }
        let amount = record.amount;
        let prior_balance = self.balance;
        let remaining = prior_balance
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientBalance {
                requested: amount,
                available: prior_balance,
            })?;

        // Commit first, then pay. A failed payment unwinds both.
        self.balance = remaining;
        let record = &mut self.transactions[pos];
        record.executed = true;
        record.executed_at = Some(Utc::now());

        if let Err(source) = transfer.transfer(&record.destination, amount, &record.payload) {
            record.executed = false;
            record.executed_at = None;
            self.balance = prior_balance;
            return Err(VaultError::TransferFailed { index, source });
        }

        Ok((amount, record.confirmations))
    }

    /// Appends an event to the audit log and mirrors it to `tracing`.
    fn emit(&mut self, mut event: VaultEvent) {
        event.seq = self.audit_log.len() as u64;
        tracing::info!(
            seq = event.seq,
            operation = %event.operation,
            caller = %event.caller,
            index = ?event.index,
            amount = ?event.amount,
            confirmations = ?event.confirmations,
            balance = event.balance,
            "vault operation accepted"
        );
        self.audit_log.push(event);
    }
}

fn rejected(operation: Operation, caller: &Address, err: VaultError) -> VaultError {
    tracing::debug!(
        operation = %operation,
        caller = %caller,
        kind = err.kind(),
        "vault operation rejected: {}",
        err
    );
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::LedgerTransfer;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    fn owners() -> Vec<Address> {
        vec![addr(1), addr(2), addr(3)]
    }

    /// 3 owners, threshold 2, balance 10.
    fn funded_vault() -> Vault {
        let mut vault = Vault::create(owners(), 2).unwrap();
        vault.deposit(&addr(1), 10).unwrap();
        vault
    }

    struct FailingTransfer;

    impl Transfer for FailingTransfer {
        fn transfer(&mut self, _: &Address, _: u64, _: &[u8]) -> Result<(), TransferError> {
            Err(TransferError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn create_rejects_empty_owner_list() {
        let err = Vault::create(vec![], 1).unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
    }

    #[test]
    fn create_rejects_duplicate_owner() {
        let err = Vault::create(vec![addr(1), addr(2), addr(1)], 2).unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
    }

    #[test]
    fn create_rejects_out_of_range_threshold() {
        assert!(Vault::create(owners(), 0).is_err());
        assert!(Vault::create(owners(), 4).is_err());
        assert!(Vault::create(owners(), 1).is_ok());
        assert!(Vault::create(owners(), 3).is_ok());
    }

    #[test]
    fn new_vault_is_empty() {
        let vault = Vault::create(owners(), 2).unwrap();
        assert_eq!(vault.owners(), owners().as_slice());
        assert_eq!(vault.threshold(), 2);
        assert_eq!(vault.balance(), 0);
        assert_eq!(vault.transaction_count(), 0);
        assert!(vault.events().is_empty());
    }

    #[test]
    fn membership_matches_owner_list() {
        let vault = Vault::create(owners(), 2).unwrap();
        assert!(vault.is_owner(&addr(1)));
        assert!(vault.is_owner(&addr(3)));
        assert!(!vault.is_owner(&addr(4)));
    }

    #[test]
    fn deposit_open_to_non_owners() {
        let mut vault = Vault::create(owners(), 2).unwrap();
        assert_eq!(vault.deposit(&addr(99), 7).unwrap(), 7);
        assert_eq!(vault.deposit(&addr(1), 3).unwrap(), 10);
        assert_eq!(vault.balance(), 10);
    }

    #[test]
    fn deposit_overflow_rejected_without_change() {
        let mut vault = Vault::create(owners(), 1).unwrap();
        vault.deposit(&addr(1), u64::MAX).unwrap();
        let err = vault.deposit(&addr(1), 1).unwrap_err();
        assert_eq!(
            err,
            VaultError::BalanceOverflow {
                current: u64::MAX,
                deposit: 1
            }
        );
        assert_eq!(vault.balance(), u64::MAX);
        assert_eq!(vault.events().len(), 1);
    }

    #[test]
    fn propose_assigns_sequential_indices() {
        let mut vault = funded_vault();
        assert_eq!(vault.propose(&addr(1), addr(9), 1, vec![]).unwrap(), 0);
        assert_eq!(vault.propose(&addr(2), addr(9), 1, vec![]).unwrap(), 1);
        assert_eq!(vault.transaction_count(), 2);
    }

    #[test]
    fn propose_by_non_owner_rejected() {
        let mut vault = funded_vault();
        let err = vault.propose(&addr(9), addr(9), 1, vec![]).unwrap_err();
        assert_eq!(err, VaultError::Unauthorized { caller: addr(9) });
        assert_eq!(vault.transaction_count(), 0);
    }

    #[test]
    fn propose_does_not_check_balance() {
        let mut vault = funded_vault();
        let index = vault.propose(&addr(1), addr(9), 1_000, vec![]).unwrap();
        assert_eq!(vault.transaction(index).unwrap().amount, 1_000);
    }

    #[test]
    fn proposed_record_fields() {
        let mut vault = funded_vault();
        vault
            .propose(&addr(2), addr(9), 2, vec![0x12, 0x34])
            .unwrap();
        let tx = vault.transaction(0).unwrap();
        assert_eq!(tx.index, 0);
        assert_eq!(tx.destination, addr(9));
        assert_eq!(tx.amount, 2);
        assert_eq!(tx.payload, vec![0x12, 0x34]);
        assert!(!tx.executed);
        assert_eq!(tx.confirmations, 0);
        assert!(tx.confirmed_by.is_empty());
        assert_eq!(tx.proposed_by, addr(2));
        assert_eq!(tx.status(), TransactionStatus::Proposed);
    }

    #[test]
    fn confirm_precedence_unauthorized_before_not_found() {
        let mut vault = funded_vault();
        let err = vault.confirm(&addr(9), 42).unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        let err = vault.confirm(&addr(1), 42).unwrap_err();
        assert_eq!(err, VaultError::NotFound { index: 42, count: 0 });
    }

    #[test]
    fn double_confirm_rejected() {
        let mut vault = funded_vault();
        vault.propose(&addr(1), addr(9), 2, vec![]).unwrap();
        assert_eq!(vault.confirm(&addr(1), 0).unwrap(), 1);
        let err = vault.confirm(&addr(1), 0).unwrap_err();
        assert_eq!(
            err,
            VaultError::AlreadyConfirmed {
                index: 0,
                owner: addr(1)
            }
        );
        assert_eq!(vault.transaction(0).unwrap().confirmations, 1);
    }

    #[test]
    fn revoke_without_confirmation_rejected() {
        let mut vault = funded_vault();
        vault.propose(&addr(1), addr(9), 2, vec![]).unwrap();
        let err = vault.revoke(&addr(2), 0).unwrap_err();
        assert_eq!(
            err,
            VaultError::NotConfirmed {
                index: 0,
                owner: addr(2)
            }
        );
    }

    #[test]
    fn confirm_revoke_confirm_roundtrip() {
        let mut vault = funded_vault();
        vault.propose(&addr(1), addr(9), 2, vec![]).unwrap();
        vault.confirm(&addr(2), 0).unwrap();
        let before = vault.transaction(0).unwrap().confirmations;

        vault.confirm(&addr(1), 0).unwrap();
        vault.revoke(&addr(1), 0).unwrap();
        assert_eq!(vault.transaction(0).unwrap().confirmations, before);
        vault.confirm(&addr(1), 0).unwrap();
        assert_eq!(vault.transaction(0).unwrap().confirmations, before + 1);
        assert!(vault.is_confirmed(0, &addr(1)).unwrap());
    }

    #[test]
    fn execute_below_threshold_rejected() {
        let mut vault = funded_vault();
        let mut ledger = LedgerTransfer::new();
        vault.propose(&addr(1), addr(9), 2, vec![]).unwrap();
        vault.confirm(&addr(1), 0).unwrap();

        let err = vault.execute(&addr(1), 0, &mut ledger).unwrap_err();
        assert_eq!(
            err,
            VaultError::InsufficientConfirmations {
                index: 0,
                confirmations: 1,
                threshold: 2
            }
        );
        assert_eq!(vault.balance(), 10);
        assert!(ledger.payouts().is_empty());
    }

    #[test]
    fn execute_with_insufficient_balance_rejected() {
        let mut vault = funded_vault();
        let mut ledger = LedgerTransfer::new();
        vault.propose(&addr(1), addr(9), 11, vec![]).unwrap();
        vault.confirm(&addr(1), 0).unwrap();
        vault.confirm(&addr(2), 0).unwrap();

        let err = vault.execute(&addr(3), 0, &mut ledger).unwrap_err();
        assert_eq!(
            err,
            VaultError::InsufficientBalance {
                requested: 11,
                available: 10
            }
        );
        assert!(!vault.transaction(0).unwrap().executed);
    }

    #[test]
    fn execute_pays_and_freezes_record() {
        let mut vault = funded_vault();
        let mut ledger = LedgerTransfer::new();
        vault
            .propose(&addr(1), addr(9), 2, vec![0x12, 0x34])
            .unwrap();
        vault.confirm(&addr(1), 0).unwrap();
        vault.confirm(&addr(2), 0).unwrap();

        vault.execute(&addr(3), 0, &mut ledger).unwrap();

        let tx = vault.transaction(0).unwrap();
        assert!(tx.executed);
        assert!(tx.executed_at.is_some());
        assert_eq!(tx.status(), TransactionStatus::Executed);
        assert_eq!(vault.balance(), 8);
        assert_eq!(ledger.total_paid(&addr(9)), 2);
        assert_eq!(ledger.payouts()[0].payload, vec![0x12, 0x34]);
    }

    #[test]
    fn executed_transaction_is_terminal() {
        let mut vault = funded_vault();
        let mut ledger = LedgerTransfer::new();
        vault.propose(&addr(1), addr(9), 2, vec![]).unwrap();
        vault.confirm(&addr(1), 0).unwrap();
        vault.confirm(&addr(2), 0).unwrap();
        vault.execute(&addr(1), 0, &mut ledger).unwrap();
        let frozen = vault.transaction(0).unwrap();

        let executed = VaultError::AlreadyExecuted { index: 0 };
        assert_eq!(vault.confirm(&addr(3), 0).unwrap_err(), executed);
        assert_eq!(vault.revoke(&addr(1), 0).unwrap_err(), executed);
        assert_eq!(
            vault.execute(&addr(1), 0, &mut ledger).unwrap_err(),
            executed
        );
        assert_eq!(vault.transaction(0).unwrap(), frozen);
        assert_eq!(vault.balance(), 8);
        assert_eq!(ledger.payouts().len(), 1);
    }

    #[test]
    fn failed_transfer_rolls_back() {
        let mut vault = funded_vault();
        vault.propose(&addr(1), addr(9), 2, vec![]).unwrap();
        vault.confirm(&addr(1), 0).unwrap();
        vault.confirm(&addr(2), 0).unwrap();
        let events_before = vault.events().len();

        let err = vault.execute(&addr(1), 0, &mut FailingTransfer).unwrap_err();
        assert_eq!(err.kind(), "transfer_failed");

        let tx = vault.transaction(0).unwrap();
        assert!(!tx.executed);
        assert!(tx.executed_at.is_none());
        assert_eq!(vault.balance(), 10);
        assert_eq!(vault.events().len(), events_before);

        // Still executable once the collaborator recovers.
        let mut ledger = LedgerTransfer::new();
        vault.execute(&addr(1), 0, &mut ledger).unwrap();
        assert_eq!(vault.balance(), 8);
    }

    #[test]
    fn works_through_trait_object() {
        let mut vault = funded_vault();
        vault.propose(&addr(1), addr(9), 2, vec![]).unwrap();
        vault.confirm(&addr(1), 0).unwrap();
        vault.confirm(&addr(2), 0).unwrap();
        let mut ledger = LedgerTransfer::new();
        let transfer: &mut dyn Transfer = &mut ledger;
        vault.execute(&addr(2), 0, transfer).unwrap();
        assert_eq!(ledger.total_paid(&addr(9)), 2);
    }

    #[test]
    fn audit_log_records_accepted_calls_only() {
        let mut vault = funded_vault();
        vault.propose(&addr(1), addr(9), 2, vec![0xAA]).unwrap();
        vault.confirm(&addr(1), 0).unwrap();
        let _ = vault.confirm(&addr(1), 0);
        let _ = vault.propose(&addr(7), addr(9), 2, vec![]);
        vault.revoke(&addr(1), 0).unwrap();

        let ops: Vec<Operation> = vault.events().iter().map(|e| e.operation).collect();
        assert_eq!(
            ops,
            vec![
                Operation::Deposit,
                Operation::Propose,
                Operation::Confirm,
                Operation::Revoke
            ]
        );
        let seqs: Vec<u64> = vault.events().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);

        let propose = &vault.events()[1];
        assert_eq!(propose.index, Some(0));
        assert_eq!(propose.destination, Some(addr(9)));
        assert_eq!(
            propose.payload_digest.as_deref(),
            Some(payload_digest(&[0xAA]).as_str())
        );
        assert_eq!(vault.events()[3].confirmations, Some(0));
        assert_eq!(vault.events_since(2).len(), 2);
        assert!(vault.events_since(100).is_empty());
    }

    #[test]
    fn snapshot_restore_preserves_state() {
        let mut vault = funded_vault();
        vault.propose(&addr(1), addr(9), 2, vec![1, 2]).unwrap();
        vault.confirm(&addr(3), 0).unwrap();

        let restored = Vault::restore(vault.snapshot()).unwrap();
        assert_eq!(restored.snapshot(), vault.snapshot());
        assert!(restored.is_owner(&addr(2)));
        assert!(restored.is_confirmed(0, &addr(3)).unwrap());
    }

    #[test]
    fn restore_rejects_inconsistent_count() {
        let mut vault = funded_vault();
        vault.propose(&addr(1), addr(9), 2, vec![]).unwrap();
        vault.confirm(&addr(1), 0).unwrap();
        let mut snap = vault.snapshot();
        snap.transactions[0].confirmations = 2;
        assert_eq!(Vault::restore(snap).unwrap_err().kind(), "corrupt_snapshot");
    }

    #[test]
    fn restore_rejects_foreign_confirmation() {
        let mut vault = funded_vault();
        vault.propose(&addr(1), addr(9), 2, vec![]).unwrap();
        let mut snap = vault.snapshot();
        snap.transactions[0].confirmed_by.insert(addr(50));
        snap.transactions[0].confirmations = 1;
        assert_eq!(Vault::restore(snap).unwrap_err().kind(), "corrupt_snapshot");
    }

    #[test]
    fn restore_rejects_bad_config_and_version() {
        let mut snap = funded_vault().snapshot();
        snap.threshold = 5;
        assert_eq!(Vault::restore(snap).unwrap_err().kind(), "invalid_config");

        let mut snap = funded_vault().snapshot();
        snap.format_version += 1;
        assert_eq!(Vault::restore(snap).unwrap_err().kind(), "corrupt_snapshot");
    }
}

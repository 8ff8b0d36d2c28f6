//! # Quorum Vault Contracts
//!
//! The approval state machine behind Quorum Vault: a fixed set of owners
//! jointly decides when funds leave.
//!
//! - **Multisig Vault**: owners propose outgoing transactions, confirm
//!   and revoke approvals, and execute once the threshold is met.
//! - **Audit**: one structured event per accepted mutation, answering
//!   "who confirmed what, and when".
//! - **Transfer**: the seam through which executed transactions actually
//!   pay out, plus an in-memory payout ledger.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. `checked_add` and
//!    `checked_sub` everywhere, because wrapping arithmetic and money do
//!    not mix.
//! 2. A rejected call changes nothing. Checks first, mutation second.
//! 3. Execution happens once. No un-execute, no re-entry.
//! 4. Records, events and snapshots are serializable (serde) for wire
//!    transport and persistent storage.

pub mod audit;
pub mod multisig_vault;
pub mod transfer;

pub use audit::{Operation, VaultEvent};
pub use multisig_vault::{
    TransactionRecord, TransactionStatus, Vault, VaultError, VaultSnapshot,
};
pub use transfer::{LedgerTransfer, Payout, Transfer, TransferError};

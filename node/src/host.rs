//! # Vault Host
//!
//! Owns the running vault, the payout ledger it pays through, and the
//! store both are persisted to. The API layer locks a `VaultHost`, calls
//! one vault operation, and then calls [`VaultHost::commit`] so the new
//! state reaches disk before the response goes out.

use thiserror::Error;

use quorum_contracts::{LedgerTransfer, TransferError, Vault, VaultError};
use quorum_protocol::config::VaultConfig;
use quorum_protocol::Address;

use crate::store::{SnapshotStore, StoreError, VaultStore};

/// Errors raised while bringing a vault up from disk or config.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("payout ledger error: {0}")]
    Ledger(#[from] TransferError),

    /// The config file names a different vault than the one on disk.
    #[error(
        "config does not match the stored vault \
         (stored: {stored_owners} owners, threshold {stored_threshold}; \
         config: {config_owners} owners, threshold {config_threshold})"
    )]
    ConfigMismatch {
        stored_owners: usize,
        stored_threshold: usize,
        config_owners: usize,
        config_threshold: usize,
    },

    /// Nothing on disk and no config to create a vault from.
    #[error("no stored vault and no config file to create one")]
    NoVault,
}

/// A vault plus everything it needs to run inside a node.
#[derive(Debug)]
pub struct VaultHost {
    pub vault: Vault,
    pub ledger: LedgerTransfer,
    store: Option<Box<dyn SnapshotStore>>,
    /// Payouts already written to the store.
    persisted_payouts: usize,
}

impl VaultHost {
    /// An unpersisted host.
    #[cfg(test)]
    pub fn in_memory(vault: Vault) -> Self {
        Self {
            vault,
            ledger: LedgerTransfer::new(),
            store: None,
            persisted_payouts: 0,
        }
    }

    /// A host writing through an arbitrary store, starting from `vault`.
    #[cfg(test)]
    pub fn with_store(vault: Vault, store: Box<dyn SnapshotStore>) -> Self {
        Self {
            vault,
            ledger: LedgerTransfer::new(),
            store: Some(store),
            persisted_payouts: 0,
        }
    }

    /// Restores the vault held in `store`, or creates one from `config`
    /// when the store is empty.
    ///
    /// When both exist they must describe the same vault; a config with a
    /// different owner list or threshold is refused rather than silently
    /// ignored.
    pub fn open(store: VaultStore, config: Option<&VaultConfig>) -> Result<Self, HostError> {
        let (vault, ledger) = match store.load_snapshot()? {
            Some(snapshot) => {
                let vault = Vault::restore(snapshot)?;
                if let Some(config) = config {
                    ensure_matches(&vault, config)?;
                }
                let ledger = LedgerTransfer::from_payouts(store.load_payouts()?)?;
                tracing::info!(
                    balance = vault.balance(),
                    transactions = vault.transaction_count(),
                    payouts = ledger.payouts().len(),
                    "vault restored from store"
                );
                (vault, ledger)
            }
            None => {
                let config = config.ok_or(HostError::NoVault)?;
                let vault = Vault::from_config(config)?;
                tracing::info!(
                    owners = vault.owners().len(),
                    threshold = vault.threshold(),
                    "created new vault from config"
                );
                (vault, LedgerTransfer::new())
            }
        };

        let persisted_payouts = ledger.payouts().len();
        let mut host = Self {
            vault,
            ledger,
            store: Some(Box::new(store)),
            persisted_payouts,
        };
        // Writes the initial state for a fresh vault; harmless on restore.
        host.commit()?;
        Ok(host)
    }

    /// Executes a transaction, paying out through the host's ledger.
    pub fn execute(&mut self, caller: &Address, index: u64) -> Result<(), VaultError> {
        self.vault.execute(caller, index, &mut self.ledger)
    }

    /// Copies the in-memory state so a failed commit can be undone.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            vault: self.vault.clone(),
            ledger: self.ledger.clone(),
        }
    }

    /// Puts back state captured by [`checkpoint`](Self::checkpoint).
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.vault = checkpoint.vault;
        self.ledger = checkpoint.ledger;
        self.persisted_payouts = self.persisted_payouts.min(self.ledger.payouts().len());
    }

    /// Persists the current vault state and any payouts not yet written.
    /// A no-op for in-memory hosts.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let new_payouts = &self.ledger.payouts()[self.persisted_payouts..];
        store.commit(&self.vault.snapshot(), new_payouts)?;
        self.persisted_payouts = self.ledger.payouts().len();
        Ok(())
    }
}

/// In-memory vault and ledger state at one point in time.
#[derive(Debug)]
pub struct Checkpoint {
    vault: Vault,
    ledger: LedgerTransfer,
}

fn ensure_matches(vault: &Vault, config: &VaultConfig) -> Result<(), HostError> {
    if vault.owners() == config.owners.as_slice() && vault.threshold() == config.threshold {
        return Ok(());
    }
    Err(HostError::ConfigMismatch {
        stored_owners: vault.owners().len(),
        stored_threshold: vault.threshold(),
        config_owners: config.owners.len(),
        config_threshold: config.threshold,
    })
}

//! # Vault Store: Persistent State on sled
//!
//! The vault itself is an in-memory state machine; this module is what
//! lets a node restart without forgetting who confirmed what.
//!
//! ## Key Layout
//!
//! Everything lives in a single sled tree named `vault`, so one `Batch`
//! can update all of it atomically:
//!
//! | Key                       | Value                     |
//! |---------------------------|---------------------------|
//! | `state`                   | `bincode(VaultSnapshot)`  |
//! | `payout:` + seq (8B BE)   | `bincode(Payout)`         |
//!
//! Payout sequence numbers are stored big-endian so sled's lexicographic
//! ordering matches numeric ordering and a prefix scan returns payouts in
//! the order they happened.

use std::path::Path;

use sled::{Batch, Db, Tree};

use quorum_contracts::{Payout, VaultSnapshot};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

const STATE_KEY: &[u8] = b"state";
const PAYOUT_PREFIX: &[u8] = b"payout:";

fn payout_key(seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(PAYOUT_PREFIX.len() + 8);
    key.extend_from_slice(PAYOUT_PREFIX);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

// ---------------------------------------------------------------------------
// VaultStore
// ---------------------------------------------------------------------------

/// Durable storage for one vault and its payout ledger.
#[derive(Debug, Clone)]
pub struct VaultStore {
    db: Db,
    tree: Tree,
}

impl VaultStore {
    /// Opens or creates a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Creates a throwaway store that disappears on drop.
    #[cfg(test)]
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let tree = db.open_tree("vault")?;
        Ok(Self { db, tree })
    }

    /// Loads the persisted vault state, if any has been written.
    pub fn load_snapshot(&self) -> StoreResult<Option<VaultSnapshot>> {
        match self.tree.get(STATE_KEY)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Loads every persisted payout, oldest first.
    pub fn load_payouts(&self) -> StoreResult<Vec<Payout>> {
        self.tree
            .scan_prefix(PAYOUT_PREFIX)
            .values()
            .map(|value| {
                let bytes = value?;
                bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Where a host writes accepted vault state.
pub trait SnapshotStore: Send + std::fmt::Debug {
    /// Writes the vault state and any payouts not written before. Must be
    /// all-or-nothing.
    fn commit(&self, snapshot: &VaultSnapshot, new_payouts: &[Payout]) -> StoreResult<()>;
}

impl SnapshotStore for VaultStore {
    /// Writes the vault state and any new payouts in one atomic batch,
    /// then flushes to disk.
    fn commit(&self, snapshot: &VaultSnapshot, new_payouts: &[Payout]) -> StoreResult<()> {
        let mut batch = Batch::default();

        let state =
            bincode::serialize(snapshot).map_err(|e| StoreError::Serialization(e.to_string()))?;
        batch.insert(STATE_KEY, state);

        for payout in new_payouts {
            let value =
                bincode::serialize(payout).map_err(|e| StoreError::Serialization(e.to_string()))?;
            batch.insert(payout_key(payout.seq), value);
        }

        self.tree.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }
}

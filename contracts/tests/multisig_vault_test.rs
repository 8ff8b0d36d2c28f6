//! Integration tests for the multisig vault contract.
//!
//! These drive the vault the way a host would: owners identified by real
//! Ed25519 keys, payouts going through the ledger collaborator, state
//! surviving a snapshot round-trip through bincode.

use quorum_contracts::{
    LedgerTransfer, Operation, Transfer, TransferError, Vault, VaultError, VaultSnapshot,
};
use quorum_protocol::config::VaultConfig;
use quorum_protocol::crypto::OwnerKeypair;
use quorum_protocol::Address;

/// Helper: three owners with deterministic keys, plus one outsider.
fn parties() -> (Vec<OwnerKeypair>, OwnerKeypair) {
    let owners = (1u8..=3).map(|b| OwnerKeypair::from_seed(&[b; 32])).collect();
    let outsider = OwnerKeypair::from_seed(&[0xEE; 32]);
    (owners, outsider)
}

fn addresses(keys: &[OwnerKeypair]) -> Vec<Address> {
    keys.iter().map(OwnerKeypair::address).collect()
}

fn destination() -> Address {
    Address::from_bytes([0xD0; 32])
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn owners_threshold_two_scenario() {
    let (keys, outsider) = parties();
    let [owner1, owner2, owner3] = [keys[0].address(), keys[1].address(), keys[2].address()];
    let mut vault = Vault::create(addresses(&keys), 2).unwrap();
    let mut ledger = LedgerTransfer::new();

    // Deployment
    assert_eq!(vault.owners(), &[owner1, owner2, owner3]);
    assert_eq!(vault.threshold(), 2);
    assert_eq!(vault.transaction_count(), 0);
    assert!(vault.is_owner(&owner1));
    assert!(!vault.is_owner(&outsider.address()));

    // Deposit 10
    vault.deposit(&owner1, 10).unwrap();
    assert_eq!(vault.balance(), 10);

    // Submit
    let index = vault
        .propose(&owner1, destination(), 2, vec![0x12, 0x34])
        .unwrap();
    assert_eq!(index, 0);
    let tx = vault.transaction(0).unwrap();
    assert_eq!(tx.destination, destination());
    assert_eq!(tx.amount, 2);
    assert_eq!(tx.payload, vec![0x12, 0x34]);
    assert_eq!(tx.confirmations, 0);
    assert!(!tx.executed);
    assert_eq!(vault.transaction_count(), 1);

    // Confirm by all three
    vault.confirm(&owner1, 0).unwrap();
    vault.confirm(&owner2, 0).unwrap();
    vault.confirm(&owner3, 0).unwrap();
    assert_eq!(vault.transaction(0).unwrap().confirmations, 3);

    // Revoke by owner3
    vault.revoke(&owner3, 0).unwrap();
    assert_eq!(vault.transaction(0).unwrap().confirmations, 2);

    // Execute by owner1
    vault.execute(&owner1, 0, &mut ledger).unwrap();
    assert!(vault.transaction(0).unwrap().executed);
    assert_eq!(vault.balance(), 8);
    assert_eq!(ledger.total_paid(&destination()), 2);
}

#[test]
fn indices_ignore_activity_on_other_transactions() {
    let (keys, _) = parties();
    let owners = addresses(&keys);
    let mut vault = Vault::create(owners.clone(), 1).unwrap();
    let mut ledger = LedgerTransfer::new();
    vault.deposit(&owners[0], 100).unwrap();

    let mut indices = Vec::new();
    for i in 0..5u64 {
        let index = vault.propose(&owners[(i % 3) as usize], destination(), 1, vec![]).unwrap();
        indices.push(index);
        // Churn the previous transaction between proposals.
        vault.confirm(&owners[0], index).unwrap();
        vault.revoke(&owners[0], index).unwrap();
        vault.confirm(&owners[1], index).unwrap();
        if i % 2 == 0 {
            vault.execute(&owners[2], index, &mut ledger).unwrap();
        }
    }
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert_eq!(vault.balance(), 97);
}

#[test]
fn execute_succeeds_exactly_at_threshold() {
    let (keys, _) = parties();
    let owners = addresses(&keys);
    let mut vault = Vault::create(owners.clone(), 3).unwrap();
    let mut ledger = LedgerTransfer::new();
    vault.deposit(&owners[0], 5).unwrap();
    vault.propose(&owners[0], destination(), 5, vec![]).unwrap();

    for (n, owner) in owners.iter().enumerate() {
        let result = vault.execute(&owners[0], 0, &mut ledger);
        assert!(
            matches!(
                result,
                Err(VaultError::InsufficientConfirmations { confirmations, threshold: 3, .. })
                    if confirmations == n
            ),
            "expected rejection with {n} confirmations, got {result:?}"
        );
        vault.confirm(owner, 0).unwrap();
    }

    vault.execute(&owners[0], 0, &mut ledger).unwrap();
    assert_eq!(vault.balance(), 0);
}

#[test]
fn late_deposit_unblocks_execution() {
    let (keys, _) = parties();
    let owners = addresses(&keys);
    let mut vault = Vault::create(owners.clone(), 1).unwrap();
    let mut ledger = LedgerTransfer::new();

    vault.propose(&owners[0], destination(), 50, vec![]).unwrap();
    vault.confirm(&owners[1], 0).unwrap();
    assert!(matches!(
        vault.execute(&owners[1], 0, &mut ledger),
        Err(VaultError::InsufficientBalance {
            requested: 50,
            available: 0
        })
    ));

    // Anyone can top the vault up.
    vault.deposit(&destination(), 50).unwrap();
    vault.execute(&owners[1], 0, &mut ledger).unwrap();
    assert_eq!(vault.balance(), 0);
}

// ---------------------------------------------------------------------------
// Failure Atomicity
// ---------------------------------------------------------------------------

#[test]
fn rejected_calls_leave_state_untouched() {
    let (keys, outsider) = parties();
    let owners = addresses(&keys);
    let mut vault = Vault::create(owners.clone(), 2).unwrap();
    let mut ledger = LedgerTransfer::new();
    vault.deposit(&owners[0], 10).unwrap();
    vault.propose(&owners[0], destination(), 4, vec![1]).unwrap();
    vault.confirm(&owners[0], 0).unwrap();
    let before = vault.snapshot();

    let stranger = outsider.address();
    assert!(vault.propose(&stranger, destination(), 1, vec![]).is_err());
    assert!(vault.confirm(&stranger, 0).is_err());
    assert!(vault.confirm(&owners[0], 0).is_err());
    assert!(vault.confirm(&owners[1], 7).is_err());
    assert!(vault.revoke(&owners[2], 0).is_err());
    assert!(vault.execute(&owners[0], 0, &mut ledger).is_err());
    assert!(vault.execute(&stranger, 0, &mut ledger).is_err());

    assert_eq!(vault.snapshot(), before);
    assert!(ledger.payouts().is_empty());
}

#[test]
fn bounced_transfer_keeps_transaction_executable() {
    let (keys, _) = parties();
    let owners = addresses(&keys);
    let mut vault = Vault::create(owners.clone(), 2).unwrap();
    let mut ledger = LedgerTransfer::new();
    ledger.block(destination());

    vault.deposit(&owners[0], 10).unwrap();
    vault.propose(&owners[0], destination(), 3, vec![]).unwrap();
    vault.confirm(&owners[0], 0).unwrap();
    vault.confirm(&owners[1], 0).unwrap();

    let err = vault.execute(&owners[0], 0, &mut ledger).unwrap_err();
    assert_eq!(
        err,
        VaultError::TransferFailed {
            index: 0,
            source: TransferError::Rejected(destination())
        }
    );
    assert!(!vault.transaction(0).unwrap().executed);
    assert_eq!(vault.balance(), 10);

    // Confirmation state is still live after a bounced transfer.
    vault.revoke(&owners[1], 0).unwrap();
    vault.confirm(&owners[2], 0).unwrap();

    ledger.unblock(&destination());
    vault.execute(&owners[2], 0, &mut ledger).unwrap();
    assert_eq!(vault.balance(), 7);
    assert_eq!(ledger.payouts().len(), 1);
}

/// A collaborator that records what it was asked to do and can be told
/// to fail, to check the vault passes through exactly what was proposed.
#[derive(Default)]
struct RecordingTransfer {
    calls: Vec<(Address, u64, Vec<u8>)>,
    fail: bool,
}

impl Transfer for RecordingTransfer {
    fn transfer(
        &mut self,
        destination: &Address,
        amount: u64,
        payload: &[u8],
    ) -> Result<(), TransferError> {
        self.calls.push((*destination, amount, payload.to_vec()));
        if self.fail {
            Err(TransferError::Unavailable("maintenance".into()))
        } else {
            Ok(())
        }
    }
}

#[test]
fn collaborator_receives_destination_amount_and_payload() {
    let (keys, _) = parties();
    let owners = addresses(&keys);
    let mut vault = Vault::create(owners.clone(), 1).unwrap();
    vault.deposit(&owners[0], 9).unwrap();
    vault
        .propose(&owners[0], destination(), 9, b"calldata".to_vec())
        .unwrap();
    vault.confirm(&owners[0], 0).unwrap();

    let mut collaborator = RecordingTransfer {
        fail: true,
        ..Default::default()
    };
    assert!(vault.execute(&owners[0], 0, &mut collaborator).is_err());
    collaborator.fail = false;
    vault.execute(&owners[0], 0, &mut collaborator).unwrap();

    assert_eq!(collaborator.calls.len(), 2);
    assert_eq!(collaborator.calls[1], (destination(), 9, b"calldata".to_vec()));
    assert!(vault.execute(&owners[0], 0, &mut collaborator).is_err());
    assert_eq!(collaborator.calls.len(), 2);
}

// ---------------------------------------------------------------------------
// Audit & Persistence
// ---------------------------------------------------------------------------

#[test]
fn audit_trail_answers_who_confirmed_what() {
    let (keys, _) = parties();
    let owners = addresses(&keys);
    let mut vault = Vault::create(owners.clone(), 2).unwrap();
    vault.propose(&owners[0], destination(), 1, vec![]).unwrap();
    vault.propose(&owners[1], destination(), 1, vec![]).unwrap();
    vault.confirm(&owners[2], 1).unwrap();
    vault.confirm(&owners[0], 0).unwrap();

    let confirmers_of_1: Vec<Address> = vault
        .events()
        .iter()
        .filter(|e| e.operation == Operation::Confirm && e.index == Some(1))
        .map(|e| e.caller)
        .collect();
    assert_eq!(confirmers_of_1, vec![owners[2]]);
}

#[test]
fn snapshot_survives_bincode_roundtrip() {
    let (keys, _) = parties();
    let owners = addresses(&keys);
    let config = VaultConfig::new(owners.clone(), 2);
    let mut vault = Vault::from_config(&config).unwrap();
    let mut ledger = LedgerTransfer::new();
    vault.deposit(&owners[0], 10).unwrap();
    vault.propose(&owners[0], destination(), 2, vec![0x12, 0x34]).unwrap();
    vault.propose(&owners[1], destination(), 3, vec![]).unwrap();
    vault.confirm(&owners[0], 0).unwrap();
    vault.confirm(&owners[1], 0).unwrap();
    vault.execute(&owners[2], 0, &mut ledger).unwrap();
    vault.confirm(&owners[2], 1).unwrap();

    let bytes = bincode::serialize(&vault.snapshot()).unwrap();
    let decoded: VaultSnapshot = bincode::deserialize(&bytes).unwrap();
    let mut restored = Vault::restore(decoded).unwrap();

    assert_eq!(restored.snapshot(), vault.snapshot());
    assert_eq!(restored.balance(), 8);
    assert!(matches!(
        restored.confirm(&owners[0], 0),
        Err(VaultError::AlreadyExecuted { index: 0 })
    ));
    assert_eq!(restored.propose(&owners[0], destination(), 1, vec![]).unwrap(), 2);
}

#[test]
fn snapshot_json_uses_hex_payloads() {
    let (keys, _) = parties();
    let owners = addresses(&keys);
    let mut vault = Vault::create(owners.clone(), 1).unwrap();
    vault.propose(&owners[0], destination(), 2, vec![0x12, 0x34]).unwrap();

    let json = serde_json::to_value(vault.snapshot()).unwrap();
    assert_eq!(json["transactions"][0]["payload"], "0x1234");
    assert_eq!(json["owners"][0], owners[0].to_hex());
}

// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Quorum Protocol: Core Primitives
//!
//! The shared vocabulary of Quorum Vault. The approval state machine lives
//! in `quorum-contracts`; the host that runs it lives in `quorum-node`.
//! Everything both of them need to agree on lives here.
//!
//! ## Modules
//!
//! - **identity**: [`Address`], the 32-byte identity of owners and payees.
//! - **crypto**: Ed25519 request signatures and BLAKE3 payload digests.
//! - **encoding**: serde helpers for opaque byte payloads.
//! - **config**: constants and the on-disk vault configuration.
//!
//! ## Design Philosophy
//!
//! 1. Identities are bytes, not strings. Parsing happens once, at the edge.
//! 2. No key generation or storage. Owners bring their own keys.
//! 3. If it touches money, it has tests. Plural.

pub mod config;
pub mod crypto;
pub mod encoding;
pub mod identity;

pub use identity::{Address, AddressError};

//! # Configuration & Constants
//!
//! Every magic number in Quorum Vault lives here, along with the one file
//! an operator has to write by hand: the [`VaultConfig`] naming the owners
//! and the confirmation threshold.
//!
//! The config file is plain JSON:
//!
//! ```json
//! {
//!   "owners": ["<64 hex chars>", "<64 hex chars>", "<64 hex chars>"],
//!   "threshold": 2
//! }
//! ```
//!
//! Structural checks (non-empty, distinct owners, sane threshold) are the
//! vault's job, not the loader's. The loader only guarantees the file
//! parses.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Address;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version of the request-signing and snapshot formats.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Bumped whenever the persisted `VaultSnapshot` layout changes.
pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Request Authentication
// ---------------------------------------------------------------------------

/// How far a signed request's timestamp may drift from the host clock.
/// Five minutes tolerates sloppy client clocks without leaving captured
/// requests replayable for long.
pub const REQUEST_EXPIRY_WINDOW: Duration = Duration::from_secs(300);

/// Header carrying the caller's hex-encoded address.
pub const CALLER_HEADER: &str = "x-quorum-caller";

/// Header carrying the unix timestamp (seconds) the caller signed.
pub const TIMESTAMP_HEADER: &str = "x-quorum-timestamp";

/// Header carrying the hex-encoded Ed25519 request signature.
pub const SIGNATURE_HEADER: &str = "x-quorum-signature";

// ---------------------------------------------------------------------------
// Host Limits
// ---------------------------------------------------------------------------

/// Maximum accepted request body. Payloads are opaque calldata, not file
/// uploads.
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Default port for the REST API.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Broadcast channel capacity for live audit events. Slow WebSocket
/// subscribers beyond this many events behind start missing events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Vault Configuration File
// ---------------------------------------------------------------------------

/// Errors raised while reading or writing a [`VaultConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Creation parameters for a vault: the ordered owner list and the
/// confirmation threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Owner addresses, in the order they will be reported back.
    pub owners: Vec<Address>,
    /// Distinct owner confirmations required to execute a transaction.
    pub threshold: usize,
}

impl VaultConfig {
    /// Creates a config in memory.
    pub fn new(owners: Vec<Address>, threshold: usize) -> Self {
        Self { owners, threshold }
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Writes the config as pretty-printed JSON, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

//! Content checksums and the current/pending pair the staleness
//! protocol is built on.
//!
//! A checksum is an opaque string: equality implies content equality for
//! the purposes of this crate. The empty string is the "unknown" sentinel
//! for data whose checksum has not been computed yet.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque content checksum of a snapshot.
///
/// The empty string means "not yet known" and never compares as stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The "not yet computed" sentinel.
    pub fn unknown() -> Self {
        Self(String::new())
    }

    /// Lowercase hex sha256 of the given bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut h = Sha256::new();
        h.update(bytes);
        Self(hex::encode(h.finalize()))
    }

    /// Whether this checksum carries a value (non-empty).
    pub fn is_known(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            f.write_str(&self.0)
        } else {
            f.write_str("<unknown>")
        }
    }
}

/// The checksum of the snapshot on display (`current`) and of the most
/// recently polled snapshot (`pending`).
///
/// Staleness is always derived from the pair via [`ChecksumPair::has_updates`],
/// never cached separately, so the two can never diverge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumPair {
    current: Checksum,
    pending: Checksum,
}

impl ChecksumPair {
    /// Fresh pair with both sides unknown.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &Checksum {
        &self.current
    }

    pub fn pending(&self) -> &Checksum {
        &self.pending
    }

    pub fn set_current(&mut self, checksum: Checksum) {
        self.current = checksum;
    }

    pub fn set_pending(&mut self, checksum: Checksum) {
        self.pending = checksum;
    }

    /// Whether a polled snapshot with different content is waiting to be
    /// accepted. An unknown pending checksum is never considered stale.
    pub fn has_updates(&self) -> bool {
        self.pending.is_known() && self.current != self.pending
    }

    /// Accept the pending snapshot: its checksum becomes current.
    pub fn promote(&mut self) {
        self.current = self.pending.clone();
    }
}

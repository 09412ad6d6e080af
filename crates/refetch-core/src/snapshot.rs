//! The contract between the controller and the data it tracks.
//!
//! A snapshot is one fetched copy of the data, produced either by the
//! loader path (navigation-triggered) or the poll path (timer-triggered).
//! The controller never inspects a snapshot's contents; it only asks for
//! its content checksum.

use std::future::Future;

use serde::Serialize;

use crate::checksum::Checksum;
use crate::errors::SnapshotError;

/// One fetched copy of loader-backed data.
///
/// The checksum accessor is asynchronous: a snapshot may need a round trip
/// to resolve its content version. Returning [`Checksum::unknown`] means
/// "no version information this time" and never triggers staleness.
pub trait Snapshot: Send + Sync + 'static {
    fn checksum(&self) -> impl Future<Output = Result<Checksum, SnapshotError>> + Send;
}

/// In-memory snapshot whose checksum is the sha256 of its bytes.
///
/// Covers the common case where the poll path fetches the whole payload
/// anyway (a file read, a small API response) and the content version is
/// derived rather than server-provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesSnapshot {
    bytes: Vec<u8>,
}

impl BytesSnapshot {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Snapshot of any serializable value, checksummed over its JSON form.
    pub fn from_value<T: Serialize>(value: &T) -> Result<Self, SnapshotError> {
        Ok(Self::new(serde_json::to_vec(value)?))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Checksum of the payload, computed synchronously.
    pub fn content_checksum(&self) -> Checksum {
        Checksum::of_bytes(&self.bytes)
    }
}

impl Snapshot for BytesSnapshot {
    fn checksum(&self) -> impl Future<Output = Result<Checksum, SnapshotError>> + Send {
        let checksum = self.content_checksum();
        async move { Ok(checksum) }
    }
}

//! Remote blob operations against a peer node.

use async_trait::async_trait;
use sfs_common::{DigestAlgorithm, Result, VolumeId};
use std::collections::HashMap;

/// Length + digests of a blob as recomputed by the node that holds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestBlob {
    pub position: u64,
    pub length: u64,
    digests: HashMap<DigestAlgorithm, Vec<u8>>,
}

impl DigestBlob {
    /// Create a digest blob with no digests attached yet.
    #[must_use]
    pub fn new(position: u64, length: u64) -> Self {
        Self {
            position,
            length,
            digests: HashMap::new(),
        }
    }

    /// Attach a digest.
    #[must_use]
    pub fn with_digest(mut self, algorithm: DigestAlgorithm, value: Vec<u8>) -> Self {
        self.digests.insert(algorithm, value);
        self
    }

    /// Digest under `algorithm`, when the remote node computed one.
    #[must_use]
    pub fn digest(&self, algorithm: DigestAlgorithm) -> Option<&[u8]> {
        self.digests.get(&algorithm).map(Vec::as_slice)
    }
}

/// Blob operations a peer node answers for the volumes it hosts.
///
/// Every operation distinguishes "no blob at that coordinate" (`Ok(None)`
/// or a negative flag) from a transport failure (`Err`); implementations
/// must never fold one into the other.
#[async_trait]
pub trait BlobPeer: Send + Sync {
    /// Recompute the digest of the blob at `(volume_id, position)`,
    /// optionally restricted to a byte window.
    async fn checksum(
        &self,
        volume_id: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
        algorithm: DigestAlgorithm,
    ) -> Result<Option<DigestBlob>>;

    /// Read the blob payload at `(volume_id, position)`.
    async fn read(
        &self,
        volume_id: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> Result<Option<Vec<u8>>>;

    /// Append a blob to `volume_id`; the volume assigns the position.
    async fn write(&self, volume_id: &VolumeId, data: Vec<u8>) -> Result<DigestBlob>;

    /// Delete the blob at `(volume_id, position)`. Idempotent; the
    /// returned flag reports whether a blob was actually removed.
    async fn delete(&self, volume_id: &VolumeId, position: u64) -> Result<bool>;

    /// Mark the blob at `(volume_id, position)` durable.
    async fn ack(&self, volume_id: &VolumeId, position: u64) -> Result<bool>;
}

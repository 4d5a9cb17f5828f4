//! Blob reference verification.
//!
//! Proves that a reference's recorded read and write integrity fields
//! both match the digest recomputed by the node that physically holds
//! the blob. Verification is a query, never an error: every failure
//! mode collapses to `false` so scrub and repair sweeps can aggregate
//! results without terminating.

use crate::directory::ClusterDirectory;
use sfs_common::DigestAlgorithm;
use sfs_model::BlobRefView;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Verifies blob references against the cluster.
pub struct VerifyBlobReference {
    directory: Arc<ClusterDirectory>,
}

impl VerifyBlobReference {
    #[must_use]
    pub fn new(directory: Arc<ClusterDirectory>) -> Self {
        Self { directory }
    }

    /// Verify one blob reference.
    ///
    /// Returns `true` only when the recorded read digest and length, the
    /// recorded write digest and length, and the recomputed digest and
    /// length all agree. A reference that cannot be verified (missing
    /// coordinates, unresolved volume, missing blob, transport failure)
    /// yields `false`.
    pub async fn call(&self, reference: BlobRefView<'_>) -> bool {
        debug!(
            path = %reference.path,
            volume = ?reference.blob.volume_id,
            position = ?reference.blob.position,
            "begin verify blob reference"
        );
        let verified = self.verify(&reference).await;
        debug!(
            path = %reference.path,
            volume = ?reference.blob.volume_id,
            position = ?reference.blob.position,
            verified,
            "end verify blob reference"
        );
        verified
    }

    async fn verify(&self, reference: &BlobRefView<'_>) -> bool {
        let segment = reference.segment;
        let write_sha512 = segment.write_sha512.as_deref();
        let write_length = segment.write_length;

        // A recorded length without a recorded digest is structurally
        // invalid; nothing recomputed could ever prove it intact.
        if write_sha512.is_none() && write_length.is_some() {
            return false;
        }

        // Only references that point at a physical blob are verifiable.
        let (Some(volume_id), Some(position)) =
            (reference.blob.volume_id.as_ref(), reference.blob.position)
        else {
            return false;
        };

        let Some(node) = self.directory.node_for_volume(volume_id) else {
            warn!(%volume_id, "no nodes contain volume");
            return false;
        };

        match node
            .checksum(volume_id, position, None, None, DigestAlgorithm::Sha512)
            .await
        {
            Err(err) => {
                error!(
                    path = %reference.path,
                    %volume_id,
                    position,
                    error = %err,
                    "verify fail blob reference"
                );
                false
            }
            Ok(None) => false,
            Ok(Some(digest_blob)) => {
                let Some(expected_sha512) = digest_blob.digest(DigestAlgorithm::Sha512) else {
                    return false;
                };
                let expected_length = digest_blob.length;

                let sha512_match = reference
                    .blob
                    .read_sha512
                    .as_deref()
                    .is_some_and(|d| d == expected_sha512);
                let length_match = reference
                    .blob
                    .read_length
                    .is_some_and(|l| l == expected_length);

                sha512_match
                    && length_match
                    && write_sha512.is_some_and(|d| d == expected_sha512)
                    && write_length.is_some_and(|l| l == expected_length)
            }
        }
    }
}

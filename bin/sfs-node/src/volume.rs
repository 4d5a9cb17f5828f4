//! Local volume access.
//!
//! The on-disk blob file format belongs to the volume layer and stays
//! behind this seam; the node only needs positional reads and appends.
//! The in-memory implementation backs tests and single-process setups.

use parking_lot::Mutex;
use sfs_cluster::VolumeAdvert;
use sfs_common::{Error, Result, VolumeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Blob operations a locally mounted volume supports.
pub trait Volume: Send + Sync {
    /// Read the blob at `position`, `None` when the coordinate is empty.
    fn read_blob(&self, position: u64) -> Result<Option<Vec<u8>>>;

    /// Append a blob and return its assigned position.
    fn append_blob(&self, data: Vec<u8>) -> Result<u64>;

    /// Delete the blob at `position`; reports whether one existed.
    fn delete_blob(&self, position: u64) -> Result<bool>;

    /// Mark the blob at `position` durable; reports whether it exists.
    fn ack_blob(&self, position: u64) -> Result<bool>;
}

struct BlobRecord {
    data: Vec<u8>,
    acknowledged: bool,
}

/// Heap-backed volume.
#[derive(Default)]
pub struct MemoryVolume {
    blobs: Mutex<HashMap<u64, BlobRecord>>,
    next_position: Mutex<u64>,
}

impl MemoryVolume {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Volume for MemoryVolume {
    fn read_blob(&self, position: u64) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(&position).map(|r| r.data.clone()))
    }

    fn append_blob(&self, data: Vec<u8>) -> Result<u64> {
        let mut next = self.next_position.lock();
        let position = *next;
        *next += 1;
        self.blobs.lock().insert(
            position,
            BlobRecord {
                data,
                acknowledged: false,
            },
        );
        Ok(position)
    }

    fn delete_blob(&self, position: u64) -> Result<bool> {
        Ok(self.blobs.lock().remove(&position).is_some())
    }

    fn ack_blob(&self, position: u64) -> Result<bool> {
        match self.blobs.lock().get_mut(&position) {
            Some(record) => {
                record.acknowledged = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// The volumes this node hosts.
pub struct VolumeRegistry {
    volumes: HashMap<VolumeId, Arc<dyn Volume>>,
}

impl VolumeRegistry {
    /// Build a registry hosting in-memory volumes for the given ids.
    #[must_use]
    pub fn in_memory(volume_ids: &[VolumeId]) -> Self {
        let volumes = volume_ids
            .iter()
            .map(|id| (id.clone(), Arc::new(MemoryVolume::new()) as Arc<dyn Volume>))
            .collect();
        Self { volumes }
    }

    /// The volume with the given id, when hosted here.
    #[must_use]
    pub fn get(&self, volume_id: &VolumeId) -> Option<Arc<dyn Volume>> {
        self.volumes.get(volume_id).cloned()
    }

    /// Look up a volume, failing when it is not hosted here.
    pub fn require(&self, volume_id: &VolumeId) -> Result<Arc<dyn Volume>> {
        self.get(volume_id)
            .ok_or_else(|| Error::VolumeUnresolved(volume_id.to_string()))
    }

    /// Number of hosted volumes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// Whether this node hosts no volumes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Adverts for the service definition this node publishes. Hosted
    /// volumes are advertised as primary.
    #[must_use]
    pub fn adverts(&self) -> Vec<VolumeAdvert> {
        let mut adverts: Vec<VolumeAdvert> = self
            .volumes
            .keys()
            .map(|id| VolumeAdvert {
                id: id.clone(),
                primary: true,
            })
            .collect();
        adverts.sort_by(|a, b| a.id.cmp(&b.id));
        adverts
    }
}

//! The cluster directory: which node hosts which volume.
//!
//! Populated from the service definition documents every node keeps
//! up to date in the metadata store. Readers take a copy-on-write
//! snapshot, so a single lookup always sees one consistent refresh and
//! never blocks on a concurrent one.

use crate::peer::BlobPeer;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sfs_common::{NodeId, Result, VolumeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A volume advertised by a node's service definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAdvert {
    pub id: VolumeId,
    /// Whether the advertising node is the volume's primary owner.
    pub primary: bool,
}

/// Service definition document a node publishes about itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDef {
    pub node_id: NodeId,
    /// Routable endpoint of the node's blob service.
    pub endpoint: String,
    #[serde(default)]
    pub volumes: Vec<VolumeAdvert>,
}

impl ServiceDef {
    /// Document id under which this definition is indexed.
    #[must_use]
    pub fn document_id(&self) -> String {
        self.node_id.to_string()
    }
}

/// Creates peers for endpoints during a directory refresh.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn BlobPeer>>;
}

struct VolumeOwnership {
    primary: Option<Arc<dyn BlobPeer>>,
    replicas: Vec<Arc<dyn BlobPeer>>,
}

type VolumeMap = HashMap<VolumeId, VolumeOwnership>;

/// Point-in-time mapping from volume id to the peers hosting it.
pub struct ClusterDirectory {
    connector: Arc<dyn PeerConnector>,
    volumes: RwLock<Arc<VolumeMap>>,
}

impl ClusterDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new(connector: Arc<dyn PeerConnector>) -> Self {
        Self {
            connector,
            volumes: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// The peer to ask about `volume_id`: the primary owner when one is
    /// advertised, otherwise any replica.
    ///
    /// `None` means no current service definition advertises the volume;
    /// callers treat that as a recoverable negative, not an error.
    #[must_use]
    pub fn node_for_volume(&self, volume_id: &VolumeId) -> Option<Arc<dyn BlobPeer>> {
        let snapshot = self.volumes.read().clone();
        let ownership = snapshot.get(volume_id)?;
        ownership
            .primary
            .clone()
            .or_else(|| ownership.replicas.first().cloned())
    }

    /// Number of volumes in the current snapshot.
    #[must_use]
    pub fn volume_count(&self) -> usize {
        self.volumes.read().len()
    }

    /// Rebuild the snapshot from the given service definitions and swap
    /// it in atomically.
    ///
    /// A node whose endpoint cannot be connected is skipped; its volumes
    /// stay unresolved until the next refresh finds them elsewhere.
    pub async fn refresh(&self, service_defs: &[ServiceDef]) {
        let mut next: VolumeMap = HashMap::new();
        for def in service_defs {
            let peer = match self.connector.connect(&def.endpoint).await {
                Ok(peer) => peer,
                Err(err) => {
                    warn!(
                        node = %def.node_id,
                        endpoint = %def.endpoint,
                        error = %err,
                        "skipping unreachable node"
                    );
                    continue;
                }
            };
            for advert in &def.volumes {
                let ownership =
                    next.entry(advert.id.clone())
                        .or_insert_with(|| VolumeOwnership {
                            primary: None,
                            replicas: Vec::new(),
                        });
                if advert.primary {
                    ownership.primary = Some(peer.clone());
                } else {
                    ownership.replicas.push(peer.clone());
                }
            }
        }
        let volume_count = next.len();
        *self.volumes.write() = Arc::new(next);
        debug!(nodes = service_defs.len(), volumes = volume_count, "refreshed cluster directory");
    }
}

//! SFS Cluster - who hosts which volume, and is what they host intact
//!
//! The cluster directory maps volume ids to the peers advertising them,
//! node clients run remote blob operations against those peers, and the
//! verifier proves that a blob reference still matches the physical blob
//! it points at.

pub mod directory;
pub mod node_client;
pub mod peer;
pub mod verify;

pub use directory::{ClusterDirectory, PeerConnector, ServiceDef, VolumeAdvert};
pub use node_client::{NodeClient, NodePool};
pub use peer::{BlobPeer, DigestBlob};
pub use verify::VerifyBlobReference;

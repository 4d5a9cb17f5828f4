//! gRPC node client and the connection pool shared by the directory.

use crate::directory::PeerConnector;
use crate::peer::{BlobPeer, DigestBlob};
use async_trait::async_trait;
use sfs_common::{DigestAlgorithm, Error, Result, VolumeId};
use sfs_proto::blob::blob_service_client::BlobServiceClient;
use sfs_proto::blob::{
    AckBlobRequest, ChecksumRequest, DeleteBlobRequest, ReadBlobRequest, WriteBlobRequest,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tonic::transport::Channel;
use tracing::info;

/// Deadline applied to each remote blob operation.
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Message size limit; checksum windows can cover whole blobs.
const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

fn proto_algorithm(algorithm: DigestAlgorithm) -> sfs_proto::blob::DigestAlgorithm {
    match algorithm {
        DigestAlgorithm::Sha512 => sfs_proto::blob::DigestAlgorithm::Sha512,
        DigestAlgorithm::Sha256 => sfs_proto::blob::DigestAlgorithm::Sha256,
    }
}

fn from_proto_blob(blob: sfs_proto::blob::DigestBlob) -> DigestBlob {
    let mut out = DigestBlob::new(blob.position, blob.length);
    for digest in blob.digests {
        let algorithm = match sfs_proto::blob::DigestAlgorithm::try_from(digest.algorithm) {
            Ok(sfs_proto::blob::DigestAlgorithm::Sha512) => DigestAlgorithm::Sha512,
            Ok(sfs_proto::blob::DigestAlgorithm::Sha256) => DigestAlgorithm::Sha256,
            _ => continue,
        };
        out = out.with_digest(algorithm, digest.value);
    }
    out
}

fn map_status(endpoint: &str, status: tonic::Status) -> Error {
    match status.code() {
        tonic::Code::DeadlineExceeded => Error::Timeout,
        tonic::Code::Unavailable => {
            Error::ServiceUnavailable(format!("{endpoint}: {}", status.message()))
        }
        _ => Error::ConnectionFailed(format!("{endpoint}: {status}")),
    }
}

/// Client for the blob service of one peer node.
#[derive(Clone)]
pub struct NodeClient {
    endpoint: String,
    client: BlobServiceClient<Channel>,
}

impl NodeClient {
    /// Connect to a peer's blob service.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let channel = tonic::transport::Endpoint::new(endpoint.to_string())
            .map_err(|e| Error::ConnectionFailed(format!("{endpoint}: {e}")))?
            .connect()
            .await
            .map_err(|e| Error::ConnectionFailed(format!("{endpoint}: {e}")))?;
        let client = BlobServiceClient::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }

    /// The endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, tonic::Status>>,
    {
        match tokio::time::timeout(RPC_TIMEOUT, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(status)) => Err(map_status(&self.endpoint, status)),
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[async_trait]
impl BlobPeer for NodeClient {
    async fn checksum(
        &self,
        volume_id: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
        algorithm: DigestAlgorithm,
    ) -> Result<Option<DigestBlob>> {
        let mut client = self.client.clone();
        let request = ChecksumRequest {
            volume_id: volume_id.as_str().to_string(),
            position,
            offset,
            length,
            algorithm: proto_algorithm(algorithm) as i32,
        };
        let response = self
            .with_timeout(async move { client.checksum(request).await })
            .await?
            .into_inner();
        if !response.found {
            return Ok(None);
        }
        Ok(response.blob.map(from_proto_blob))
    }

    async fn read(
        &self,
        volume_id: &VolumeId,
        position: u64,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> Result<Option<Vec<u8>>> {
        let mut client = self.client.clone();
        let request = ReadBlobRequest {
            volume_id: volume_id.as_str().to_string(),
            position,
            offset,
            length,
        };
        let response = self
            .with_timeout(async move { client.read(request).await })
            .await?
            .into_inner();
        if !response.found {
            return Ok(None);
        }
        Ok(Some(response.data))
    }

    async fn write(&self, volume_id: &VolumeId, data: Vec<u8>) -> Result<DigestBlob> {
        let mut client = self.client.clone();
        let request = WriteBlobRequest {
            volume_id: volume_id.as_str().to_string(),
            data,
        };
        let response = self
            .with_timeout(async move { client.write(request).await })
            .await?
            .into_inner();
        Ok(from_proto_blob(sfs_proto::blob::DigestBlob {
            position: response.position,
            length: response.length,
            digests: response.digests,
        }))
    }

    async fn delete(&self, volume_id: &VolumeId, position: u64) -> Result<bool> {
        let mut client = self.client.clone();
        let request = DeleteBlobRequest {
            volume_id: volume_id.as_str().to_string(),
            position,
        };
        let response = self
            .with_timeout(async move { client.delete(request).await })
            .await?
            .into_inner();
        Ok(response.deleted)
    }

    async fn ack(&self, volume_id: &VolumeId, position: u64) -> Result<bool> {
        let mut client = self.client.clone();
        let request = AckBlobRequest {
            volume_id: volume_id.as_str().to_string(),
            position,
        };
        let response = self
            .with_timeout(async move { client.ack(request).await })
            .await?
            .into_inner();
        Ok(response.acknowledged)
    }
}

/// Pool of node clients, one per endpoint.
///
/// Connecting happens outside the lock with a double-checked insert so
/// concurrent callers racing on the same endpoint share one channel.
pub struct NodePool {
    clients: RwLock<HashMap<String, NodeClient>>,
}

impl NodePool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Get the client for `endpoint`, connecting if necessary.
    pub async fn get_or_connect(&self, endpoint: &str) -> Result<NodeClient> {
        if let Some(client) = self.clients.read().await.get(endpoint) {
            return Ok(client.clone());
        }

        let client = NodeClient::connect(endpoint).await?;

        let mut clients = self.clients.write().await;
        // Another task may have connected while we were dialling.
        if let Some(existing) = clients.get(endpoint) {
            return Ok(existing.clone());
        }
        clients.insert(endpoint.to_string(), client.clone());
        info!(endpoint, "connected to node");
        Ok(client)
    }

    /// Drop the client for `endpoint`.
    pub async fn disconnect(&self, endpoint: &str) {
        if self.clients.write().await.remove(endpoint).is_some() {
            info!(endpoint, "disconnected from node");
        }
    }

    /// Number of pooled connections.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether the pool has no connections.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

impl Default for NodePool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerConnector for NodePool {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn BlobPeer>> {
        let client = self.get_or_connect(endpoint).await?;
        Ok(Arc::new(client))
    }
}

//! Blob gRPC service implementation.

use crate::volume::VolumeRegistry;
use sfs_common::{DigestAlgorithm, DigestCalculator, VolumeId};
use sfs_proto::blob::blob_service_server::BlobService;
use sfs_proto::blob::{
    AckBlobRequest, AckBlobResponse, ChecksumRequest, ChecksumResponse, DeleteBlobRequest,
    DeleteBlobResponse, Digest, DigestBlob, ReadBlobRequest, ReadBlobResponse, WriteBlobRequest,
    WriteBlobResponse,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::debug;

/// Node-local blob service state.
pub struct NodeService {
    registry: Arc<VolumeRegistry>,
}

impl NodeService {
    #[must_use]
    pub fn new(registry: Arc<VolumeRegistry>) -> Self {
        Self { registry }
    }

    fn volume(
        &self,
        volume_id: &str,
    ) -> Result<Arc<dyn crate::volume::Volume>, Status> {
        let id = VolumeId::new(volume_id);
        self.registry
            .get(&id)
            .ok_or_else(|| Status::not_found(format!("volume {volume_id} is not hosted here")))
    }

    fn algorithm(raw: i32) -> Result<DigestAlgorithm, Status> {
        match sfs_proto::blob::DigestAlgorithm::try_from(raw) {
            Ok(sfs_proto::blob::DigestAlgorithm::Sha512) => Ok(DigestAlgorithm::Sha512),
            Ok(sfs_proto::blob::DigestAlgorithm::Sha256) => Ok(DigestAlgorithm::Sha256),
            _ => Err(Status::invalid_argument("unknown digest algorithm")),
        }
    }
}

/// Apply the optional byte window to a blob payload.
fn window(data: &[u8], offset: Option<u64>, length: Option<u64>) -> &[u8] {
    let start = offset.unwrap_or(0).min(data.len() as u64) as usize;
    let end = match length {
        Some(length) => (start as u64).saturating_add(length).min(data.len() as u64) as usize,
        None => data.len(),
    };
    &data[start..end]
}

#[tonic::async_trait]
impl BlobService for NodeService {
    async fn checksum(
        &self,
        request: Request<ChecksumRequest>,
    ) -> Result<Response<ChecksumResponse>, Status> {
        let req = request.into_inner();
        let algorithm = Self::algorithm(req.algorithm)?;
        let volume = self.volume(&req.volume_id)?;

        let data = volume
            .read_blob(req.position)
            .map_err(|e| Status::internal(format!("read failed: {e}")))?;

        let Some(data) = data else {
            debug!(
                volume = %req.volume_id,
                position = req.position,
                "checksum of absent blob"
            );
            return Ok(Response::new(ChecksumResponse {
                found: false,
                blob: None,
            }));
        };

        let windowed = window(&data, req.offset, req.length);
        let mut calculator = DigestCalculator::new(algorithm);
        calculator.update(windowed);
        let (digest, length) = calculator.finalize();

        debug!(
            volume = %req.volume_id,
            position = req.position,
            length,
            algorithm = %algorithm,
            "computed blob checksum"
        );

        Ok(Response::new(ChecksumResponse {
            found: true,
            blob: Some(DigestBlob {
                position: req.position,
                length,
                digests: vec![Digest {
                    algorithm: req.algorithm,
                    value: digest,
                }],
            }),
        }))
    }

    async fn read(
        &self,
        request: Request<ReadBlobRequest>,
    ) -> Result<Response<ReadBlobResponse>, Status> {
        let req = request.into_inner();
        let volume = self.volume(&req.volume_id)?;

        let data = volume
            .read_blob(req.position)
            .map_err(|e| Status::internal(format!("read failed: {e}")))?;

        let Some(data) = data else {
            return Ok(Response::new(ReadBlobResponse {
                found: false,
                data: Vec::new(),
                length: 0,
            }));
        };

        let windowed = window(&data, req.offset, req.length).to_vec();
        let length = windowed.len() as u64;
        Ok(Response::new(ReadBlobResponse {
            found: true,
            data: windowed,
            length,
        }))
    }

    async fn write(
        &self,
        request: Request<WriteBlobRequest>,
    ) -> Result<Response<WriteBlobResponse>, Status> {
        let req = request.into_inner();
        let volume = self.volume(&req.volume_id)?;

        let mut calculator = DigestCalculator::new(DigestAlgorithm::Sha512);
        calculator.update(&req.data);
        let (digest, length) = calculator.finalize();

        let position = volume
            .append_blob(req.data)
            .map_err(|e| Status::internal(format!("write failed: {e}")))?;

        debug!(
            volume = %req.volume_id,
            position,
            length,
            "wrote blob"
        );

        Ok(Response::new(WriteBlobResponse {
            position,
            length,
            digests: vec![Digest {
                algorithm: sfs_proto::blob::DigestAlgorithm::Sha512 as i32,
                value: digest,
            }],
        }))
    }

    async fn delete(
        &self,
        request: Request<DeleteBlobRequest>,
    ) -> Result<Response<DeleteBlobResponse>, Status> {
        let req = request.into_inner();
        let volume = self.volume(&req.volume_id)?;

        let deleted = volume
            .delete_blob(req.position)
            .map_err(|e| Status::internal(format!("delete failed: {e}")))?;

        Ok(Response::new(DeleteBlobResponse { deleted }))
    }

    async fn ack(
        &self,
        request: Request<AckBlobRequest>,
    ) -> Result<Response<AckBlobResponse>, Status> {
        let req = request.into_inner();
        let volume = self.volume(&req.volume_id)?;

        let acknowledged = volume
            .ack_blob(req.position)
            .map_err(|e| Status::internal(format!("ack failed: {e}")))?;

        Ok(Response::new(AckBlobResponse { acknowledged }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_with_volume() -> NodeService {
        let registry = Arc::new(VolumeRegistry::in_memory(&[VolumeId::new("v1")]));
        NodeService::new(registry)
    }

    fn checksum_request(position: u64) -> ChecksumRequest {
        ChecksumRequest {
            volume_id: "v1".to_string(),
            position,
            offset: None,
            length: None,
            algorithm: sfs_proto::blob::DigestAlgorithm::Sha512 as i32,
        }
    }

    async fn write(service: &NodeService, data: &[u8]) -> u64 {
        let response = service
            .write(Request::new(WriteBlobRequest {
                volume_id: "v1".to_string(),
                data: data.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        response.position
    }

    #[tokio::test]
    async fn test_checksum_recomputes_digest_and_length() {
        let service = service_with_volume();
        let data = b"some blob body";
        let position = write(&service, data).await;

        let response = service
            .checksum(Request::new(checksum_request(position)))
            .await
            .unwrap()
            .into_inner();

        assert!(response.found);
        let blob = response.blob.unwrap();
        assert_eq!(blob.position, position);
        assert_eq!(blob.length, data.len() as u64);
        assert_eq!(
            blob.digests[0].value,
            DigestAlgorithm::Sha512.compute(data)
        );
    }

    #[tokio::test]
    async fn test_checksum_of_absent_blob_is_not_found_not_error() {
        let service = service_with_volume();
        let response = service
            .checksum(Request::new(checksum_request(404)))
            .await
            .unwrap()
            .into_inner();
        assert!(!response.found);
        assert!(response.blob.is_none());
    }

    #[tokio::test]
    async fn test_checksum_honours_byte_window() {
        let service = service_with_volume();
        let position = write(&service, b"0123456789").await;

        let mut request = checksum_request(position);
        request.offset = Some(2);
        request.length = Some(4);
        let response = service
            .checksum(Request::new(request))
            .await
            .unwrap()
            .into_inner();

        let blob = response.blob.unwrap();
        assert_eq!(blob.length, 4);
        assert_eq!(
            blob.digests[0].value,
            DigestAlgorithm::Sha512.compute(b"2345")
        );
    }

    #[tokio::test]
    async fn test_unhosted_volume_is_an_error() {
        let service = service_with_volume();
        let mut request = checksum_request(0);
        request.volume_id = "elsewhere".to_string();
        let status = service
            .checksum(Request::new(request))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_write_reports_sha512() {
        let service = service_with_volume();
        let response = service
            .write(Request::new(WriteBlobRequest {
                volume_id: "v1".to_string(),
                data: b"payload".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.length, 7);
        assert_eq!(
            response.digests[0].value,
            DigestAlgorithm::Sha512.compute(b"payload")
        );
    }

    #[tokio::test]
    async fn test_delete_then_checksum_absent() {
        let service = service_with_volume();
        let position = write(&service, b"gone soon").await;

        let response = service
            .delete(Request::new(DeleteBlobRequest {
                volume_id: "v1".to_string(),
                position,
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.deleted);

        let response = service
            .checksum(Request::new(checksum_request(position)))
            .await
            .unwrap()
            .into_inner();
        assert!(!response.found);
    }

    #[tokio::test]
    async fn test_ack() {
        let service = service_with_volume();
        let position = write(&service, b"ack me").await;

        let response = service
            .ack(Request::new(AckBlobRequest {
                volume_id: "v1".to_string(),
                position,
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.acknowledged);
    }

    #[test]
    fn test_window_bounds() {
        let data = b"0123456789";
        assert_eq!(window(data, None, None), data);
        assert_eq!(window(data, Some(8), Some(100)), b"89");
        assert_eq!(window(data, Some(100), None), b"");
        assert_eq!(window(data, Some(0), Some(0)), b"");
    }
}

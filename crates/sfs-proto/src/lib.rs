//! SFS Protocol - gRPC service definitions
//!
//! This crate contains the protobuf-generated code for SFS's
//! inter-node blob service.

/// Blob service (remote volume operations)
pub mod blob {
    tonic::include_proto!("sfs.blob");
}

//! SFS Model - the blob reference tree
//!
//! An object owns versions, a version owns segments, a segment owns blob
//! references. The tree is stored as one document in the per-container
//! object index; navigation back up the tree is done with borrowed views
//! that carry the path identifiers, not with parent pointers.

pub mod object;

pub use object::{
    BlobRefView, BlobReferenceDoc, ObjectDoc, SegmentDoc, SegmentPath, VersionDoc,
};

//! Object document and its nested entities.

use serde::{Deserialize, Serialize};
use sfs_common::{hex_bytes, VolumeId};
use std::fmt;

/// An object stored in a container, identified by
/// `(account_id, container_id, object_id)`.
///
/// Versions are ordered by monotonically increasing id; the highest id is
/// the user-visible state of the object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDoc {
    pub account_id: String,
    pub container_id: String,
    pub object_id: String,
    #[serde(default)]
    pub versions: Vec<VersionDoc>,
}

impl ObjectDoc {
    /// Create an object with no versions yet.
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        container_id: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            container_id: container_id.into(),
            object_id: object_id.into(),
            versions: Vec::new(),
        }
    }

    /// The newest version, if any exist.
    #[must_use]
    pub fn latest_version(&self) -> Option<&VersionDoc> {
        self.versions.last()
    }

    /// Append a fresh version with the next id and return it.
    pub fn new_version(&mut self) -> &mut VersionDoc {
        let id = self.versions.last().map_or(0, |v| v.id + 1);
        self.versions.push(VersionDoc::new(id));
        self.versions.last_mut().unwrap()
    }

    /// Look up a version by id.
    #[must_use]
    pub fn version(&self, id: u64) -> Option<&VersionDoc> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Iterate every blob reference in the tree, each bundled with its
    /// segment and path.
    pub fn blob_references(&self) -> impl Iterator<Item = BlobRefView<'_>> {
        self.versions.iter().flat_map(move |version| {
            version.segments.iter().flat_map(move |segment| {
                segment.blobs.iter().map(move |blob| BlobRefView {
                    path: SegmentPath {
                        object_id: self.object_id.clone(),
                        version_id: version.id,
                        segment_id: segment.id,
                    },
                    segment,
                    blob,
                })
            })
        })
    }
}

/// One version of an object: an ordered list of segments that concatenate
/// to the version's body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDoc {
    pub id: u64,
    #[serde(default)]
    pub segments: Vec<SegmentDoc>,
    #[serde(default)]
    pub deleted: bool,
}

impl VersionDoc {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            segments: Vec::new(),
            deleted: false,
        }
    }

    /// Append a segment with the next index and return it.
    pub fn push_segment(&mut self) -> &mut SegmentDoc {
        let id = self.segments.last().map_or(0, |s| s.id + 1);
        self.segments.push(SegmentDoc::new(id));
        self.segments.last_mut().unwrap()
    }

    /// Look up a segment by id.
    #[must_use]
    pub fn segment(&self, id: u64) -> Option<&SegmentDoc> {
        self.segments.iter().find(|s| s.id == id)
    }
}

/// A contiguous byte range of a version, with the integrity fields
/// recorded when the segment body was written.
///
/// `write_sha512` and `write_length` stay unset while a staged write is
/// in flight; a segment with a length but no digest is structurally
/// invalid and never verifies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDoc {
    pub id: u64,
    #[serde(default, with = "hex_bytes::option")]
    pub write_sha512: Option<Vec<u8>>,
    #[serde(default)]
    pub write_length: Option<u64>,
    #[serde(default)]
    pub blobs: Vec<BlobReferenceDoc>,
}

impl SegmentDoc {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            write_sha512: None,
            write_length: None,
            blobs: Vec::new(),
        }
    }

    /// Record the integrity fields observed while writing the body.
    pub fn record_write(&mut self, sha512: Vec<u8>, length: u64) {
        self.write_sha512 = Some(sha512);
        self.write_length = Some(length);
    }

    /// Append a blob reference replica and return it.
    pub fn push_blob(&mut self, blob: BlobReferenceDoc) -> &mut BlobReferenceDoc {
        self.blobs.push(blob);
        self.blobs.last_mut().unwrap()
    }
}

/// A replica of a segment body on a specific volume.
///
/// Every field except `acknowledged` is tri-state: unset during staged
/// writes, present once the volume reported the write. `(volume_id,
/// position)` locates the physical blob on exactly one volume.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobReferenceDoc {
    #[serde(default)]
    pub volume_id: Option<VolumeId>,
    #[serde(default)]
    pub position: Option<u64>,
    #[serde(default, with = "hex_bytes::option")]
    pub read_sha512: Option<Vec<u8>>,
    #[serde(default)]
    pub read_length: Option<u64>,
    #[serde(default)]
    pub acknowledged: bool,
}

impl BlobReferenceDoc {
    /// A reference can only be verified once it points at a physical blob.
    #[must_use]
    pub fn is_verifiable(&self) -> bool {
        self.volume_id.is_some() && self.position.is_some()
    }

    /// Mark the reference durable after all replicas confirmed the write.
    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }
}

/// Identifiers locating a segment inside its object, carried on borrowed
/// views so log lines can name the full path without parent pointers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentPath {
    pub object_id: String,
    pub version_id: u64,
    pub segment_id: u64,
}

impl fmt::Display for SegmentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "object={}, version={}, segment={}",
            self.object_id, self.version_id, self.segment_id
        )
    }
}

/// A blob reference together with its owning segment and path.
#[derive(Clone, Debug)]
pub struct BlobRefView<'a> {
    pub path: SegmentPath,
    pub segment: &'a SegmentDoc,
    pub blob: &'a BlobReferenceDoc,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_object() -> ObjectDoc {
        let mut object = ObjectDoc::new("acc", "cont", "obj");
        let version = object.new_version();
        let segment = version.push_segment();
        segment.record_write(vec![1u8; 64], 100);
        segment.push_blob(BlobReferenceDoc {
            volume_id: Some(VolumeId::new("v1")),
            position: Some(42),
            read_sha512: Some(vec![1u8; 64]),
            read_length: Some(100),
            acknowledged: false,
        });
        segment.push_blob(BlobReferenceDoc::default());
        object
    }

    #[test]
    fn test_version_ids_monotonic() {
        let mut object = ObjectDoc::new("a", "c", "o");
        assert_eq!(object.new_version().id, 0);
        assert_eq!(object.new_version().id, 1);
        assert_eq!(object.latest_version().unwrap().id, 1);
    }

    #[test]
    fn test_blob_reference_iteration_carries_path() {
        let object = sample_object();
        let views: Vec<_> = object.blob_references().collect();
        assert_eq!(views.len(), 2);

        let view = &views[0];
        assert_eq!(view.path.object_id, "obj");
        assert_eq!(view.path.version_id, 0);
        assert_eq!(view.path.segment_id, 0);
        assert_eq!(view.segment.write_length, Some(100));
        assert!(view.blob.is_verifiable());
        assert!(!views[1].blob.is_verifiable());
    }

    #[test]
    fn test_acknowledge() {
        let mut blob = BlobReferenceDoc::default();
        assert!(!blob.acknowledged);
        blob.acknowledge();
        assert!(blob.acknowledged);
    }

    #[test]
    fn test_document_json_shape() {
        let object = sample_object();
        let json = serde_json::to_value(&object).unwrap();

        // Digests persist as hex strings, unset fields as null.
        let segment = &json["versions"][0]["segments"][0];
        assert_eq!(segment["write_sha512"], "01".repeat(64));
        assert!(segment["blobs"][1]["volume_id"].is_null());

        let back: ObjectDoc = serde_json::from_value(json).unwrap();
        assert_eq!(back, object);
    }
}

//! The seam between the metadata layer and the external indexed
//! document store.
//!
//! Everything above this trait (the store, the envelope, verification)
//! is transport-agnostic; the production implementation speaks the
//! store's REST API, tests use an in-process fake.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Result type for index client operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Errors surfaced by an index client.
///
/// The two benign write conflicts are distinct variants so the request
/// envelope can map them to "absent" instead of failing the request.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("document already exists")]
    DocumentAlreadyExists,

    #[error("version conflict")]
    VersionConflict,

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("cluster health is {status}, wanted green")]
    NotGreen { status: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected http status {status}: {body}")]
    Http { status: u16, body: String },
}

impl IndexError {
    /// Whether this error is one of the write conflicts mapped to an
    /// absent result instead of a failure.
    #[must_use]
    pub fn is_benign_conflict(&self) -> bool {
        matches!(self, Self::DocumentAlreadyExists | Self::VersionConflict)
    }
}

/// Shard telemetry attached to read/write responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardInfo {
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
}

/// Cluster health as reported for an index prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterHealth {
    pub status: HealthStatus,
    pub timed_out: bool,
}

/// Health states of the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

impl HealthStatus {
    /// Parse the wire name of a health state.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "green" => Some(Self::Green),
            "yellow" => Some(Self::Yellow),
            "red" => Some(Self::Red),
            _ => None,
        }
    }
}

/// Admin acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Acknowledged(pub bool);

/// Settings applied when an index is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub refresh_interval: String,
}

/// A settings update on an existing index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub number_of_replicas: u32,
}

/// A document-level action submitted through the request envelope.
#[derive(Clone, Debug)]
pub enum ActionRequest {
    /// Index (create or overwrite) a document. With `create` set the
    /// action fails with a benign conflict when the id already exists.
    Index {
        index: String,
        id: String,
        document: Value,
        create: bool,
    },
    /// Fetch a document by id.
    Get { index: String, id: String },
    /// Delete a document, optionally guarded by an expected version.
    Delete {
        index: String,
        id: String,
        version: Option<u64>,
    },
    /// Run a search against one index.
    Search { index: String, query: Value },
}

impl ActionRequest {
    /// Index the action targets.
    #[must_use]
    pub fn index_name(&self) -> &str {
        match self {
            Self::Index { index, .. }
            | Self::Get { index, .. }
            | Self::Delete { index, .. }
            | Self::Search { index, .. } => index,
        }
    }
}

/// Response of a document-level action.
#[derive(Clone, Debug, Default)]
pub struct ActionResponse {
    /// Present on read/write responses that carry shard telemetry.
    pub shards: Option<ShardInfo>,
    /// Present on admin-style responses.
    pub acknowledged: Option<bool>,
    /// Raw response document.
    pub body: Value,
}

/// Operations the metadata layer needs from the external store.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Cluster health for `index_pattern`, waiting server-side up to
    /// `wait` for green before reporting.
    async fn cluster_health(
        &self,
        index_pattern: &str,
        wait: Duration,
    ) -> IndexResult<ClusterHealth>;

    /// Whether the index exists.
    async fn index_exists(&self, index: &str) -> IndexResult<bool>;

    /// Create an index with a mapping for `doc_type` and initial settings.
    async fn create_index(
        &self,
        index: &str,
        doc_type: &str,
        mapping: &str,
        settings: &IndexSettings,
    ) -> IndexResult<Acknowledged>;

    /// Apply a mapping to an existing index.
    async fn update_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: &str,
    ) -> IndexResult<Acknowledged>;

    /// Apply a settings update to an existing index.
    async fn update_settings(
        &self,
        index: &str,
        settings: &SettingsUpdate,
    ) -> IndexResult<Acknowledged>;

    /// Delete an index. Fails with [`IndexError::IndexNotFound`] when it
    /// does not exist.
    async fn delete_index(&self, index: &str) -> IndexResult<Acknowledged>;

    /// Execute a document-level action.
    async fn execute(&self, action: &ActionRequest) -> IndexResult<ActionResponse>;

    /// Release the underlying connections.
    async fn close(&self) -> IndexResult<()>;
}

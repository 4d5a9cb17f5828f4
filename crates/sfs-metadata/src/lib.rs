//! SFS Metadata - the indexed document store layer
//!
//! This crate owns the system of record: the index catalog, the store
//! lifecycle with its green-health gate, and the request envelope that
//! normalises shard-level partial success and benign write conflicts.

pub mod catalog;
pub mod client;
pub mod config;
pub mod envelope;
pub mod http;
pub mod store;

pub use client::{
    Acknowledged, ActionRequest, ActionResponse, ClusterHealth, HealthStatus, IndexClient,
    IndexError, IndexResult, IndexSettings, SettingsUpdate, ShardInfo,
};
pub use config::{ElasticsearchConfig, RawElasticsearchConfig, Timeouts};
pub use http::HttpIndexClient;
pub use store::{MetadataError, MetadataStore, Status};

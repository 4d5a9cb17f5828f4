//! Index catalog: the fixed set of logical indices and their names.
//!
//! Index names are persisted data. The prefix and the `_objects` suffix
//! appear in every deployed cluster; renaming either breaks on-disk
//! compatibility.

/// Prefix of every index owned by this system.
pub const INDEX_PREFIX: &str = "sfs_v0_";

/// Document type used for every mapping.
pub const DEFAULT_TYPE: &str = "default";

const OBJECT_SUFFIX: &str = "_objects";

/// Name of the account index.
#[must_use]
pub fn account_index() -> String {
    format!("{INDEX_PREFIX}account")
}

/// Name of the container index.
#[must_use]
pub fn container_index() -> String {
    format!("{INDEX_PREFIX}container")
}

/// Name of the container key index.
#[must_use]
pub fn container_key_index() -> String {
    format!("{INDEX_PREFIX}container_key")
}

/// Name of the master key index.
#[must_use]
pub fn master_key_index() -> String {
    format!("{INDEX_PREFIX}master_key")
}

/// Name of the service definition index.
#[must_use]
pub fn service_def_index() -> String {
    format!("{INDEX_PREFIX}service_def")
}

/// Name of the per-container object index.
#[must_use]
pub fn object_index(container_name: &str) -> String {
    format!("{INDEX_PREFIX}{container_name}{OBJECT_SUFFIX}")
}

/// Whether `index_name` is a per-container object index.
#[must_use]
pub fn is_object_index(index_name: &str) -> bool {
    index_name.starts_with(INDEX_PREFIX) && index_name.ends_with(OBJECT_SUFFIX)
}

/// Mapping body for the account index.
pub const ACCOUNT_MAPPING: &str = include_str!("mappings/es-account-mapping.json");
/// Mapping body for the container index.
pub const CONTAINER_MAPPING: &str = include_str!("mappings/es-container-mapping.json");
/// Mapping body for the container key index.
pub const CONTAINER_KEY_MAPPING: &str = include_str!("mappings/es-container-key-mapping.json");
/// Mapping body for the master key index.
pub const MASTER_KEY_MAPPING: &str = include_str!("mappings/es-master-key-mapping.json");
/// Mapping body for per-container object indices.
pub const OBJECT_MAPPING: &str = include_str!("mappings/es-object-mapping.json");

//! Metadata store configuration.
//!
//! Keys mirror the deployed option names; every one of them can come
//! from the config file or the environment (config wins, see
//! `sfs_common::config`).

use serde::{Deserialize, Serialize};
use sfs_common::config::field_or_env;
use sfs_common::{Error, Result};
use std::time::Duration;

pub const CLUSTER_NAME: &str = "elasticsearch.cluster.name";
pub const NODE_NAME: &str = "elasticsearch.node.name";
pub const UNICAST_HOSTS: &str = "elasticsearch.discovery.zen.ping.unicast.hosts";
pub const MULTICAST_ENABLED: &str = "elasticsearch.discovery.zen.ping.multicast.enabled";
pub const UNICAST_ENABLED: &str = "elasticsearch.discovery.zen.ping.unicast.enabled";
pub const SHARDS: &str = "elasticsearch.shards";
pub const REPLICAS: &str = "elasticsearch.replicas";
pub const DEFAULT_INDEX_TIMEOUT: &str = "elasticsearch.defaultindextimeout";
pub const DEFAULT_GET_TIMEOUT: &str = "elasticsearch.defaultgettimeout";
pub const DEFAULT_SEARCH_TIMEOUT: &str = "elasticsearch.defaultsearchtimeout";
pub const DEFAULT_DELETE_TIMEOUT: &str = "elasticsearch.defaultdeletetimeout";
pub const DEFAULT_ADMIN_TIMEOUT: &str = "elasticsearch.defaultadmintimeout";
pub const DEFAULT_SCROLL_TIMEOUT: &str = "elasticsearch.defaultscrolltimeout";

/// Port assumed when a seed host omits one.
pub const DEFAULT_SEED_PORT: u16 = 9300;

/// Raw `[elasticsearch]` section as it appears in the config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawElasticsearchConfig {
    pub cluster_name: Option<String>,
    pub node_name: Option<String>,
    #[serde(default)]
    pub unicast_hosts: Vec<String>,
    pub multicast_enabled: Option<bool>,
    pub unicast_enabled: Option<bool>,
    pub shards: Option<u32>,
    pub replicas: Option<u32>,
    pub default_index_timeout_ms: Option<u64>,
    pub default_get_timeout_ms: Option<u64>,
    pub default_search_timeout_ms: Option<u64>,
    pub default_delete_timeout_ms: Option<u64>,
    pub default_admin_timeout_ms: Option<u64>,
    pub default_scroll_timeout_ms: Option<u64>,
}

/// Per-operation default timeouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub index: Duration,
    pub get: Duration,
    pub search: Duration,
    pub delete: Duration,
    pub admin: Duration,
    pub scroll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            index: Duration::from_millis(500),
            get: Duration::from_millis(500),
            search: Duration::from_secs(5),
            delete: Duration::from_millis(500),
            admin: Duration::from_secs(30),
            scroll: Duration::from_secs(120),
        }
    }
}

/// Resolved metadata store configuration.
#[derive(Clone, Debug)]
pub struct ElasticsearchConfig {
    pub cluster_name: Option<String>,
    pub node_name: Option<String>,
    /// Seed `host:port` endpoints, port defaulted when omitted.
    pub unicast_hosts: Vec<String>,
    pub multicast_enabled: bool,
    pub unicast_enabled: bool,
    /// Default shard count for freshly created indices.
    pub shards: u32,
    /// Default replica count for freshly created indices.
    pub replicas: u32,
    pub timeouts: Timeouts,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            cluster_name: None,
            node_name: None,
            unicast_hosts: Vec::new(),
            multicast_enabled: true,
            unicast_enabled: false,
            shards: 1,
            replicas: 0,
            timeouts: Timeouts::default(),
        }
    }
}

impl ElasticsearchConfig {
    /// Resolve a raw config section against the environment.
    pub fn resolve(raw: &RawElasticsearchConfig) -> Result<Self> {
        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            index: resolve_ms(
                raw.default_index_timeout_ms,
                DEFAULT_INDEX_TIMEOUT,
                defaults.index,
            )?,
            get: resolve_ms(raw.default_get_timeout_ms, DEFAULT_GET_TIMEOUT, defaults.get)?,
            search: resolve_ms(
                raw.default_search_timeout_ms,
                DEFAULT_SEARCH_TIMEOUT,
                defaults.search,
            )?,
            delete: resolve_ms(
                raw.default_delete_timeout_ms,
                DEFAULT_DELETE_TIMEOUT,
                defaults.delete,
            )?,
            admin: resolve_ms(
                raw.default_admin_timeout_ms,
                DEFAULT_ADMIN_TIMEOUT,
                defaults.admin,
            )?,
            scroll: resolve_ms(
                raw.default_scroll_timeout_ms,
                DEFAULT_SCROLL_TIMEOUT,
                defaults.scroll,
            )?,
        };

        let unicast_hosts = if raw.unicast_hosts.is_empty() {
            match field_or_env(None, UNICAST_HOSTS) {
                Some(csv) => csv
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                None => Vec::new(),
            }
        } else {
            raw.unicast_hosts.clone()
        }
        .into_iter()
        .map(|host| with_default_port(&host))
        .collect();

        Ok(Self {
            cluster_name: field_or_env(raw.cluster_name.as_deref(), CLUSTER_NAME),
            node_name: field_or_env(raw.node_name.as_deref(), NODE_NAME),
            unicast_hosts,
            multicast_enabled: resolve_bool(raw.multicast_enabled, MULTICAST_ENABLED, true)?,
            unicast_enabled: resolve_bool(raw.unicast_enabled, UNICAST_ENABLED, false)?,
            shards: resolve_u32(raw.shards, SHARDS, 1)?,
            replicas: resolve_u32(raw.replicas, REPLICAS, 0)?,
            timeouts,
        })
    }
}

fn with_default_port(host: &str) -> String {
    // Bracketed IPv6 literals and host:port pairs already carry a port
    // marker; only bare hostnames get the default appended.
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_SEED_PORT}")
    }
}

fn resolve_ms(field: Option<u64>, key: &str, default: Duration) -> Result<Duration> {
    match field {
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => match field_or_env(None, key) {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| Error::configuration(format!("{key}: {e}"))),
            None => Ok(default),
        },
    }
}

fn resolve_u32(field: Option<u32>, key: &str, default: u32) -> Result<u32> {
    match field {
        Some(v) => Ok(v),
        None => match field_or_env(None, key) {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|e| Error::configuration(format!("{key}: {e}"))),
            None => Ok(default),
        },
    }
}

fn resolve_bool(field: Option<bool>, key: &str, default: bool) -> Result<bool> {
    match field {
        Some(v) => Ok(v),
        None => match field_or_env(None, key) {
            Some(raw) => raw
                .parse::<bool>()
                .map_err(|e| Error::configuration(format!("{key}: {e}"))),
            None => Ok(default),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests in this module read and write process environment; serialise
    // them so parallel test threads cannot observe each other's vars.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults_match_contract() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = ElasticsearchConfig::resolve(&RawElasticsearchConfig::default()).unwrap();
        assert_eq!(config.shards, 1);
        assert_eq!(config.replicas, 0);
        assert!(config.multicast_enabled);
        assert!(!config.unicast_enabled);
        assert!(config.unicast_hosts.is_empty());
        assert_eq!(config.timeouts.index, Duration::from_millis(500));
        assert_eq!(config.timeouts.get, Duration::from_millis(500));
        assert_eq!(config.timeouts.search, Duration::from_secs(5));
        assert_eq!(config.timeouts.delete, Duration::from_millis(500));
        assert_eq!(config.timeouts.admin, Duration::from_secs(30));
        assert_eq!(config.timeouts.scroll, Duration::from_secs(120));
    }

    #[test]
    fn test_seed_hosts_get_default_port() {
        let raw = RawElasticsearchConfig {
            unicast_hosts: vec!["es1".to_string(), "es2:9301".to_string()],
            ..Default::default()
        };
        let config = ElasticsearchConfig::resolve(&raw).unwrap();
        assert_eq!(config.unicast_hosts, vec!["es1:9300", "es2:9301"]);
    }

    #[test]
    fn test_env_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ELASTICSEARCH_SHARDS", "3");
        let config = ElasticsearchConfig::resolve(&RawElasticsearchConfig::default()).unwrap();
        assert_eq!(config.shards, 3);
        std::env::remove_var("ELASTICSEARCH_SHARDS");
    }

    #[test]
    fn test_file_wins_over_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ELASTICSEARCH_REPLICAS", "5");
        let raw = RawElasticsearchConfig {
            replicas: Some(2),
            ..Default::default()
        };
        let config = ElasticsearchConfig::resolve(&raw).unwrap();
        assert_eq!(config.replicas, 2);
        std::env::remove_var("ELASTICSEARCH_REPLICAS");
    }
}

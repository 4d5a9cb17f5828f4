//! Node configuration file structure.

use serde::Deserialize;
use sfs_metadata::RawElasticsearchConfig;

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub elasticsearch: RawElasticsearchConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
pub struct NodeSection {
    /// Human-readable node name.
    #[serde(default = "default_node_name")]
    pub name: String,
    /// Listen address for the blob gRPC service.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Address other nodes use to reach this one. Derived from the
    /// listen address when unset.
    #[serde(default)]
    pub advertise_addr: Option<String>,
    /// Whether this node applies the common index mappings on startup.
    #[serde(default)]
    pub master: bool,
    /// Volume ids hosted by this node.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Seconds between cluster directory refreshes.
    #[serde(default = "default_refresh_secs")]
    pub directory_refresh_secs: u64,
    /// Port of the HTTP admin surface.
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            listen: default_listen(),
            advertise_addr: None,
            master: false,
            volumes: Vec::new(),
            directory_refresh_secs: default_refresh_secs(),
            admin_port: default_admin_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_node_name() -> String {
    "sfs-node".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:9002".to_string()
}

fn default_refresh_secs() -> u64 {
    30
}

fn default_admin_port() -> u16 {
    9201
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.node.name, "sfs-node");
        assert_eq!(config.node.listen, "0.0.0.0:9002");
        assert!(!config.node.master);
        assert_eq!(config.node.directory_refresh_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_file() {
        let config: Config = toml::from_str(
            r#"
            [node]
            name = "node-a"
            listen = "0.0.0.0:19002"
            advertise_addr = "http://node-a:19002"
            master = true
            volumes = ["v1", "v2"]

            [elasticsearch]
            cluster_name = "sfs"
            unicast_hosts = ["es1:9300"]
            shards = 3

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.node.name, "node-a");
        assert!(config.node.master);
        assert_eq!(config.node.volumes, vec!["v1", "v2"]);
        assert_eq!(config.elasticsearch.cluster_name.as_deref(), Some("sfs"));
        assert_eq!(config.elasticsearch.shards, Some(3));
        assert_eq!(config.logging.level, "debug");
    }
}

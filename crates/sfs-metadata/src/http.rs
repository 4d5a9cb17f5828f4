//! REST transport for the indexed document store.

use crate::client::{
    Acknowledged, ActionRequest, ActionResponse, ClusterHealth, HealthStatus, IndexClient,
    IndexError, IndexResult, IndexSettings, SettingsUpdate, ShardInfo,
};
use crate::config::ElasticsearchConfig;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

const DOCUMENT_EXISTS_EXCEPTION: &str = "document_already_exists_exception";
const VERSION_CONFLICT_EXCEPTION: &str = "version_conflict_engine_exception";

/// `IndexClient` speaking the store's REST API over HTTP.
///
/// Seed hosts come from the discovery host list; a transport failure
/// rotates to the next host. The multicast/unicast discovery toggles are
/// transport-level settings the REST API has no use for; they are kept in
/// the config for compatibility and logged at startup.
pub struct HttpIndexClient {
    http: reqwest::Client,
    hosts: Vec<String>,
    current_host: AtomicUsize,
}

impl HttpIndexClient {
    /// Build a client from the resolved configuration.
    pub fn new(config: &ElasticsearchConfig) -> IndexResult<Self> {
        if config.unicast_hosts.is_empty() {
            return Err(IndexError::Transport(
                "no discovery hosts configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        debug!(
            cluster = config.cluster_name.as_deref().unwrap_or("-"),
            hosts = config.unicast_hosts.len(),
            "created index client"
        );
        Ok(Self {
            http,
            hosts: config.unicast_hosts.clone(),
            current_host: AtomicUsize::new(0),
        })
    }

    fn base_url(&self) -> &str {
        let idx = self.current_host.load(Ordering::Relaxed) % self.hosts.len();
        &self.hosts[idx]
    }

    fn rotate_host(&self) {
        self.current_host.fetch_add(1, Ordering::Relaxed);
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> IndexResult<(StatusCode, Value)> {
        let url = format!("http://{}/{}", self.base_url(), path);
        let mut builder = self.http.request(method, &url).query(query);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await.map_err(|e| {
            self.rotate_host();
            if e.is_timeout() {
                IndexError::Timeout
            } else {
                IndexError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, body))
    }

    /// Translate an error response into the matching error kind.
    fn classify_error(index: &str, status: StatusCode, body: &Value) -> IndexError {
        if status == StatusCode::CONFLICT {
            if error_type(body).contains(DOCUMENT_EXISTS_EXCEPTION) {
                return IndexError::DocumentAlreadyExists;
            }
            // Creates on current store versions report conflicts as
            // version conflicts; both map to the same benign class.
            return IndexError::VersionConflict;
        }
        // Document-level misses are handled before classification; any
        // 404 reaching this point is an index-level miss.
        if status == StatusCode::NOT_FOUND {
            return IndexError::IndexNotFound(index.to_string());
        }
        IndexError::Http {
            status: status.as_u16(),
            body: body.to_string(),
        }
    }

    fn acknowledged(body: &Value) -> Acknowledged {
        Acknowledged(body["acknowledged"].as_bool().unwrap_or(false))
    }
}

/// Pull the error type string out of an error response body.
fn error_type(body: &Value) -> String {
    let root = &body["error"];
    let mut out = String::new();
    if let Some(t) = root["type"].as_str() {
        out.push_str(t);
    }
    if let Some(causes) = root["root_cause"].as_array() {
        for cause in causes {
            if let Some(t) = cause["type"].as_str() {
                out.push(' ');
                out.push_str(t);
            }
        }
    }
    // Older store versions return the error as a plain string.
    if let Some(s) = root.as_str() {
        out.push_str(s);
    }
    out
}

/// Extract shard telemetry from a response body.
fn shard_info(body: &Value) -> Option<ShardInfo> {
    let shards = body.get("_shards")?;
    Some(ShardInfo {
        total: shards["total"].as_u64()? as u32,
        successful: shards["successful"].as_u64()? as u32,
        failed: shards["failed"].as_u64().unwrap_or(0) as u32,
    })
}

#[async_trait]
impl IndexClient for HttpIndexClient {
    async fn cluster_health(
        &self,
        index_pattern: &str,
        wait: Duration,
    ) -> IndexResult<ClusterHealth> {
        let path = format!("_cluster/health/{index_pattern}");
        let query = [
            ("wait_for_status", "green".to_string()),
            ("timeout", format!("{}ms", wait.as_millis())),
        ];
        let (status, body) = self.request(Method::GET, &path, &query, None).await?;
        // A health wait that times out server-side answers 408 with the
        // same body shape; surface the status it reached either way.
        if !status.is_success() && status != StatusCode::REQUEST_TIMEOUT {
            return Err(Self::classify_error(index_pattern, status, &body));
        }
        let health_status = body["status"]
            .as_str()
            .and_then(HealthStatus::parse)
            .ok_or_else(|| IndexError::Transport(format!("malformed health response: {body}")))?;
        Ok(ClusterHealth {
            status: health_status,
            timed_out: body["timed_out"].as_bool().unwrap_or(false),
        })
    }

    async fn index_exists(&self, index: &str) -> IndexResult<bool> {
        let (status, body) = self.request(Method::HEAD, index, &[], None).await?;
        match status {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::classify_error(index, status, &body)),
        }
    }

    async fn create_index(
        &self,
        index: &str,
        doc_type: &str,
        mapping: &str,
        settings: &IndexSettings,
    ) -> IndexResult<Acknowledged> {
        let mapping: Value =
            serde_json::from_str(mapping).map_err(|e| IndexError::Transport(e.to_string()))?;
        let body = json!({
            "settings": {
                "index": {
                    "number_of_shards": settings.number_of_shards,
                    "number_of_replicas": settings.number_of_replicas,
                    "refresh_interval": settings.refresh_interval,
                }
            },
            "mappings": { doc_type: mapping }
        });
        let (status, body) = self.request(Method::PUT, index, &[], Some(body)).await?;
        if !status.is_success() {
            return Err(Self::classify_error(index, status, &body));
        }
        Ok(Self::acknowledged(&body))
    }

    async fn update_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: &str,
    ) -> IndexResult<Acknowledged> {
        let mapping: Value =
            serde_json::from_str(mapping).map_err(|e| IndexError::Transport(e.to_string()))?;
        let path = format!("{index}/_mapping/{doc_type}");
        let (status, body) = self.request(Method::PUT, &path, &[], Some(mapping)).await?;
        if !status.is_success() {
            return Err(Self::classify_error(index, status, &body));
        }
        Ok(Self::acknowledged(&body))
    }

    async fn update_settings(
        &self,
        index: &str,
        settings: &SettingsUpdate,
    ) -> IndexResult<Acknowledged> {
        let path = format!("{index}/_settings");
        let body = json!({
            "index": { "number_of_replicas": settings.number_of_replicas }
        });
        let (status, body) = self.request(Method::PUT, &path, &[], Some(body)).await?;
        if !status.is_success() {
            return Err(Self::classify_error(index, status, &body));
        }
        Ok(Self::acknowledged(&body))
    }

    async fn delete_index(&self, index: &str) -> IndexResult<Acknowledged> {
        let (status, body) = self.request(Method::DELETE, index, &[], None).await?;
        if !status.is_success() {
            return Err(Self::classify_error(index, status, &body));
        }
        Ok(Self::acknowledged(&body))
    }

    async fn execute(&self, action: &ActionRequest) -> IndexResult<ActionResponse> {
        let (status, body) = match action {
            ActionRequest::Index {
                index,
                id,
                document,
                create,
            } => {
                let path = format!("{index}/{}/{id}", crate::catalog::DEFAULT_TYPE);
                let mut query = Vec::new();
                if *create {
                    query.push(("op_type", "create".to_string()));
                }
                self.request(Method::PUT, &path, &query, Some(document.clone()))
                    .await?
            }
            ActionRequest::Get { index, id } => {
                let path = format!("{index}/{}/{id}", crate::catalog::DEFAULT_TYPE);
                let (status, body) = self.request(Method::GET, &path, &[], None).await?;
                // A missing document is an ordinary "found: false"
                // response, not an error.
                if status == StatusCode::NOT_FOUND && body["found"] == Value::Bool(false) {
                    return Ok(ActionResponse {
                        shards: None,
                        acknowledged: None,
                        body,
                    });
                }
                (status, body)
            }
            ActionRequest::Delete { index, id, version } => {
                let path = format!("{index}/{}/{id}", crate::catalog::DEFAULT_TYPE);
                let mut query = Vec::new();
                if let Some(version) = version {
                    query.push(("version", version.to_string()));
                }
                self.request(Method::DELETE, &path, &query, None).await?
            }
            ActionRequest::Search { index, query } => {
                let path = format!("{index}/_search");
                self.request(Method::POST, &path, &[], Some(query.clone()))
                    .await?
            }
        };

        if !status.is_success() {
            return Err(Self::classify_error(action.index_name(), status, &body));
        }
        Ok(ActionResponse {
            shards: shard_info(&body),
            acknowledged: body["acknowledged"].as_bool(),
            body,
        })
    }

    async fn close(&self) -> IndexResult<()> {
        // reqwest connections are pooled and dropped with the client.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_conflicts() {
        let body = json!({
            "error": {
                "type": VERSION_CONFLICT_EXCEPTION,
                "root_cause": [{"type": VERSION_CONFLICT_EXCEPTION}]
            }
        });
        assert!(matches!(
            HttpIndexClient::classify_error("i", StatusCode::CONFLICT, &body),
            IndexError::VersionConflict
        ));

        let body = json!({
            "error": {"root_cause": [{"type": DOCUMENT_EXISTS_EXCEPTION}]}
        });
        assert!(matches!(
            HttpIndexClient::classify_error("i", StatusCode::CONFLICT, &body),
            IndexError::DocumentAlreadyExists
        ));
    }

    #[test]
    fn test_classify_index_not_found() {
        for body in [
            json!({"error": {"type": "index_not_found_exception"}}),
            json!({"error": "IndexNotFoundException[no such index]"}),
        ] {
            let err = HttpIndexClient::classify_error("gone", StatusCode::NOT_FOUND, &body);
            assert!(matches!(err, IndexError::IndexNotFound(index) if index == "gone"));
        }
    }

    #[test]
    fn test_classify_other_http_error() {
        let body = json!({"error": {"type": "mapper_parsing_exception"}});
        let err = HttpIndexClient::classify_error("i", StatusCode::BAD_REQUEST, &body);
        assert!(matches!(err, IndexError::Http { status: 400, .. }));
    }

    #[test]
    fn test_shard_info_extraction() {
        let body = json!({"_shards": {"total": 5, "successful": 4, "failed": 1}});
        assert_eq!(
            shard_info(&body),
            Some(ShardInfo {
                total: 5,
                successful: 4,
                failed: 1
            })
        );
        assert_eq!(shard_info(&json!({"acknowledged": true})), None);
    }

    #[test]
    fn test_error_type_plain_string() {
        let body = json!({"error": "IndexNotFoundException[no such index]"});
        assert!(error_type(&body).contains("IndexNotFoundException"));
    }
}

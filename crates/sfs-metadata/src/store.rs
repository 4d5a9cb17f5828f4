//! The metadata store: lifecycle, health gating and index management
//! over an [`IndexClient`].

use crate::catalog;
use crate::client::{
    Acknowledged, ActionRequest, ActionResponse, ClusterHealth, HealthStatus, IndexClient,
    IndexError, IndexResult, IndexSettings, SettingsUpdate,
};
use crate::config::ElasticsearchConfig;
use crate::envelope::{self, Backoff};
use crate::http::HttpIndexClient;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Retries performed while waiting for the cluster to go green.
const MAX_HEALTH_RETRIES: u32 = 10;

/// Server-side wait passed to each individual health request.
const HEALTH_WAIT: Duration = Duration::from_secs(2);

/// Errors from the metadata store.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("{successful} shards succeeded, expected {total}")]
    ShardIncomplete { total: u32, successful: u32 },

    #[error("request not acknowledged")]
    NotAcknowledged,

    #[error("cluster health wait exhausted after {attempts} attempts")]
    HealthWaitExhausted {
        attempts: u32,
        #[source]
        last: IndexError,
    },

    #[error("metadata store is not started")]
    NotStarted,

    #[error("shards must be >= 1, got {0}")]
    InvalidShardCount(u32),

    #[error("unexpected lifecycle transition")]
    LifecycleConflict,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Lifecycle states of the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Stopped = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
}

/// CAS cell guarding every lifecycle transition. A lost CAS means a
/// concurrent caller already owns the transition and the loser backs off.
struct StatusCell(AtomicU8);

impl StatusCell {
    const fn new(status: Status) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    fn get(&self) -> Status {
        match self.0.load(Ordering::SeqCst) {
            0 => Status::Stopped,
            1 => Status::Starting,
            2 => Status::Started,
            _ => Status::Stopping,
        }
    }

    fn compare_and_set(&self, current: Status, new: Status) -> bool {
        self.0
            .compare_exchange(current as u8, new as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Builds the index client during start. Swapped out by tests and by
/// deployments with a different transport.
pub type ClientFactory =
    Arc<dyn Fn(&ElasticsearchConfig) -> IndexResult<Arc<dyn IndexClient>> + Send + Sync>;

/// System-of-record access for accounts, containers, keys and objects.
pub struct MetadataStore {
    config: ElasticsearchConfig,
    factory: ClientFactory,
    client: RwLock<Option<Arc<dyn IndexClient>>>,
    status: StatusCell,
}

impl MetadataStore {
    /// Create a store backed by the REST transport.
    #[must_use]
    pub fn new(config: ElasticsearchConfig) -> Self {
        Self::with_client_factory(
            config,
            Arc::new(|config: &ElasticsearchConfig| {
                Ok(Arc::new(HttpIndexClient::new(config)?) as Arc<dyn IndexClient>)
            }),
        )
    }

    /// Create a store with a custom client factory.
    #[must_use]
    pub fn with_client_factory(config: ElasticsearchConfig, factory: ClientFactory) -> Self {
        Self {
            config,
            factory,
            client: RwLock::new(None),
            status: StatusCell::new(Status::Stopped),
        }
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    /// Connect to the store, wait for green health and, on the master
    /// node, apply the common index mappings.
    ///
    /// A concurrent or repeated start is a no-op; only the caller that
    /// wins the `Stopped -> Starting` transition performs initialisation.
    pub async fn start(&self, is_master: bool) -> Result<(), MetadataError> {
        if !self.status.compare_and_set(Status::Stopped, Status::Starting) {
            debug!(status = ?self.status.get(), "start ignored");
            return Ok(());
        }
        debug!("starting metadata store");

        // Client construction resolves seed hosts; keep it off the
        // async context.
        let factory = self.factory.clone();
        let config = self.config.clone();
        let client = tokio::task::spawn_blocking(move || factory(&config))
            .await
            .map_err(|e| MetadataError::Internal(e.to_string()))??;
        *self.client.write() = Some(client);

        self.wait_for_green().await?;
        if is_master {
            self.prepare_common_indices().await?;
        }

        if !self
            .status
            .compare_and_set(Status::Starting, Status::Started)
        {
            return Err(MetadataError::LifecycleConflict);
        }
        debug!("started metadata store");
        Ok(())
    }

    /// Close the client and return to `Stopped`. No-op unless the store
    /// is started or starting.
    pub async fn stop(&self) -> Result<(), MetadataError> {
        if !(self
            .status
            .compare_and_set(Status::Started, Status::Stopping)
            || self
                .status
                .compare_and_set(Status::Starting, Status::Stopping))
        {
            return Ok(());
        }
        debug!("stopping metadata store");

        let client = self.client.write().take();
        if let Some(client) = client {
            if let Err(err) = client.close().await {
                warn!(error = %err, "error closing index client");
            }
        }

        if !self
            .status
            .compare_and_set(Status::Stopping, Status::Stopped)
        {
            return Err(MetadataError::LifecycleConflict);
        }
        debug!("stopped metadata store");
        Ok(())
    }

    fn client(&self) -> Result<Arc<dyn IndexClient>, MetadataError> {
        self.client.read().clone().ok_or(MetadataError::NotStarted)
    }

    /// Apply the fixed mapping set. Run on the master node only.
    async fn prepare_common_indices(&self) -> Result<(), MetadataError> {
        self.create_update_index(&catalog::account_index(), catalog::ACCOUNT_MAPPING, None, None)
            .await?;
        self.create_update_index(
            &catalog::container_index(),
            catalog::CONTAINER_MAPPING,
            None,
            None,
        )
        .await?;
        self.create_update_index(
            &catalog::container_key_index(),
            catalog::CONTAINER_KEY_MAPPING,
            None,
            None,
        )
        .await?;
        self.create_update_index(
            &catalog::master_key_index(),
            catalog::MASTER_KEY_MAPPING,
            None,
            None,
        )
        .await
    }

    /// Create the per-container object index, or update its mapping and
    /// replica count when it already exists.
    pub async fn prepare_object_index(
        &self,
        container_name: &str,
        shards: Option<u32>,
        replicas: Option<u32>,
    ) -> Result<(), MetadataError> {
        let index = catalog::object_index(container_name);
        self.create_update_index(&index, catalog::OBJECT_MAPPING, shards, replicas)
            .await
    }

    /// Delete the per-container object index. Succeeds when the index is
    /// already gone.
    pub async fn delete_object_index(&self, container_name: &str) -> Result<(), MetadataError> {
        let index = catalog::object_index(container_name);
        self.delete_index(&index).await
    }

    /// Idempotently bring `index` to the wanted mapping and settings,
    /// then wait for it to go green.
    ///
    /// `None` for shards or replicas means "not set": creation falls
    /// back to the component defaults, and an existing index keeps its
    /// replica count. Shard counts are fixed at creation and never
    /// changed here.
    pub async fn create_update_index(
        &self,
        index: &str,
        mapping: &str,
        shards: Option<u32>,
        replicas: Option<u32>,
    ) -> Result<(), MetadataError> {
        if let Some(shards) = shards {
            if shards < 1 {
                return Err(MetadataError::InvalidShardCount(shards));
            }
        }
        let admin = self.config.timeouts.admin;
        let client = self.client()?;

        let exists = {
            let client = client.clone();
            let index = index.to_string();
            envelope::dispatch(async move { client.index_exists(&index).await }, admin).await?
        };

        if exists {
            // The mapping update is applied even when unchanged; see the
            // mapping-churn note in DESIGN.md.
            let ack = {
                let client = client.clone();
                let index = index.to_string();
                let mapping = mapping.to_string();
                envelope::dispatch(
                    async move {
                        client
                            .update_mapping(&index, catalog::DEFAULT_TYPE, &mapping)
                            .await
                    },
                    admin,
                )
                .await?
            };
            ensure_acknowledged(ack)?;

            if let Some(replicas) = replicas {
                let ack = {
                    let client = client.clone();
                    let index = index.to_string();
                    let settings = SettingsUpdate {
                        number_of_replicas: replicas,
                    };
                    envelope::dispatch(
                        async move { client.update_settings(&index, &settings).await },
                        admin,
                    )
                    .await?
                };
                ensure_acknowledged(ack)?;
            }
        } else {
            let settings = IndexSettings {
                number_of_shards: shards.unwrap_or(self.config.shards),
                number_of_replicas: replicas.unwrap_or(self.config.replicas),
                refresh_interval: "1s".to_string(),
            };
            let ack = {
                let client = client.clone();
                let index = index.to_string();
                let mapping = mapping.to_string();
                envelope::dispatch(
                    async move {
                        client
                            .create_index(&index, catalog::DEFAULT_TYPE, &mapping, &settings)
                            .await
                    },
                    admin,
                )
                .await?
            };
            ensure_acknowledged(ack)?;
        }

        self.wait_for_index_green(index).await
    }

    /// Delete an index. An index that does not exist counts as deleted.
    pub async fn delete_index(&self, index: &str) -> Result<(), MetadataError> {
        let client = self.client()?;
        let result = {
            let index = index.to_string();
            envelope::dispatch(
                async move { client.delete_index(&index).await },
                self.config.timeouts.admin,
            )
            .await
        };
        match result {
            Ok(ack) => ensure_acknowledged(ack),
            Err(IndexError::IndexNotFound(_)) => {
                debug!(index, "delete of absent index");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Execute a document-level action under a deadline.
    ///
    /// Returns `Ok(Some(response))` when every targeted shard succeeded,
    /// `Ok(None)` when the action failed with one of the benign write
    /// conflicts, and an error otherwise.
    pub async fn execute(
        &self,
        action: ActionRequest,
        timeout: Duration,
    ) -> Result<Option<ActionResponse>, MetadataError> {
        let client = self.client()?;
        let result =
            envelope::dispatch(async move { client.execute(&action).await }, timeout).await;
        match result {
            Ok(response) => {
                if let Some(shards) = response.shards {
                    if shards.successful != shards.total {
                        return Err(MetadataError::ShardIncomplete {
                            total: shards.total,
                            successful: shards.successful,
                        });
                    }
                }
                if response.acknowledged == Some(false) {
                    return Err(MetadataError::NotAcknowledged);
                }
                Ok(Some(response))
            }
            Err(err) if err.is_benign_conflict() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Default deadline for an action, from the configured timeouts.
    #[must_use]
    pub fn default_timeout_for(&self, action: &ActionRequest) -> Duration {
        match action {
            ActionRequest::Index { .. } => self.config.timeouts.index,
            ActionRequest::Get { .. } => self.config.timeouts.get,
            ActionRequest::Delete { .. } => self.config.timeouts.delete,
            ActionRequest::Search { .. } => self.config.timeouts.search,
        }
    }

    /// Wait for every owned index to be green, retrying connection
    /// failures with exponential backoff.
    pub async fn wait_for_green(&self) -> Result<(), MetadataError> {
        let pattern = format!("{}*", catalog::INDEX_PREFIX);
        let backoff = Backoff::new(Duration::from_millis(100), MAX_HEALTH_RETRIES);
        let mut attempt = 0u32;
        loop {
            match self.health(&pattern).await {
                Ok(()) => return Ok(()),
                Err(last) => {
                    attempt += 1;
                    match backoff.delay(attempt) {
                        Some(delay) => {
                            warn!(
                                error = %last,
                                "cluster not green, retrying after {}ms",
                                delay.as_millis()
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            return Err(MetadataError::HealthWaitExhausted {
                                attempts: attempt,
                                last,
                            });
                        }
                    }
                }
            }
        }
    }

    async fn wait_for_index_green(&self, index: &str) -> Result<(), MetadataError> {
        self.health(index).await.map_err(MetadataError::from)
    }

    async fn health(&self, pattern: &str) -> Result<(), IndexError> {
        let client = self.client().map_err(|_| {
            IndexError::Transport("metadata store is not started".to_string())
        })?;
        let health: ClusterHealth = {
            let pattern = pattern.to_string();
            envelope::dispatch(
                async move { client.cluster_health(&pattern, HEALTH_WAIT).await },
                self.config.timeouts.admin,
            )
            .await?
        };
        if health.status == HealthStatus::Green {
            Ok(())
        } else {
            Err(IndexError::NotGreen {
                status: format!("{:?}", health.status).to_lowercase(),
            })
        }
    }
}

fn ensure_acknowledged(ack: Acknowledged) -> Result<(), MetadataError> {
    if ack.0 {
        Ok(())
    } else {
        Err(MetadataError::NotAcknowledged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ShardInfo;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::AtomicU32;
    use tokio::sync::oneshot;

    /// In-process fake of the external document store.
    #[derive(Default)]
    struct FakeIndexClient {
        indices: Mutex<HashSet<String>>,
        /// Health calls that fail before the cluster reports green;
        /// `u32::MAX` means never green.
        health_failures: AtomicU32,
        health_calls: AtomicU32,
        create_calls: Mutex<Vec<(String, IndexSettings)>>,
        update_mapping_calls: Mutex<Vec<String>>,
        update_settings_calls: Mutex<Vec<(String, SettingsUpdate)>>,
        close_calls: AtomicU32,
        execute_results: Mutex<VecDeque<IndexResult<ActionResponse>>>,
        /// Complete execute calls from a foreign thread.
        execute_from_thread: bool,
    }

    impl FakeIndexClient {
        fn with_index(self, index: &str) -> Self {
            self.indices.lock().insert(index.to_string());
            self
        }

        fn with_health_failures(self, failures: u32) -> Self {
            self.health_failures.store(failures, Ordering::SeqCst);
            self
        }

        fn push_execute_result(&self, result: IndexResult<ActionResponse>) {
            self.execute_results.lock().push_back(result);
        }
    }

    #[async_trait::async_trait]
    impl IndexClient for FakeIndexClient {
        async fn cluster_health(
            &self,
            _index_pattern: &str,
            _wait: Duration,
        ) -> IndexResult<ClusterHealth> {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.health_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                if remaining != u32::MAX {
                    self.health_failures.store(remaining - 1, Ordering::SeqCst);
                }
                return Err(IndexError::Transport("connection refused".to_string()));
            }
            Ok(ClusterHealth {
                status: HealthStatus::Green,
                timed_out: false,
            })
        }

        async fn index_exists(&self, index: &str) -> IndexResult<bool> {
            Ok(self.indices.lock().contains(index))
        }

        async fn create_index(
            &self,
            index: &str,
            _doc_type: &str,
            _mapping: &str,
            settings: &IndexSettings,
        ) -> IndexResult<Acknowledged> {
            self.create_calls
                .lock()
                .push((index.to_string(), settings.clone()));
            self.indices.lock().insert(index.to_string());
            Ok(Acknowledged(true))
        }

        async fn update_mapping(
            &self,
            index: &str,
            _doc_type: &str,
            _mapping: &str,
        ) -> IndexResult<Acknowledged> {
            self.update_mapping_calls.lock().push(index.to_string());
            Ok(Acknowledged(true))
        }

        async fn update_settings(
            &self,
            index: &str,
            settings: &SettingsUpdate,
        ) -> IndexResult<Acknowledged> {
            self.update_settings_calls
                .lock()
                .push((index.to_string(), *settings));
            Ok(Acknowledged(true))
        }

        async fn delete_index(&self, index: &str) -> IndexResult<Acknowledged> {
            if self.indices.lock().remove(index) {
                Ok(Acknowledged(true))
            } else {
                Err(IndexError::IndexNotFound(index.to_string()))
            }
        }

        async fn execute(&self, _action: &ActionRequest) -> IndexResult<ActionResponse> {
            let queued = self.execute_results.lock().pop_front();
            let result = queued.unwrap_or_else(|| Ok(ActionResponse::default()));
            if self.execute_from_thread {
                let (tx, rx) = oneshot::channel();
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    let _ = tx.send(result);
                });
                rx.await
                    .unwrap_or_else(|_| Err(IndexError::Transport("thread died".to_string())))
            } else {
                result
            }
        }

        async fn close(&self) -> IndexResult<()> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MetadataStore>,
        fake: Arc<FakeIndexClient>,
        factory_calls: Arc<AtomicU32>,
    }

    fn harness(fake: FakeIndexClient) -> Harness {
        harness_with_config(fake, ElasticsearchConfig::default())
    }

    fn harness_with_config(fake: FakeIndexClient, config: ElasticsearchConfig) -> Harness {
        let fake = Arc::new(fake);
        let factory_calls = Arc::new(AtomicU32::new(0));
        let store = {
            let fake = fake.clone();
            let factory_calls = factory_calls.clone();
            MetadataStore::with_client_factory(
                config,
                Arc::new(move |_| {
                    factory_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(fake.clone() as Arc<dyn IndexClient>)
                }),
            )
        };
        Harness {
            store: Arc::new(store),
            fake,
            factory_calls,
        }
    }

    fn write_response(total: u32, successful: u32) -> ActionResponse {
        ActionResponse {
            shards: Some(ShardInfo {
                total,
                successful,
                failed: total - successful,
            }),
            acknowledged: None,
            body: json!({"_id": "doc"}),
        }
    }

    #[tokio::test]
    async fn test_start_transitions_to_started() {
        let h = harness(FakeIndexClient::default());
        assert_eq!(h.store.status(), Status::Stopped);

        h.store.start(false).await.unwrap();

        assert_eq!(h.store.status(), Status::Started);
        assert_eq!(h.factory_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.fake.health_calls.load(Ordering::SeqCst), 1);
        // Not a master: no index setup.
        assert!(h.fake.create_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_master_start_applies_common_mappings() {
        let h = harness(FakeIndexClient::default());
        h.store.start(true).await.unwrap();

        let created: Vec<String> = h
            .fake
            .create_calls
            .lock()
            .iter()
            .map(|(index, _)| index.clone())
            .collect();
        assert_eq!(
            created,
            vec![
                "sfs_v0_account",
                "sfs_v0_container",
                "sfs_v0_container_key",
                "sfs_v0_master_key"
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_start_initialises_once() {
        let h = harness(FakeIndexClient::default());
        let (a, b) = tokio::join!(h.store.start(false), h.store.start(false));
        a.unwrap();
        b.unwrap();

        assert_eq!(h.store.status(), Status::Started);
        assert_eq!(h.factory_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_start_is_noop() {
        let h = harness(FakeIndexClient::default());
        h.store.start(false).await.unwrap();
        h.store.start(false).await.unwrap();
        assert_eq!(h.factory_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_closes_client() {
        let h = harness(FakeIndexClient::default());
        h.store.start(false).await.unwrap();

        h.store.stop().await.unwrap();
        assert_eq!(h.store.status(), Status::Stopped);
        assert_eq!(h.fake.close_calls.load(Ordering::SeqCst), 1);

        // Stopping an already stopped store is a no-op.
        h.store.stop().await.unwrap();
        assert_eq!(h.fake.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_green_retries_then_recovers() {
        let h = harness(FakeIndexClient::default().with_health_failures(3));
        let before = tokio::time::Instant::now();
        h.store.start(false).await.unwrap();

        // Three failures sleep 200 + 400 + 800 ms before the fourth
        // attempt reports green.
        assert_eq!(h.fake.health_calls.load(Ordering::SeqCst), 4);
        assert_eq!(before.elapsed(), Duration::from_millis(1_400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_green_exhausts_after_ten_retries() {
        let h = harness(FakeIndexClient::default().with_health_failures(u32::MAX));
        let before = tokio::time::Instant::now();
        let err = h.store.start(false).await.unwrap_err();

        assert!(matches!(
            err,
            MetadataError::HealthWaitExhausted { attempts: 11, .. }
        ));
        assert_eq!(h.fake.health_calls.load(Ordering::SeqCst), 11);
        // Delays are 100 * 2^k ms for k = 1..10.
        let expected: u64 = (1..=10).map(|k| 100 * (1u64 << k)).sum();
        assert_eq!(before.elapsed(), Duration::from_millis(expected));
    }

    #[tokio::test]
    async fn test_create_update_index_creates_when_missing() {
        let h = harness(FakeIndexClient::default());
        h.store.start(false).await.unwrap();

        h.store
            .prepare_object_index("photos", Some(3), Some(1))
            .await
            .unwrap();

        let creates = h.fake.create_calls.lock();
        assert_eq!(creates.len(), 1);
        let (index, settings) = &creates[0];
        assert_eq!(index, "sfs_v0_photos_objects");
        assert_eq!(settings.number_of_shards, 3);
        assert_eq!(settings.number_of_replicas, 1);
        assert_eq!(settings.refresh_interval, "1s");
        assert!(h.fake.indices.lock().contains("sfs_v0_photos_objects"));
    }

    #[tokio::test]
    async fn test_create_update_index_updates_existing() {
        let h = harness(FakeIndexClient::default().with_index("sfs_v0_photos_objects"));
        h.store.start(false).await.unwrap();

        h.store
            .prepare_object_index("photos", None, Some(2))
            .await
            .unwrap();

        // Mapping is re-applied, replica count updated, shard count and
        // index creation untouched.
        assert_eq!(
            *h.fake.update_mapping_calls.lock(),
            vec!["sfs_v0_photos_objects"]
        );
        let settings = h.fake.update_settings_calls.lock();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].1.number_of_replicas, 2);
        assert!(h.fake.create_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_create_update_index_existing_without_replicas_skips_settings() {
        let h = harness(FakeIndexClient::default().with_index("sfs_v0_photos_objects"));
        h.store.start(false).await.unwrap();

        h.store
            .prepare_object_index("photos", None, None)
            .await
            .unwrap();

        assert!(h.fake.update_settings_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_create_update_index_falls_back_to_defaults() {
        let config = ElasticsearchConfig {
            shards: 4,
            replicas: 2,
            ..Default::default()
        };
        let h = harness_with_config(FakeIndexClient::default(), config);
        h.store.start(false).await.unwrap();

        h.store
            .prepare_object_index("photos", None, None)
            .await
            .unwrap();

        let creates = h.fake.create_calls.lock();
        assert_eq!(creates[0].1.number_of_shards, 4);
        assert_eq!(creates[0].1.number_of_replicas, 2);
    }

    #[tokio::test]
    async fn test_create_update_index_rejects_zero_shards() {
        let h = harness(FakeIndexClient::default());
        h.store.start(false).await.unwrap();

        let err = h
            .store
            .prepare_object_index("photos", Some(0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidShardCount(0)));
        assert!(h.fake.create_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_delete_index_swallows_missing() {
        let h = harness(FakeIndexClient::default());
        h.store.start(false).await.unwrap();

        h.store.delete_object_index("never_created").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_index_removes_existing() {
        let h = harness(FakeIndexClient::default().with_index("sfs_v0_photos_objects"));
        h.store.start(false).await.unwrap();

        h.store.delete_object_index("photos").await.unwrap();
        assert!(!h.fake.indices.lock().contains("sfs_v0_photos_objects"));
    }

    #[tokio::test]
    async fn test_execute_enforces_shard_success() {
        let h = harness(FakeIndexClient::default());
        h.store.start(false).await.unwrap();

        h.fake.push_execute_result(Ok(write_response(5, 5)));
        let action = ActionRequest::Get {
            index: "sfs_v0_account".to_string(),
            id: "a".to_string(),
        };
        let response = h
            .store
            .execute(action.clone(), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        let shards = response.shards.unwrap();
        assert_eq!(shards.successful, shards.total);

        h.fake.push_execute_result(Ok(write_response(5, 4)));
        let err = h
            .store
            .execute(action, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MetadataError::ShardIncomplete {
                total: 5,
                successful: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_execute_maps_benign_conflicts_to_absent() {
        let h = harness(FakeIndexClient::default());
        h.store.start(false).await.unwrap();

        let action = ActionRequest::Index {
            index: "sfs_v0_account".to_string(),
            id: "a".to_string(),
            document: json!({}),
            create: true,
        };

        h.fake
            .push_execute_result(Err(IndexError::DocumentAlreadyExists));
        let absent = h
            .store
            .execute(action.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(absent.is_none());

        h.fake.push_execute_result(Err(IndexError::VersionConflict));
        let absent = h
            .store
            .execute(action.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(absent.is_none());

        // Every other error kind fails the call.
        h.fake
            .push_execute_result(Err(IndexError::Transport("broken pipe".to_string())));
        let err = h
            .store
            .execute(action, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Index(IndexError::Transport(_))));
    }

    #[tokio::test]
    async fn test_execute_rejects_unacknowledged_response() {
        let h = harness(FakeIndexClient::default());
        h.store.start(false).await.unwrap();

        h.fake.push_execute_result(Ok(ActionResponse {
            shards: None,
            acknowledged: Some(false),
            body: json!({}),
        }));
        let err = h
            .store
            .execute(
                ActionRequest::Get {
                    index: "sfs_v0_account".to_string(),
                    id: "a".to_string(),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotAcknowledged));
    }

    #[tokio::test]
    async fn test_execute_completes_on_caller_context() {
        let fake = FakeIndexClient {
            execute_from_thread: true,
            ..Default::default()
        };
        let h = harness(fake);
        h.store.start(false).await.unwrap();

        let caller_thread = std::thread::current().id();
        h.fake.push_execute_result(Ok(ActionResponse::default()));
        h.store
            .execute(
                ActionRequest::Get {
                    index: "sfs_v0_account".to_string(),
                    id: "a".to_string(),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        // Single-threaded runtime: the continuation must be back on the
        // origin context even though the fake completed on its own thread.
        assert_eq!(std::thread::current().id(), caller_thread);
    }

    #[tokio::test]
    async fn test_execute_before_start_fails() {
        let h = harness(FakeIndexClient::default());
        let err = h
            .store
            .execute(
                ActionRequest::Get {
                    index: "sfs_v0_account".to_string(),
                    id: "a".to_string(),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotStarted));
    }

    #[tokio::test]
    async fn test_default_timeouts_per_action() {
        let h = harness(FakeIndexClient::default());
        let get = ActionRequest::Get {
            index: "i".to_string(),
            id: "a".to_string(),
        };
        let search = ActionRequest::Search {
            index: "i".to_string(),
            query: json!({}),
        };
        assert_eq!(
            h.store.default_timeout_for(&get),
            Duration::from_millis(500)
        );
        assert_eq!(h.store.default_timeout_for(&search), Duration::from_secs(5));
    }
}

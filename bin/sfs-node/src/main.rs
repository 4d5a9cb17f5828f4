//! SFS Node - volume-bearing cluster node
//!
//! Serves the inter-node blob service, keeps this node's service
//! definition registered in the metadata store, and maintains the local
//! view of the cluster directory.

mod config;
mod http;
mod service;
mod volume;

use anyhow::Result;
use clap::Parser;
use config::Config;
use service::NodeService;
use sfs_cluster::{ClusterDirectory, NodePool, ServiceDef};
use sfs_common::{NodeId, VolumeId};
use sfs_metadata::{catalog, ActionRequest, ElasticsearchConfig, MetadataStore};
use sfs_proto::blob::blob_service_server::BlobServiceServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tonic::transport::Server;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use volume::VolumeRegistry;

#[derive(Parser, Debug)]
#[command(name = "sfs-node")]
#[command(about = "SFS volume-bearing cluster node")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/sfs/node.toml")]
    config: String,

    /// Listen address for the blob gRPC service
    #[arg(short, long)]
    listen: Option<String>,

    /// Advertise address (how other nodes reach this one)
    /// If not set, derived from listen address
    #[arg(long)]
    advertise_addr: Option<String>,

    /// Apply the common index mappings on startup
    #[arg(long)]
    master: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Admin HTTP port (health, metrics, scrub)
    #[arg(long)]
    admin_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config file if it exists
    let config: Config = if std::path::Path::new(&args.config).exists() {
        let config_str = std::fs::read_to_string(&args.config)?;
        toml::from_str(&config_str).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to parse config file: {}", e);
            Config::default()
        })
    } else {
        Config::default()
    };

    // Merge CLI args with config file (CLI takes precedence)
    let listen = args.listen.unwrap_or(config.node.listen.clone());
    let advertise_addr = args
        .advertise_addr
        .or(config.node.advertise_addr.clone());
    let is_master = args.master || config.node.master;
    let admin_port = args.admin_port.unwrap_or(config.node.admin_port);
    let log_level = if args.log_level != "info" {
        args.log_level
    } else {
        config.logging.level.clone()
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SFS node");
    info!("Config file: {}", args.config);

    let node_id = NodeId::new();
    info!("Node ID: {}", node_id);

    let volume_ids: Vec<VolumeId> = config
        .node
        .volumes
        .iter()
        .map(|id| VolumeId::new(id.clone()))
        .collect();
    let registry = Arc::new(VolumeRegistry::in_memory(&volume_ids));
    info!("Hosting {} volumes", registry.len());

    // Connect the metadata store
    let es_config = match ElasticsearchConfig::resolve(&config.elasticsearch) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid elasticsearch configuration: {}", e);
            std::process::exit(1);
        }
    };
    let store = Arc::new(MetadataStore::new(es_config));
    if let Err(e) = store.start(is_master).await {
        error!("Failed to start metadata store: {}", e);
        std::process::exit(1);
    }
    info!("Metadata store started (master={})", is_master);

    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", listen, e))?;

    // Determine the address advertised in this node's service definition
    let advertise_addr = match advertise_addr {
        Some(addr) if addr.starts_with("http://") || addr.starts_with("https://") => addr,
        Some(addr) => format!("http://{}", addr),
        None if listen.starts_with("0.0.0.0") => {
            format!(
                "http://127.0.0.1:{}",
                listen.split(':').next_back().unwrap_or("9002")
            )
        }
        None => format!("http://{}", listen),
    };
    info!("Advertising at: {}", advertise_addr);

    // Publish this node's service definition
    let service_def = ServiceDef {
        node_id,
        endpoint: advertise_addr.clone(),
        volumes: registry.adverts(),
    };
    match register_service_def(&store, &service_def).await {
        Ok(()) => info!("Registered service definition"),
        Err(e) => warn!("Failed to register service definition: {} (continuing anyway)", e),
    }

    // Cluster directory, refreshed from service definitions
    let directory = Arc::new(ClusterDirectory::new(Arc::new(NodePool::new())));
    let refresh_interval = Duration::from_secs(config.node.directory_refresh_secs.max(1));
    {
        let store = store.clone();
        let directory = directory.clone();
        tokio::spawn(async move {
            directory_refresh_loop(store, directory, refresh_interval).await;
        });
    }

    // Admin HTTP surface
    let admin_state = Arc::new(http::AdminState {
        node_name: config.node.name.clone(),
        registry: registry.clone(),
        store: store.clone(),
        directory: directory.clone(),
        start_time: Instant::now(),
    });
    tokio::spawn(async move {
        if let Err(e) = serve_admin(admin_port, admin_state).await {
            error!("Admin server error: {}", e);
        }
    });

    info!("Starting blob service on {}", addr);
    info!("Admin surface at http://0.0.0.0:{}", admin_port);

    let blob_service = BlobServiceServer::new(NodeService::new(registry));
    Server::builder()
        .add_service(blob_service)
        .serve_with_shutdown(addr, async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    if let Err(e) = store.stop().await {
        warn!("Error stopping metadata store: {}", e);
    }
    info!("Node shut down gracefully");

    Ok(())
}

/// Index this node's service definition, overwriting the previous one.
async fn register_service_def(store: &MetadataStore, def: &ServiceDef) -> Result<()> {
    let action = ActionRequest::Index {
        index: catalog::service_def_index(),
        id: def.document_id(),
        document: serde_json::to_value(def)?,
        create: false,
    };
    let timeout = store.default_timeout_for(&action);
    store.execute(action, timeout).await?;
    Ok(())
}

/// Read every service definition currently registered.
async fn fetch_service_defs(store: &MetadataStore) -> Result<Vec<ServiceDef>> {
    let action = ActionRequest::Search {
        index: catalog::service_def_index(),
        query: serde_json::json!({"query": {"match_all": {}}, "size": 1000}),
    };
    let timeout = store.default_timeout_for(&action);
    let response = store.execute(action, timeout).await?;

    let mut defs = Vec::new();
    if let Some(response) = response {
        if let Some(hits) = response.body["hits"]["hits"].as_array() {
            for hit in hits {
                match serde_json::from_value::<ServiceDef>(hit["_source"].clone()) {
                    Ok(def) => defs.push(def),
                    Err(e) => warn!("Skipping malformed service definition: {}", e),
                }
            }
        }
    }
    Ok(defs)
}

/// Keep the cluster directory in sync with the service definitions.
async fn directory_refresh_loop(
    store: Arc<MetadataStore>,
    directory: Arc<ClusterDirectory>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match fetch_service_defs(&store).await {
            Ok(defs) => directory.refresh(&defs).await,
            Err(e) => warn!("Service definition refresh failed: {}", e),
        }
    }
}

/// Serve the admin HTTP surface.
async fn serve_admin(port: u16, state: Arc<http::AdminState>) -> Result<()> {
    let app = http::router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

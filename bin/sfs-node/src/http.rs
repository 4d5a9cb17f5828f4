//! HTTP admin surface: health, metrics, blob header lookups and
//! on-demand blob reference scrubbing.

use crate::volume::VolumeRegistry;
use axum::extract::{Path, State};
use axum::http::{header::HeaderName, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sfs_cluster::{ClusterDirectory, VerifyBlobReference};
use sfs_common::{HeaderBlob, VolumeId};
use sfs_metadata::{catalog, ActionRequest, MetadataStore};
use sfs_model::ObjectDoc;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Response annotations for a blob header.
pub const X_CONTENT_LENGTH: HeaderName = HeaderName::from_static("x-content-length");
pub const X_CONTENT_VOLUME: HeaderName = HeaderName::from_static("x-content-volume");
pub const X_CONTENT_POSITION: HeaderName = HeaderName::from_static("x-content-position");

/// Write the `X-Content-*` annotations for a blob header, when present.
pub fn write_header_blob(headers: &mut HeaderMap, blob: Option<&HeaderBlob>) {
    if let Some(blob) = blob {
        headers.insert(
            X_CONTENT_LENGTH,
            blob.length.to_string().parse().expect("decimal header"),
        );
        if let Ok(volume) = blob.volume_id.as_str().parse() {
            headers.insert(X_CONTENT_VOLUME, volume);
        }
        headers.insert(
            X_CONTENT_POSITION,
            blob.position.to_string().parse().expect("decimal header"),
        );
    }
}

/// State shared by the admin routes.
pub struct AdminState {
    pub node_name: String,
    pub registry: Arc<VolumeRegistry>,
    pub store: Arc<MetadataStore>,
    pub directory: Arc<ClusterDirectory>,
    pub start_time: Instant,
}

/// Build the admin router.
pub fn router(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/blob/:volume/:position", get(blob_handler))
        .route(
            "/verify/:account/:container/:object",
            get(verify_handler),
        )
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    let mut output = String::with_capacity(1024);

    writeln!(output, "# HELP sfs_node_info Node information").unwrap();
    writeln!(output, "# TYPE sfs_node_info gauge").unwrap();
    writeln!(output, "sfs_node_info{{node=\"{}\"}} 1", state.node_name).unwrap();

    writeln!(output, "# HELP sfs_node_uptime_seconds Node uptime in seconds").unwrap();
    writeln!(output, "# TYPE sfs_node_uptime_seconds counter").unwrap();
    writeln!(
        output,
        "sfs_node_uptime_seconds{{node=\"{}\"}} {}",
        state.node_name,
        state.start_time.elapsed().as_secs()
    )
    .unwrap();

    writeln!(output, "# HELP sfs_node_volumes Hosted volume count").unwrap();
    writeln!(output, "# TYPE sfs_node_volumes gauge").unwrap();
    writeln!(
        output,
        "sfs_node_volumes{{node=\"{}\"}} {}",
        state.node_name,
        state.registry.len()
    )
    .unwrap();

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        output,
    )
}

/// Answer a blob-coordinate probe with the header annotations.
async fn blob_handler(
    State(state): State<Arc<AdminState>>,
    Path((volume, position)): Path<(String, u64)>,
) -> impl IntoResponse {
    let volume_id = VolumeId::new(volume);
    let Some(volume) = state.registry.get(&volume_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let data = match volume.read_blob(position) {
        Ok(data) => data,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let Some(data) = data else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let blob = HeaderBlob {
        volume_id,
        position,
        length: data.len() as u64,
    };
    let mut headers = HeaderMap::new();
    write_header_blob(&mut headers, Some(&blob));
    (StatusCode::NO_CONTENT, headers).into_response()
}

/// Fetch an object document and verify every blob reference it holds.
///
/// Scrub sweeps call this per object; a reference that cannot be
/// verified reports `false`, never an error.
async fn verify_handler(
    State(state): State<Arc<AdminState>>,
    Path((account, container, object)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let action = ActionRequest::Get {
        index: catalog::object_index(&container),
        id: format!("{account}/{container}/{object}"),
    };
    let timeout = state.store.default_timeout_for(&action);
    let response = match state.store.execute(action, timeout).await {
        Ok(Some(response)) => response,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            warn!(error = %err, "object lookup failed");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };
    if response.body["found"] != serde_json::Value::Bool(true) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let object_doc: ObjectDoc = match serde_json::from_value(response.body["_source"].clone()) {
        Ok(doc) => doc,
        Err(err) => {
            warn!(error = %err, "malformed object document");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let verifier = VerifyBlobReference::new(state.directory.clone());
    let mut references = Vec::new();
    for view in object_doc.blob_references() {
        let volume_id = view.blob.volume_id.clone();
        let position = view.blob.position;
        let verified = verifier.call(view).await;
        references.push(json!({
            "volume_id": volume_id,
            "position": position,
            "verified": verified,
        }));
    }

    Json(json!({
        "account_id": object_doc.account_id,
        "container_id": object_doc.container_id,
        "object_id": object_doc.object_id,
        "references": references,
    }))
    .into_response()
}

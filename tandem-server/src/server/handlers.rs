use crate::core::{KVStore, Store, StoreError};
use crate::replication::{ControlInfo, ReplicationError, ReplicationSlave, SlaveStatus};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Serving front end; refuses reads while out of sync
    pub slave: ReplicationSlave,
    /// Local replica store, for stats only
    pub kv_store: Arc<KVStore>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GetResponse {
    String { value: String, flags: u32 },
    Bytes { value: Vec<u8>, flags: u32 },
    NotFound(serde_json::Value),
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_keys: usize,
    pub total_memory_bytes: usize,
    pub operations: OperationStats,
    pub hit_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct OperationStats {
    pub gets: u64,
    pub sets: u64,
    pub dels: u64,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub control: String,
    pub result: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tandem",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET endpoint - read a key through the replication slave
pub async fn kv_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<GetResponse>, StoreError> {
    let return_type = params.get("type").map(|s| s.as_str()).unwrap_or("string");
    debug!("REST GET key={}, type={}", key, return_type);

    let Some(item) = state.slave.get(&key)? else {
        return Ok(Json(GetResponse::NotFound(
            serde_json::json!({"error": "Key not found"}),
        )));
    };

    match return_type {
        "bytes" => Ok(Json(GetResponse::Bytes {
            value: item.value,
            flags: item.flags,
        })),
        _ => {
            let value = String::from_utf8(item.value)
                .unwrap_or_else(|e| format!("<binary data: {} bytes>", e.as_bytes().len()));
            Ok(Json(GetResponse::String {
                value,
                flags: item.flags,
            }))
        }
    }
}

/// STATS endpoint - local store counters
pub async fn kv_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    debug!("REST STATS");

    let stats = state.kv_store.stats();

    Json(StatsResponse {
        total_keys: stats.total_keys,
        total_memory_bytes: stats.total_memory_bytes,
        operations: OperationStats {
            gets: stats.gets,
            sets: stats.sets,
            dels: stats.dels,
            hits: stats.hits,
            misses: stats.misses,
        },
        hit_rate: stats.hit_rate(),
    })
}

pub async fn replication_status(State(state): State<AppState>) -> Json<SlaveStatus> {
    Json(state.slave.status())
}

pub async fn replication_controls(State(state): State<AppState>) -> Json<Vec<ControlInfo>> {
    Json(state.slave.controls())
}

/// Run an admin control; the request body is its argument string
pub async fn replication_control(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: String,
) -> Result<Json<ControlResponse>, ReplicationError> {
    info!("REST CONTROL {} args={:?}", name, body);

    let result = state.slave.control(&name, body.trim()).await?;

    Ok(Json(ControlResponse {
        control: name,
        result,
    }))
}
